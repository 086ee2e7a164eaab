//! Fake SSH collaborators.

use crate::ssh::{Communicator, Connector, Provisioner, SshConfig};
use crate::ui::Ui;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Session {
    commands: Vec<String>,
    uploads: Vec<(PathBuf, String)>,
    exit_status: HashMap<String, i32>,
    closed: bool,
}

/// A communicator that records what it is asked to do.
///
/// Clones share the same session record.
#[derive(Debug, Clone, Default)]
pub struct FakeCommunicator {
    session: Arc<Mutex<Session>>,
}

impl FakeCommunicator {
    /// Creates a communicator where every command exits 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `command` exit with `status`.
    #[must_use]
    pub fn with_exit_status(self, command: impl Into<String>, status: i32) -> Self {
        self.session.lock().exit_status.insert(command.into(), status);
        self
    }

    /// Commands run so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.session.lock().commands.clone()
    }

    /// Files uploaded so far.
    #[must_use]
    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.session.lock().uploads.clone()
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.session.lock().closed
    }
}

#[async_trait]
impl Communicator for FakeCommunicator {
    async fn run_command(&mut self, command: &str) -> anyhow::Result<i32> {
        let mut session = self.session.lock();
        if session.closed {
            anyhow::bail!("connection closed");
        }
        session.commands.push(command.to_string());
        Ok(session.exit_status.get(command).copied().unwrap_or(0))
    }

    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> anyhow::Result<()> {
        self.session
            .lock()
            .uploads
            .push((local_path.to_path_buf(), remote_path.to_string()));
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.session.lock().closed = true;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Dialing {
    refusals_left: Option<usize>,
    attempts: Vec<String>,
    last_config: Option<SshConfig>,
}

/// A connector that refuses a configurable number of attempts.
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    dialing: Arc<Mutex<Dialing>>,
    communicator: FakeCommunicator,
}

impl FakeConnector {
    /// Creates a connector that accepts the first attempt.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dialing: Arc::new(Mutex::new(Dialing {
                refusals_left: Some(0),
                ..Dialing::default()
            })),
            communicator: FakeCommunicator::new(),
        }
    }

    /// Creates a connector that never accepts.
    #[must_use]
    pub fn refusing() -> Self {
        Self::default()
    }

    /// Refuses the first `count` attempts.
    #[must_use]
    pub fn refusing_first(self, count: usize) -> Self {
        self.dialing.lock().refusals_left = Some(count);
        self
    }

    /// Uses `communicator` for accepted connections.
    #[must_use]
    pub fn with_communicator(mut self, communicator: FakeCommunicator) -> Self {
        self.communicator = communicator;
        self
    }

    /// The communicator handed out on success.
    #[must_use]
    pub fn communicator(&self) -> &FakeCommunicator {
        &self.communicator
    }

    /// Addresses dialed so far.
    #[must_use]
    pub fn attempts(&self) -> Vec<String> {
        self.dialing.lock().attempts.clone()
    }

    /// Configuration of the last attempt.
    #[must_use]
    pub fn last_config(&self) -> Option<SshConfig> {
        self.dialing.lock().last_config.clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        address: &str,
        config: &SshConfig,
    ) -> anyhow::Result<Box<dyn Communicator>> {
        let mut dialing = self.dialing.lock();
        dialing.attempts.push(address.to_string());
        dialing.last_config = Some(config.clone());
        match dialing.refusals_left {
            Some(0) => Ok(Box::new(self.communicator.clone())),
            Some(ref mut n) => {
                *n -= 1;
                anyhow::bail!("connection refused by {address}")
            }
            None => anyhow::bail!("connection refused by {address}"),
        }
    }
}

/// A provisioner that runs one command and records that it ran.
#[derive(Debug, Clone)]
pub struct RecordingProvisioner {
    name: String,
    command: String,
    runs: Arc<Mutex<usize>>,
}

impl RecordingProvisioner {
    /// Creates a provisioner that runs `command`.
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            runs: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of times it ran.
    #[must_use]
    pub fn runs(&self) -> usize {
        *self.runs.lock()
    }
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn provision(
        &self,
        ui: &dyn Ui,
        communicator: &mut dyn Communicator,
    ) -> anyhow::Result<()> {
        *self.runs.lock() += 1;
        ui.message(&format!("{}: {}", self.name, self.command));
        let status = communicator.run_command(&self.command).await?;
        if status != 0 {
            anyhow::bail!("{} failed with status {status}", self.name);
        }
        Ok(())
    }
}
