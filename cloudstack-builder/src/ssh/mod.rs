//! SSH access to the build VM.
//!
//! The transport itself is a collaborator: a [`Connector`] dials, a
//! [`Communicator`] runs commands and uploads files, and [`Provisioner`]s
//! drive a communicator. This module derives the address and credentials
//! from the state bag.

use crate::errors::BuildError;
use crate::state::StateBag;
use crate::ui::Ui;
use async_trait::async_trait;
use ssh_key::PrivateKey;
use std::fmt;
use std::path::Path;

/// One authentication method offered to the server.
#[derive(Clone)]
pub enum SshAuth {
    /// Password authentication.
    Password(String),
    /// Keyboard-interactive, answering every prompt with the password.
    KeyboardInteractive(String),
    /// Public key authentication.
    PublicKey(PrivateKey),
}

impl SshAuth {
    /// Method name as used in SSH negotiation.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::KeyboardInteractive(_) => "keyboard-interactive",
            Self::PublicKey(_) => "publickey",
        }
    }
}

impl fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// Client configuration handed to a [`Connector`].
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Remote user.
    pub username: String,
    /// Authentication methods, tried in order.
    pub auth: Vec<SshAuth>,
}

impl SshConfig {
    /// Returns true if public key authentication is offered.
    #[must_use]
    pub fn has_public_key(&self) -> bool {
        self.auth.iter().any(|a| matches!(a, SshAuth::PublicKey(_)))
    }
}

/// Address of the VM's SSH server, `<ip>:<port>`.
pub fn ssh_address(state: &StateBag) -> Result<String, BuildError> {
    let ip = state.virtual_machine_ip()?;
    Ok(format!("{ip}:{}", state.config().ssh_port))
}

/// Builds the client configuration for the VM.
///
/// Password and keyboard-interactive authentication are always offered.
/// Public key authentication is added when the state holds key material.
pub fn ssh_config(state: &StateBag) -> Result<SshConfig, BuildError> {
    let config = state.config();
    let password = config.ssh_password.clone();

    let mut auth = vec![
        SshAuth::Password(password.clone()),
        SshAuth::KeyboardInteractive(password),
    ];

    let private_key = state.ssh_private_key()?;
    if !private_key.trim().is_empty() {
        let key = PrivateKey::from_openssh(private_key)
            .map_err(|e| BuildError::SshKey(format!("Error parsing private key: {e}")))?;
        auth.push(SshAuth::PublicKey(key));
    }

    Ok(SshConfig {
        username: config.ssh_username.clone(),
        auth,
    })
}

/// Dials SSH servers.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection to `address`.
    async fn connect(
        &self,
        address: &str,
        config: &SshConfig,
    ) -> anyhow::Result<Box<dyn Communicator>>;
}

/// An open SSH connection.
#[async_trait]
pub trait Communicator: Send + Sync + fmt::Debug {
    /// Runs a command and returns its exit status.
    async fn run_command(&mut self, command: &str) -> anyhow::Result<i32>;

    /// Copies a local file to `remote_path`.
    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> anyhow::Result<()>;

    /// Closes the connection.
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Configures the VM over an open connection.
#[async_trait]
pub trait Provisioner: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Runs the provisioner.
    async fn provision(&self, ui: &dyn Ui, communicator: &mut dyn Communicator)
        -> anyhow::Result<()>;
}

/// Runs a fixed list of shell commands; any non-zero exit fails.
#[derive(Debug, Clone, Default)]
pub struct ShellProvisioner {
    commands: Vec<String>,
}

impl ShellProvisioner {
    /// Creates a provisioner for `commands`.
    #[must_use]
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Provisioner for ShellProvisioner {
    fn name(&self) -> &str {
        "shell"
    }

    async fn provision(
        &self,
        ui: &dyn Ui,
        communicator: &mut dyn Communicator,
    ) -> anyhow::Result<()> {
        for command in &self.commands {
            ui.message(&format!("Running: {command}"));
            let status = communicator.run_command(command).await?;
            if status != 0 {
                anyhow::bail!("command `{command}` exited with status {status}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_state, FakeCloudStack, FakeCommunicator};
    use crate::ui::CollectingUi;
    use ssh_key::private::{Ed25519Keypair, KeypairData};
    use ssh_key::LineEnding;

    fn openssh_key() -> String {
        let pair = Ed25519Keypair::from_seed(&[7u8; 32]);
        PrivateKey::new(KeypairData::from(pair), "test")
            .unwrap()
            .to_openssh(LineEnding::LF)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_ssh_address() {
        let mut state = test_state(FakeCloudStack::new());
        assert!(ssh_address(&state).unwrap_err().is_defect());

        state.put_virtual_machine_ip("10.1.1.5");
        assert_eq!(ssh_address(&state).unwrap(), "10.1.1.5:22");
    }

    #[test]
    fn test_ssh_config_without_key() {
        let mut state = test_state(FakeCloudStack::new());
        state.put_ssh_key_pair("", "");

        let config = ssh_config(&state).unwrap();
        assert_eq!(config.username, "root");
        assert_eq!(config.auth.len(), 2);
        assert!(!config.has_public_key());
        assert_eq!(config.auth[1].method(), "keyboard-interactive");
    }

    #[test]
    fn test_ssh_config_with_key() {
        let mut state = test_state(FakeCloudStack::new());
        state.put_ssh_key_pair(openssh_key(), "ssh-ed25519 AAAA test");

        let config = ssh_config(&state).unwrap();
        assert_eq!(config.auth.len(), 3);
        assert!(config.has_public_key());
    }

    #[test]
    fn test_ssh_config_rejects_garbage_key() {
        let mut state = test_state(FakeCloudStack::new());
        state.put_ssh_key_pair("not a key", "");

        let err = ssh_config(&state).unwrap_err();
        assert!(matches!(err, BuildError::SshKey(_)));
    }

    #[test]
    fn test_ssh_config_requires_key_state() {
        let state = test_state(FakeCloudStack::new());
        assert!(ssh_config(&state).unwrap_err().is_defect());
    }

    #[tokio::test]
    async fn test_shell_provisioner_runs_in_order() {
        let ui = CollectingUi::new();
        let mut comm = FakeCommunicator::new();
        let provisioner = ShellProvisioner::new(["apt-get update", "apt-get -y upgrade"]);

        provisioner.provision(&ui, &mut comm).await.unwrap();

        assert_eq!(comm.commands(), vec!["apt-get update", "apt-get -y upgrade"]);
        assert!(ui.contains("Running: apt-get update"));
    }

    #[tokio::test]
    async fn test_shell_provisioner_fails_on_nonzero_exit() {
        let ui = CollectingUi::new();
        let mut comm = FakeCommunicator::new().with_exit_status("false", 1);
        let provisioner = ShellProvisioner::new(["true", "false", "never"]);

        let err = provisioner.provision(&ui, &mut comm).await.unwrap_err();

        assert!(err.to_string().contains("exited with status 1"));
        assert_eq!(comm.commands(), vec!["true", "false"]);
    }
}
