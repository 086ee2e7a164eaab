//! Connects to the VM over SSH.

use crate::errors::BuildError;
use crate::pipeline::{halt, Step, StepAction};
use crate::ssh::{ssh_address, ssh_config, Communicator, Connector, SshConfig};
use crate::state::StateBag;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Dials until a connection succeeds or `timeout` elapses.
pub async fn connect_with_retry(
    connector: &dyn Connector,
    address: &str,
    config: &SshConfig,
    timeout: Duration,
    interval: Duration,
) -> Result<Box<dyn Communicator>, BuildError> {
    let mut last_error: Option<String> = None;

    let dial = async {
        loop {
            match connector.connect(address, config).await {
                Ok(communicator) => return communicator,
                Err(e) => {
                    debug!(address, error = %format!("{e:#}"), "SSH not available yet");
                    last_error = Some(format!("{e:#}"));
                }
            }
            tokio::time::sleep(interval).await;
        }
    };
    let result = tokio::time::timeout(timeout, dial).await;

    result.map_err(|_| BuildError::SshTimeout {
        address: address.to_string(),
        timeout_seconds: timeout.as_secs_f64(),
        last_error: last_error.unwrap_or_else(|| "no connection attempt completed".to_string()),
    })
}

/// Opens the SSH connection used by provisioners.
///
/// Cleanup closes it, so the connection never outlives the run.
#[derive(Clone)]
pub struct StepConnectSsh {
    connector: Arc<dyn Connector>,
}

impl StepConnectSsh {
    /// Creates the step around `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }
}

impl std::fmt::Debug for StepConnectSsh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepConnectSsh").finish_non_exhaustive()
    }
}

#[async_trait]
impl Step for StepConnectSsh {
    fn name(&self) -> &str {
        "connect_ssh"
    }

    async fn run(&mut self, state: &mut StateBag) -> StepAction {
        let target = ssh_address(state).and_then(|address| Ok((address, ssh_config(state)?)));
        let (address, ssh) = match target {
            Ok(target) => target,
            Err(e) => return halt(state, e),
        };
        let config = state.config().clone();

        state.ui().say("Waiting for SSH to become available...");
        let connected = connect_with_retry(
            self.connector.as_ref(),
            &address,
            &ssh,
            config.ssh_timeout(),
            config.ssh_retry_interval(),
        )
        .await;

        match connected {
            Ok(communicator) => {
                info!(address = %address, "Connected to SSH");
                state.ui().say("Connected to SSH!");
                state.put_communicator(communicator);
                StepAction::Continue
            }
            Err(e) => halt(state, e),
        }
    }

    async fn cleanup(&mut self, state: &mut StateBag) {
        if let Some(mut communicator) = state.take_communicator() {
            if let Err(e) = communicator.close().await {
                warn!(error = %format!("{e:#}"), "Error closing SSH connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_state, FakeCloudStack, FakeConnector};
    use tokio::time::Instant;

    fn connectable_state() -> StateBag {
        let mut state = test_state(FakeCloudStack::new());
        state.put_virtual_machine_ip("10.0.0.10");
        state.put_ssh_key_pair("", "");
        state
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_connected() {
        let connector = FakeConnector::new().refusing_first(2);
        let mut state = connectable_state();
        let mut step = StepConnectSsh::new(Arc::new(connector.clone()));
        let started = Instant::now();

        assert_eq!(step.run(&mut state).await, StepAction::Continue);
        assert_eq!(connector.attempts(), vec!["10.0.0.10:22"; 3]);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(connector.last_config().unwrap().username, "root");

        step.cleanup(&mut state).await;
        assert!(connector.communicator().is_closed());
        assert!(state.communicator_mut().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let connector = FakeConnector::refusing();
        let mut state = connectable_state();
        let mut step = StepConnectSsh::new(Arc::new(connector));

        assert_eq!(step.run(&mut state).await, StepAction::Halt);
        let err = state.error().unwrap();
        assert!(matches!(err, BuildError::SshTimeout { .. }));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_missing_ip_is_defect() {
        let mut state = test_state(FakeCloudStack::new());
        let mut step = StepConnectSsh::new(Arc::new(FakeConnector::new()));

        assert_eq!(step.run(&mut state).await, StepAction::Halt);
        assert!(state.error().unwrap().is_defect());
    }
}
