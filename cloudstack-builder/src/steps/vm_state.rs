//! Waiting for a VM to reach a lifecycle state.

use crate::client::{CloudStackApi, VirtualMachine};
use crate::errors::BuildError;
use crate::pipeline::{halt, Step, StepAction};
use crate::state::StateBag;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Polls until the VM is in `desired`.
///
/// Returns the VM as last reported. Fails immediately if the VM enters the
/// `Error` state, and with [`BuildError::StateTimeout`] once `timeout`
/// elapses. Query failures are retried within the same budget.
pub async fn wait_for_vm_state(
    client: &dyn CloudStackApi,
    vm_id: &str,
    desired: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<VirtualMachine, BuildError> {
    let mut last_error: Option<String> = None;

    let poll = async {
        loop {
            match client.query_virtual_machine(vm_id).await {
                Ok(vm) if vm.is_in_state(desired) => return Ok(vm),
                Ok(vm) if vm.is_error() => {
                    return Err(BuildError::VirtualMachineError {
                        vm_id: vm_id.to_string(),
                        state: vm.state,
                        desired: desired.to_string(),
                    });
                }
                Ok(vm) => debug!(vm_id, state = %vm.state, desired, "Waiting for state"),
                Err(e) => {
                    warn!(vm_id, error = %e, "Error querying virtual machine; retrying");
                    last_error = Some(e.message);
                }
            }
            tokio::time::sleep(interval).await;
        }
    };
    let result = tokio::time::timeout(timeout, poll).await;

    match result {
        Ok(outcome) => outcome,
        Err(_) => Err(BuildError::StateTimeout {
            vm_id: vm_id.to_string(),
            desired: desired.to_string(),
            timeout_seconds: timeout.as_secs_f64(),
            last_error,
        }),
    }
}

/// Waits for the VM to reach a target state.
#[derive(Debug)]
pub struct StepVirtualMachineState {
    target: String,
}

impl StepVirtualMachineState {
    /// Waits for `target`, e.g. `Running`.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl Step for StepVirtualMachineState {
    fn name(&self) -> &str {
        "wait_for_virtual_machine_state"
    }

    async fn run(&mut self, state: &mut StateBag) -> StepAction {
        state
            .ui()
            .say(&format!("Waiting for virtual machine to become {}...", self.target));

        let vm_id = match state.virtual_machine_id() {
            Ok(id) => id.to_string(),
            Err(e) => return halt(state, e),
        };
        let client = state.client().clone();
        let config = state.config().clone();

        let waited = wait_for_vm_state(
            client.as_ref(),
            &vm_id,
            &self.target,
            config.state_timeout(),
            config.state_poll_interval(),
        )
        .await;

        match waited {
            Ok(vm) => {
                if let Some(ip) = vm.ip_address {
                    state.put_virtual_machine_ip(ip);
                }
                StepAction::Continue
            }
            Err(e) => halt(state, e),
        }
    }
}
