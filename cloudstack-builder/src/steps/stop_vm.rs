//! Stops the VM before it is snapshotted.

use super::vm_state::wait_for_vm_state;
use crate::errors::BuildError;
use crate::pipeline::{halt, Step, StepAction};
use crate::state::StateBag;
use async_trait::async_trait;

const STOPPED: &str = "Stopped";

/// Stops the VM and waits until it reports `Stopped`.
#[derive(Debug, Default)]
pub struct StepStopVirtualMachine;

#[async_trait]
impl Step for StepStopVirtualMachine {
    fn name(&self) -> &str {
        "stop_virtual_machine"
    }

    async fn run(&mut self, state: &mut StateBag) -> StepAction {
        state.ui().say("Stopping virtual machine...");

        let vm_id = match state.virtual_machine_id() {
            Ok(id) => id.to_string(),
            Err(e) => return halt(state, e),
        };
        let client = state.client().clone();
        let config = state.config().clone();

        if let Err(e) = client.stop_virtual_machine(&vm_id).await {
            return halt(state, BuildError::api("stopping virtual machine", e));
        }

        let stopped = wait_for_vm_state(
            client.as_ref(),
            &vm_id,
            STOPPED,
            config.state_timeout(),
            config.state_poll_interval(),
        )
        .await;

        match stopped {
            Ok(_) => StepAction::Continue,
            Err(e) => halt(state, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_state, FakeCloudStack};

    #[tokio::test(start_paused = true)]
    async fn test_stops_and_waits() {
        let cloud = FakeCloudStack::new().with_vm_state("Running");
        let mut state = test_state(cloud.clone());
        state.put_virtual_machine_id("vm-1");

        assert_eq!(StepStopVirtualMachine.run(&mut state).await, StepAction::Continue);
        assert_eq!(cloud.calls(), vec!["stop_virtual_machine", "query_virtual_machine"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_through_stopping() {
        let cloud = FakeCloudStack::new().with_state_script(["Stopping", "Stopping"]);
        let mut state = test_state(cloud.clone());
        state.put_virtual_machine_id("vm-1");

        assert_eq!(StepStopVirtualMachine.run(&mut state).await, StepAction::Continue);
        assert_eq!(cloud.call_count("query_virtual_machine"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_error_halts() {
        let cloud = FakeCloudStack::new().failing("stop_virtual_machine", "denied");
        let mut state = test_state(cloud.clone());
        state.put_virtual_machine_id("vm-1");

        assert_eq!(StepStopVirtualMachine.run(&mut state).await, StepAction::Halt);
        assert_eq!(
            state.error().unwrap().to_string(),
            "Error stopping virtual machine: denied"
        );
        assert_eq!(cloud.call_count("query_virtual_machine"), 0);
    }
}
