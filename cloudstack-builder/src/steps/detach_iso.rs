//! Detaches the installation ISO.

use crate::errors::BuildError;
use crate::pipeline::{halt, Step, StepAction};
use crate::state::StateBag;
use async_trait::async_trait;
use tracing::debug;

/// Detaches the ISO the VM booted from, if any.
#[derive(Debug, Default)]
pub struct StepDetachIso;

#[async_trait]
impl Step for StepDetachIso {
    fn name(&self) -> &str {
        "detach_iso"
    }

    async fn run(&mut self, state: &mut StateBag) -> StepAction {
        let vm_id = match state.virtual_machine_id() {
            Ok(id) => id.to_string(),
            Err(e) => return halt(state, e),
        };
        let client = state.client().clone();

        let vm = match client.query_virtual_machine(&vm_id).await {
            Ok(vm) => vm,
            Err(e) => return halt(state, BuildError::api("querying virtual machine", e)),
        };
        let Some(iso_id) = vm.iso_id else {
            debug!(vm_id = %vm_id, "No ISO attached");
            return StepAction::Continue;
        };

        state.ui().say(&format!("Detaching ISO {iso_id}..."));
        tokio::time::sleep(state.config().detach_iso_wait()).await;

        match client.detach_iso(&vm_id).await {
            Ok(()) => StepAction::Continue,
            Err(e) => halt(state, BuildError::api("detaching ISO", e)),
        }
    }
}
