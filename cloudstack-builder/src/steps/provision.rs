//! Runs provisioners over the open SSH connection.

use crate::errors::BuildError;
use crate::pipeline::{halt, Step, StepAction};
use crate::ssh::Provisioner;
use crate::state::StateBag;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Hands the communicator to each provisioner in order.
#[derive(Debug, Default)]
pub struct StepProvision {
    provisioners: Vec<Arc<dyn Provisioner>>,
}

impl StepProvision {
    /// Creates the step.
    #[must_use]
    pub fn new(provisioners: Vec<Arc<dyn Provisioner>>) -> Self {
        Self { provisioners }
    }
}

#[async_trait]
impl Step for StepProvision {
    fn name(&self) -> &str {
        "provision"
    }

    async fn run(&mut self, state: &mut StateBag) -> StepAction {
        if self.provisioners.is_empty() {
            return StepAction::Continue;
        }
        let ui = state.ui().clone();

        for provisioner in &self.provisioners {
            ui.say(&format!("Provisioning with {}...", provisioner.name()));
            let communicator = match state.communicator_mut() {
                Ok(communicator) => communicator,
                Err(e) => return halt(state, e),
            };
            if let Err(e) = provisioner.provision(ui.as_ref(), communicator).await {
                return halt(state, BuildError::collaborator("provisioning", e));
            }
            info!(provisioner = provisioner.name(), "Provisioner finished");
        }
        StepAction::Continue
    }
}
