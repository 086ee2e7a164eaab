//! Deploys the build VM.

use crate::client::DeployVirtualMachine;
use crate::config::user_data_placeholder;
use crate::errors::BuildError;
use crate::pipeline::{halt, Step, StepAction};
use crate::state::{HttpEndpoint, StateBag};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Captures;
use tracing::{info, warn};
use uuid::Uuid;

/// Substitutes the HTTP endpoint into a user data template and base64
/// encodes the result. Empty templates yield `None`.
#[must_use]
pub fn render_user_data(template: &str, endpoint: &HttpEndpoint) -> Option<String> {
    if template.is_empty() {
        return None;
    }
    let rendered = user_data_placeholder().replace_all(template, |caps: &Captures<'_>| {
        match &caps[1] {
            "HTTPIP" => endpoint.ip.clone(),
            "HTTPPort" => endpoint.port.to_string(),
            _ => caps[0].to_string(),
        }
    });
    Some(STANDARD.encode(rendered.as_bytes()))
}

/// Creates the VM the template is built from.
///
/// Cleanup destroys the VM when one was deployed.
#[derive(Debug, Default)]
pub struct StepDeployVirtualMachine {
    deployed: Option<String>,
}

impl StepDeployVirtualMachine {
    /// Creates the step.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn params(state: &StateBag) -> Result<DeployVirtualMachine, BuildError> {
        let config = state.config();
        let endpoint = state.require_http_endpoint()?;
        let public_key = state.ssh_public_key()?;

        Ok(DeployVirtualMachine {
            service_offering_id: config.service_offering_id.clone(),
            template_id: config.template_id.clone(),
            zone_id: config.zone_id.clone(),
            network_ids: config.network_ids.clone(),
            disk_offering_id: config.disk_offering_id.clone(),
            hypervisor: config.hypervisor.clone(),
            display_name: format!("cloudstack-builder-{}", Uuid::new_v4()),
            ssh_public_key: (!public_key.is_empty()).then(|| public_key.to_string()),
            user_data: render_user_data(&config.user_data, endpoint),
        })
    }
}

#[async_trait]
impl Step for StepDeployVirtualMachine {
    fn name(&self) -> &str {
        "deploy_virtual_machine"
    }

    async fn run(&mut self, state: &mut StateBag) -> StepAction {
        state.ui().say("Deploying virtual machine...");

        let params = match Self::params(state) {
            Ok(params) => params,
            Err(e) => return halt(state, e),
        };
        let client = state.client().clone();

        let deployed = match client.deploy_virtual_machine(params).await {
            Ok(vm) => vm,
            Err(e) => return halt(state, BuildError::api("deploying virtual machine", e)),
        };

        info!(vm_id = %deployed.id, "Virtual machine deployed");
        state
            .ui()
            .message(&format!("Virtual machine {} deployed", deployed.id));
        self.deployed = Some(deployed.id.clone());
        state.put_virtual_machine_id(deployed.id);
        if let Some(ip) = deployed.ip_address {
            state.put_virtual_machine_ip(ip);
        }
        StepAction::Continue
    }

    async fn cleanup(&mut self, state: &mut StateBag) {
        let Some(vm_id) = self.deployed.take() else {
            return;
        };
        state.ui().say("Destroying virtual machine...");
        let client = state.client().clone();
        if let Err(e) = client.destroy_virtual_machine(&vm_id).await {
            warn!(vm_id = %vm_id, error = %e, "Error destroying virtual machine");
            state.ui().error(&format!(
                "Error destroying virtual machine {vm_id}; please destroy it manually: {e}"
            ));
        }
    }
}
