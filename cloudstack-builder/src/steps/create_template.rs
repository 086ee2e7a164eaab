//! Creates the template from the stopped VM's root volume.

use crate::client::CreateTemplate;
use crate::errors::BuildError;
use crate::pipeline::{halt, Step, StepAction};
use crate::state::StateBag;
use async_trait::async_trait;
use tracing::info;

/// Snapshots the root volume into a template.
#[derive(Debug, Default)]
pub struct StepCreateTemplate;

#[async_trait]
impl Step for StepCreateTemplate {
    fn name(&self) -> &str {
        "create_template"
    }

    async fn run(&mut self, state: &mut StateBag) -> StepAction {
        let config = state.config().clone();
        state
            .ui()
            .say(&format!("Creating template: {}", config.template_name));

        let vm_id = match state.virtual_machine_id() {
            Ok(id) => id.to_string(),
            Err(e) => return halt(state, e),
        };
        let client = state.client().clone();

        let volume_id = match client.root_volume_id(&vm_id).await {
            Ok(id) => id,
            Err(e) => return halt(state, BuildError::api("retrieving root volume", e)),
        };

        let params = CreateTemplate {
            name: config.template_name.clone(),
            display_text: config.template_display_text.clone(),
            volume_id,
            os_type_id: config.template_os_id.clone(),
            is_public: config.template_public,
            is_featured: config.template_featured,
            is_extractable: config.template_extractable,
            is_dynamically_scalable: config.template_scalable,
            password_enabled: config.template_password_enabled,
        };

        match client.create_template(params).await {
            Ok(template) => {
                info!(template_id = %template.id, name = %template.name, "Template created");
                state.put_template(template.id, template.name);
                StepAction::Continue
            }
            Err(e) => halt(state, BuildError::api("creating template", e)),
        }
    }
}
