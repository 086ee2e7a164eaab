//! Tags the created template.

use crate::client::{CreateTags, Tag, TEMPLATE_RESOURCE_TYPE};
use crate::errors::BuildError;
use crate::pipeline::{halt, Step, StepAction};
use crate::state::StateBag;
use async_trait::async_trait;
use tracing::debug;

/// Applies `template_tags` in a single call.
#[derive(Debug, Default)]
pub struct StepCreateTags;

#[async_trait]
impl Step for StepCreateTags {
    fn name(&self) -> &str {
        "create_tags"
    }

    async fn run(&mut self, state: &mut StateBag) -> StepAction {
        let config = state.config().clone();
        if config.template_tags.is_empty() {
            debug!("No template tags configured");
            return StepAction::Continue;
        }

        let template_id = match state.template_id() {
            Ok(id) => id.to_string(),
            Err(e) => return halt(state, e),
        };
        state.ui().say(&format!("Creating template tags for {template_id}..."));

        let params = CreateTags {
            resource_ids: vec![template_id],
            resource_type: TEMPLATE_RESOURCE_TYPE.to_string(),
            tags: config
                .template_tags
                .iter()
                .map(|(k, v)| Tag::new(k, v))
                .collect(),
        };

        let client = state.client().clone();
        match client.create_tags(params).await {
            Ok(()) => StepAction::Continue,
            Err(e) => halt(state, BuildError::api("creating tags", e)),
        }
    }
}
