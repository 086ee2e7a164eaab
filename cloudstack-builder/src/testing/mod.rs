//! Test doubles for hosts and for this crate's own tests.
//!
//! This module provides:
//! - [`FakeCloudStack`], a scripted API that records calls
//! - [`FakeConnector`] / [`FakeCommunicator`] for the SSH seam
//! - [`RecordingStep`] and [`StepJournal`] for runner behavior
//! - Fixtures for a valid configuration and a seeded state bag

mod cloud;
mod ssh;
mod steps;

pub use cloud::{FakeCloudStack, FAKE_BASE_URL};
pub use ssh::{FakeCommunicator, FakeConnector, RecordingProvisioner};
pub use steps::{RecordingStep, StepJournal};

use crate::client::CloudStackApi;
use crate::config::PipelineConfig;
use crate::state::StateBag;
use crate::ui::{NoOpUi, Ui};
use std::sync::Arc;

/// A configuration that passes validation.
#[must_use]
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        api_url: FAKE_BASE_URL.to_string(),
        api_key: "test-key".to_string(),
        secret_key: "test-secret".to_string(),
        service_offering_id: "so-small".to_string(),
        template_id: "tpl-debian".to_string(),
        zone_id: "zone-1".to_string(),
        template_name: "golden-image".to_string(),
        ..PipelineConfig::default()
    }
}

/// A state bag seeded with [`test_config`] and a silent UI.
pub fn test_state(client: impl CloudStackApi + 'static) -> StateBag {
    test_state_with(test_config(), client, Arc::new(NoOpUi))
}

/// A state bag seeded with the given parts.
pub fn test_state_with(
    config: PipelineConfig,
    client: impl CloudStackApi + 'static,
    ui: Arc<dyn Ui>,
) -> StateBag {
    StateBag::new(Arc::new(config), Arc::new(client), ui)
}
