//! Contract of the CloudStack API client.
//!
//! The pipeline consumes the cloud through [`CloudStackApi`]. Request
//! signing and the wire format belong to the implementation; every call
//! either returns a typed response or an [`ApiError`] whose message is
//! surfaced verbatim.

use crate::errors::ApiResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Resource type used when tagging templates.
pub const TEMPLATE_RESOURCE_TYPE: &str = "Template";

/// Lifecycle state reported for a VM that failed.
pub const ERROR_STATE: &str = "Error";

/// Parameters of a `deployVirtualMachine` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployVirtualMachine {
    /// Service offering.
    pub service_offering_id: String,
    /// Source template or ISO.
    pub template_id: String,
    /// Zone.
    pub zone_id: String,
    /// Networks to attach.
    pub network_ids: Vec<String>,
    /// Disk offering.
    pub disk_offering_id: Option<String>,
    /// Hypervisor.
    pub hypervisor: Option<String>,
    /// Display name of the VM.
    pub display_name: String,
    /// OpenSSH public key to authorize on the guest.
    pub ssh_public_key: Option<String>,
    /// Base64 encoded user data.
    pub user_data: Option<String>,
}

/// Response of a deploy call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedVirtualMachine {
    /// Cloud-assigned VM id.
    pub id: String,
    /// Address of the default NIC, if already known.
    pub ip_address: Option<String>,
}

/// A VM as reported by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    /// Cloud-assigned VM id.
    pub id: String,
    /// Lifecycle state, e.g. `Running` or `Stopped`.
    pub state: String,
    /// Address of the default NIC.
    pub ip_address: Option<String>,
    /// Id of the attached ISO, if any.
    pub iso_id: Option<String>,
}

impl VirtualMachine {
    /// Returns true if the VM is in `state`, ignoring case.
    #[must_use]
    pub fn is_in_state(&self, state: &str) -> bool {
        self.state.eq_ignore_ascii_case(state)
    }

    /// Returns true if the API reports the VM as failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.is_in_state(ERROR_STATE)
    }
}

/// Parameters of a `createTemplate` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTemplate {
    /// Template name.
    pub name: String,
    /// Display text.
    pub display_text: String,
    /// Root volume to snapshot.
    pub volume_id: String,
    /// OS type id.
    pub os_type_id: String,
    /// Public template.
    pub is_public: bool,
    /// Featured template.
    pub is_featured: bool,
    /// Extractable template.
    pub is_extractable: bool,
    /// Dynamically scalable template.
    pub is_dynamically_scalable: bool,
    /// Password reset enabled.
    pub password_enabled: bool,
}

/// A created template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Template id.
    pub id: String,
    /// Template name.
    pub name: String,
}

/// A key/value resource tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Creates a tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Parameters of a `createTags` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTags {
    /// Resources to tag.
    pub resource_ids: Vec<String>,
    /// Resource type, e.g. `Template`.
    pub resource_type: String,
    /// Tags to apply.
    pub tags: Vec<Tag>,
}

/// Operations the pipeline and the artifact perform against CloudStack.
///
/// Implementations must be stateless from the caller's point of view: a
/// single instance is shared by every step and by the resulting artifact.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudStackApi: Send + Sync {
    /// Base URL of the API, used to build artifact ids.
    fn base_url(&self) -> String;

    /// Creates and starts a VM.
    async fn deploy_virtual_machine(
        &self,
        params: DeployVirtualMachine,
    ) -> ApiResult<DeployedVirtualMachine>;

    /// Reports the VM's current state.
    async fn query_virtual_machine(&self, id: &str) -> ApiResult<VirtualMachine>;

    /// Requests a VM stop.
    async fn stop_virtual_machine(&self, id: &str) -> ApiResult<()>;

    /// Destroys a VM.
    async fn destroy_virtual_machine(&self, id: &str) -> ApiResult<()>;

    /// Detaches the ISO attached to a VM.
    async fn detach_iso(&self, vm_id: &str) -> ApiResult<()>;

    /// Returns the id of the VM's root volume.
    async fn root_volume_id(&self, vm_id: &str) -> ApiResult<String>;

    /// Snapshots a volume into a template.
    async fn create_template(&self, params: CreateTemplate) -> ApiResult<Template>;

    /// Deletes a template.
    async fn delete_template(&self, id: &str) -> ApiResult<()>;

    /// Applies tags to resources in one call.
    async fn create_tags(&self, params: CreateTags) -> ApiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_matching_ignores_case() {
        let vm = VirtualMachine {
            id: "vm-1".to_string(),
            state: "running".to_string(),
            ip_address: None,
            iso_id: None,
        };

        assert!(vm.is_in_state("Running"));
        assert!(!vm.is_in_state("Stopped"));
        assert!(!vm.is_error());
    }

    #[test]
    fn test_error_state() {
        let vm = VirtualMachine {
            id: "vm-1".to_string(),
            state: "Error".to_string(),
            ip_address: None,
            iso_id: None,
        };
        assert!(vm.is_error());
    }
}
