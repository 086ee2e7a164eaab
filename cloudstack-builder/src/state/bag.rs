//! The typed state bag.

use crate::client::CloudStackApi;
use crate::config::PipelineConfig;
use crate::errors::BuildError;
use crate::ssh::Communicator;
use crate::ui::Ui;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Names of the values a run passes between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    /// Address of the auxiliary HTTP server.
    HttpIp,
    /// Port of the auxiliary HTTP server.
    HttpPort,
    /// OpenSSH private key.
    SshPrivateKey,
    /// OpenSSH public key.
    SshPublicKey,
    /// Id of the build VM.
    VirtualMachineId,
    /// Address of the build VM.
    VirtualMachineIp,
    /// Open SSH connection.
    Communicator,
    /// Id of the created template.
    TemplateId,
    /// Name of the created template.
    TemplateName,
}

impl StateKey {
    /// The key's name in the state vocabulary.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HttpIp => "http_ip",
            Self::HttpPort => "http_port",
            Self::SshPrivateKey => "ssh_private_key",
            Self::SshPublicKey => "ssh_public_key",
            Self::VirtualMachineId => "virtual_machine_id",
            Self::VirtualMachineIp => "virtual_machine_ip",
            Self::Communicator => "communicator",
            Self::TemplateId => "template_id",
            Self::TemplateName => "template_name",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the auxiliary HTTP server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEndpoint {
    /// Address reachable from the guest, or `0.0.0.0` when no server runs.
    pub ip: String,
    /// Port, or `0` when no server runs.
    pub port: u16,
}

impl HttpEndpoint {
    /// The endpoint written when no directory is served.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            port: 0,
        }
    }
}

fn require<T>(value: Option<T>, key: StateKey) -> Result<T, BuildError> {
    value.ok_or(BuildError::MissingState(key))
}

/// Mutable state shared by the steps of one run.
///
/// Configuration, API client and UI are seeded at construction and always
/// present. Everything else starts empty and is written by the step that
/// produces it.
pub struct StateBag {
    config: Arc<PipelineConfig>,
    client: Arc<dyn CloudStackApi>,
    ui: Arc<dyn Ui>,
    http: Option<HttpEndpoint>,
    ssh_private_key: Option<String>,
    ssh_public_key: Option<String>,
    virtual_machine_id: Option<String>,
    virtual_machine_ip: Option<String>,
    communicator: Option<Box<dyn Communicator>>,
    template_id: Option<String>,
    template_name: Option<String>,
    error: Option<BuildError>,
    cancelled: bool,
    halted: bool,
}

impl StateBag {
    /// Creates a bag seeded with the run's collaborators.
    #[must_use]
    pub fn new(config: Arc<PipelineConfig>, client: Arc<dyn CloudStackApi>, ui: Arc<dyn Ui>) -> Self {
        Self {
            config,
            client,
            ui,
            http: None,
            ssh_private_key: None,
            ssh_public_key: None,
            virtual_machine_id: None,
            virtual_machine_ip: None,
            communicator: None,
            template_id: None,
            template_name: None,
            error: None,
            cancelled: false,
            halted: false,
        }
    }

    /// The build configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<PipelineConfig> {
        &self.config
    }

    /// The API client.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn CloudStackApi> {
        &self.client
    }

    /// The progress UI.
    #[must_use]
    pub fn ui(&self) -> &Arc<dyn Ui> {
        &self.ui
    }

    /// Records where the HTTP server listens.
    pub fn put_http_endpoint(&mut self, endpoint: HttpEndpoint) {
        self.http = Some(endpoint);
    }

    /// Where the HTTP server listens, if the server step ran.
    #[must_use]
    pub fn http_endpoint(&self) -> Option<&HttpEndpoint> {
        self.http.as_ref()
    }

    /// Where the HTTP server listens; required by the deploy step.
    pub fn require_http_endpoint(&self) -> Result<&HttpEndpoint, BuildError> {
        require(self.http.as_ref(), StateKey::HttpIp)
    }

    /// Records the generated key pair.
    pub fn put_ssh_key_pair(&mut self, private_key: impl Into<String>, public_key: impl Into<String>) {
        self.ssh_private_key = Some(private_key.into());
        self.ssh_public_key = Some(public_key.into());
    }

    /// The OpenSSH private key.
    pub fn ssh_private_key(&self) -> Result<&str, BuildError> {
        require(self.ssh_private_key.as_deref(), StateKey::SshPrivateKey)
    }

    /// The OpenSSH public key.
    pub fn ssh_public_key(&self) -> Result<&str, BuildError> {
        require(self.ssh_public_key.as_deref(), StateKey::SshPublicKey)
    }

    /// Records the deployed VM's id.
    pub fn put_virtual_machine_id(&mut self, id: impl Into<String>) {
        self.virtual_machine_id = Some(id.into());
    }

    /// The deployed VM's id.
    pub fn virtual_machine_id(&self) -> Result<&str, BuildError> {
        require(self.virtual_machine_id.as_deref(), StateKey::VirtualMachineId)
    }

    /// The deployed VM's id, if one was deployed.
    #[must_use]
    pub fn virtual_machine_id_ok(&self) -> Option<&str> {
        self.virtual_machine_id.as_deref()
    }

    /// Records the VM's address.
    pub fn put_virtual_machine_ip(&mut self, ip: impl Into<String>) {
        self.virtual_machine_ip = Some(ip.into());
    }

    /// The VM's address.
    pub fn virtual_machine_ip(&self) -> Result<&str, BuildError> {
        require(self.virtual_machine_ip.as_deref(), StateKey::VirtualMachineIp)
    }

    /// Stores the open SSH connection.
    pub fn put_communicator(&mut self, communicator: Box<dyn Communicator>) {
        self.communicator = Some(communicator);
    }

    /// Borrows the open SSH connection.
    pub fn communicator_mut(&mut self) -> Result<&mut (dyn Communicator + 'static), BuildError> {
        require(self.communicator.as_deref_mut(), StateKey::Communicator)
    }

    /// Removes the SSH connection so it can be closed.
    pub fn take_communicator(&mut self) -> Option<Box<dyn Communicator>> {
        self.communicator.take()
    }

    /// Records the created template.
    pub fn put_template(&mut self, id: impl Into<String>, name: impl Into<String>) {
        self.template_id = Some(id.into());
        self.template_name = Some(name.into());
    }

    /// The created template's id.
    pub fn template_id(&self) -> Result<&str, BuildError> {
        require(self.template_id.as_deref(), StateKey::TemplateId)
    }

    /// The created template's id and name, if both were recorded.
    #[must_use]
    pub fn template(&self) -> Option<(&str, &str)> {
        Some((self.template_id.as_deref()?, self.template_name.as_deref()?))
    }

    /// Records a fatal error.
    ///
    /// The first error wins; later ones are logged and dropped so cleanup
    /// failures cannot mask the original cause.
    pub fn put_error(&mut self, error: BuildError) {
        if let Some(existing) = &self.error {
            warn!(existing = %existing, dropped = %error, "Error already recorded; keeping the first");
            return;
        }
        self.error = Some(error);
    }

    /// The recorded error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&BuildError> {
        self.error.as_ref()
    }

    /// Removes and returns the recorded error.
    pub fn take_error(&mut self) -> Option<BuildError> {
        self.error.take()
    }

    /// Marks the run as cancelled.
    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Whether the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Marks the run as halted.
    pub fn mark_halted(&mut self) {
        self.halted = true;
    }

    /// Whether a step halted the run.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }
}

impl fmt::Debug for StateBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBag")
            .field("http", &self.http)
            .field("has_ssh_key", &self.ssh_private_key.is_some())
            .field("virtual_machine_id", &self.virtual_machine_id)
            .field("virtual_machine_ip", &self.virtual_machine_ip)
            .field("has_communicator", &self.communicator.is_some())
            .field("template_id", &self.template_id)
            .field("template_name", &self.template_name)
            .field("error", &self.error)
            .field("cancelled", &self.cancelled)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}
