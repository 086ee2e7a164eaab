//! Build configuration.
//!
//! `PipelineConfig` is deserialized from JSON, completed from the
//! environment, and validated by [`PipelineConfig::prepare`] before any step
//! runs. Steps only ever read it.

use crate::errors::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable consulted when `api_url` is empty.
pub const ENV_API_URL: &str = "CLOUDSTACK_API_URL";
/// Environment variable consulted when `api_key` is empty.
pub const ENV_API_KEY: &str = "CLOUDSTACK_API_KEY";
/// Environment variable consulted when `secret_key` is empty.
pub const ENV_SECRET_KEY: &str = "CLOUDSTACK_SECRET_KEY";

/// Placeholder replaced in `template_name` by the current unix time.
pub const TIMESTAMP_PLACEHOLDER: &str = "{{timestamp}}";

/// Configuration for one template build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Base URL of the CloudStack API.
    #[serde(default)]
    pub api_url: String,
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// API secret.
    #[serde(default, skip_serializing)]
    pub secret_key: String,
    /// Skip TLS verification when the client talks to the API.
    ///
    /// Not read by the build itself; passed through for the host's
    /// [`CloudStackApi`](crate::client::CloudStackApi) implementation.
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// SSH user on the guest.
    #[serde(default = "default_ssh_username")]
    pub ssh_username: String,
    /// SSH port on the guest.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    /// Existing private key to use instead of generating one.
    #[serde(default)]
    pub ssh_key_path: Option<PathBuf>,
    /// SSH password, offered alongside key authentication.
    #[serde(default, skip_serializing)]
    pub ssh_password: String,
    /// How long to wait for SSH to become available.
    #[serde(default = "default_ssh_timeout")]
    pub ssh_timeout_seconds: f64,
    /// Delay between SSH connection attempts.
    #[serde(default = "default_ssh_retry_interval")]
    pub ssh_retry_interval_seconds: f64,

    /// How long to wait for a virtual machine to reach a state.
    #[serde(default = "default_state_timeout")]
    pub state_timeout_seconds: f64,
    /// Delay between state queries.
    #[serde(default = "default_state_poll_interval")]
    pub state_poll_interval_seconds: f64,
    /// Delay before detaching the installation ISO.
    #[serde(default = "default_detach_iso_wait")]
    pub detach_iso_wait_seconds: f64,

    /// Directory served to the guest over HTTP.
    #[serde(default)]
    pub http_directory: Option<PathBuf>,
    /// Lowest port the HTTP server may bind.
    #[serde(default = "default_http_port_min")]
    pub http_port_min: u16,
    /// Highest port the HTTP server may bind.
    #[serde(default = "default_http_port_max")]
    pub http_port_max: u16,

    /// Service offering for the build VM.
    #[serde(default)]
    pub service_offering_id: String,
    /// Source template or ISO.
    #[serde(default)]
    pub template_id: String,
    /// Zone to deploy into.
    #[serde(default)]
    pub zone_id: String,
    /// Networks to attach.
    #[serde(default)]
    pub network_ids: Vec<String>,
    /// Disk offering, required when booting from an ISO.
    #[serde(default)]
    pub disk_offering_id: Option<String>,
    /// User data template; may reference `{{ .HTTPIP }}` and `{{ .HTTPPort }}`.
    #[serde(default)]
    pub user_data: String,
    /// Hypervisor to deploy on.
    #[serde(default)]
    pub hypervisor: Option<String>,

    /// Name of the resulting template.
    #[serde(default = "default_template_name")]
    pub template_name: String,
    /// Display text of the resulting template.
    #[serde(default = "default_template_display_text")]
    pub template_display_text: String,
    /// OS type id of the resulting template.
    #[serde(default = "default_template_os_id")]
    pub template_os_id: String,
    /// Mark the template dynamically scalable.
    #[serde(default)]
    pub template_scalable: bool,
    /// Make the template public.
    #[serde(default)]
    pub template_public: bool,
    /// Make the template featured.
    #[serde(default)]
    pub template_featured: bool,
    /// Make the template extractable.
    #[serde(default)]
    pub template_extractable: bool,
    /// Enable password reset on the template.
    #[serde(default)]
    pub template_password_enabled: bool,
    /// Tags applied to the template after creation.
    #[serde(default)]
    pub template_tags: BTreeMap<String, String>,

    /// Pause between steps.
    #[serde(default)]
    pub debug: bool,
}

fn default_ssh_username() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_timeout() -> f64 {
    600.0
}

fn default_ssh_retry_interval() -> f64 {
    5.0
}

fn default_state_timeout() -> f64 {
    300.0
}

fn default_state_poll_interval() -> f64 {
    2.0
}

fn default_detach_iso_wait() -> f64 {
    10.0
}

fn default_http_port_min() -> u16 {
    8000
}

fn default_http_port_max() -> u16 {
    9000
}

fn default_template_name() -> String {
    format!("template-{TIMESTAMP_PLACEHOLDER}")
}

fn default_template_display_text() -> String {
    "Generated_Template".to_string()
}

fn default_template_os_id() -> String {
    // "Other (64-bit)"
    "103".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            secret_key: String::new(),
            insecure_skip_verify: false,
            ssh_username: default_ssh_username(),
            ssh_port: default_ssh_port(),
            ssh_key_path: None,
            ssh_password: String::new(),
            ssh_timeout_seconds: default_ssh_timeout(),
            ssh_retry_interval_seconds: default_ssh_retry_interval(),
            state_timeout_seconds: default_state_timeout(),
            state_poll_interval_seconds: default_state_poll_interval(),
            detach_iso_wait_seconds: default_detach_iso_wait(),
            http_directory: None,
            http_port_min: default_http_port_min(),
            http_port_max: default_http_port_max(),
            service_offering_id: String::new(),
            template_id: String::new(),
            zone_id: String::new(),
            network_ids: Vec::new(),
            disk_offering_id: None,
            user_data: String::new(),
            hypervisor: None,
            template_name: default_template_name(),
            template_display_text: default_template_display_text(),
            template_os_id: default_template_os_id(),
            template_scalable: false,
            template_public: false,
            template_featured: false,
            template_extractable: false,
            template_password_enabled: false,
            template_tags: BTreeMap::new(),
            debug: false,
        }
    }
}

/// Matches `{{ .Name }}` placeholders in user data.
#[allow(clippy::unwrap_used)]
pub(crate) fn user_data_placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{\s*\.(\w+)\s*\}\}").unwrap())
}

/// Placeholders the deploy step knows how to fill in.
pub(crate) const USER_DATA_VARIABLES: [&str; 2] = ["HTTPIP", "HTTPPort"];

impl PipelineConfig {
    /// Parses a configuration from JSON without preparing it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError {
            errors: vec![format!("Error parsing configuration: {e}")],
        })
    }

    /// Reads and parses a JSON configuration file without preparing it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError {
            errors: vec![format!("Error reading {}: {e}", path.display())],
        })?;
        Self::from_json_str(&raw)
    }

    /// Fills defaults from the environment, expands placeholders and
    /// validates.
    ///
    /// Every problem found is reported at once.
    pub fn prepare(mut self) -> Result<Self, ConfigError> {
        fill_from_env(&mut self.api_url, ENV_API_URL);
        fill_from_env(&mut self.api_key, ENV_API_KEY);
        fill_from_env(&mut self.secret_key, ENV_SECRET_KEY);

        self.expand_template_name();

        self.validate()?;
        Ok(self)
    }

    /// Replaces `{{timestamp}}` in `template_name` with the current unix time.
    pub fn expand_template_name(&mut self) {
        if self.template_name.contains(TIMESTAMP_PLACEHOLDER) {
            let now = chrono::Utc::now().timestamp().to_string();
            self.template_name = self.template_name.replace(TIMESTAMP_PLACEHOLDER, &now);
        }
    }

    /// Validates the configuration, accumulating every problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = ConfigError::new();

        if self.api_url.is_empty() {
            errs.push(format!("{ENV_API_URL} in env (api_url in json) must be specified"));
        } else if let Err(e) = url::Url::parse(&self.api_url) {
            errs.push(format!("api_url is not a valid URL: {e}"));
        }
        if self.api_key.is_empty() {
            errs.push(format!("{ENV_API_KEY} in env (api_key in json) must be specified"));
        }
        if self.secret_key.is_empty() {
            errs.push(format!("{ENV_SECRET_KEY} in env (secret_key in json) must be specified"));
        }

        for (name, value) in [
            ("service_offering_id", &self.service_offering_id),
            ("template_id", &self.template_id),
            ("zone_id", &self.zone_id),
        ] {
            if value.is_empty() {
                errs.push(format!("{name} must be specified"));
            }
        }

        if self.http_port_min == 0 {
            errs.push("http_port_min must be greater than 0");
        }
        if self.http_port_min > self.http_port_max {
            errs.push("http_port_min must be less than http_port_max");
        }

        for (name, value) in [
            ("ssh_timeout_seconds", self.ssh_timeout_seconds),
            ("ssh_retry_interval_seconds", self.ssh_retry_interval_seconds),
            ("state_timeout_seconds", self.state_timeout_seconds),
            ("state_poll_interval_seconds", self.state_poll_interval_seconds),
        ] {
            match Duration::try_from_secs_f64(value) {
                Ok(d) if !d.is_zero() => {}
                _ => errs.push(format!("{name} must be a positive number of seconds")),
            }
        }
        if Duration::try_from_secs_f64(self.detach_iso_wait_seconds).is_err() {
            errs.push("detach_iso_wait_seconds must not be negative");
        }

        for caps in user_data_placeholder().captures_iter(&self.user_data) {
            let name = &caps[1];
            if !USER_DATA_VARIABLES.contains(&name) {
                errs.push(format!("Error parsing user_data: unknown variable '{name}'"));
            }
        }

        errs.into_result()
    }

    /// SSH availability bound.
    #[must_use]
    pub fn ssh_timeout(&self) -> Duration {
        seconds(self.ssh_timeout_seconds)
    }

    /// Delay between SSH connection attempts.
    #[must_use]
    pub fn ssh_retry_interval(&self) -> Duration {
        seconds(self.ssh_retry_interval_seconds)
    }

    /// State wait bound.
    #[must_use]
    pub fn state_timeout(&self) -> Duration {
        seconds(self.state_timeout_seconds)
    }

    /// Delay between state queries.
    #[must_use]
    pub fn state_poll_interval(&self) -> Duration {
        seconds(self.state_poll_interval_seconds)
    }

    /// Delay before detaching the ISO.
    #[must_use]
    pub fn detach_iso_wait(&self) -> Duration {
        seconds(self.detach_iso_wait_seconds)
    }
}

/// Out-of-range values saturate; `validate` rejects them first.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(if value > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

fn fill_from_env(value: &mut String, var: &str) {
    if value.is_empty() {
        if let Ok(from_env) = std::env::var(var) {
            *value = from_env;
        }
    }
}
