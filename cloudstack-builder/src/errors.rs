//! Error types for the template builder.
//!
//! The taxonomy mirrors how a build can go wrong: configuration problems are
//! caught before anything runs, remote-call failures and timeouts halt the
//! pipeline, cancellation is reported separately, and a missing state key is
//! a programming defect in step ordering.

use crate::state::StateKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for a pipeline run.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A cloud API call failed.
    #[error("Error {action}: {source}")]
    Api {
        /// What the pipeline was doing, e.g. "deploying virtual machine".
        action: &'static str,
        /// The structured error reported by the API.
        #[source]
        source: ApiError,
    },

    /// A virtual machine did not reach the desired state in time.
    #[error(
        "Timeout while waiting for virtual machine {vm_id} to become {desired} after {timeout_seconds}s{}",
        last_error.as_ref().map(|e| format!(" (last API error: {e})")).unwrap_or_default()
    )]
    StateTimeout {
        /// The virtual machine id.
        vm_id: String,
        /// The state that was waited for.
        desired: String,
        /// The configured bound.
        timeout_seconds: f64,
        /// The last transient query error, if the API was failing.
        last_error: Option<String>,
    },

    /// The API reported the virtual machine in an error state.
    #[error("Virtual machine {vm_id} entered the {state} state while waiting for {desired}")]
    VirtualMachineError {
        /// The virtual machine id.
        vm_id: String,
        /// The reported state.
        state: String,
        /// The state that was waited for.
        desired: String,
    },

    /// SSH never became available.
    #[error("Timeout waiting for SSH on {address} after {timeout_seconds}s: {last_error}")]
    SshTimeout {
        /// The dialed address.
        address: String,
        /// The configured bound.
        timeout_seconds: f64,
        /// The last connection error.
        last_error: String,
    },

    /// A step read a state key that no earlier step produced.
    #[error("Pipeline state is missing '{0}'; a step ran before the step that produces it")]
    MissingState(StateKey),

    /// The HTTP file server could not be started.
    #[error("Error starting HTTP server: {0}")]
    HttpServer(String),

    /// SSH key material could not be generated, read or parsed.
    #[error("Error setting up SSH key: {0}")]
    SshKey(String),

    /// A collaborator (SSH connector, communicator, provisioner) failed.
    #[error("Error {action}: {source:#}")]
    Collaborator {
        /// What the pipeline was doing.
        action: &'static str,
        /// The collaborator's error.
        #[source]
        source: anyhow::Error,
    },

    /// The build was cancelled between steps.
    #[error("Build was cancelled.")]
    Cancelled,

    /// A step halted without recording an error.
    #[error("Build was halted.")]
    Halted,

    /// Configuration was invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Wraps an API error with the action that failed.
    #[must_use]
    pub fn api(action: &'static str, source: ApiError) -> Self {
        Self::Api { action, source }
    }

    /// Wraps a collaborator error with the action that failed.
    #[must_use]
    pub fn collaborator(action: &'static str, source: anyhow::Error) -> Self {
        Self::Collaborator { action, source }
    }

    /// Returns true for the step-ordering defect.
    #[must_use]
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::MissingState(_))
    }
}

/// A structured error returned by the cloud API.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    /// The API error code, when the platform reports one.
    pub code: Option<u16>,
    /// The error text, surfaced verbatim.
    pub message: String,
}

impl ApiError {
    /// Creates an API error without a code.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Sets the error code.
    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(code) = self.code {
            map.insert("code".to_string(), serde_json::json!(code));
        }
        map
    }
}

/// Result type for cloud API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Accumulated configuration problems.
#[derive(Debug, Clone, Default, Error)]
#[error("{} error(s) occurred:\n* {}", errors.len(), errors.join("\n* "))]
pub struct ConfigError {
    /// One message per problem found.
    pub errors: Vec<String>,
}

impl ConfigError {
    /// Creates an empty error list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a problem.
    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Returns true if no problems were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns `Err(self)` if any problem was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Errors from building a Vagrant descriptor out of an artifact id.
#[derive(Debug, Clone, Error)]
pub enum VagrantError {
    /// The artifact id is not a URL.
    #[error("Poorly formatted artifact ID: {0}")]
    InvalidArtifactId(String),

    /// The artifact id has no usable host/port.
    #[error("Network address has an invalid form: {0}")]
    InvalidAddress(String),
}
