//! # cloudstack-builder
//!
//! Builds reusable CloudStack templates. A build deploys a temporary virtual
//! machine from a source template or ISO, optionally serves files to it over
//! HTTP during installation, provisions it over SSH, stops it, and snapshots
//! its root volume into a new template.
//!
//! The build is a fixed sequence of steps sharing a typed [`state::StateBag`].
//! The first step that fails halts the sequence, and every step that started
//! gets to clean up, in reverse order, whatever the outcome.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cloudstack_builder::prelude::*;
//!
//! init_tracing(LogFormat::Text)?;
//! let config = PipelineConfig::from_file("build.json")?.prepare()?;
//! let builder = Builder::new(config, client, connector);
//!
//! match builder.run().await? {
//!     Some(artifact) => println!("{artifact}"),
//!     None => eprintln!("build produced no template"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifact;
pub mod builder;
pub mod cancellation;
pub mod client;
pub mod config;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod ssh;
pub mod state;
pub mod steps;
pub mod testing;
pub mod ui;
pub mod vagrant;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifact::{Artifact, BUILDER_ID};
    pub use crate::builder::Builder;
    pub use crate::cancellation::CancellationToken;
    pub use crate::client::{CloudStackApi, VirtualMachine};
    pub use crate::config::PipelineConfig;
    pub use crate::errors::{ApiError, BuildError, ConfigError, VagrantError};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        BasicRunner, ChannelPause, DebugPause, DebugRunner, LogPause, RunOutcome, Runner, Step,
        StepAction,
    };
    pub use crate::ssh::{Communicator, Connector, Provisioner, ShellProvisioner, SshConfig};
    pub use crate::state::StateBag;
    pub use crate::ui::{CollectingUi, LoggingUi, NoOpUi, Ui};
    pub use crate::vagrant::CloudStackProvider;
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
