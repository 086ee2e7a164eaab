//! The build lifecycle, one step per module.
//!
//! Steps run in this order: HTTP server, SSH key pair, deploy, wait for
//! `Running`, detach ISO, connect over SSH, provision, stop, create
//! template, create tags.

mod connect_ssh;
mod create_tags;
mod create_template;
mod deploy_vm;
mod detach_iso;
mod http_server;
mod provision;
mod ssh_key;
mod stop_vm;
mod vm_state;

pub use connect_ssh::{connect_with_retry, StepConnectSsh};
pub use create_tags::StepCreateTags;
pub use create_template::StepCreateTemplate;
pub use deploy_vm::{render_user_data, StepDeployVirtualMachine};
pub use detach_iso::StepDetachIso;
pub use http_server::StepHttpServer;
pub use provision::StepProvision;
pub use ssh_key::{generate_key_pair, load_key_pair, KeyPair, StepCreateSshKeyPair};
pub use stop_vm::StepStopVirtualMachine;
pub use vm_state::{wait_for_vm_state, StepVirtualMachineState};
