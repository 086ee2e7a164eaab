//! Step sequencing.
//!
//! This module provides:
//! - The [`Step`] contract and the [`halt`] helper
//! - [`BasicRunner`] and the pausing [`DebugRunner`]
//! - Debug pause strategies

mod debug;
mod runner;
mod step;

pub use debug::{ChannelPause, DebugPause, LogPause};
pub use runner::{BasicRunner, DebugRunner, RunOutcome, Runner};
pub use step::{halt, Step, StepAction};
