//! The step contract.

use crate::errors::BuildError;
use crate::state::StateBag;
use async_trait::async_trait;
use std::fmt::Debug;

/// What the runner should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Proceed to the next step.
    Continue,
    /// Stop the pipeline.
    Halt,
}

/// One unit of the build lifecycle.
///
/// A step reads the keys it needs from the [`StateBag`], performs one
/// action, writes its results, and reports whether the pipeline may go on.
/// `cleanup` runs for every step whose `run` was entered, in reverse order,
/// however the pipeline ended.
#[async_trait]
pub trait Step: Send + Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Performs the step.
    async fn run(&mut self, state: &mut StateBag) -> StepAction;

    /// Releases what `run` acquired.
    ///
    /// Must not fail: problems are logged and swallowed, and the stored
    /// error is left alone.
    async fn cleanup(&mut self, _state: &mut StateBag) {}
}

/// Reports `error` to the UI, records it and halts.
pub fn halt(state: &mut StateBag, error: BuildError) -> StepAction {
    state.ui().error(&error.to_string());
    state.put_error(error);
    StepAction::Halt
}

