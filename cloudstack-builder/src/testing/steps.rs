//! Steps that record what the runner does with them.

use crate::cancellation::CancellationToken;
use crate::errors::BuildError;
use crate::pipeline::{halt, Step, StepAction};
use crate::state::StateBag;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared, ordered log of step runs and cleanups.
#[derive(Debug, Clone, Default)]
pub struct StepJournal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl StepJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in order, e.g. `run a` or `cleanup a`.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    fn push(&self, entry: String) {
        self.entries.lock().push(entry);
    }
}

/// A step that journals `run` and `cleanup` calls.
#[derive(Debug)]
pub struct RecordingStep {
    name: String,
    journal: StepJournal,
    halt_with: Option<BuildError>,
    cancel: Option<Arc<CancellationToken>>,
}

impl RecordingStep {
    /// Creates a step that continues.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: &StepJournal) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
            halt_with: None,
            cancel: None,
        }
    }

    /// Makes the step halt with `error`.
    #[must_use]
    pub fn halting_with(mut self, error: BuildError) -> Self {
        self.halt_with = Some(error);
        self
    }

    /// Makes the step cancel `token` while it runs.
    #[must_use]
    pub fn cancelling(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[async_trait]
impl Step for RecordingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, state: &mut StateBag) -> StepAction {
        self.journal.push(format!("run {}", self.name));
        if let Some(token) = &self.cancel {
            token.cancel(format!("cancelled by {}", self.name));
        }
        match self.halt_with.take() {
            Some(err) => halt(state, err),
            None => StepAction::Continue,
        }
    }

    async fn cleanup(&mut self, _state: &mut StateBag) {
        self.journal.push(format!("cleanup {}", self.name));
    }
}
