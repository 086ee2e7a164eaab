//! Sequential step runners.

use super::debug::DebugPause;
use super::step::{Step, StepAction};
use crate::cancellation::CancellationToken;
use crate::state::StateBag;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step continued.
    Completed,
    /// A step halted.
    Halted,
    /// The token was cancelled before a step started.
    Cancelled,
}

impl RunOutcome {
    /// Returns the outcome as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Halted => "halted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Executes a step sequence against a state bag.
#[async_trait]
pub trait Runner: Send {
    /// Runs every step until completion, halt or cancellation, then cleans
    /// up the started steps in reverse order.
    async fn run(&mut self, state: &mut StateBag) -> RunOutcome;
}

/// Runs steps back to back.
#[derive(Debug)]
pub struct BasicRunner {
    steps: Vec<Box<dyn Step>>,
    token: Arc<CancellationToken>,
}

impl BasicRunner {
    /// Creates a runner over `steps` that observes `token` between steps.
    #[must_use]
    pub fn new(steps: Vec<Box<dyn Step>>, token: Arc<CancellationToken>) -> Self {
        Self { steps, token }
    }

    /// Number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl Runner for BasicRunner {
    async fn run(&mut self, state: &mut StateBag) -> RunOutcome {
        run_steps(&mut self.steps, state, &self.token, None).await
    }
}

/// Runs steps with a pause after each one that continues.
pub struct DebugRunner {
    steps: Vec<Box<dyn Step>>,
    token: Arc<CancellationToken>,
    pause: Box<dyn DebugPause>,
}

impl DebugRunner {
    /// Creates a debug runner.
    #[must_use]
    pub fn new(
        steps: Vec<Box<dyn Step>>,
        token: Arc<CancellationToken>,
        pause: Box<dyn DebugPause>,
    ) -> Self {
        Self { steps, token, pause }
    }
}

impl std::fmt::Debug for DebugRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugRunner")
            .field("steps", &self.steps)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Runner for DebugRunner {
    async fn run(&mut self, state: &mut StateBag) -> RunOutcome {
        run_steps(&mut self.steps, state, &self.token, Some(self.pause.as_mut())).await
    }
}

async fn run_steps(
    steps: &mut [Box<dyn Step>],
    state: &mut StateBag,
    token: &CancellationToken,
    pause: Option<&mut (dyn DebugPause + 'static)>,
) -> RunOutcome {
    let span = info_span!("build", build_id = %Uuid::new_v4(), steps = steps.len());
    async move {
        let mut pause = pause;
        let mut started = 0;
        let mut outcome = RunOutcome::Completed;

        for index in 0..steps.len() {
            if token.is_cancelled() {
                info!(
                    reason = token.reason().as_deref().unwrap_or(""),
                    remaining = steps.len() - index,
                    "Build cancelled; skipping remaining steps"
                );
                state.mark_cancelled();
                outcome = RunOutcome::Cancelled;
                break;
            }

            let name = steps[index].name().to_string();
            debug!(step = %name, "Starting step");
            let started_at = Instant::now();
            started = index + 1;

            let action = steps[index].run(state).await;
            info!(
                step = %name,
                duration_ms = started_at.elapsed().as_millis() as u64,
                halted = action == StepAction::Halt,
                "Step finished"
            );

            if action == StepAction::Halt {
                state.mark_halted();
                outcome = RunOutcome::Halted;
                break;
            }

            if let Some(pause) = pause.as_mut() {
                let next = steps.get(index + 1).map(|s| s.name().to_string());
                pause.pause(&name, next.as_deref(), token).await;
            }
        }

        for step in steps[..started].iter_mut().rev() {
            debug!(step = step.name(), "Cleaning up step");
            step.cleanup(state).await;
        }

        info!(outcome = outcome.as_str(), "Build finished");
        outcome
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BuildError;
    use crate::pipeline::{ChannelPause, LogPause};
    use crate::testing::{test_state, FakeCloudStack, RecordingStep, StepJournal};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn steps(journal: &StepJournal, names: &[&str]) -> Vec<Box<dyn Step>> {
        names
            .iter()
            .map(|n| Box::new(RecordingStep::new(*n, journal)) as Box<dyn Step>)
            .collect()
    }

    #[tokio::test]
    async fn test_all_steps_complete_and_clean_up_in_reverse() {
        let journal = StepJournal::new();
        let mut runner = BasicRunner::new(steps(&journal, &["a", "b", "c"]), Arc::default());
        let mut state = test_state(FakeCloudStack::new());

        let outcome = runner.run(&mut state).await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(
            journal.entries(),
            vec!["run a", "run b", "run c", "cleanup c", "cleanup b", "cleanup a"]
        );
        assert!(!state.is_halted());
        assert_eq!(runner.step_count(), 3);
    }

    #[tokio::test]
    async fn test_halt_stops_and_cleans_started_steps() {
        let journal = StepJournal::new();
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(RecordingStep::new("a", &journal)),
            Box::new(RecordingStep::new("b", &journal)),
            Box::new(
                RecordingStep::new("c", &journal)
                    .halting_with(BuildError::HttpServer("bind failed".to_string())),
            ),
            Box::new(RecordingStep::new("d", &journal)),
            Box::new(RecordingStep::new("e", &journal)),
        ];
        let mut runner = BasicRunner::new(steps, Arc::default());
        let mut state = test_state(FakeCloudStack::new());

        let outcome = runner.run(&mut state).await;

        assert_eq!(outcome, RunOutcome::Halted);
        assert_eq!(
            journal.entries(),
            vec!["run a", "run b", "run c", "cleanup c", "cleanup b", "cleanup a"]
        );
        assert!(state.is_halted());
        assert!(state.error().unwrap().to_string().contains("bind failed"));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step_runs_nothing() {
        let journal = StepJournal::new();
        let token = Arc::new(CancellationToken::new());
        token.cancel("interrupt");
        let mut runner = BasicRunner::new(steps(&journal, &["a", "b"]), token);
        let mut state = test_state(FakeCloudStack::new());

        let outcome = runner.run(&mut state).await;

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(journal.entries().is_empty());
        assert!(state.is_cancelled());
        assert!(!state.is_halted());
    }

    #[tokio::test]
    async fn test_cancel_during_step_stops_at_next_boundary() {
        let journal = StepJournal::new();
        let token = Arc::new(CancellationToken::new());
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(RecordingStep::new("a", &journal)),
            Box::new(RecordingStep::new("b", &journal).cancelling(token.clone())),
            Box::new(RecordingStep::new("c", &journal)),
        ];
        let mut runner = BasicRunner::new(steps, token);
        let mut state = test_state(FakeCloudStack::new());

        let outcome = runner.run(&mut state).await;

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(
            journal.entries(),
            vec!["run a", "run b", "cleanup b", "cleanup a"]
        );
    }

    #[tokio::test]
    async fn test_debug_runner_with_log_pause_matches_basic() {
        let journal = StepJournal::new();
        let mut runner = DebugRunner::new(
            steps(&journal, &["a", "b"]),
            Arc::default(),
            Box::new(LogPause),
        );
        let mut state = test_state(FakeCloudStack::new());

        assert_eq!(runner.run(&mut state).await, RunOutcome::Completed);
        assert_eq!(
            journal.entries(),
            vec!["run a", "run b", "cleanup b", "cleanup a"]
        );
    }

    #[tokio::test]
    async fn test_debug_runner_waits_for_ack() {
        let journal = StepJournal::new();
        let (pause, acks) = ChannelPause::new();
        let mut runner = DebugRunner::new(
            steps(&journal, &["a", "b"]),
            Arc::default(),
            Box::new(pause),
        );

        let handle = {
            let journal = journal.clone();
            tokio::spawn(async move {
                let mut state = test_state(FakeCloudStack::new());
                let outcome = runner.run(&mut state).await;
                (outcome, journal)
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(journal.entries(), vec!["run a"]);

        acks.send(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(journal.entries(), vec!["run a", "run b"]);

        acks.send(()).await.unwrap();
        let (outcome, journal) = handle.await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(journal.entries().len(), 4);
    }

    #[tokio::test]
    async fn test_debug_pause_released_by_cancellation() {
        let journal = StepJournal::new();
        let token = Arc::new(CancellationToken::new());
        let (pause, _acks) = ChannelPause::new();
        let mut runner = DebugRunner::new(
            steps(&journal, &["a", "b"]),
            token.clone(),
            Box::new(pause),
        );

        let handle = tokio::spawn(async move {
            let mut state = test_state(FakeCloudStack::new());
            runner.run(&mut state).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel("operator");

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(journal.entries(), vec!["run a", "cleanup a"]);
    }
}
