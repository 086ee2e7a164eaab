//! Pauses between steps for interactive debugging.

use crate::cancellation::CancellationToken;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Decides how the debug runner waits after a step.
#[async_trait]
pub trait DebugPause: Send {
    /// Waits until the host allows `next` to run.
    ///
    /// Returns early once `token` is cancelled; the runner then stops at the
    /// next boundary.
    async fn pause(&mut self, completed: &str, next: Option<&str>, token: &CancellationToken);
}

/// Resumes when the host sends an acknowledgement on a channel.
#[derive(Debug)]
pub struct ChannelPause {
    acks: mpsc::Receiver<()>,
}

impl ChannelPause {
    /// Creates a pause and the sender the host uses to resume.
    #[must_use]
    pub fn new() -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { acks: rx }, tx)
    }
}

#[async_trait]
impl DebugPause for ChannelPause {
    async fn pause(&mut self, completed: &str, next: Option<&str>, token: &CancellationToken) {
        info!(
            completed = completed,
            next = next.unwrap_or("<end>"),
            "Pausing after step; waiting for acknowledgement"
        );
        tokio::select! {
            ack = self.acks.recv() => {
                if ack.is_none() {
                    warn!("Debug acknowledgement channel closed; continuing without pauses");
                }
            }
            () = token.cancelled() => {}
        }
    }
}

/// Logs the boundary and continues immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPause;

#[async_trait]
impl DebugPause for LogPause {
    async fn pause(&mut self, completed: &str, next: Option<&str>, _token: &CancellationToken) {
        info!(
            completed = completed,
            next = next.unwrap_or("<end>"),
            "Debug pause"
        );
    }
}
