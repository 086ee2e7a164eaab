//! User-facing progress output.
//!
//! Steps report progress through a [`Ui`]. The hosting process decides
//! where it goes; the library ships a tracing-backed implementation and a
//! collecting one for tests.

use parking_lot::RwLock;
use tracing::{error, info};

/// Severity of a UI line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiLevel {
    /// A headline for a step.
    Say,
    /// Detail under the current headline.
    Message,
    /// A failure.
    Error,
}

/// Sink for progress lines.
///
/// Implementations must never fail; output problems are theirs to swallow.
pub trait Ui: Send + Sync {
    /// Reports a step headline.
    fn say(&self, message: &str);

    /// Reports a detail line.
    fn message(&self, message: &str);

    /// Reports an error.
    fn error(&self, message: &str);
}

/// A UI that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpUi;

impl Ui for NoOpUi {
    fn say(&self, _message: &str) {}
    fn message(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// A UI that writes through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingUi {
    prefix: String,
}

impl Default for LoggingUi {
    fn default() -> Self {
        Self::new("cloudstack")
    }
}

impl LoggingUi {
    /// Creates a logging UI that tags every line with `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Ui for LoggingUi {
    fn say(&self, message: &str) {
        info!(ui = %self.prefix, "==> {}", message);
    }

    fn message(&self, message: &str) {
        info!(ui = %self.prefix, "    {}", message);
    }

    fn error(&self, message: &str) {
        error!(ui = %self.prefix, "{}", message);
    }
}

/// A UI that records lines for assertions.
#[derive(Debug, Default)]
pub struct CollectingUi {
    lines: RwLock<Vec<(UiLevel, String)>>,
}

impl CollectingUi {
    /// Creates an empty collecting UI.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded line.
    #[must_use]
    pub fn lines(&self) -> Vec<(UiLevel, String)> {
        self.lines.read().clone()
    }

    /// Returns the recorded lines of one level.
    #[must_use]
    pub fn lines_of(&self, level: UiLevel) -> Vec<String> {
        self.lines
            .read()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Returns true if any line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.read().iter().any(|(_, m)| m.contains(needle))
    }

    fn push(&self, level: UiLevel, message: &str) {
        self.lines.write().push((level, message.to_string()));
    }
}

impl Ui for CollectingUi {
    fn say(&self, message: &str) {
        self.push(UiLevel::Say, message);
    }

    fn message(&self, message: &str) {
        self.push(UiLevel::Message, message);
    }

    fn error(&self, message: &str) {
        self.push(UiLevel::Error, message);
    }
}
