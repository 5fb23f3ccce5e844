//! The [`Log`] trait and an in-memory implementation for tests.
use std::sync::Mutex;

/// Abstraction over logging backends.
///
/// Engine and pipeline code log through `&dyn Log` so they never reach for
/// global state, and tests can capture what was said.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
}

/// A [`Log`] that keeps every message in memory, prefixed with its level.
#[derive(Debug, Default)]
pub struct RecordingLog {
    lines: Mutex<Vec<String>>,
}

impl RecordingLog {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages recorded so far, as `level: message`.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map_or_else(|_| Vec::new(), |guard| guard.clone())
    }

    /// Whether any recorded line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }

    fn push(&self, level: &str, msg: &str) {
        if let Ok(mut guard) = self.lines.lock() {
            guard.push(format!("{level}: {msg}"));
        }
    }
}

impl Log for RecordingLog {
    fn stage(&self, msg: &str) {
        self.push("stage", msg);
    }

    fn info(&self, msg: &str) {
        self.push("info", msg);
    }

    fn debug(&self, msg: &str) {
        self.push("debug", msg);
    }

    fn warn(&self, msg: &str) {
        self.push("warn", msg);
    }

    fn error(&self, msg: &str) {
        self.push("error", msg);
    }
}
