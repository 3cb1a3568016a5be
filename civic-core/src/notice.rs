//! Transient notices shown to the user.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Visual severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

/// A short-lived message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub text: String,
    pub severity: Severity,
    pub duration: Duration,
}

impl Notice {
    /// Standard display time.
    pub const DEFAULT_DURATION: Duration = Duration::from_millis(5000);
    /// Instant feedback on the user's own click.
    pub const QUICK_DURATION: Duration = Duration::from_millis(1500);

    pub fn new(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            text: text.into(),
            severity,
            duration: Self::DEFAULT_DURATION,
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Success)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Info)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Warning)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Error)
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn quick(self) -> Self {
        self.with_duration(Self::QUICK_DURATION)
    }
}
