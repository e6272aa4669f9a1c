//! Task status vocabulary
//!
//! Matching is case-sensitive. Anything outside the known processing and
//! completed values is terminal failure.

use std::fmt;

pub const INITIALIZED: &str = "initialized";
pub const RECEIVED: &str = "received";
pub const PROCESSING_IN_PROGRESS: &str = "processing-in-progress";
pub const PROCESSING_COMPLETED: &str = "processing-completed";

/// Status of a task as reported by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Initialized,
    Received,
    ProcessingInProgress,
    ProcessingCompleted,
    /// Failure or unrecognized status, kept verbatim
    Other(String),
}

impl TaskStatus {
    /// Non-terminal; keep polling
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            Self::Initialized | Self::Received | Self::ProcessingInProgress
        )
    }

    /// Terminal success
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::ProcessingCompleted)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Initialized => INITIALIZED,
            Self::Received => RECEIVED,
            Self::ProcessingInProgress => PROCESSING_IN_PROGRESS,
            Self::ProcessingCompleted => PROCESSING_COMPLETED,
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        match s {
            INITIALIZED => Self::Initialized,
            RECEIVED => Self::Received,
            PROCESSING_IN_PROGRESS => Self::ProcessingInProgress,
            PROCESSING_COMPLETED => Self::ProcessingCompleted,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
