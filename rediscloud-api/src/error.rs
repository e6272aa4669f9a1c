//! Error types for API calls and waits

use std::time::Duration;

use thiserror::Error;

use crate::task::TaskResponseError;

/// Errors returned by a single call to the REST API
#[derive(Debug, Error)]
pub enum ApiError {
    /// The addressed resource does not exist (HTTP 404)
    #[error("Failed to {operation}: not found")]
    NotFound { operation: String },

    /// Non-success status other than 404
    #[error("Failed to {operation}: {status} - {body}")]
    Http {
        operation: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response
    #[error("Failed to {operation}: {message}")]
    Transport { operation: String, message: String },

    /// The response body did not match the expected shape
    #[error("Failed to decode response to {operation}: {message}")]
    Decode { operation: String, message: String },

    /// The client could not be built from its configuration
    #[error("Client configuration error: {0}")]
    Configuration(String),
}

impl ApiError {
    pub fn not_found(operation: impl Into<String>) -> Self {
        Self::NotFound {
            operation: operation.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for API calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Terminal outcomes of a wait other than success
///
/// "Not processed yet" observations never surface here; they are retried
/// inside the polling loop.
#[derive(Debug, Error)]
pub enum WaitError {
    /// Fetching the current record failed; never retried
    #[error("Failed to fetch {target}: {source}")]
    Fetch {
        target: String,
        #[source]
        source: ApiError,
    },

    /// The task reached a status outside the known vocabulary
    #[error("task {id} failed {status} - {description}")]
    TaskFailed {
        id: String,
        status: String,
        description: String,
    },

    /// The task record embeds an error, whatever its status claims
    #[error("task {id} returned an error: {source}")]
    TaskResponse {
        id: String,
        #[source]
        source: TaskResponseError,
    },

    /// The task completed without naming the resource it produced
    #[error("task {id} completed without a resource id")]
    MissingResourceId { id: String },

    /// A resource reported a status that is neither pending nor a target
    #[error("{target} reached unexpected status '{status}' (expected one of: {expected})")]
    UnexpectedStatus {
        target: String,
        status: String,
        expected: String,
    },

    /// The bounded wait ran out of time
    #[error(
        "Timed out after {timeout:?} waiting for {target} (last status: {})",
        .last_status.as_deref().unwrap_or("unknown")
    )]
    Timeout {
        target: String,
        timeout: Duration,
        last_status: Option<String>,
    },

    /// The caller's cancellation token fired
    #[error("Wait for {target} cancelled")]
    Cancelled { target: String },
}

impl WaitError {
    pub fn fetch(target: impl Into<String>, source: ApiError) -> Self {
        Self::Fetch {
            target: target.into(),
            source,
        }
    }

    pub fn cancelled(target: impl Into<String>) -> Self {
        Self::Cancelled {
            target: target.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The wait was aborted because the service said the resource is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Fetch { source, .. } if source.is_not_found())
    }
}

/// Result type for waits
pub type WaitResult<T> = Result<T, WaitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = ApiError::not_found("retrieve subscription 12");
        assert_eq!(err.to_string(), "Failed to retrieve subscription 12: not found");
        assert!(err.is_not_found());

        let err = ApiError::Http {
            operation: "delete database 3".to_string(),
            status: 409,
            body: "conflict".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to delete database 3: 409 - conflict");
        assert!(!err.is_not_found());
    }

    #[test]
    fn task_failed_embeds_id_status_and_description() {
        let err = WaitError::TaskFailed {
            id: "abc".to_string(),
            status: "processing-error".to_string(),
            description: "quota exceeded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "task abc failed processing-error - quota exceeded"
        );
    }

    #[test]
    fn timeout_reports_last_status() {
        let err = WaitError::Timeout {
            target: "subscription 12".to_string(),
            timeout: Duration::from_secs(60),
            last_status: Some("pending".to_string()),
        };
        assert!(err.is_timeout());
        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("last status: pending"));
    }

    #[test]
    fn classification_helpers() {
        assert!(WaitError::cancelled("task abc").is_cancelled());
        assert!(WaitError::fetch("subscription 1", ApiError::not_found("x")).is_not_found());
        assert!(!WaitError::cancelled("task abc").is_not_found());
    }
}
