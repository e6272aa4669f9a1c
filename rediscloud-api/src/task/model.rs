//! Task records as returned by `/tasks/{id}`

use serde::{Deserialize, Serialize};

use super::status::TaskStatus;

/// One asynchronous unit of work tracked by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "taskId")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<TaskResponse>,
}

impl Task {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from(self.status.as_deref().unwrap_or_default())
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    /// The error embedded in the result payload, if any
    pub fn response_error(&self) -> Option<&TaskResponseError> {
        self.response.as_ref().and_then(|r| r.error.as_ref())
    }

    /// Identifier of the resource the task produced
    pub fn resource_id(&self) -> Option<i64> {
        self.response.as_ref().and_then(|r| r.resource_id)
    }

    /// Raw resource payload attached to the result
    pub fn resource(&self) -> Option<&serde_json::Value> {
        self.response.as_ref().and_then(|r| r.resource.as_ref())
    }
}

/// Result payload, present once the task has completed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_resource_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskResponseError>,
}

/// Error reported inside a task's result payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResponseError {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl std::fmt::Display for TaskResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {}: {}",
            self.status.as_deref().unwrap_or_default(),
            self.kind.as_deref().unwrap_or_default(),
            self.description.as_deref().unwrap_or_default()
        )
    }
}

impl std::error::Error for TaskResponseError {}
