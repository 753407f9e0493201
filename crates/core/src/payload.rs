//! Request and response bodies of the HTTP task API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::TaskResult;
use crate::types::{TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Body of `POST /generate-commands`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub messages: Vec<ChatMessage>,
}

impl SubmitRequest {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: content.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub task_id: Option<TaskId>,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    /// Human-readable detail. Non-string details are rendered as JSON.
    pub fn message(&self) -> Option<String> {
        match &self.detail {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Body of `GET /task/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusPayload {
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default = "unknown_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub error: Option<String>,
}

fn unknown_status() -> TaskStatus {
    TaskStatus::Unknown
}

impl TaskStatusPayload {
    /// The result, but only once the task has completed.
    pub fn completed_result(&self) -> Option<&TaskResult> {
        match self.status {
            TaskStatus::Completed => self.result.as_ref(),
            _ => None,
        }
    }
}

/// Body of `GET /health`. Only `status` is interpreted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthPayload {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
