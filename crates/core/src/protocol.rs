//! Push events delivered over the realtime channel.
//!
//! Event names and payloads arrive as loosely-typed JSON. [`ServerEvent::decode`]
//! turns them into a closed enum at the transport boundary so the rest of the
//! client never touches raw payloads. Decoding is tolerant: only the event
//! name and the `task_id` are required, every nested field is optional.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, TaskError};
use crate::types::{TaskId, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    TaskUpdate,
    TaskCompleted,
    TaskError,
    AgentProgress,
    StateUpdate,
    StateFullUpdate,
    NodeUpdate,
    LlmUpdate,
    ErrorUpdate,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::TaskUpdate,
        EventKind::TaskCompleted,
        EventKind::TaskError,
        EventKind::AgentProgress,
        EventKind::StateUpdate,
        EventKind::StateFullUpdate,
        EventKind::NodeUpdate,
        EventKind::LlmUpdate,
        EventKind::ErrorUpdate,
    ];

    /// Wire name as emitted by the server.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskUpdate => "task_update",
            Self::TaskCompleted => "task_completed",
            Self::TaskError => "task_error",
            Self::AgentProgress => "agent_progress",
            Self::StateUpdate => "state_update",
            Self::StateFullUpdate => "state_full_update",
            Self::NodeUpdate => "node_update",
            Self::LlmUpdate => "llm_update",
            Self::ErrorUpdate => "error_update",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodePhase {
    Start,
    Complete,
    Other(String),
}

impl NodePhase {
    fn parse(s: &str) -> Self {
        match s {
            "node_start" => Self::Start,
            "node_complete" => Self::Complete,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Final output of a solved task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskResult {
    /// Raw command entries. The server may mix JSON fragments in; see the
    /// result viewer's command filter.
    pub geogebra_commands: Vec<Value>,
    pub explanation: Option<String>,
    pub is_valid: Option<bool>,
    pub parsed_elements: Option<Map<String, Value>>,
}

impl TaskResult {
    pub fn from_value(value: &Value) -> Self {
        Self {
            geogebra_commands: array_field(value, "geogebra_commands"),
            explanation: str_field(value, "explanation"),
            is_valid: value.get("is_valid").and_then(Value::as_bool),
            parsed_elements: object_field(value, "parsed_elements"),
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            parsed_elements: self.parsed_elements.clone(),
            geogebra_commands: Some(self.geogebra_commands.clone()),
            explanation: self.explanation.clone(),
        }
    }
}

/// Partial or complete pipeline state. Absent fields are left untouched by
/// consumers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSnapshot {
    pub parsed_elements: Option<Map<String, Value>>,
    pub geogebra_commands: Option<Vec<Value>>,
    pub explanation: Option<String>,
}

impl StateSnapshot {
    pub fn from_value(value: &Value) -> Self {
        Self {
            parsed_elements: object_field(value, "parsed_elements"),
            geogebra_commands: value
                .get("geogebra_commands")
                .and_then(Value::as_array)
                .cloned(),
            explanation: str_field(value, "explanation"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parsed_elements.is_none()
            && self.geogebra_commands.is_none()
            && self.explanation.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    TaskUpdate {
        task_id: TaskId,
        status: TaskStatus,
        message: Option<String>,
    },
    TaskCompleted {
        task_id: TaskId,
        result: TaskResult,
    },
    TaskError {
        task_id: TaskId,
        error: String,
    },
    AgentProgress {
        task_id: TaskId,
        fields: Map<String, Value>,
    },
    StateUpdate {
        task_id: TaskId,
        snapshot: Option<StateSnapshot>,
        fields: Map<String, Value>,
    },
    StateFullUpdate {
        task_id: TaskId,
        snapshot: StateSnapshot,
    },
    NodeUpdate {
        task_id: TaskId,
        phase: NodePhase,
        node: Option<String>,
        message: Option<String>,
    },
    LlmUpdate {
        task_id: TaskId,
        fields: Map<String, Value>,
    },
    ErrorUpdate {
        task_id: TaskId,
        node: Option<String>,
        message: Option<String>,
        error: Option<String>,
    },
}

impl ServerEvent {
    /// Decode a named push event. Fails only on an unknown name or a missing
    /// task identifier.
    pub fn decode(name: &str, payload: Value) -> Result<Self, ProtocolError> {
        let kind = EventKind::from_name(name)
            .ok_or_else(|| ProtocolError::UnknownEvent(name.to_string()))?;

        let mut obj = match payload {
            Value::Object(obj) => obj,
            _ => {
                return Err(ProtocolError::MissingTaskId {
                    event: name.to_string(),
                })
            }
        };

        let task_id = match obj.remove("task_id") {
            Some(Value::String(id)) if !id.is_empty() => TaskId::new(id),
            _ => {
                return Err(ProtocolError::MissingTaskId {
                    event: name.to_string(),
                })
            }
        };
        let value = Value::Object(obj);

        let event = match kind {
            EventKind::TaskUpdate => Self::TaskUpdate {
                task_id,
                status: value
                    .get("status")
                    .cloned()
                    .and_then(|s| serde_json::from_value(s).ok())
                    .unwrap_or(TaskStatus::Unknown),
                message: str_field(&value, "message"),
            },
            EventKind::TaskCompleted => Self::TaskCompleted {
                task_id,
                result: value
                    .get("result")
                    .map(TaskResult::from_value)
                    .unwrap_or_default(),
            },
            EventKind::TaskError => Self::TaskError {
                task_id,
                error: str_field(&value, "error")
                    .or_else(|| str_field(&value, "message"))
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
            EventKind::AgentProgress => Self::AgentProgress {
                task_id,
                fields: into_map(value),
            },
            EventKind::StateUpdate => Self::StateUpdate {
                task_id,
                snapshot: value
                    .get("data")
                    .filter(|d| d.is_object())
                    .map(StateSnapshot::from_value),
                fields: into_map(value),
            },
            EventKind::StateFullUpdate => Self::StateFullUpdate {
                task_id,
                snapshot: value
                    .get("data")
                    .map(StateSnapshot::from_value)
                    .unwrap_or_default(),
            },
            EventKind::NodeUpdate => Self::NodeUpdate {
                task_id,
                phase: NodePhase::parse(value.get("type").and_then(Value::as_str).unwrap_or("")),
                node: str_field(&value, "node"),
                message: str_field(&value, "message"),
            },
            EventKind::LlmUpdate => Self::LlmUpdate {
                task_id,
                fields: into_map(value),
            },
            EventKind::ErrorUpdate => Self::ErrorUpdate {
                task_id,
                node: str_field(&value, "node"),
                message: str_field(&value, "message"),
                error: str_field(&value, "error"),
            },
        };

        Ok(event)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::TaskUpdate { .. } => EventKind::TaskUpdate,
            Self::TaskCompleted { .. } => EventKind::TaskCompleted,
            Self::TaskError { .. } => EventKind::TaskError,
            Self::AgentProgress { .. } => EventKind::AgentProgress,
            Self::StateUpdate { .. } => EventKind::StateUpdate,
            Self::StateFullUpdate { .. } => EventKind::StateFullUpdate,
            Self::NodeUpdate { .. } => EventKind::NodeUpdate,
            Self::LlmUpdate { .. } => EventKind::LlmUpdate,
            Self::ErrorUpdate { .. } => EventKind::ErrorUpdate,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::TaskUpdate { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskError { task_id, .. }
            | Self::AgentProgress { task_id, .. }
            | Self::StateUpdate { task_id, .. }
            | Self::StateFullUpdate { task_id, .. }
            | Self::NodeUpdate { task_id, .. }
            | Self::LlmUpdate { task_id, .. }
            | Self::ErrorUpdate { task_id, .. } => task_id,
        }
    }

    /// The task failure carried by this event, if it reports one.
    pub fn task_error(&self) -> Option<TaskError> {
        match self {
            Self::TaskError { task_id, error } => Some(TaskError {
                task_id: task_id.clone(),
                message: error.clone(),
                node: None,
            }),
            Self::ErrorUpdate {
                task_id,
                node,
                message,
                error,
            } => Some(TaskError {
                task_id: task_id.clone(),
                message: error
                    .clone()
                    .or_else(|| message.clone())
                    .unwrap_or_else(|| "unknown error".to_string()),
                node: node.clone(),
            }),
            _ => None,
        }
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

fn array_field(value: &Value, key: &str) -> Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn object_field(value: &Value, key: &str) -> Option<Map<String, Value>> {
    value.get(key).and_then(Value::as_object).cloned()
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
