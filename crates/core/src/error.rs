use thiserror::Error;

use crate::types::TaskId;

/// Failures decoding an inbound push event at the transport boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Event {event} carries no task_id")]
    MissingTaskId { event: String },
}

/// A server-reported failure of a running task. Terminal for that task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Task {task_id} failed: {message}")]
pub struct TaskError {
    pub task_id: TaskId,
    pub message: String,
    pub node: Option<String>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
