use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use geosolve_core::payload::TaskStatusPayload;
use geosolve_core::protocol::{NodePhase, ServerEvent};
use geosolve_core::types::{Task, TaskId, TaskStatus};

/// The tracker is written by the submission client and read by every
/// dispatch, so it lives behind a shared lock.
pub type SharedTracker = Arc<Mutex<TaskTracker>>;

/// Holds the single task the client is following.
#[derive(Debug, Default)]
pub struct TaskTracker {
    current: Option<Task>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTracker {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Start following `id`, discarding the previous task. Returns the id
    /// that was replaced.
    pub fn adopt(&mut self, id: TaskId) -> Option<TaskId> {
        let previous = self.current.take().map(|t| t.id);
        debug!("Tracking task {} (replaces {:?})", id, previous);
        self.current = Some(Task::submitted(id));
        previous
    }

    pub fn current_id(&self) -> Option<&TaskId> {
        self.current.as_ref().map(|t| &t.id)
    }

    pub fn current(&self) -> Option<&Task> {
        self.current.as_ref()
    }

    pub fn is_tracking(&self, id: &TaskId) -> bool {
        self.current_id() == Some(id)
    }

    /// Apply lifecycle state carried by an event for the tracked task.
    /// Events for any other task are ignored.
    pub fn apply(&mut self, event: &ServerEvent) {
        let task = match self.current.as_mut() {
            Some(task) if &task.id == event.task_id() => task,
            _ => return,
        };

        match event {
            ServerEvent::TaskUpdate { status, .. }
                if *status != TaskStatus::Unknown && !task.status.is_terminal() =>
            {
                task.status = *status;
            }
            ServerEvent::NodeUpdate {
                phase: NodePhase::Start,
                ..
            } if !task.status.is_terminal() => {
                task.status = TaskStatus::Processing;
            }
            ServerEvent::TaskCompleted { result, .. } => {
                task.status = TaskStatus::Completed;
                task.result = Some(result.clone());
                task.error = None;
            }
            ServerEvent::TaskError { .. } | ServerEvent::ErrorUpdate { .. } => {
                task.status = TaskStatus::Error;
                task.error = event.task_error().map(|e| e.message);
            }
            _ => {}
        }
    }

    /// Fold a status-check response into the tracked task.
    pub fn apply_status(&mut self, payload: &TaskStatusPayload) {
        let task = match self.current.as_mut() {
            Some(task) => task,
            None => return,
        };
        if let Some(id) = &payload.task_id {
            if id != &task.id {
                return;
            }
        }
        if payload.status != TaskStatus::Unknown {
            task.status = payload.status;
        }
        if let Some(result) = payload.completed_result() {
            task.result = Some(result.clone());
        }
        if payload.error.is_some() {
            task.error = payload.error.clone();
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

/// Lock the shared tracker. A poisoned lock still holds a consistent
/// tracker, so it is recovered rather than propagated.
pub fn lock(tracker: &SharedTracker) -> MutexGuard<'_, TaskTracker> {
    tracker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosolve_core::protocol::TaskResult;
    use serde_json::json;

    fn event(name: &str, payload: serde_json::Value) -> ServerEvent {
        ServerEvent::decode(name, payload).unwrap()
    }

    #[test]
    fn test_adopt_replaces_previous_task() {
        let mut tracker = TaskTracker::new();
        assert_eq!(tracker.adopt(TaskId::new("a")), None);
        assert_eq!(tracker.adopt(TaskId::new("b")), Some(TaskId::new("a")));
        assert_eq!(tracker.current_id(), Some(&TaskId::new("b")));
        assert_eq!(tracker.current().unwrap().status, TaskStatus::Submitted);
    }

    #[test]
    fn test_apply_lifecycle() {
        let mut tracker = TaskTracker::new();
        tracker.adopt(TaskId::new("t1"));

        tracker.apply(&event("task_update", json!({"task_id": "t1", "status": "processing"})));
        assert_eq!(tracker.current().unwrap().status, TaskStatus::Processing);

        tracker.apply(&event(
            "task_completed",
            json!({"task_id": "t1", "result": {"geogebra_commands": ["A=(0,0)"]}}),
        ));
        let task = tracker.current().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.as_ref().unwrap().geogebra_commands.len(), 1);
    }

    #[test]
    fn test_finished_task_is_not_reopened() {
        let mut tracker = TaskTracker::new();
        tracker.adopt(TaskId::new("t1"));
        tracker.apply(&event("task_completed", json!({"task_id": "t1", "result": {}})));
        tracker.apply(&event("task_update", json!({"task_id": "t1", "status": "processing"})));
        tracker.apply(&event("node_update", json!({"task_id": "t1", "type": "node_start", "node": "parsing_agent"})));
        assert_eq!(tracker.current().unwrap().status, TaskStatus::Completed);

        tracker.adopt(TaskId::new("t2"));
        tracker.apply(&event("task_error", json!({"task_id": "t2", "error": "boom"})));
        tracker.apply(&event("task_update", json!({"task_id": "t2", "status": "processing"})));
        let task = tracker.current().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_apply_ignores_other_tasks() {
        let mut tracker = TaskTracker::new();
        tracker.adopt(TaskId::new("new"));
        tracker.apply(&event("task_error", json!({"task_id": "old", "error": "boom"})));

        let task = tracker.current().unwrap();
        assert_eq!(task.status, TaskStatus::Submitted);
        assert!(task.error.is_none());
    }

    #[test]
    fn test_apply_error_update() {
        let mut tracker = TaskTracker::new();
        tracker.adopt(TaskId::new("t1"));
        tracker.apply(&event(
            "error_update",
            json!({"task_id": "t1", "node": "validation_agent", "error": "invalid command"}),
        ));
        let task = tracker.current().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.error.as_deref(), Some("invalid command"));
    }

    #[test]
    fn test_apply_status_payload() {
        let mut tracker = TaskTracker::new();
        tracker.adopt(TaskId::new("t1"));
        tracker.apply_status(&TaskStatusPayload {
            task_id: Some(TaskId::new("t1")),
            status: TaskStatus::Completed,
            result: Some(TaskResult::default()),
            error: None,
        });
        let task = tracker.current().unwrap();
        assert!(task.is_terminal());
        assert!(task.result.is_some());
    }

    #[test]
    fn test_clear() {
        let tracker = TaskTracker::shared();
        lock(&tracker).adopt(TaskId::new("t1"));
        lock(&tracker).clear();
        assert!(lock(&tracker).current_id().is_none());
    }
}
