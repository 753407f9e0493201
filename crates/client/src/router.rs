//! Routes decoded push events to registered callbacks.
//!
//! The router is generic over the context the callbacks mutate, so the
//! widgets are handed in at dispatch time instead of living in globals.
//! Every dispatch re-reads the tracked task id; events for any other task
//! are dropped before lifecycle state or callbacks see them. Once the
//! tracked task has finished, late progress events for it are dropped too.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use geosolve_core::protocol::{EventKind, ServerEvent};

use crate::task::{self, SharedTracker};

pub type Callback<C> = Box<dyn FnMut(&mut C, &ServerEvent) + Send>;

pub struct EventRouter<C> {
    tracker: SharedTracker,
    callbacks: HashMap<EventKind, Callback<C>>,
}

impl<C> EventRouter<C> {
    pub fn new(tracker: SharedTracker) -> Self {
        Self {
            tracker,
            callbacks: HashMap::new(),
        }
    }

    /// Register the callback for a wire event name. Unrecognized names are
    /// ignored. Returns whether the callback was registered.
    pub fn on<F>(&mut self, name: &str, callback: F) -> bool
    where
        F: FnMut(&mut C, &ServerEvent) + Send + 'static,
    {
        match EventKind::from_name(name) {
            Some(kind) => {
                self.on_kind(kind, callback);
                true
            }
            None => {
                debug!("Ignoring handler for unknown event {}", name);
                false
            }
        }
    }

    /// Register the callback for `kind`, replacing any earlier one.
    pub fn on_kind<F>(&mut self, kind: EventKind, callback: F)
    where
        F: FnMut(&mut C, &ServerEvent) + Send + 'static,
    {
        if self.callbacks.insert(kind, Box::new(callback)).is_some() {
            debug!("Replaced handler for {}", kind);
        }
    }

    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.callbacks.contains_key(&kind)
    }

    /// Decode and dispatch a raw event from the transport. Undecodable
    /// events are dropped.
    pub fn dispatch_raw(&mut self, ctx: &mut C, name: &str, payload: Value) -> bool {
        match ServerEvent::decode(name, payload) {
            Ok(event) => self.dispatch(ctx, &event),
            Err(e) => {
                debug!("Dropping event {}: {}", name, e);
                false
            }
        }
    }

    /// Dispatch an event for the tracked task. Returns `false` if the event
    /// was discarded as stale or arrived after the task finished.
    pub fn dispatch(&mut self, ctx: &mut C, event: &ServerEvent) -> bool {
        {
            let mut tracker = task::lock(&self.tracker);
            if !tracker.is_tracking(event.task_id()) {
                debug!(
                    "Discarding {} for untracked task {}",
                    event.kind(),
                    event.task_id()
                );
                return false;
            }
            let finished = tracker.current().is_some_and(|t| t.is_terminal());
            if finished && matches!(event.kind(), EventKind::TaskUpdate | EventKind::NodeUpdate) {
                debug!(
                    "Discarding late {} for finished task {}",
                    event.kind(),
                    event.task_id()
                );
                return false;
            }
            tracker.apply(event);
        }

        if let Some(callback) = self.callbacks.get_mut(&event.kind()) {
            callback(ctx, event);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosolve_core::types::{TaskId, TaskStatus};
    use serde_json::json;

    use crate::task::TaskTracker;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<String>,
    }

    fn router() -> (EventRouter<Recorder>, SharedTracker) {
        let tracker = TaskTracker::shared();
        task::lock(&tracker).adopt(TaskId::new("t1"));
        let mut router = EventRouter::new(tracker.clone());
        router.on("task_update", |rec: &mut Recorder, ev| {
            rec.seen.push(format!("update {}", ev.task_id()));
        });
        router.on("node_update", |rec: &mut Recorder, _| rec.seen.push("node".into()));
        (router, tracker)
    }

    #[test]
    fn test_dispatch_matching_task() {
        let (mut router, tracker) = router();
        let mut rec = Recorder::default();

        assert!(router.dispatch_raw(
            &mut rec,
            "task_update",
            json!({"task_id": "t1", "status": "processing"})
        ));
        assert_eq!(rec.seen, vec!["update t1"]);
        assert_eq!(
            task::lock(&tracker).current().unwrap().status,
            TaskStatus::Processing
        );
    }

    #[test]
    fn test_stale_events_have_no_effect() {
        let (mut router, tracker) = router();
        let mut rec = Recorder::default();

        assert!(!router.dispatch_raw(
            &mut rec,
            "task_update",
            json!({"task_id": "old", "status": "completed"})
        ));
        assert!(rec.seen.is_empty());
        assert_eq!(
            task::lock(&tracker).current().unwrap().status,
            TaskStatus::Submitted
        );
    }

    #[test]
    fn test_no_tracked_task_discards_everything() {
        let (mut router, tracker) = router();
        task::lock(&tracker).clear();
        let mut rec = Recorder::default();

        assert!(!router.dispatch_raw(&mut rec, "node_update", json!({"task_id": "t1"})));
        assert!(rec.seen.is_empty());
    }

    #[test]
    fn test_tracked_id_is_read_at_dispatch_time() {
        let (mut router, tracker) = router();
        let mut rec = Recorder::default();

        task::lock(&tracker).adopt(TaskId::new("t2"));
        router.dispatch_raw(&mut rec, "node_update", json!({"task_id": "t1"}));
        router.dispatch_raw(&mut rec, "node_update", json!({"task_id": "t2"}));
        assert_eq!(rec.seen, vec!["node"]);
    }

    #[test]
    fn test_unknown_names_are_ignored() {
        let (mut router, _tracker) = router();
        assert!(!router.on("weather", |_: &mut Recorder, _| {}));

        let mut rec = Recorder::default();
        assert!(!router.dispatch_raw(&mut rec, "weather", json!({"task_id": "t1"})));
        assert!(!router.dispatch_raw(&mut rec, "task_update", json!({"status": "x"})));
        assert!(rec.seen.is_empty());
    }

    #[test]
    fn test_one_callback_per_event() {
        let (mut router, _tracker) = router();
        router.on("task_update", |rec: &mut Recorder, _| rec.seen.push("second".into()));

        let mut rec = Recorder::default();
        router.dispatch_raw(&mut rec, "task_update", json!({"task_id": "t1"}));
        assert_eq!(rec.seen, vec!["second"]);
    }

    #[test]
    fn test_progress_after_finish_is_discarded() {
        let (mut router, tracker) = router();
        let mut rec = Recorder::default();

        assert!(router.dispatch_raw(&mut rec, "task_error", json!({"task_id": "t1", "error": "x"})));
        assert!(!router.dispatch_raw(
            &mut rec,
            "task_update",
            json!({"task_id": "t1", "status": "processing"})
        ));
        assert!(!router.dispatch_raw(
            &mut rec,
            "node_update",
            json!({"task_id": "t1", "type": "node_start", "node": "parsing_agent"})
        ));
        assert!(rec.seen.is_empty());
        assert_eq!(task::lock(&tracker).current().unwrap().status, TaskStatus::Error);
    }

    #[test]
    fn test_events_without_handler_still_update_lifecycle() {
        let (mut router, tracker) = router();
        let mut rec = Recorder::default();

        assert!(!router.has_handler(EventKind::TaskError));
        assert!(router.dispatch_raw(&mut rec, "task_error", json!({"task_id": "t1", "error": "x"})));
        assert_eq!(task::lock(&tracker).current().unwrap().status, TaskStatus::Error);
        assert!(rec.seen.is_empty());
    }
}
