use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use geosolve_core::payload::TaskStatusPayload;
use geosolve_core::pipeline;
use geosolve_core::protocol::{NodePhase, ServerEvent};
use geosolve_core::types::{GraphNodeState, NodeStatus, TaskId, TaskStatus};
use geosolve_transport::{ConnectionEvent, ConnectionState};

use crate::api::{HealthProbe, TaskClient};
use crate::command::{Command, CommandBarState};
use crate::event::Event;
use crate::router::EventRouter;
use crate::task;
use crate::views::workspace::{Workspace, WorkspaceAction};
use crate::widgets::activity_log::ActivityLevel;
use crate::widgets::command_bar::render_command_bar;
use crate::widgets::results::geogebra_url;

const DEFAULT_EXPORT_FILE: &str = "geogebra_commands.txt";

/// How a headless run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(String),
}

pub struct App {
    pub workspace: Workspace,
    pub command_bar: CommandBarState,
    pub connection_state: ConnectionState,
    pub should_quit: bool,
    router: EventRouter<Workspace>,
    client: TaskClient,
    event_tx: mpsc::UnboundedSender<Event>,
    /// Last failure that ended a run without a task reaching a terminal state.
    last_failure: Option<String>,
}

/// Initialization parameters for App.
pub struct AppInit {
    pub client: TaskClient,
    pub event_tx: mpsc::UnboundedSender<Event>,
    pub flow_log_capacity: usize,
}

impl App {
    pub fn new(init: AppInit) -> Self {
        let mut router = EventRouter::new(init.client.tracker().clone());
        register_handlers(&mut router);

        Self {
            workspace: Workspace::new(init.flow_log_capacity),
            command_bar: CommandBarState::new(),
            connection_state: ConnectionState::Connecting,
            should_quit: false,
            router,
            client: init.client,
            event_tx: init.event_tx,
            last_failure: None,
        }
    }

    pub fn update(&mut self, event: Event) {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Resize | Event::Tick => {}
            Event::Connection(conn) => self.handle_connection(conn),
            Event::SubmissionFinished(Ok(task_id)) => {
                self.workspace.set_status(
                    format!("task {} submitted, waiting for the pipeline", task_id.short()),
                    ActivityLevel::Info,
                );
            }
            Event::SubmissionFinished(Err(message)) => {
                let message = format!("submission failed: {}", message);
                self.last_failure = Some(message.clone());
                self.workspace.fail(message);
            }
            Event::StatusChecked { task_id, result } => self.handle_status_checked(task_id, result),
            Event::HealthProbed(probe) => match probe {
                HealthProbe::Alive(payload) => {
                    let detail = payload.status.unwrap_or_else(|| "ok".into());
                    self.workspace.set_status(
                        format!("server is up ({}) but the realtime channel is broken", detail),
                        ActivityLevel::Warning,
                    );
                }
                HealthProbe::Unreachable(reason) => {
                    self.workspace.set_status(
                        format!("server is not responding: {}", reason),
                        ActivityLevel::Error,
                    );
                }
            },
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        // Command bar takes priority when active
        if self.command_bar.active {
            match key.code {
                KeyCode::Esc => {
                    if self.command_bar.completion.is_some() {
                        self.command_bar.close_completion();
                    } else {
                        self.command_bar.deactivate();
                    }
                }
                KeyCode::Enter => {
                    if let Some(cmd) = self.command_bar.submit() {
                        self.execute_command(cmd);
                    }
                }
                KeyCode::Backspace => self.command_bar.delete_char(),
                KeyCode::Tab => self.command_bar.tab_complete(),
                KeyCode::Up => self.command_bar.select_prev(),
                KeyCode::Down => self.command_bar.select_next(),
                KeyCode::Char(c) => self.command_bar.insert_char(c),
                _ => {}
            }
            return;
        }

        // ':' activates command bar
        if key.code == KeyCode::Char(':') {
            self.command_bar.activate();
            return;
        }
        match self.workspace.handle_key(key) {
            WorkspaceAction::PromptSolve => self.command_bar.activate_with("solve "),
            WorkspaceAction::Quit => self.should_quit = true,
            WorkspaceAction::None => {}
        }
    }

    pub fn execute_command(&mut self, cmd: Command) {
        match cmd {
            Command::Solve { problem } => self.submit(problem),
            Command::Status => match self.tracked_id() {
                Some(id) => self.spawn_status_check(id),
                None => self
                    .workspace
                    .append_activity("no task to check", ActivityLevel::Warning),
            },
            Command::Tab(tab) => self.workspace.results.show_tab(tab),
            Command::Export { path } => {
                let path = PathBuf::from(path.unwrap_or_else(|| DEFAULT_EXPORT_FILE.into()));
                match export_commands(self.workspace.results.commands(), &path) {
                    Ok(count) => {
                        info!("Exported {} commands to {}", count, path.display());
                        self.workspace.append_activity(
                            format!("exported {} commands to {}", count, path.display()),
                            ActivityLevel::Success,
                        );
                    }
                    Err(e) => {
                        warn!("Export failed: {:#}", e);
                        self.workspace
                            .append_activity(format!("export failed: {:#}", e), ActivityLevel::Error);
                    }
                }
            }
            Command::Open => {
                let commands = self.workspace.results.commands();
                if commands.is_empty() {
                    self.workspace
                        .append_activity("no commands to open", ActivityLevel::Warning);
                } else {
                    let url = geogebra_url(commands);
                    info!("GeoGebra link: {}", url);
                    self.workspace.append_activity(url, ActivityLevel::Info);
                }
            }
            Command::Reset => {
                task::lock(self.client.tracker()).clear();
                self.workspace.reset_all();
                self.workspace.input_enabled = true;
                self.last_failure = None;
                self.workspace.set_status("ready", ActivityLevel::Info);
            }
            Command::Quit => {
                self.should_quit = true;
            }
            Command::Unknown(input) => {
                if !input.is_empty() {
                    self.workspace.append_activity(
                        format!("unknown command: {}", input),
                        ActivityLevel::Warning,
                    );
                }
            }
        }
    }

    /// Start a submission. Empty input never reaches the network.
    pub fn submit(&mut self, problem: String) {
        let problem = problem.trim().to_string();
        if problem.is_empty() {
            self.workspace
                .append_activity("enter a problem statement first", ActivityLevel::Warning);
            return;
        }
        if !self.workspace.input_enabled {
            self.workspace
                .append_activity("a task is already running", ActivityLevel::Warning);
            return;
        }

        self.last_failure = None;
        self.workspace.begin_submission();

        let client = self.client.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = client.submit_problem(&problem).await.map_err(|e| e.to_string());
            let _ = tx.send(Event::SubmissionFinished(result));
        });
    }

    fn tracked_id(&self) -> Option<TaskId> {
        task::lock(self.client.tracker()).current_id().cloned()
    }

    fn spawn_status_check(&self, task_id: TaskId) {
        let client = self.client.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = client
                .check_task_status(&task_id)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(Event::StatusChecked { task_id, result });
        });
    }

    fn spawn_health_probe(&self) {
        let client = self.client.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let probe = client.probe_health().await;
            let _ = tx.send(Event::HealthProbed(probe));
        });
    }

    fn handle_connection(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { sid } => {
                info!("Realtime channel connected, sid={}", sid);
                self.connection_state = ConnectionState::Connected;
                self.workspace.set_status("connected", ActivityLevel::Success);
            }
            ConnectionEvent::Disconnected { reason } => {
                warn!("Realtime channel lost: {}", reason);
                self.connection_state = ConnectionState::Disconnected;
                self.workspace.set_status(
                    format!("disconnected ({}), restart the client if it does not reconnect", reason),
                    ActivityLevel::Warning,
                );
            }
            ConnectionEvent::ReconnectAttempt { attempt, max } => {
                self.connection_state = ConnectionState::Reconnecting;
                self.workspace.set_status(
                    format!("reconnecting ({}/{})", attempt, max),
                    ActivityLevel::Warning,
                );
            }
            ConnectionEvent::Reconnected { attempt } => {
                info!("Reconnected after {} attempts", attempt);
                self.connection_state = ConnectionState::Connected;
                self.workspace.set_status("reconnected", ActivityLevel::Success);
                // Terminal state may have been missed while offline
                if let Some(id) = self.tracked_id() {
                    self.workspace.append_activity(
                        format!("re-syncing task {}", id.short()),
                        ActivityLevel::Info,
                    );
                    self.spawn_status_check(id);
                }
            }
            ConnectionEvent::ConnectError { message } => {
                warn!("Connect error: {}", message);
                self.workspace.set_status(
                    format!("connection error: {}", message),
                    ActivityLevel::Error,
                );
                self.spawn_health_probe();
            }
            ConnectionEvent::ReconnectFailed => {
                self.connection_state = ConnectionState::Disconnected;
                let message = "could not reconnect, restart the client".to_string();
                self.last_failure = Some(message.clone());
                self.workspace.set_status(message, ActivityLevel::Error);
            }
            ConnectionEvent::Message { name, payload } => {
                self.router.dispatch_raw(&mut self.workspace, &name, payload);
            }
        }
    }

    /// Replay a re-synced terminal state through the router, so an answer
    /// for a task that is no longer tracked is still discarded.
    fn handle_status_checked(&mut self, task_id: TaskId, result: Result<TaskStatusPayload, String>) {
        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                self.workspace.append_activity(
                    format!("status check for {} failed: {}", task_id.short(), e),
                    ActivityLevel::Warning,
                );
                return;
            }
        };

        // A completion without a result has nothing to paint
        let replay = match payload.status {
            TaskStatus::Completed => payload.result.clone().map(|result| ServerEvent::TaskCompleted {
                task_id: task_id.clone(),
                result,
            }),
            TaskStatus::Error => Some(ServerEvent::TaskError {
                task_id: task_id.clone(),
                error: payload
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
            _ => None,
        };

        match replay {
            Some(event) => {
                if !self.router.dispatch(&mut self.workspace, &event) {
                    debug!("Status for {} arrived after the task was replaced", task_id);
                }
            }
            None => {
                let tracked = {
                    let mut tracker = task::lock(self.client.tracker());
                    let tracked = tracker.is_tracking(&task_id);
                    if tracked {
                        tracker.apply_status(&payload);
                    }
                    tracked
                };
                if tracked {
                    self.workspace.append_activity(
                        format!("task {} is {}", task_id.short(), payload.status),
                        ActivityLevel::Info,
                    );
                }
            }
        }
    }

    /// `Some` once the run has ended one way or the other.
    pub fn outcome(&self) -> Option<RunOutcome> {
        let tracker = task::lock(self.client.tracker());
        if let Some(task) = tracker.current() {
            match task.status {
                TaskStatus::Completed => return Some(RunOutcome::Completed),
                TaskStatus::Error => {
                    return Some(RunOutcome::Failed(
                        task.error.clone().unwrap_or_else(|| "unknown error".into()),
                    ))
                }
                _ => {}
            }
        }
        self.last_failure.clone().map(RunOutcome::Failed)
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(1), // status bar
            Constraint::Length(1), // command bar
        ])
        .split(frame.area());

        self.workspace.render(frame, chunks[0]);
        self.render_status_bar(frame, chunks[1]);
        render_command_bar(frame, chunks[2], &self.command_bar, self.workspace.input_enabled);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let mut spans = vec![Span::styled(
            " GEOSOLVE ",
            Style::default().fg(Color::Black).bg(Color::Cyan).bold(),
        )];

        spans.push(Span::styled("  ", Style::default().bg(Color::Rgb(25, 25, 25))));

        let conn_color = match self.connection_state {
            ConnectionState::Connected => Color::Green,
            ConnectionState::Connecting | ConnectionState::Reconnecting => Color::Yellow,
            ConnectionState::Disconnected => Color::Red,
        };
        spans.push(Span::styled("● ", Style::default().fg(conn_color).bg(Color::Rgb(25, 25, 25))));
        spans.push(Span::styled(
            format!("{} ", self.connection_state),
            Style::default().fg(Color::Gray).bg(Color::Rgb(25, 25, 25)),
        ));

        let task_label = {
            let tracker = task::lock(self.client.tracker());
            tracker
                .current()
                .map(|t| format!(" task {} {} ", t.id.short(), t.status))
                .unwrap_or_else(|| " no task ".to_string())
        };
        spans.push(Span::styled(
            task_label,
            Style::default().fg(Color::White).bg(Color::Rgb(40, 40, 40)),
        ));
        spans.push(Span::styled(
            format!(" {} ", self.client.base_url()),
            Style::default().fg(Color::DarkGray).bg(Color::Rgb(25, 25, 25)),
        ));

        let bar = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(25, 25, 25)));
        frame.render_widget(bar, area);
    }
}

/// Wire the push events to the widgets.
pub fn register_handlers(router: &mut EventRouter<Workspace>) {
    router.on("task_update", |ws: &mut Workspace, ev: &ServerEvent| {
        let ServerEvent::TaskUpdate { status, message, .. } = ev else {
            return;
        };
        match status {
            TaskStatus::Processing => {
                ws.graph.reset();
                ws.set_progress(30);
                ws.set_status(
                    message.clone().unwrap_or_else(|| "analyzing problem".into()),
                    ActivityLevel::Info,
                );
            }
            other => ws.append_activity(format!("task {}", other), ActivityLevel::Info),
        }
    });

    router.on("node_update", |ws: &mut Workspace, ev: &ServerEvent| {
        let ServerEvent::NodeUpdate { phase, node, message, .. } = ev else {
            return;
        };
        let Some(node) = node.as_deref() else {
            return;
        };
        let message = message.as_deref();
        let (flow_status, graph_state, progress) = match phase {
            NodePhase::Start => (NodeStatus::Running, GraphNodeState::Active, 50),
            NodePhase::Complete => (NodeStatus::Completed, GraphNodeState::Completed, 70),
            NodePhase::Other(kind) => {
                debug!("Ignoring node_update of type {}", kind);
                return;
            }
        };

        if let Err(e) = ws.flow.update_node_status(node, flow_status, message) {
            ws.append_activity(e.to_string(), ActivityLevel::Warning);
        }
        ws.graph.update_node_status(node, graph_state, message);
        ws.set_progress(progress);
        if *phase == NodePhase::Start {
            ws.status = format!("{}...", pipeline::display_name(node));
            ws.status_level = ActivityLevel::Info;
        }
    });

    router.on("error_update", |ws: &mut Workspace, ev: &ServerEvent| {
        let Some(err) = ev.task_error() else {
            return;
        };
        if let Some(node) = err.node.as_deref() {
            if let Err(e) = ws.flow.update_node_status(node, NodeStatus::Error, Some(err.message.as_str())) {
                ws.append_activity(e.to_string(), ActivityLevel::Warning);
            }
            ws.graph.update_node_status(node, GraphNodeState::Error, Some(err.message.as_str()));
        }
        ws.fail(err.to_string());
    });

    router.on("task_error", |ws: &mut Workspace, ev: &ServerEvent| {
        if let Some(err) = ev.task_error() {
            ws.fail(err.to_string());
        }
    });

    router.on("task_completed", |ws: &mut Workspace, ev: &ServerEvent| {
        let ServerEvent::TaskCompleted { result, .. } = ev else {
            return;
        };
        ws.apply_result(result);
        ws.set_progress(100);
        ws.input_enabled = true;
        ws.set_status("solution ready", ActivityLevel::Success);
        if result.is_valid == Some(false) {
            ws.append_activity(
                "commands did not pass validation, check before use",
                ActivityLevel::Warning,
            );
        }
    });

    router.on("state_update", |ws: &mut Workspace, ev: &ServerEvent| {
        let ServerEvent::StateUpdate { snapshot, fields, .. } = ev else {
            return;
        };
        match snapshot {
            Some(snapshot) => ws.apply_snapshot(snapshot),
            None => ws.append_activity(summarize("state", fields), ActivityLevel::Info),
        }
    });

    router.on("state_full_update", |ws: &mut Workspace, ev: &ServerEvent| {
        if let ServerEvent::StateFullUpdate { snapshot, .. } = ev {
            ws.apply_snapshot(snapshot);
        }
    });

    router.on("agent_progress", |ws: &mut Workspace, ev: &ServerEvent| {
        if let ServerEvent::AgentProgress { fields, .. } = ev {
            ws.append_activity(summarize("agent", fields), ActivityLevel::Info);
        }
    });

    router.on("llm_update", |ws: &mut Workspace, ev: &ServerEvent| {
        if let ServerEvent::LlmUpdate { fields, .. } = ev {
            ws.append_activity(summarize("llm", fields), ActivityLevel::Info);
        }
    });
}

/// One activity line for a loosely shaped progress payload: its `message`
/// if present, otherwise its scalar fields.
fn summarize(prefix: &str, fields: &Map<String, Value>) -> String {
    if let Some(Value::String(message)) = fields.get("message") {
        return format!("[{}] {}", prefix, message);
    }
    let parts: Vec<String> = fields
        .iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some(format!("{}={}", k, s)),
            Value::Number(n) => Some(format!("{}={}", k, n)),
            Value::Bool(b) => Some(format!("{}={}", k, b)),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        format!("[{}] update", prefix)
    } else {
        format!("[{}] {}", prefix, parts.join(" "))
    }
}

/// Write one command per line. Returns the number written.
pub fn export_commands(commands: &[String], path: &Path) -> anyhow::Result<usize> {
    if commands.is_empty() {
        bail!("no commands to export");
    }
    let mut body = commands.join("\n");
    body.push('\n');
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(commands.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::task::TaskTracker;
    use crate::widgets::results::{PaneContent, ResultTab, NO_VALID_COMMANDS};

    fn app_tracking(id: &str) -> (App, mpsc::UnboundedReceiver<Event>) {
        let tracker = TaskTracker::shared();
        task::lock(&tracker).adopt(TaskId::new(id));
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(AppInit {
            client: TaskClient::new("http://127.0.0.1:9", tracker),
            event_tx: tx,
            flow_log_capacity: 100,
        });
        (app, rx)
    }

    fn push(app: &mut App, name: &str, payload: Value) {
        app.update(Event::Connection(ConnectionEvent::Message {
            name: name.to_string(),
            payload,
        }));
    }

    #[test]
    fn test_stale_events_leave_widgets_untouched() {
        let (mut app, _rx) = app_tracking("t1");
        let flow_before = app.workspace.flow.view();
        let graph_before = app.workspace.graph.view();

        push(&mut app, "node_update", json!({"task_id": "t0", "type": "node_start", "node": "parsing_agent"}));
        push(&mut app, "task_completed", json!({"task_id": "t0", "result": {"geogebra_commands": ["A=(1,2)"]}}));
        push(&mut app, "error_update", json!({"task_id": "t0", "node": "planner_agent", "error": "boom"}));

        assert_eq!(app.workspace.flow.view(), flow_before);
        assert_eq!(app.workspace.graph.view(), graph_before);
        assert!(app.workspace.results.commands().is_empty());
        assert_eq!(app.workspace.progress, 0);
        assert!(app.outcome().is_none());
    }

    #[test]
    fn test_pipeline_run_end_to_end() {
        let (mut app, _rx) = app_tracking("t1");

        push(&mut app, "task_update", json!({"task_id": "t1", "status": "processing"}));
        assert_eq!(app.workspace.progress, 30);

        push(&mut app, "node_update", json!({"task_id": "t1", "type": "node_start", "node": "parsing_agent"}));
        assert_eq!(app.workspace.progress, 50);
        assert_eq!(app.workspace.flow.active(), Some("parsing_agent"));
        assert_eq!(app.workspace.graph.state("parsing_agent"), Some(GraphNodeState::Active));

        push(&mut app, "node_update", json!({"task_id": "t1", "type": "node_complete", "node": "parsing_agent"}));
        assert_eq!(app.workspace.progress, 70);
        assert!(app.workspace.flow.active().is_none());
        assert_eq!(app.workspace.flow.status("parsing_agent"), Some(NodeStatus::Completed));

        app.workspace.input_enabled = false;
        push(
            &mut app,
            "task_completed",
            json!({"task_id": "t1", "result": {
                "geogebra_commands": ["\"MoveA\",", "commands", "[", "A=(1,2)", "]"],
                "explanation": "Place A.",
                "is_valid": true,
                "parsed_elements": {"points": ["A"]}
            }}),
        );
        assert_eq!(app.workspace.progress, 100);
        assert!(app.workspace.input_enabled);
        assert_eq!(app.workspace.results.commands(), ["A=(1,2)".to_string()]);
        assert_eq!(app.workspace.results.explanation(), Some("Place A."));
        assert_eq!(app.outcome(), Some(RunOutcome::Completed));
    }

    #[test]
    fn test_error_update_marks_node_and_reenables_input() {
        let (mut app, _rx) = app_tracking("t1");
        app.workspace.input_enabled = false;
        app.workspace.set_progress(50);

        push(
            &mut app,
            "error_update",
            json!({"task_id": "t1", "node": "validation_agent", "message": "step failed", "error": "bad syntax"}),
        );
        assert_eq!(app.workspace.flow.status("validation_agent"), Some(NodeStatus::Error));
        assert_eq!(app.workspace.graph.state("validation_agent"), Some(GraphNodeState::Error));
        assert!(app.workspace.input_enabled);
        assert_eq!(app.workspace.progress, 0);
        assert!(app.workspace.status.contains("bad syntax"));
        assert_eq!(app.outcome(), Some(RunOutcome::Failed("bad syntax".into())));
    }

    #[test]
    fn test_state_full_update_fills_panes() {
        let (mut app, _rx) = app_tracking("t1");
        push(
            &mut app,
            "state_full_update",
            json!({"task_id": "t1", "data": {"geogebra_commands": ["commands"], "explanation": "So."}}),
        );
        assert_eq!(
            app.workspace.results.pane(ResultTab::Commands),
            &PaneContent::Placeholder(NO_VALID_COMMANDS)
        );
        assert_eq!(app.workspace.results.explanation(), Some("So."));
    }

    #[test]
    fn test_progress_events_log_activity() {
        let (mut app, _rx) = app_tracking("t1");
        push(&mut app, "agent_progress", json!({"task_id": "t1", "message": "planning"}));
        push(&mut app, "llm_update", json!({"task_id": "t1", "step": "generate", "tokens": 12}));

        let lines: Vec<_> = app.workspace.activity_log.entries().map(|e| e.text.clone()).collect();
        assert!(lines.contains(&"[agent] planning".to_string()));
        assert!(lines.contains(&"[llm] step=generate tokens=12".to_string()));
    }

    #[test]
    fn test_status_resync_replays_completion() {
        let (mut app, _rx) = app_tracking("t1");
        let payload: TaskStatusPayload = serde_json::from_value(json!({
            "task_id": "t1",
            "status": "completed",
            "result": {"geogebra_commands": ["B=(0,0)"]}
        }))
        .unwrap();

        app.update(Event::StatusChecked {
            task_id: TaskId::new("t1"),
            result: Ok(payload),
        });
        assert_eq!(app.workspace.results.commands(), ["B=(0,0)".to_string()]);
        assert_eq!(app.workspace.progress, 100);
    }

    #[test]
    fn test_status_resync_without_result_keeps_panes() {
        let (mut app, _rx) = app_tracking("t1");
        push(
            &mut app,
            "state_full_update",
            json!({"task_id": "t1", "data": {"geogebra_commands": ["A=(1,2)"], "explanation": "So."}}),
        );
        let payload: TaskStatusPayload =
            serde_json::from_value(json!({"task_id": "t1", "status": "completed"})).unwrap();

        app.update(Event::StatusChecked {
            task_id: TaskId::new("t1"),
            result: Ok(payload),
        });
        assert_eq!(app.workspace.results.commands(), ["A=(1,2)".to_string()]);
        assert_eq!(app.workspace.results.explanation(), Some("So."));
        assert_eq!(
            task::lock(app.client.tracker()).current().unwrap().status,
            TaskStatus::Completed
        );
    }

    #[test]
    fn test_late_progress_does_not_reopen_completed_task() {
        let (mut app, _rx) = app_tracking("t1");
        push(&mut app, "node_update", json!({"task_id": "t1", "type": "node_start", "node": "parsing_agent"}));
        push(&mut app, "task_completed", json!({"task_id": "t1", "result": {"geogebra_commands": ["A=(1,2)"]}}));
        let graph_before = app.workspace.graph.view();
        let status_before = app.workspace.status.clone();

        push(&mut app, "task_update", json!({"task_id": "t1", "status": "processing"}));
        push(&mut app, "node_update", json!({"task_id": "t1", "type": "node_start", "node": "planner_agent"}));

        assert_eq!(app.outcome(), Some(RunOutcome::Completed));
        assert_eq!(app.workspace.progress, 100);
        assert_eq!(app.workspace.graph.view(), graph_before);
        assert_eq!(app.workspace.graph.state("parsing_agent"), Some(GraphNodeState::Active));
        assert_eq!(app.workspace.status, status_before);
        assert!(app.workspace.input_enabled);
    }

    #[test]
    fn test_late_progress_does_not_reopen_failed_task() {
        let (mut app, _rx) = app_tracking("t1");
        app.workspace.begin_submission();
        push(&mut app, "task_error", json!({"task_id": "t1", "error": "solver crashed"}));
        let status_before = app.workspace.status.clone();

        push(&mut app, "task_update", json!({"task_id": "t1", "status": "processing"}));
        push(&mut app, "node_update", json!({"task_id": "t1", "type": "node_start", "node": "parsing_agent"}));

        assert_eq!(app.outcome(), Some(RunOutcome::Failed("solver crashed".into())));
        assert_eq!(app.workspace.progress, 0);
        assert_eq!(app.workspace.status, status_before);
        assert!(app.workspace.flow.active().is_none());
        assert!(app.workspace.input_enabled);
    }

    #[test]
    fn test_status_resync_for_replaced_task_is_discarded() {
        let (mut app, _rx) = app_tracking("t2");
        let payload: TaskStatusPayload = serde_json::from_value(json!({
            "status": "completed",
            "result": {"geogebra_commands": ["B=(0,0)"]}
        }))
        .unwrap();

        app.update(Event::StatusChecked {
            task_id: TaskId::new("t1"),
            result: Ok(payload),
        });
        assert!(app.workspace.results.commands().is_empty());
        assert!(app.outcome().is_none());
    }

    #[test]
    fn test_empty_solve_does_not_submit() {
        let (mut app, mut rx) = app_tracking("t1");
        app.execute_command(Command::Solve { problem: "   ".into() });

        assert!(app.workspace.input_enabled);
        assert_eq!(app.workspace.progress, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(
            app.workspace.activity_log.entries().last().unwrap().level,
            ActivityLevel::Warning
        );
    }

    #[test]
    fn test_submission_failure_restores_input() {
        let (mut app, _rx) = app_tracking("t1");
        app.workspace.begin_submission();
        app.update(Event::SubmissionFinished(Err("Server rejected the problem (422): bad input".into())));

        assert!(app.workspace.input_enabled);
        assert!(app.workspace.status.contains("bad input"));
        // The tracked task is untouched by a failed submission
        assert_eq!(app.tracked_id(), Some(TaskId::new("t1")));
    }

    #[test]
    fn test_connection_status_text() {
        let (mut app, _rx) = app_tracking("t1");
        app.update(Event::Connection(ConnectionEvent::Connected { sid: "s1".into() }));
        assert_eq!(app.connection_state, ConnectionState::Connected);
        assert_eq!(app.workspace.status, "connected");

        app.update(Event::Connection(ConnectionEvent::ReconnectAttempt { attempt: 2, max: 5 }));
        assert_eq!(app.workspace.status, "reconnecting (2/5)");
        assert_eq!(app.connection_state, ConnectionState::Reconnecting);

        app.update(Event::HealthProbed(HealthProbe::Unreachable("refused".into())));
        assert!(app.workspace.status.contains("not responding"));

        app.update(Event::HealthProbed(HealthProbe::Alive(Default::default())));
        assert!(app.workspace.status.contains("realtime channel is broken"));
    }

    #[test]
    fn test_reset_forgets_task() {
        let (mut app, _rx) = app_tracking("t1");
        app.execute_command(Command::Reset);
        assert!(app.tracked_id().is_none());

        push(&mut app, "node_update", json!({"task_id": "t1", "type": "node_start", "node": "parsing_agent"}));
        assert!(app.workspace.flow.active().is_none());
    }

    #[test]
    fn test_resize_and_tick_change_nothing() {
        let (mut app, mut rx) = app_tracking("t1");
        let status = app.workspace.status.clone();
        app.update(Event::Resize);
        app.update(Event::Tick);
        assert_eq!(app.workspace.status, status);
        assert!(!app.should_quit);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_export_commands() {
        let path = std::env::temp_dir().join(format!("geosolve-export-{}.txt", std::process::id()));
        let written = export_commands(&["A=(1,2)".into(), "B=(3,4)".into()], &path).unwrap();
        assert_eq!(written, 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A=(1,2)\nB=(3,4)\n");
        let _ = std::fs::remove_file(&path);

        assert!(export_commands(&[], &path).is_err());
    }
}
