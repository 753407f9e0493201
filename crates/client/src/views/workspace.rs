use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Gauge, Padding, Paragraph};

use geosolve_core::protocol::{StateSnapshot, TaskResult};

use crate::widgets::activity_log::{render_activity_log, ActivityLevel, ActivityLog};
use crate::widgets::flow::{render_flow, FlowWidget};
use crate::widgets::graph::{render_graph, GraphWidget};
use crate::widgets::results::{render_results, ResultViewer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineView {
    Flow,
    Graph,
}

/// All widget state the push-event callbacks act on.
pub struct Workspace {
    pub flow: FlowWidget,
    pub graph: GraphWidget,
    pub results: ResultViewer,
    pub activity_log: ActivityLog,
    pub status: String,
    pub status_level: ActivityLevel,
    pub progress: u8,
    pub input_enabled: bool,
    pub pipeline_view: PipelineView,
}

impl Workspace {
    pub fn new(flow_log_capacity: usize) -> Self {
        Self {
            flow: FlowWidget::new(flow_log_capacity),
            graph: GraphWidget::new(),
            results: ResultViewer::new(),
            activity_log: ActivityLog::new(200),
            status: "connecting".into(),
            status_level: ActivityLevel::Info,
            progress: 0,
            input_enabled: true,
            pipeline_view: PipelineView::Flow,
        }
    }

    pub fn append_activity(&mut self, text: impl Into<String>, level: ActivityLevel) {
        self.activity_log.push(text, level);
    }

    /// Replace the status line and record it in the activity log.
    pub fn set_status(&mut self, text: impl Into<String>, level: ActivityLevel) {
        self.status = text.into();
        self.status_level = level;
        self.activity_log.push(self.status.clone(), level);
    }

    pub fn set_progress(&mut self, pct: u8) {
        self.progress = pct.min(100);
    }

    /// Clear the previous run and lock input while a submission is in flight.
    pub fn begin_submission(&mut self) {
        self.flow.reset_nodes();
        self.graph.reset();
        self.results.reset_results();
        self.input_enabled = false;
        self.set_progress(10);
        self.set_status("submitting problem", ActivityLevel::Info);
    }

    /// The current run failed; input comes back.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.set_progress(0);
        self.input_enabled = true;
        self.set_status(message, ActivityLevel::Error);
    }

    pub fn apply_result(&mut self, result: &TaskResult) {
        self.results.update_parsed_elements(result.parsed_elements.as_ref());
        self.results.update_commands(&result.geogebra_commands);
        self.results.update_explanation(result.explanation.as_deref());
    }

    /// Apply the fields a state snapshot carries, leaving the others alone.
    pub fn apply_snapshot(&mut self, snapshot: &StateSnapshot) {
        if let Some(parsed) = &snapshot.parsed_elements {
            self.results.update_parsed_elements(Some(parsed));
        }
        if let Some(commands) = &snapshot.geogebra_commands {
            self.results.update_commands(commands);
        }
        if let Some(explanation) = &snapshot.explanation {
            self.results.update_explanation(Some(explanation));
        }
    }

    pub fn reset_all(&mut self) {
        self.flow.reset_nodes();
        self.graph.reset();
        self.results.reset_results();
        self.set_progress(0);
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> WorkspaceAction {
        match key.code {
            KeyCode::Tab => {
                self.results.next_tab();
                WorkspaceAction::None
            }
            KeyCode::Char('g') => {
                self.pipeline_view = match self.pipeline_view {
                    PipelineView::Flow => PipelineView::Graph,
                    PipelineView::Graph => PipelineView::Flow,
                };
                WorkspaceAction::None
            }
            KeyCode::Char('s') if self.input_enabled => WorkspaceAction::PromptSolve,
            KeyCode::Char('q') => WorkspaceAction::Quit,
            _ => WorkspaceAction::None,
        }
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect) {
        // Unknown nodes were reported; the table is rebuilt from the
        // catalog on every frame, so the flag only needs clearing.
        self.flow.needs_reflow = false;

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(8),
            ])
            .split(area);

        self.render_status(frame, rows[0]);

        let middle = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(rows[1]);

        match self.pipeline_view {
            PipelineView::Flow => render_flow(frame, middle[0], &self.flow.view()),
            PipelineView::Graph => render_graph(frame, middle[0], &self.graph.view()),
        }
        render_results(frame, middle[1], &self.results);

        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[2]);
        match self.pipeline_view {
            PipelineView::Flow => render_activity_log(frame, bottom[0], "PIPELINE LOG", self.flow.log()),
            PipelineView::Graph => render_activity_log(frame, bottom[0], "GRAPH LOG", self.graph.log()),
        }
        render_activity_log(frame, bottom[1], "ACTIVITY", &self.activity_log);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(ratatui::widgets::BorderType::Rounded)
            .border_style(Style::default().fg(Color::Rgb(60, 60, 60)))
            .padding(Padding::horizontal(1))
            .title(Line::from(vec![
                Span::styled(" ", Style::default()),
                Span::styled("STATUS", Style::default().fg(Color::Cyan).bold()),
                Span::styled(" ", Style::default()),
            ]));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(20), Constraint::Length(30)])
            .split(inner);

        let level_color = match self.status_level {
            ActivityLevel::Info => Color::White,
            other => other.color(),
        };
        frame.render_widget(
            Paragraph::new(Span::styled(self.status.as_str(), Style::default().fg(level_color))),
            cols[0],
        );

        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Rgb(30, 30, 30)))
            .percent(self.progress as u16)
            .label(format!("{}%", self.progress));
        frame.render_widget(gauge, cols[1]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceAction {
    None,
    PromptSolve,
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;
    use geosolve_core::types::NodeStatus;
    use serde_json::json;

    use crate::widgets::results::{PaneContent, ResultTab, WAITING};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_begin_submission_resets_run() {
        let mut ws = Workspace::new(50);
        ws.flow
            .update_node_status("parsing_agent", NodeStatus::Completed, None)
            .unwrap();
        ws.results.update_explanation(Some("old"));

        ws.begin_submission();
        assert_eq!(ws.progress, 10);
        assert!(!ws.input_enabled);
        assert_eq!(ws.flow.status("parsing_agent"), Some(NodeStatus::Pending));
        assert_eq!(ws.results.pane(ResultTab::Explanation), &PaneContent::Placeholder(WAITING));
    }

    #[test]
    fn test_fail_reenables_input() {
        let mut ws = Workspace::new(50);
        ws.begin_submission();
        ws.fail("Server rejected the problem");
        assert!(ws.input_enabled);
        assert_eq!(ws.progress, 0);
        assert_eq!(ws.status_level, ActivityLevel::Error);
        assert_eq!(ws.activity_log.entries().last().unwrap().text, "Server rejected the problem");
    }

    #[test]
    fn test_apply_snapshot_keeps_missing_fields() {
        let mut ws = Workspace::new(50);
        ws.results.update_explanation(Some("kept"));
        let snapshot = StateSnapshot::from_value(&json!({"geogebra_commands": ["A=(0,0)"]}));
        ws.apply_snapshot(&snapshot);
        assert_eq!(ws.results.commands(), ["A=(0,0)".to_string()]);
        assert_eq!(ws.results.explanation(), Some("kept"));
    }

    #[test]
    fn test_keys() {
        let mut ws = Workspace::new(50);
        assert_eq!(ws.handle_key(key(KeyCode::Tab)), WorkspaceAction::None);
        assert_eq!(ws.results.tab(), ResultTab::Commands);
        assert_eq!(ws.handle_key(key(KeyCode::Char('g'))), WorkspaceAction::None);
        assert_eq!(ws.pipeline_view, PipelineView::Graph);
        assert_eq!(ws.handle_key(key(KeyCode::Char('s'))), WorkspaceAction::PromptSolve);
        ws.input_enabled = false;
        assert_eq!(ws.handle_key(key(KeyCode::Char('s'))), WorkspaceAction::None);
        assert_eq!(ws.handle_key(key(KeyCode::Char('q'))), WorkspaceAction::Quit);
    }
}
