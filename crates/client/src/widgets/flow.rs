//! Pipeline flow list: one status cell per pipeline node plus a log.

use std::collections::HashMap;

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Padding, Row, Table};
use thiserror::Error;
use tracing::warn;

use geosolve_core::pipeline::{self, NodeGroup, NODES};
use geosolve_core::types::NodeStatus;

use crate::widgets::activity_log::{ActivityLevel, ActivityLog};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown pipeline node: {0}")]
pub struct UnknownNode(pub String);

pub struct FlowWidget {
    statuses: HashMap<&'static str, NodeStatus>,
    active: Option<&'static str>,
    log: ActivityLog,
    /// Set when an update named a node outside the catalog. The renderer
    /// rebuilds its layout from scratch and clears the flag.
    pub needs_reflow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRow {
    pub id: &'static str,
    pub name: &'static str,
    pub group: NodeGroup,
    pub status: NodeStatus,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowView {
    pub rows: Vec<FlowRow>,
}

impl FlowWidget {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            statuses: NODES.iter().map(|n| (n.id, NodeStatus::Pending)).collect(),
            active: None,
            log: ActivityLog::new(log_capacity),
            needs_reflow: false,
        }
    }

    /// Set one node's status and log the change.
    ///
    /// Running makes the node the single active node. Completing the active
    /// node leaves no node active.
    pub fn update_node_status(
        &mut self,
        id: &str,
        status: NodeStatus,
        message: Option<&str>,
    ) -> Result<(), UnknownNode> {
        let node = match pipeline::node_by_id(id) {
            Some(node) => node,
            None => {
                warn!("Flow update for unknown node {}, reflowing", id);
                self.needs_reflow = true;
                return Err(UnknownNode(id.to_string()));
            }
        };

        self.statuses.insert(node.id, status);
        match status {
            NodeStatus::Running => self.active = Some(node.id),
            NodeStatus::Completed | NodeStatus::Error | NodeStatus::Pending => {
                if self.active == Some(node.id) {
                    self.active = None;
                }
            }
        }

        let message = message.unwrap_or(match status {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "started",
            NodeStatus::Completed => "completed",
            NodeStatus::Error => "error",
        });
        let (text, level) = match status {
            NodeStatus::Completed => (
                format!("done: {}: {}", node.name, message),
                ActivityLevel::Success,
            ),
            NodeStatus::Error => (
                format!("error: {}: {}", node.name, message),
                ActivityLevel::Error,
            ),
            _ => (format!("{}: {}", node.name, message), ActivityLevel::Info),
        };
        self.log.push(text, level);
        Ok(())
    }

    pub fn reset_nodes(&mut self) {
        for status in self.statuses.values_mut() {
            *status = NodeStatus::Pending;
        }
        self.active = None;
        self.log.clear();
        self.needs_reflow = false;
    }

    pub fn status(&self, id: &str) -> Option<NodeStatus> {
        self.statuses.get(id).copied()
    }

    pub fn active(&self) -> Option<&'static str> {
        self.active
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn view(&self) -> FlowView {
        FlowView {
            rows: NODES
                .iter()
                .map(|n| FlowRow {
                    id: n.id,
                    name: n.name,
                    group: n.group,
                    status: self.statuses.get(n.id).copied().unwrap_or_default(),
                    is_active: self.active == Some(n.id),
                })
                .collect(),
        }
    }
}

fn status_symbol(status: NodeStatus, is_active: bool) -> (&'static str, Color) {
    match status {
        NodeStatus::Running if is_active => ("▶", Color::Yellow),
        NodeStatus::Running => ("◉", Color::Blue),
        NodeStatus::Completed => ("✓", Color::Green),
        NodeStatus::Error => ("✗", Color::Red),
        NodeStatus::Pending => ("◦", Color::DarkGray),
    }
}

pub fn render_flow(frame: &mut Frame, area: Rect, view: &FlowView) {
    let done = view
        .rows
        .iter()
        .filter(|r| r.status == NodeStatus::Completed)
        .count();

    let rows: Vec<Row> = view
        .rows
        .iter()
        .map(|r| {
            let (sym, color) = status_symbol(r.status, r.is_active);
            let name_style = if r.is_active {
                Style::default().fg(Color::White).bold()
            } else {
                Style::default().fg(Color::Gray)
            };
            Row::new(vec![
                Cell::from(Span::styled(sym, Style::default().fg(color))),
                Cell::from(Span::styled(r.name, name_style)),
                Cell::from(Span::styled(
                    r.group.to_string(),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(2),
        Constraint::Min(16),
        Constraint::Length(12),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(ratatui::widgets::BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(60, 60, 60)))
        .padding(Padding::horizontal(1))
        .title(Line::from(vec![
            Span::styled(" ", Style::default()),
            Span::styled("PIPELINE", Style::default().fg(Color::Cyan).bold()),
            Span::styled(
                format!(" {}/{} ", done, view.rows.len()),
                Style::default().fg(Color::DarkGray),
            ),
        ]));

    frame.render_widget(Table::new(rows, widths).block(block), area);
}
