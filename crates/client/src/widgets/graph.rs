use std::collections::BTreeSet;

use ratatui::prelude::*;
use ratatui::widgets::canvas::{Canvas, Circle, Line};
use ratatui::widgets::{Block, Borders};
use tracing::debug;

use geosolve_core::pipeline::{self, Edge, NodeGroup, EDGES, NODES};
use geosolve_core::types::GraphNodeState;

use crate::widgets::activity_log::{ActivityLevel, ActivityLog};

pub const GRAPH_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStyle {
    /// Both ends active.
    Emphasized,
    /// Completed node feeding an active one.
    Highlighted,
    /// Both ends completed.
    HighlightedThin,
    /// Either end failed.
    ErrorDashed,
    Neutral,
}

impl EdgeStyle {
    pub fn color(&self) -> Color {
        match self {
            Self::Emphasized => Color::Rgb(76, 175, 80),
            Self::Highlighted | Self::HighlightedThin => Color::Rgb(33, 150, 243),
            Self::ErrorDashed => Color::Rgb(244, 67, 54),
            Self::Neutral => Color::Rgb(170, 170, 170),
        }
    }

    pub fn width(&self) -> u8 {
        match self {
            Self::Emphasized | Self::Highlighted => 3,
            Self::HighlightedThin | Self::ErrorDashed | Self::Neutral => 2,
        }
    }

    pub fn dashed(&self) -> bool {
        matches!(self, Self::ErrorDashed)
    }
}

/// Pipeline diagram state: every node is in at most one of the three sets.
pub struct GraphWidget {
    active: BTreeSet<&'static str>,
    completed: BTreeSet<&'static str>,
    error: BTreeSet<&'static str>,
    log: ActivityLog,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNodeView {
    pub id: &'static str,
    pub name: &'static str,
    pub column: usize,
    pub row: usize,
    pub state: Option<GraphNodeState>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphView {
    pub nodes: Vec<GraphNodeView>,
    pub edges: Vec<(Edge, EdgeStyle)>,
    pub rows: usize,
}

impl Default for GraphWidget {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphWidget {
    pub fn new() -> Self {
        Self {
            active: BTreeSet::new(),
            completed: BTreeSet::new(),
            error: BTreeSet::new(),
            log: ActivityLog::new(GRAPH_LOG_CAPACITY),
        }
    }

    /// Move a node into the set for `state`. Unknown nodes are ignored.
    pub fn update_node_status(&mut self, id: &str, state: GraphNodeState, message: Option<&str>) {
        let node = match pipeline::node_by_id(id) {
            Some(node) => node,
            None => {
                debug!("Graph ignoring unknown node {}", id);
                return;
            }
        };

        self.active.remove(node.id);
        self.completed.remove(node.id);
        self.error.remove(node.id);

        let (set, level, default_message) = match state {
            GraphNodeState::Active => (&mut self.active, ActivityLevel::Info, "started"),
            GraphNodeState::Completed => {
                (&mut self.completed, ActivityLevel::Success, "completed")
            }
            GraphNodeState::Error => (&mut self.error, ActivityLevel::Error, "error"),
        };
        set.insert(node.id);

        self.log.push(
            format!("{}: {}", node.name, message.unwrap_or(default_message)),
            level,
        );
    }

    pub fn state(&self, id: &str) -> Option<GraphNodeState> {
        if self.active.contains(id) {
            Some(GraphNodeState::Active)
        } else if self.completed.contains(id) {
            Some(GraphNodeState::Completed)
        } else if self.error.contains(id) {
            Some(GraphNodeState::Error)
        } else {
            None
        }
    }

    /// Style of the edge `from -> to`, first matching rule wins.
    pub fn edge_style(&self, from: &str, to: &str) -> EdgeStyle {
        if self.active.contains(from) && self.active.contains(to) {
            EdgeStyle::Emphasized
        } else if self.completed.contains(from) && self.active.contains(to) {
            EdgeStyle::Highlighted
        } else if self.completed.contains(from) && self.completed.contains(to) {
            EdgeStyle::HighlightedThin
        } else if self.error.contains(from) || self.error.contains(to) {
            EdgeStyle::ErrorDashed
        } else {
            EdgeStyle::Neutral
        }
    }

    pub fn reset(&mut self) {
        self.active.clear();
        self.completed.clear();
        self.error.clear();
        self.log.clear();
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn view(&self) -> GraphView {
        let mut nodes = Vec::with_capacity(NODES.len());
        let mut rows = 0;
        for group in NodeGroup::ALL {
            for (row, node) in pipeline::group_nodes(group).enumerate() {
                nodes.push(GraphNodeView {
                    id: node.id,
                    name: node.name,
                    column: group.column(),
                    row,
                    state: self.state(node.id),
                });
                rows = rows.max(row + 1);
            }
        }

        GraphView {
            nodes,
            edges: EDGES
                .iter()
                .map(|e| (*e, self.edge_style(e.from, e.to)))
                .collect(),
            rows,
        }
    }
}

fn node_color(state: Option<GraphNodeState>) -> Color {
    match state {
        Some(GraphNodeState::Active) => EdgeStyle::Emphasized.color(),
        Some(GraphNodeState::Completed) => EdgeStyle::Highlighted.color(),
        Some(GraphNodeState::Error) => EdgeStyle::ErrorDashed.color(),
        None => Color::DarkGray,
    }
}

pub fn render_graph(frame: &mut Frame, area: Rect, view: &GraphView) {
    let w = area.width as f64;
    let h = (area.height as f64) * 2.0; // braille has 2:1 aspect ratio
    let columns = NodeGroup::ALL.len() as f64;
    let rows = view.rows.max(1) as f64;

    let position = |column: usize, row: usize| -> (f64, f64) {
        let x = (column as f64 + 0.5) * w / columns;
        let y = h - (row as f64 + 1.0) * h / (rows + 1.0);
        (x, y)
    };

    let canvas = Canvas::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(ratatui::widgets::BorderType::Rounded)
                .border_style(Style::default().fg(Color::Rgb(60, 60, 60)))
                .title(ratatui::text::Line::from(vec![
                    Span::styled(" ", Style::default()),
                    Span::styled("GRAPH", Style::default().fg(Color::Cyan).bold()),
                    Span::styled(" ", Style::default()),
                ])),
        )
        .marker(symbols::Marker::Braille)
        .x_bounds([0.0, w])
        .y_bounds([0.0, h])
        .paint(|ctx| {
            let find = |id: &str| view.nodes.iter().find(|n| n.id == id);

            for (edge, style) in &view.edges {
                let (Some(from), Some(to)) = (find(edge.from), find(edge.to)) else {
                    continue;
                };
                let (x1, y1) = position(from.column, from.row);
                let (x2, y2) = position(to.column, to.row);
                let color = style.color();

                if style.dashed() {
                    // Alternate drawn and skipped segments along the edge
                    const DASHES: usize = 8;
                    for i in (0..DASHES).step_by(2) {
                        let t1 = i as f64 / DASHES as f64;
                        let t2 = (i + 1) as f64 / DASHES as f64;
                        ctx.draw(&Line {
                            x1: x1 + (x2 - x1) * t1,
                            y1: y1 + (y2 - y1) * t1,
                            x2: x1 + (x2 - x1) * t2,
                            y2: y1 + (y2 - y1) * t2,
                            color,
                        });
                    }
                } else {
                    ctx.draw(&Line { x1, y1, x2, y2, color });
                    // Wider edges get a parallel stroke
                    if style.width() >= 3 {
                        ctx.draw(&Line { x1, y1: y1 + 0.5, x2, y2: y2 + 0.5, color });
                    }
                }
            }

            for node in &view.nodes {
                let (x, y) = position(node.column, node.row);
                let color = node_color(node.state);
                ctx.draw(&Circle {
                    x,
                    y,
                    radius: 1.5,
                    color,
                });
                let label = short_label(node.name);
                ctx.print(x - (label.len() as f64 / 2.0), y - 2.5, label.fg(color));
            }
        });

    frame.render_widget(canvas, area);
}

/// First word of the display name, enough to tell nodes apart in a column.
fn short_label(name: &str) -> String {
    name.split_whitespace().next().unwrap_or(name).to_string()
}
