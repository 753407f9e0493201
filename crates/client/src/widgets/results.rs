//! Tabbed result viewer: parsed elements, GeoGebra commands, explanation.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Padding, Paragraph, Tabs, Wrap};
use serde_json::{Map, Value};

pub const WAITING: &str = "Waiting for results...";
pub const NO_PARSED_ELEMENTS: &str = "No parsed elements.";
pub const NO_COMMANDS_YET: &str = "No commands yet.";
pub const NO_VALID_COMMANDS: &str = "No valid GeoGebra commands.";
pub const NO_EXPLANATION: &str = "No explanation available.";

const GEOGEBRA_BASE: &str = "https://www.geogebra.org/classic?command=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultTab {
    Parsed,
    Commands,
    Explanation,
}

impl ResultTab {
    pub const ALL: [ResultTab; 3] = [ResultTab::Parsed, ResultTab::Commands, ResultTab::Explanation];

    pub fn title(&self) -> &'static str {
        match self {
            Self::Parsed => "Parsed elements",
            Self::Commands => "Commands",
            Self::Explanation => "Explanation",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Self::Parsed => Self::Commands,
            Self::Commands => Self::Explanation,
            Self::Explanation => Self::Parsed,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "parsed" | "elements" => Some(Self::Parsed),
            "commands" | "cmd" => Some(Self::Commands),
            "explanation" | "explain" => Some(Self::Explanation),
            _ => None,
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::Parsed => 0,
            Self::Commands => 1,
            Self::Explanation => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneContent {
    Placeholder(&'static str),
    /// Humanized key with its formatted value lines.
    Elements(Vec<(String, Vec<String>)>),
    Commands(Vec<String>),
    Text(String),
}

pub struct ResultViewer {
    tab: ResultTab,
    parsed: PaneContent,
    commands: PaneContent,
    explanation: PaneContent,
}

impl Default for ResultViewer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultViewer {
    pub fn new() -> Self {
        Self {
            tab: ResultTab::Parsed,
            parsed: PaneContent::Placeholder(WAITING),
            commands: PaneContent::Placeholder(WAITING),
            explanation: PaneContent::Placeholder(WAITING),
        }
    }

    pub fn tab(&self) -> ResultTab {
        self.tab
    }

    pub fn show_tab(&mut self, tab: ResultTab) {
        self.tab = tab;
    }

    pub fn next_tab(&mut self) {
        self.tab = self.tab.next();
    }

    pub fn pane(&self, tab: ResultTab) -> &PaneContent {
        match tab {
            ResultTab::Parsed => &self.parsed,
            ResultTab::Commands => &self.commands,
            ResultTab::Explanation => &self.explanation,
        }
    }

    pub fn update_parsed_elements(&mut self, elements: Option<&Map<String, Value>>) {
        self.parsed = match elements {
            Some(map) if !map.is_empty() => PaneContent::Elements(
                map.iter()
                    .map(|(k, v)| (humanize_key(k), format_value(v)))
                    .collect(),
            ),
            _ => PaneContent::Placeholder(NO_PARSED_ELEMENTS),
        };
    }

    pub fn update_commands(&mut self, raw: &[Value]) {
        if raw.is_empty() {
            self.commands = PaneContent::Placeholder(NO_COMMANDS_YET);
            return;
        }
        let filtered = filter_geogebra_commands(raw);
        self.commands = if filtered.is_empty() {
            PaneContent::Placeholder(NO_VALID_COMMANDS)
        } else {
            PaneContent::Commands(filtered)
        };
    }

    pub fn update_explanation(&mut self, text: Option<&str>) {
        self.explanation = match text.map(str::trim) {
            Some(t) if !t.is_empty() => PaneContent::Text(t.to_string()),
            _ => PaneContent::Placeholder(NO_EXPLANATION),
        };
    }

    pub fn reset_results(&mut self) {
        self.parsed = PaneContent::Placeholder(WAITING);
        self.commands = PaneContent::Placeholder(WAITING);
        self.explanation = PaneContent::Placeholder(WAITING);
    }

    /// Filtered command list currently shown, empty when a placeholder is up.
    pub fn commands(&self) -> &[String] {
        match &self.commands {
            PaneContent::Commands(list) => list,
            _ => &[],
        }
    }

    pub fn explanation(&self) -> Option<&str> {
        match &self.explanation {
            PaneContent::Text(t) => Some(t),
            _ => None,
        }
    }
}

pub fn humanize_key(key: &str) -> String {
    let known = match key {
        "points" => Some("Points"),
        "lines" => Some("Lines"),
        "circles" => Some("Circles"),
        "triangles" => Some("Triangles"),
        "angles" => Some("Angles"),
        "lengths" => Some("Lengths"),
        "areas" => Some("Areas"),
        "known_facts" => Some("Known facts"),
        "goal" => Some("Goal"),
        "constraints" => Some("Constraints"),
        _ => None,
    };
    if let Some(name) = known {
        return name.to_string();
    }

    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Render a JSON value as display lines. Arrays give one line per item,
/// objects one `key: value` line per entry, nested values are indented.
pub fn format_value(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(format_inline_or_nested).collect(),
        Value::Object(map) => map
            .iter()
            .flat_map(|(k, v)| match v {
                Value::Array(_) | Value::Object(_) => {
                    let mut lines = vec![format!("{}:", k)];
                    lines.extend(format_value(v).into_iter().map(|l| format!("  {}", l)));
                    lines
                }
                _ => vec![format!("{}: {}", k, scalar(v))],
            })
            .collect(),
        other => vec![scalar(other)],
    }
}

fn format_inline_or_nested(item: &Value) -> Vec<String> {
    match item {
        Value::Object(map) if map.len() > 1 => {
            let mut lines = format_value(item);
            if let Some(first) = lines.first_mut() {
                *first = format!("- {}", first);
            }
            for line in lines.iter_mut().skip(1) {
                *line = format!("  {}", line);
            }
            lines
        }
        _ => format_value(item),
    }
}

fn scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn clean_command(raw: &Value) -> String {
    let text = match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut s = text.trim();

    if s.len() >= 3 && s.starts_with('"') && s.ends_with("\",") {
        s = &s[1..s.len() - 2];
    } else if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s = &s[1..s.len() - 1];
    }
    let s = s.trim();
    s.strip_suffix(',').unwrap_or(s).trim().to_string()
}

fn is_bare_identifier(s: &str) -> bool {
    s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Clean raw command strings from the pipeline and drop the JSON fragments
/// and section markers that leak into the list.
pub fn filter_geogebra_commands(raw: &[Value]) -> Vec<String> {
    raw.iter()
        .map(clean_command)
        .filter(|cmd| {
            !(cmd.is_empty()
                || cmd == "commands"
                || cmd == "["
                || cmd == "]"
                || cmd.starts_with("analysis")
                || cmd.starts_with("fixed_issues")
                || is_bare_identifier(cmd))
        })
        .collect()
}

pub fn geogebra_url(commands: &[String]) -> String {
    let joined = commands.join("\n");
    let encoded: String = url::form_urlencoded::byte_serialize(joined.as_bytes()).collect();
    format!("{}{}", GEOGEBRA_BASE, encoded)
}

fn pane_lines(content: &PaneContent) -> Vec<Line<'static>> {
    match content {
        PaneContent::Placeholder(text) => vec![Line::from(Span::styled(
            *text,
            Style::default().fg(Color::DarkGray).italic(),
        ))],
        PaneContent::Elements(entries) => {
            let mut lines = Vec::new();
            for (key, values) in entries {
                lines.push(Line::from(Span::styled(
                    key.clone(),
                    Style::default().fg(Color::Cyan).bold(),
                )));
                for v in values {
                    lines.push(Line::from(format!("  {}", v)));
                }
            }
            lines
        }
        PaneContent::Commands(list) => list
            .iter()
            .enumerate()
            .map(|(i, cmd)| {
                Line::from(vec![
                    Span::styled(format!("{:>3}. ", i + 1), Style::default().fg(Color::DarkGray)),
                    Span::styled(cmd.clone(), Style::default().fg(Color::White)),
                ])
            })
            .collect(),
        PaneContent::Text(text) => text.lines().map(|l| Line::from(l.to_string())).collect(),
    }
}

pub fn render_results(frame: &mut Frame, area: Rect, viewer: &ResultViewer) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(ratatui::widgets::BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(60, 60, 60)))
        .padding(Padding::horizontal(1))
        .title(Line::from(vec![
            Span::styled(" ", Style::default()),
            Span::styled("RESULTS", Style::default().fg(Color::Green).bold()),
            Span::styled(
                format!(" {} ", viewer.commands().len()),
                Style::default().fg(Color::DarkGray),
            ),
        ]));

    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.height < 2 {
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(inner);

    let tabs = Tabs::new(ResultTab::ALL.iter().map(|t| t.title()))
        .select(viewer.tab().index())
        .style(Style::default().fg(Color::DarkGray))
        .highlight_style(Style::default().fg(Color::Yellow).bold())
        .divider(Span::styled("│", Style::default().fg(Color::Rgb(60, 60, 60))));
    frame.render_widget(tabs, chunks[0]);

    let body = Paragraph::new(pane_lines(viewer.pane(viewer.tab()))).wrap(Wrap { trim: false });
    frame.render_widget(body, chunks[1]);
}
