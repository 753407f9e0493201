use std::collections::VecDeque;

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Padding, Paragraph, Wrap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl ActivityLevel {
    pub fn color(&self) -> Color {
        match self {
            Self::Info => Color::DarkGray,
            Self::Success => Color::Green,
            Self::Warning => Color::Yellow,
            Self::Error => Color::Red,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub text: String,
    pub level: ActivityLevel,
}

/// Ring-buffer log with fixed capacity. The oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, text: impl Into<String>, level: ActivityLevel) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ActivityEntry {
            text: text.into(),
            level,
        });
    }

    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &ActivityEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub fn render_activity_log(frame: &mut Frame, area: Rect, title: &str, log: &ActivityLog) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(ratatui::widgets::BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(60, 60, 60)))
        .padding(Padding::new(1, 1, 0, 0))
        .title(Line::from(vec![
            Span::styled(" ", Style::default()),
            Span::styled(title.to_string(), Style::default().fg(Color::Yellow).bold()),
            Span::styled(
                format!(" {} ", log.len()),
                Style::default().fg(Color::DarkGray),
            ),
        ]));

    let inner = block.inner(area);
    let max_width = inner.width as usize;
    let max_height = inner.height as usize;

    if max_width == 0 || max_height == 0 {
        frame.render_widget(block, area);
        return;
    }

    // Embedded newlines become separate lines so the wrap estimate holds.
    let mut lines: Vec<Line> = Vec::new();
    for entry in log.entries() {
        let style = Style::default().fg(entry.level.color());
        for part in entry.text.split('\n') {
            lines.push(Line::from(Span::styled(part.to_string(), style)));
        }
    }

    // Word wrapping can produce more rows than the character estimate, so
    // pad each wrapped line by one.
    let total_visual: usize = lines
        .iter()
        .map(|l| {
            let w = l.width();
            if w <= max_width {
                1
            } else {
                w.div_ceil(max_width) + 1
            }
        })
        .sum();

    let scroll_y = total_visual.saturating_sub(max_height) as u16;

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll_y, 0));
    frame.render_widget(paragraph, area);
}
