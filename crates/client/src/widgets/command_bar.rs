use ratatui::prelude::*;
use ratatui::widgets::{Block, BorderType, Borders, Clear, Paragraph};

use crate::command::{CommandBarState, Completion};

const BAR_BG: Color = Color::Rgb(25, 25, 25);
const IDLE_BG: Color = Color::Rgb(20, 20, 20);
const KEY: Color = Color::Magenta;

/// Bottom bar. While a submission is in flight the idle hint says so.
pub fn render_command_bar(frame: &mut Frame, area: Rect, state: &CommandBarState, input_enabled: bool) {
    if state.active {
        let input_line = Line::from(vec![
            Span::styled(":", Style::default().fg(KEY).bold()),
            Span::styled(state.input.as_str(), Style::default().fg(Color::White)),
        ]);
        frame.render_widget(Paragraph::new(input_line).style(Style::default().bg(BAR_BG)), area);
        frame.set_cursor_position((area.x + 1 + state.cursor_pos as u16, area.y));

        if let Some(completion) = &state.completion {
            render_completion(frame, area, completion);
        }
        return;
    }

    let hint = if input_enabled {
        let mut spans = vec![Span::raw("  ")];
        for (key, label) in [(":", "commands"), ("s", "solve"), ("Tab", "next pane"), ("g", "flow/graph"), ("q", "quit")] {
            spans.push(Span::styled(key, Style::default().fg(KEY).bold()));
            spans.push(Span::styled(format!(" {}  ", label), Style::default().fg(Color::DarkGray)));
        }
        Line::from(spans)
    } else {
        Line::from(vec![
            Span::raw("  "),
            Span::styled("solving", Style::default().fg(Color::Yellow).bold()),
            Span::styled(" input disabled until the task finishes", Style::default().fg(Color::DarkGray)),
        ])
    };
    frame.render_widget(Paragraph::new(hint).style(Style::default().bg(IDLE_BG)), area);
}

/// Candidate list drawn just above the bar; the selected entry shows its description.
fn render_completion(frame: &mut Frame, bar: Rect, completion: &Completion) {
    let prefix = completion.parent.map(|p| format!("{} ", p)).unwrap_or_else(|| ":".into());
    let lines: Vec<Line> = completion
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let selected = i == completion.selected;
            let name_style = if selected {
                Style::default().fg(Color::Cyan).bold()
            } else {
                Style::default().fg(Color::White)
            };
            let mut spans = vec![Span::styled(format!(" {}{}", prefix, item.name), name_style)];
            if !item.args.is_empty() {
                spans.push(Span::styled(format!(" {}", item.args), Style::default().fg(Color::DarkGray)));
            }
            if selected {
                spans.push(Span::styled(
                    format!("  {}", item.about),
                    Style::default().fg(Color::Rgb(120, 150, 160)),
                ));
            }
            Line::from(spans)
        })
        .collect();

    let content_width = lines.iter().map(Line::width).max().unwrap_or(0);
    let width = (content_width as u16 + 3).min(bar.width);
    let height = lines.len() as u16 + 2;
    let popup = Rect {
        x: bar.x,
        y: bar.y.saturating_sub(height),
        width,
        height,
    };

    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(Color::Rgb(60, 60, 60)))
                .style(Style::default().bg(Color::Rgb(30, 30, 30))),
        ),
        popup,
    );
}
