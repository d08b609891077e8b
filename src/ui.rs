use chatterm_core::{Message, Role};
use chrono::Local;
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::App;

/// Alternating runs of whitespace and non-whitespace, so that wrapping can
/// keep indentation and repeated spaces as typed.
fn whitespace_runs(text: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut in_space = None;
    for (i, c) in text.char_indices() {
        let space = c.is_whitespace();
        if in_space.is_some_and(|prev| prev != space) {
            runs.push(&text[start..i]);
            start = i;
        }
        in_space = Some(space);
    }
    if start < text.len() {
        runs.push(&text[start..]);
    }
    runs
}

/// Wrap one line of text to `width` terminal cells.
///
/// Breaks at whitespace where possible. A word wider than the whole line is
/// split across rows so none of it falls off screen.
fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;

    for run in whitespace_runs(text) {
        let run_width = run.width();
        if current_width + run_width <= width {
            current.push_str(run);
            current_width += run_width;
            continue;
        }

        if run.starts_with(char::is_whitespace) {
            // The break replaces the whitespace
            if current_width > 0 {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            continue;
        }

        if run_width <= width {
            let kept = current.trim_end();
            if !kept.is_empty() {
                lines.push(kept.to_string());
            }
            current = run.to_string();
            current_width = run_width;
            continue;
        }

        for ch in run.chars() {
            let ch_width = ch.width().unwrap_or(0);
            if current_width + ch_width > width && current_width > 0 {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            current.push(ch);
            current_width += ch_width;
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }

    lines
}

/// The part of `line` between display columns `skip` and `skip + take`.
/// A wide character cut by the left edge is replaced with spaces.
fn cell_window(line: &str, skip: usize, take: usize) -> String {
    let end = skip + take;
    let mut out = String::new();
    let mut col = 0;
    for ch in line.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if col >= skip && col + ch_width <= end {
            out.push(ch);
        } else if col < skip && col + ch_width > skip {
            out.push_str(&" ".repeat((col + ch_width - skip).min(take)));
        }
        col += ch_width;
        if col >= end {
            break;
        }
    }
    out
}

fn sender_line(role: Role, stamp: Option<String>) -> Line<'static> {
    let (label, color) = match role {
        Role::User => ("👤 You", Color::Cyan),
        Role::Assistant => ("🤖 Bot", Color::Yellow),
    };
    let mut spans = vec![Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )];
    if let Some(stamp) = stamp {
        spans.push(Span::styled(format!("  {}", stamp), Style::default().fg(Color::DarkGray)));
    }
    Line::from(spans)
}

fn message_lines(message: &Message, width: usize) -> Vec<Line<'static>> {
    let stamp = message.timestamp().with_timezone(&Local).format("%H:%M").to_string();
    let mut lines = vec![sender_line(message.role(), Some(stamp))];

    let text_style = match message.role() {
        Role::User => Style::default().fg(Color::Cyan),
        Role::Assistant => Style::default(),
    };
    for raw in message.text().lines() {
        for wrapped in wrap_text_to_width(raw, width) {
            lines.push(Line::from(Span::styled(wrapped, text_style)));
        }
    }
    lines.push(Line::default());
    lines
}

/// Fully wrapped chat transcript, one entry per screen row.
pub fn chat_lines(app: &App, width: usize) -> Vec<Line<'static>> {
    if app.log.is_empty() && !app.loading {
        return vec![Line::from(Span::styled(
            "Say hello to start the conversation...",
            Style::default().fg(Color::DarkGray),
        ))];
    }

    let mut lines: Vec<Line<'static>> = app
        .log
        .iter()
        .flat_map(|message| message_lines(message, width))
        .collect();

    if app.loading {
        lines.push(sender_line(Role::Assistant, None));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(app.input_rows() + 2),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (status, status_color) = match app.backend_healthy {
        Some(true) => ("● connected", Color::Green),
        Some(false) => ("● offline", Color::Red),
        None => ("● checking", Color::Gray),
    };

    let title = Line::from(vec![
        Span::styled(" chatterm ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
        Span::raw("  "),
        Span::styled(app.base_url.clone(), Style::default().fg(Color::White)),
        Span::raw(" "),
        Span::styled(status, Style::default().fg(status_color)),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size minus borders
    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2);

    let lines = chat_lines(app, inner_width);
    let total = lines.len().min(u16::MAX as usize) as u16;
    app.update_chat_viewport(inner_height, total);

    let title = match app.log.last_model() {
        Some(model) => format!(" Chat: {} ", model),
        None => " Chat ".to_string(),
    };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let enabled = app.send_enabled();
    let (border_color, title) = if enabled {
        (Color::Yellow, " Message (Enter to send, Alt+Enter for newline) ")
    } else {
        (Color::DarkGray, " Waiting for reply... ")
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let inner_width = area.width.saturating_sub(2) as usize;
    let rows = area.height.saturating_sub(2) as usize;
    let (cursor_line, cursor_col) = app.cursor_line_col();

    // Keep the cursor row and column visible
    let v_offset = if rows == 0 {
        0
    } else {
        cursor_line.saturating_sub(rows - 1)
    };
    let h_offset = if inner_width == 0 {
        0
    } else if cursor_col >= inner_width {
        cursor_col - inner_width + 1
    } else {
        0
    };

    let visible: Vec<Line> = app
        .input
        .split('\n')
        .skip(v_offset)
        .take(rows)
        .map(|line| Line::from(cell_window(line, h_offset, inner_width)))
        .collect();

    // Use cyan text to match the "You" style - visible in both light and dark terminals
    let input = Paragraph::new(Text::from(visible))
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if rows > 0 {
        frame.set_cursor_position((
            area.x + 1 + (cursor_col - h_offset) as u16,
            area.y + 1 + (cursor_line - v_offset) as u16,
        ));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = if app.loading {
        (" WAITING ", Style::default().bg(Color::Yellow).fg(Color::Black))
    } else {
        (" CHAT ", Style::default().bg(Color::Blue).fg(Color::White))
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let disabled_style = Style::default().bg(Color::Black).fg(Color::DarkGray);

    let send_style = if app.send_enabled() { label_style } else { disabled_style };

    let mut hints = vec![
        Span::styled(" Enter ", key_style),
        Span::styled(" send ", send_style),
        Span::styled(" Alt+Enter ", key_style),
        Span::styled(" newline ", label_style),
        Span::styled(" ↑/↓ ", key_style),
        Span::styled(" scroll ", label_style),
    ];
    if app.loading {
        hints.extend(vec![
            Span::styled(" Esc ", key_style),
            Span::styled(" stop waiting ", label_style),
        ]);
    }
    hints.extend(vec![
        Span::styled(" Ctrl+C ", key_style),
        Span::styled(" quit ", label_style),
    ]);
    if let Some(note) = &app.status_note {
        let note_style = Style::default().bg(Color::Black).fg(Color::Yellow);
        hints.push(Span::styled(format!("  {}", note), note_style));
    }

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}
