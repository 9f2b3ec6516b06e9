use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use nhakhoa_core::{Navigation, NoticeLevel, Speaker};
use crate::app::{App, InputMode, Screen};

const MAX_INPUT_LINES: u16 = 6;

/// One line of assistant text in `base` style, with `**...**` runs in bold.
/// An unmatched `**` is shown as typed.
fn bot_line(text: &str, base: Style) -> Line<'static> {
    let runs: Vec<&str> = text.split("**").collect();
    // with an odd number of markers the last run has no closing marker
    let closed = if runs.len() % 2 == 0 { runs.len() - 1 } else { runs.len() };

    let spans: Vec<Span<'static>> = runs
        .iter()
        .enumerate()
        .filter_map(|(i, run)| {
            if i >= closed {
                Some(Span::styled(format!("**{run}"), base))
            } else if run.is_empty() {
                None
            } else if i % 2 == 1 {
                Some(Span::styled(run.to_string(), base.add_modifier(Modifier::BOLD)))
            } else {
                Some(Span::styled(run.to_string(), base))
            }
        })
        .collect();
    Line::from(spans)
}

fn speaker_label(speaker: Speaker) -> Line<'static> {
    let (label, color) = match speaker {
        Speaker::User => ("Bạn:", Color::Cyan),
        Speaker::Bot => ("Trợ lý:", Color::Yellow),
    };
    Line::from(Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)))
}

/// Row and column (in chars) of the cursor inside a multi-line input
fn cursor_row_col(input: &str, cursor: usize) -> (usize, usize) {
    let before: String = input.chars().take(cursor).collect();
    let row = before.matches('\n').count();
    let col = before
        .rsplit('\n')
        .next()
        .map(|line| line.chars().count())
        .unwrap_or(0);
    (row, col)
}

fn input_height(input: &str) -> u16 {
    let lines = input.split('\n').count() as u16;
    lines.clamp(1, MAX_INPUT_LINES) + 2 // +2 for borders
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen.clone() {
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::Handoff(target) => render_handoff_screen(app, &target, frame, body_area),
    }

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let endpoint = Span::styled(
        format!(" {} ", app.config.api_base_url),
        Style::default().fg(Color::Gray),
    );

    let title = Line::from(vec![
        Span::styled(" Nha Khoa · Trợ lý đặt lịch ", Style::default().fg(Color::Cyan).bold()),
        endpoint,
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Latest toast takes over the footer while it lasts
    if let Some(toast) = app.toasts.last() {
        let style = match toast.notice.level {
            NoticeLevel::Success => Style::default().bg(Color::Green).fg(Color::Black),
            NoticeLevel::Error => Style::default().bg(Color::Red).fg(Color::White),
        };
        let footer = Paragraph::new(format!(" {} ", toast.notice.text)).style(style.bold());
        frame.render_widget(footer, area);
        return;
    }

    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match (&app.screen, app.input_mode) {
        (Screen::Handoff(_), _) => " DONE ",
        (Screen::Chat, InputMode::Normal) => " VIEW ",
        (Screen::Chat, InputMode::Editing) => " CHAT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match (&app.screen, app.input_mode) {
        (Screen::Handoff(_), _) => vec![
            Span::styled(" c ", key_style),
            Span::styled(" copy link ", label_style),
            Span::styled(" n ", key_style),
            Span::styled(" new chat ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        (Screen::Chat, InputMode::Editing) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Shift+Enter ", key_style),
            Span::styled(" newline ", label_style),
            Span::styled(" Ctrl+N ", key_style),
            Span::styled(" new chat ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" stop typing ", label_style),
        ],
        (Screen::Chat, InputMode::Normal) => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" n ", key_style),
            Span::styled(" new chat ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
    };

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

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let banner_height = if app.conversation.reservation().is_active() { 1 } else { 0 };

    let [banner_area, chat_area, input_area] = Layout::vertical([
        Constraint::Length(banner_height),
        Constraint::Min(0),
        Constraint::Length(input_height(&app.input)),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    if banner_height > 0 {
        let banner = Paragraph::new(Line::from(vec![
            Span::styled(" Đang giữ chỗ ", Style::default().bg(Color::Magenta).fg(Color::White).bold()),
            Span::styled(
                format!(" còn {} ", app.conversation.reservation().display()),
                Style::default().fg(Color::Magenta).bold(),
            ),
            Span::styled(
                "hoàn tất đặt lịch trước khi hết giờ",
                Style::default().fg(Color::Gray),
            ),
        ]));
        frame.render_widget(banner, banner_area);
    }

    render_transcript(app, frame, chat_area);
    render_input(app, frame, input_area);
}

fn render_transcript(app: &App, frame: &mut Frame, area: Rect) {
    let border_color = if app.input_mode == InputMode::Normal { Color::Cyan } else { Color::DarkGray };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Trò chuyện ");

    let mut lines: Vec<Line> = Vec::new();

    for msg in app.conversation.transcript() {
        lines.push(speaker_label(msg.role));
        for line in msg.text.lines() {
            match msg.role {
                Speaker::User => lines.push(Line::from(line.to_string())),
                Speaker::Bot => lines.push(bot_line(line, Style::default())),
            }
        }
        lines.push(Line::default());
    }

    if app.is_busy() {
        lines.push(speaker_label(Speaker::Bot));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(bot_line(
            &format!("Đang trả lời{dots}"),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;

    let (title, title_style) = if let Some(notice) = app.validation_notice {
        (format!(" {} ", notice), Style::default().fg(Color::Red).bold())
    } else if app.handoff_pending() {
        (" Đang chuyển trang... ".to_string(), Style::default().fg(Color::Green).bold())
    } else if app.is_busy() {
        (" Đang xử lý... ".to_string(), Style::default().fg(Color::DarkGray))
    } else {
        (" Nhập tin nhắn ".to_string(), Style::default())
    };

    let border_color = if editing && !app.is_busy() { Color::Yellow } else { Color::DarkGray };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Span::styled(title, title_style));

    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;
    let (row, col) = cursor_row_col(&app.input, app.cursor);

    // Keep the cursor visible: scroll vertically by rows, horizontally by chars
    let row_offset = (row + 1).saturating_sub(inner_height.max(1));
    let col_offset = (col + 1).saturating_sub(inner_width.max(1));

    let visible: Vec<Line> = app
        .input
        .split('\n')
        .skip(row_offset)
        .take(inner_height)
        .map(|line| Line::from(line.chars().skip(col_offset).take(inner_width).collect::<String>()))
        .collect();

    // Use cyan text to match the "Bạn:" style - visible in both light and dark terminals
    let input = Paragraph::new(Text::from(visible))
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if editing {
        frame.set_cursor_position((
            area.x + 1 + (col - col_offset) as u16,
            area.y + 1 + (row - row_offset) as u16,
        ));
    }
}

fn render_handoff_screen(app: &App, target: &Navigation, frame: &mut Frame, area: Rect) {
    let (heading, detail) = match target {
        Navigation::Payment { .. } => (
            "Đặt lịch thành công - chờ thanh toán",
            "Hoàn tất thanh toán để xác nhận lịch hẹn của bạn:",
        ),
        Navigation::Appointments => (
            "Đặt lịch thành công",
            "Xem lịch hẹn của bạn tại:",
        ),
    };

    let popup_width = 70.min(area.width.saturating_sub(4));
    let popup_height = 9.min(area.height);
    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green))
        .title(format!(" {} ", heading));

    let mut lines = vec![
        Line::default(),
        Line::from(detail),
        Line::default(),
        Line::from(Span::styled(
            app.handoff_url(target),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::UNDERLINED),
        )),
    ];
    if app.conversation.reservation().is_active() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            format!("Giữ chỗ còn {}", app.conversation.reservation().display()),
            Style::default().fg(Color::Magenta),
        )));
    }

    let body = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(body, popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bot_line_bolds_marked_runs() {
        let line = bot_line("Bác sĩ **Lan** lúc 9h", Style::default());
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "Lan");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_bot_line_unclosed_marker_is_literal() {
        let line = bot_line("giá **200k", Style::default());
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "giá **200k");
    }

    #[test]
    fn test_bot_line_keeps_base_style() {
        let base = Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC);
        let line = bot_line("Đang trả lời **...**", base);
        assert!(line.spans.iter().all(|s| s.style.fg == Some(Color::DarkGray)));
        assert!(line.spans[1].style.add_modifier.contains(Modifier::ITALIC | Modifier::BOLD));
    }

    #[test]
    fn test_cursor_row_col_multiline() {
        assert_eq!(cursor_row_col("", 0), (0, 0));
        assert_eq!(cursor_row_col("mai\n9h", 3), (0, 3));
        assert_eq!(cursor_row_col("mai\n9h", 4), (1, 0));
        assert_eq!(cursor_row_col("mai\nrăng", 7), (1, 3));
    }

    #[test]
    fn test_input_height_grows_then_caps() {
        assert_eq!(input_height(""), 3);
        assert_eq!(input_height("a\nb\nc"), 5);
        assert_eq!(input_height(&"x\n".repeat(20)), MAX_INPUT_LINES + 2);
    }
}
