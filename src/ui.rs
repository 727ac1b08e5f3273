use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
    },
    Frame,
};

use crate::app::{App, InputMode};
use crate::art::{ArtState, LOADING_PHRASES};
use crate::session::{Mode, Role};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
            // Consume the second *
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some((_, c)) = chars.next() {
                if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                    chars.next(); // consume second *
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
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

    if app.show_chat {
        let [home_area, chat_area] = Layout::horizontal([
            Constraint::Min(0),
            Constraint::Percentage(45),
        ])
        .areas(body_area);
        render_home(app, frame, home_area);
        render_chat_panel(app, frame, chat_area);
    } else {
        render_home(app, frame, body_area);
    }

    render_footer(app, frame, footer_area);

    // Popups (in order of priority)
    if app.art.is_some() {
        render_art_modal(app, frame, area);
    } else if app.show_topic_prompt {
        render_topic_prompt(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let listening_indicator = if app.is_listening { " [listening]" } else { "" };

    let title = Line::from(vec![
        Span::styled(" Nexus ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            "learning companion",
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(listening_indicator, Style::default().fg(Color::Red).bold()),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_home(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Home ");

    let mic_line = if app.speech.is_available() {
        "  m        toggle voice input (in chat)"
    } else {
        "  (voice input unavailable: set speech_command in config.json)"
    };

    let text = Text::from(vec![
        Line::default(),
        Line::from(Span::styled(
            "  Welcome to Nexus.",
            Style::default().fg(Color::Cyan).bold(),
        )),
        Line::default(),
        Line::from("  c        open the chat panel"),
        Line::from("  Tab      switch Assistant / Tutor (in chat)"),
        Line::from("  g        generate AI art for a topic"),
        Line::from(mic_line),
        Line::from("  q        quit"),
    ]);

    let home = Paragraph::new(text).block(block);
    frame.render_widget(home, area);
}

fn render_chat_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    let [tabs_area, transcript_area, input_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    render_mode_tabs(app, frame, tabs_area);
    render_transcript(app, frame, transcript_area);
    render_chat_input(app, frame, input_area);
}

fn render_mode_tabs(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans: Vec<Span> = vec![Span::raw(" ")];
    for mode in [Mode::Assistant, Mode::Tutor] {
        let style = if mode == app.active_mode() {
            Style::default().fg(Color::Black).bg(Color::Cyan).bold()
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!(" {} ", mode.title()), style));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(
        "(Tab to switch)",
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let mode = app.active_mode();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} ", mode.title()));

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let mut lines: Vec<Line> = Vec::new();
    for msg in app.session.messages(mode) {
        match msg.role {
            Role::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
                lines.push(Line::default());
            }
            Role::Model => {
                // The in-progress message is empty until the first chunk;
                // the typing indicator below stands in for it.
                if msg.content.is_empty() {
                    continue;
                }
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(parse_markdown_line(line));
                }
                lines.push(Line::default());
            }
        }
    }

    if app.session.awaiting_first_chunk(mode) {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )));
    }

    let total_lines = lines.len() as u16;

    let transcript = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(transcript, area);

    if total_lines > app.chat_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state =
            ScrollbarState::new(total_lines as usize).position(app.chat_scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn render_chat_input(app: &App, frame: &mut Frame, area: Rect) {
    let input_border_color = if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let title = if app.is_listening {
        " Listening... "
    } else if app.active_is_loading() {
        " Waiting for reply... "
    } else {
        match app.active_mode() {
            Mode::Assistant => " Ask for help (i to edit, Enter to send) ",
            Mode::Tutor => " Ask the Tutor (i to edit, Enter to send) ",
        }
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling.
    // Multi-line input shows its last line.
    let inner_width = area.width.saturating_sub(2) as usize;
    let (last_line, cursor_on_last) = match app.input.rsplit_once('\n') {
        Some((head, tail)) => {
            let head_chars = head.chars().count() + 1;
            (tail, app.input_cursor.saturating_sub(head_chars))
        }
        None => (app.input.as_str(), app.input_cursor),
    };

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_on_last >= inner_width {
        cursor_on_last - inner_width + 1
    } else {
        0
    };

    let visible_text: String = last_line
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if app.input_mode == InputMode::Editing && !app.active_is_loading() {
        let cursor_x = (cursor_on_last - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_topic_prompt(app: &App, frame: &mut Frame, area: Rect) {
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 7;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(" AI Art ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions =
        Paragraph::new("Enter a topic to illustrate. Press Enter to generate, Esc to cancel.")
            .style(Style::default().fg(Color::DarkGray));
    let instructions_area = Rect::new(inner.x, inner.y, inner.width, 1);
    frame.render_widget(instructions, instructions_area);

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let input = Paragraph::new(app.topic_input.as_str()).style(Style::default().fg(Color::Cyan));
    frame.render_widget(input, input_area);

    let cursor_x = app.topic_cursor.min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}

fn render_art_modal(app: &App, frame: &mut Frame, area: Rect) {
    let Some(modal) = &app.art else {
        return;
    };

    let popup_width = 64.min(area.width.saturating_sub(4));
    let popup_height = 12.min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(format!(" AI Art: {} ", modal.topic));

    let text = match &modal.state {
        ArtState::Loading => Text::from(vec![
            Line::default(),
            Line::from(Span::styled(
                format!("  {}", LOADING_PHRASES[app.art_phrase_idx]),
                Style::default().fg(Color::Magenta).bold(),
            )),
            Line::default(),
            Line::from(Span::styled(
                "  Powered by Imagen",
                Style::default().fg(Color::DarkGray),
            )),
            Line::default(),
            Line::from(Span::styled(
                "  Esc to dismiss",
                Style::default().fg(Color::DarkGray),
            )),
        ]),
        ArtState::Ready(image) => {
            let size_kb = image.bytes.len() / 1024;
            let mut lines = vec![
                Line::default(),
                Line::from(Span::styled(
                    "  Artwork ready!",
                    Style::default().fg(Color::Green).bold(),
                )),
                Line::default(),
                Line::from(format!("  {} ({} KB)", image.mime_type, size_kb)),
                Line::from(format!(
                    "  File name: {}",
                    crate::art::download_file_name(&modal.topic)
                )),
                Line::default(),
            ];
            match &modal.saved_to {
                Some(path) => lines.push(Line::from(Span::styled(
                    format!("  Saved to {}", path.display()),
                    Style::default().fg(Color::Green),
                ))),
                None => lines.push(Line::from(Span::styled(
                    "  s to save, Esc to dismiss",
                    Style::default().fg(Color::DarkGray),
                ))),
            }
            Text::from(lines)
        }
        ArtState::Failed(message) => Text::from(vec![
            Line::default(),
            Line::from(Span::styled(
                "  Creation Failed",
                Style::default().fg(Color::Red).bold(),
            )),
            Line::default(),
            Line::from(format!("  {}", message)),
            Line::default(),
            Line::from(Span::styled(
                "  Enter or Esc to close",
                Style::default().fg(Color::DarkGray),
            )),
        ]),
    };

    let body = Paragraph::new(text).block(block).wrap(Wrap { trim: false });
    frame.render_widget(body, popup_area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = if app.art.is_some() {
        " ART "
    } else if app.show_chat {
        " CHAT "
    } else {
        " HOME "
    };

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: Vec<Span> = if app.art.is_some() {
        vec![
            Span::styled(" s ", key_style),
            Span::styled(" save ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" close ", label_style),
        ]
    } else if app.show_chat {
        let mut hints = vec![
            Span::styled(" Tab ", key_style),
            Span::styled(" mode ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" edit ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
        ];
        if app.speech.is_available() {
            hints.extend(vec![
                Span::styled(" m ", key_style),
                Span::styled(" voice ", label_style),
            ]);
        }
        hints.extend(vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" close ", label_style),
        ]);
        hints
    } else {
        vec![
            Span::styled(" c ", key_style),
            Span::styled(" chat ", label_style),
            Span::styled(" g ", key_style),
            Span::styled(" art ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ]
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    spans.extend(hints);

    let footer = Paragraph::new(Line::from(spans));
    frame.render_widget(footer, area);
}
