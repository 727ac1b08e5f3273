use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, InputMode};
use crate::art::ArtState;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Session(session_event) => app.apply_session_event(session_event),
        AppEvent::Speech(speech_event) => app.apply_speech_event(speech_event),
        AppEvent::Art(art_event) => app.apply_art_event(art_event),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global quit, works in any state
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Popups take priority over whatever is underneath
    if app.art.is_some() {
        handle_art_modal_key(app, key);
        return;
    }
    if app.show_topic_prompt {
        handle_topic_prompt_key(app, key);
        return;
    }

    if app.show_chat {
        match app.input_mode {
            InputMode::Normal => handle_chat_normal(app, key),
            InputMode::Editing => handle_chat_editing(app, key),
        }
    } else {
        handle_home(app, key);
    }
}

fn handle_home(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('c') => app.toggle_chat(),
        KeyCode::Char('g') => app.open_topic_prompt(),
        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        // Close the panel; the in-flight request (if any) keeps streaming.
        KeyCode::Esc | KeyCode::Char('q') => app.toggle_chat(),

        // Tab switches Assistant/Tutor
        KeyCode::Tab => app.switch_mode(),

        KeyCode::Char('i') => {
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.input.chars().count();
        }

        // Mic toggle (inert when the capability is unavailable)
        KeyCode::Char('m') => app.toggle_listening(),

        KeyCode::Char('g') => app.open_topic_prompt(),

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(),

        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        // Shift+Enter inserts a newline, plain Enter sends
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => {
            insert_char(app, '\n');
        }
        KeyCode::Enter => {
            app.submit(None);
        }
        KeyCode::Backspace => {
            if !app.active_is_loading() && app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if !app.active_is_loading() && app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            insert_char(app, c);
        }
        _ => {}
    }
}

/// Input is disabled while the active mode is loading, mirroring the
/// submit-while-loading no-op.
fn insert_char(app: &mut App, c: char) {
    if app.active_is_loading() {
        return;
    }
    let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
    app.input.insert(byte_pos, c);
    app.input_cursor += 1;
}

fn handle_topic_prompt_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_topic_prompt(),
        KeyCode::Enter => {
            let topic = app.topic_input.clone();
            app.request_art(&topic);
        }
        KeyCode::Backspace => {
            if app.topic_cursor > 0 {
                app.topic_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.topic_input, app.topic_cursor);
                app.topic_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.topic_cursor = app.topic_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.topic_input.chars().count();
            app.topic_cursor = (app.topic_cursor + 1).min(char_count);
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.topic_input, app.topic_cursor);
            app.topic_input.insert(byte_pos, c);
            app.topic_cursor += 1;
        }
        _ => {}
    }
}

fn handle_art_modal_key(app: &mut App, key: KeyEvent) {
    match key.code {
        // Dismiss in any state; a still-loading request finishes silently in
        // the background and its result is dropped.
        KeyCode::Esc => app.close_art_modal(),
        KeyCode::Char('s') => {
            if matches!(
                app.art.as_ref().map(|m| &m.state),
                Some(ArtState::Ready(_))
            ) {
                app.save_art();
            }
        }
        KeyCode::Enter => {
            if matches!(
                app.art.as_ref().map(|m| &m.state),
                Some(ArtState::Failed(_))
            ) {
                app.close_art_modal();
            }
        }
        _ => {}
    }
}
