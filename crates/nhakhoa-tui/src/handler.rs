use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, InputMode, Screen};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// What Enter does in the composer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterAction {
    Submit,
    Newline,
}

/// Plain Enter sends; Shift+Enter or Alt+Enter (for terminals that do not
/// report Shift on Enter) starts a new line.
pub fn enter_action(modifiers: KeyModifiers) -> EnterAction {
    if modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) {
        EnterAction::Newline
    } else {
        EnterAction::Submit
    }
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => app.scroll_to_bottom(),
        AppEvent::Tick => app.tick(),
        AppEvent::Countdown(remaining) => app.on_countdown(remaining),
        AppEvent::TurnFinished { id, result } => app.finish_turn(id, result),
        AppEvent::Navigate(target) => app.navigate(target),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => {
                app.should_quit = true;
                return;
            }
            KeyCode::Char('n') => {
                app.start_new_conversation();
                return;
            }
            _ => {}
        }
    }

    match app.screen {
        Screen::Handoff(_) => handle_handoff(app, key),
        Screen::Chat => match app.input_mode {
            InputMode::Normal => handle_chat_normal(app, key),
            InputMode::Editing => handle_chat_editing(app, key),
        },
    }
}

fn handle_handoff(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('c') => {
            if let Screen::Handoff(target) = &app.screen {
                let url = app.handoff_url(target);
                copy_to_clipboard(&url);
            }
        }
        KeyCode::Char('n') | KeyCode::Enter | KeyCode::Esc => app.start_new_conversation(),
        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,
        KeyCode::Char('n') => app.start_new_conversation(),

        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::PageDown => app.scroll_down(app.chat_height.max(2) / 2),
        KeyCode::PageUp => app.scroll_up(app.chat_height.max(2) / 2),
        KeyCode::Char('G') => app.scroll_to_bottom(),
        KeyCode::Char('g') => app.chat_scroll = 0,
        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => match enter_action(key.modifiers) {
            EnterAction::Submit => {
                if !app.is_busy() {
                    app.submit();
                }
            }
            EnterAction::Newline => insert_char(app, '\n'),
        },
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::PageDown => app.scroll_down(app.chat_height.max(2) / 2),
        KeyCode::PageUp => app.scroll_up(app.chat_height.max(2) / 2),
        KeyCode::Char(c) => insert_char(app, c),
        _ => {}
    }
}

fn insert_char(app: &mut App, c: char) {
    let byte_pos = char_to_byte_index(&app.input, app.cursor);
    app.input.insert(byte_pos, c);
    app.cursor += 1;
    app.validation_notice = None;
}

fn copy_to_clipboard(text: &str) {
    use std::process::{Command, Stdio};
    use std::io::Write;

    for program in ["pbcopy", "wl-copy", "xclip"] {
        let mut command = Command::new(program);
        if program == "xclip" {
            command.args(["-selection", "clipboard"]);
        }
        if let Ok(mut child) = command.stdin(Stdio::piped()).spawn() {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(text.as_bytes());
            }
            let _ = child.wait();
            tracing::debug!(program, "copied handoff url");
            return;
        }
    }
    tracing::warn!("no clipboard program available for handoff url");
}
