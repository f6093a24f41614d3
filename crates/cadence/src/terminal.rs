//! Raw-mode keyboard input.
//!
//! crossterm's `event::read` blocks, so keys are read on their own thread and
//! forwarded to the async side over a channel.

use std::fmt::Display;
use std::io::{self, Write};
use std::thread;

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Press(char),
    Release(char),
    Space,
    Enter,
    Quit,
}

/// Puts the terminal in raw mode until dropped.
pub struct RawTerminal {
    /// Whether key releases are reported.
    reports_release: bool,
}

impl RawTerminal {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;

        let reports_release = matches!(terminal::supports_keyboard_enhancement(), Ok(true));
        if reports_release {
            execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        }
        Ok(Self { reports_release })
    }

    pub fn reports_release(&self) -> bool {
        self.reports_release
    }

    /// Start forwarding key input. The thread ends when the receiver is gone.
    pub fn keys(&self) -> mpsc::UnboundedReceiver<KeyInput> {
        let (tx, rx) = mpsc::unbounded_channel();

        thread::spawn(move || loop {
            let input = match event::read() {
                Ok(Event::Key(key)) => translate(key),
                Ok(_) => None,
                Err(e) => {
                    log::error!("Failed to read terminal input: {}", e);
                    Some(KeyInput::Quit)
                }
            };
            if let Some(input) = input {
                if tx.send(input).is_err() || input == KeyInput::Quit {
                    break;
                }
            }
        });

        rx
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if self.reports_release {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = disable_raw_mode();
    }
}

fn translate(key: KeyEvent) -> Option<KeyInput> {
    let KeyEvent {
        code,
        modifiers,
        kind,
        ..
    } = key;

    match (code, modifiers, kind) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL, _) => Some(KeyInput::Quit),
        (KeyCode::Esc, _, _) | (KeyCode::Char('q'), _, KeyEventKind::Press) => {
            Some(KeyInput::Quit)
        }
        (KeyCode::Char(' '), _, KeyEventKind::Press) => Some(KeyInput::Space),
        (KeyCode::Enter, _, KeyEventKind::Press) => Some(KeyInput::Enter),
        (KeyCode::Char(c), _, KeyEventKind::Press) => Some(KeyInput::Press(c)),
        (KeyCode::Char(c), _, KeyEventKind::Release) => Some(KeyInput::Release(c)),
        _ => None,
    }
}

/// Print one line. Raw mode needs the explicit carriage return.
pub fn say(text: impl Display) {
    let mut stdout = io::stdout();
    let _ = write!(stdout, "{}\r\n", text);
    let _ = stdout.flush();
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyEventState;

    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers, kind: KeyEventKind) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_translate_keys() {
        assert_eq!(
            translate(key(KeyCode::Char('c'), KeyModifiers::CONTROL, KeyEventKind::Press)),
            Some(KeyInput::Quit)
        );
        assert_eq!(
            translate(key(KeyCode::Char('a'), KeyModifiers::NONE, KeyEventKind::Press)),
            Some(KeyInput::Press('a'))
        );
        assert_eq!(
            translate(key(KeyCode::Char('a'), KeyModifiers::NONE, KeyEventKind::Release)),
            Some(KeyInput::Release('a'))
        );
        assert_eq!(
            translate(key(KeyCode::Char(' '), KeyModifiers::NONE, KeyEventKind::Repeat)),
            None
        );
        assert_eq!(
            translate(key(KeyCode::Esc, KeyModifiers::NONE, KeyEventKind::Press)),
            Some(KeyInput::Quit)
        );
    }
}
