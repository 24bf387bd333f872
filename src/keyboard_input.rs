use crate::error::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What a key press asks the booth to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoothCommand {
    /// Start the mode bound to this key
    Capture(char),
    Email,
    Cancel,
    Quit,
}

/// Map a key event to a command. `mode_keys` are the configured mode
/// triggers; they win over the built-in letters.
pub fn map_key(key: &KeyEvent, mode_keys: &[char]) -> Option<BoothCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(BoothCommand::Quit)
        }
        KeyCode::Char(c) if mode_keys.contains(&c) => Some(BoothCommand::Capture(c)),
        KeyCode::Char('e') => Some(BoothCommand::Email),
        KeyCode::Char('c') => Some(BoothCommand::Cancel),
        KeyCode::Char('q') | KeyCode::Esc => Some(BoothCommand::Quit),
        other => {
            debug!("Key pressed: {:?}", other);
            None
        }
    }
}

/// Raw-mode keyboard polled from the cooperative loop
pub struct KeyboardInputHandler {
    mode_keys: Vec<char>,
    raw_mode: bool,
}

impl KeyboardInputHandler {
    pub fn new(mode_keys: Vec<char>) -> Self {
        Self {
            mode_keys,
            raw_mode: false,
        }
    }

    /// Enable raw mode so single key presses arrive without Enter
    pub fn start(&mut self) -> Result<()> {
        info!("Starting keyboard input handler");
        enable_raw_mode()?;
        self.raw_mode = true;
        Ok(())
    }

    /// Wait up to `timeout` for a key press. Doubles as the loop's pacing.
    pub fn poll(&self, timeout: Duration) -> Option<BoothCommand> {
        match event::poll(timeout) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) => map_key(&key, &self.mode_keys),
                Ok(_) => None,
                Err(e) => {
                    warn!("Error reading keyboard event: {}", e);
                    None
                }
            },
            Ok(false) => None,
            Err(e) => {
                warn!("Error polling for keyboard events: {}", e);
                std::thread::sleep(timeout);
                None
            }
        }
    }

    pub fn stop(&mut self) {
        if !self.raw_mode {
            return;
        }
        info!("Stopping keyboard input handler");
        if let Err(e) = disable_raw_mode() {
            error!("Failed to disable raw mode: {}", e);
        }
        self.raw_mode = false;
    }
}

impl Drop for KeyboardInputHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_mode_keys_trigger_capture() {
        let keys = ['1', '4', '9', 'a'];
        assert_eq!(
            map_key(&press(KeyCode::Char('4')), &keys),
            Some(BoothCommand::Capture('4'))
        );
        assert_eq!(
            map_key(&press(KeyCode::Char('a')), &keys),
            Some(BoothCommand::Capture('a'))
        );
        assert_eq!(map_key(&press(KeyCode::Char('7')), &keys), None);
    }

    #[test]
    fn test_control_keys() {
        let keys = ['1'];
        assert_eq!(
            map_key(&press(KeyCode::Char('e')), &keys),
            Some(BoothCommand::Email)
        );
        assert_eq!(
            map_key(&press(KeyCode::Char('c')), &keys),
            Some(BoothCommand::Cancel)
        );
        assert_eq!(map_key(&press(KeyCode::Esc), &keys), Some(BoothCommand::Quit));
        assert_eq!(
            map_key(
                &KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
                &keys
            ),
            Some(BoothCommand::Quit)
        );
    }

    #[test]
    fn test_key_release_ignored() {
        let mut key = press(KeyCode::Char('1'));
        key.kind = KeyEventKind::Release;
        assert_eq!(map_key(&key, &['1']), None);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut handler = KeyboardInputHandler::new(vec!['1']);
        handler.stop();
        assert!(!handler.raw_mode);
    }
}
