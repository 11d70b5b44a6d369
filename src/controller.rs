use std::time::Duration;
use tracing::trace;

use crate::domain::{DVConfig, DVError, Message};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &DVConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, DVError> {
        if !event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(None);
        }
        let message = match event::read()? {
            Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                if model.raw_keyevents() {
                    Some(Message::RawKey(key))
                } else {
                    Self::handle_key(key)
                }
            }
            Event::Resize(width, height) => Some(Message::Resize(width as usize, height as usize)),
            _ => None,
        };
        Ok(message)
    }

    fn handle_key(key: KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Down | KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::Up | KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Left | KeyCode::Char('h'), _) => Some(Message::MoveLeft),
            (KeyCode::Right | KeyCode::Char('l'), _) => Some(Message::MoveRight),
            (KeyCode::PageUp, _) => Some(Message::MovePageUp),
            (KeyCode::PageDown, _) => Some(Message::MovePageDown),
            (KeyCode::Home | KeyCode::Char('g'), _) => Some(Message::MoveBeginning),
            (KeyCode::End | KeyCode::Char('G'), _) => Some(Message::MoveEnd),
            (KeyCode::Enter | KeyCode::Char(' '), _) => Some(Message::ToggleHistory),
            (KeyCode::Char('/'), _) => Some(Message::Filter),
            (KeyCode::Char('s'), _) => Some(Message::SortAscending),
            (KeyCode::Char('S'), _) => Some(Message::SortDescending),
            (KeyCode::Char('>'), _) => Some(Message::WidenColumn),
            (KeyCode::Char('<'), _) => Some(Message::NarrowColumn),
            (KeyCode::Char('c'), _) => Some(Message::CopyCell),
            (KeyCode::Char('y'), _) => Some(Message::CopyRow),
            (KeyCode::Char('x'), _) => Some(Message::Export),
            (KeyCode::Char('r'), _) => Some(Message::Reload),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Esc, _) => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn maps_bindings() {
        assert_eq!(Controller::handle_key(key(KeyCode::Char('q'))), Some(Message::Quit));
        assert_eq!(Controller::handle_key(key(KeyCode::Enter)), Some(Message::ToggleHistory));
        assert_eq!(Controller::handle_key(key(KeyCode::Char(' '))), Some(Message::ToggleHistory));
        assert_eq!(
            Controller::handle_key(KeyEvent::new(KeyCode::Char('S'), KeyModifiers::SHIFT)),
            Some(Message::SortDescending)
        );
        assert_eq!(
            Controller::handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Message::Quit)
        );
        assert_eq!(Controller::handle_key(key(KeyCode::Char('c'))), Some(Message::CopyCell));
        assert_eq!(Controller::handle_key(key(KeyCode::F(5))), None);
    }
}
