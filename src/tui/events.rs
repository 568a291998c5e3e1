//! TUI Event System
//!
//! Merges terminal input, animation ticks and wizard notifications into one
//! stream for the app loop.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc;

use crate::wizard::events::EventReceiver;
use crate::wizard::WizardEvent;

/// Events that can occur in the TUI
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// User pressed a key
    Key(KeyEvent),

    /// Terminal was resized
    Resize(u16, u16),

    /// Animation tick (spinner while an action runs)
    Tick,

    /// Notification from the wizard controller
    Wizard(WizardEvent),
}

/// Event handler for the TUI
pub struct EventHandler {
    tx: mpsc::UnboundedSender<TuiEvent>,
    rx: mpsc::UnboundedReceiver<TuiEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Get a sender for sending events
    pub fn sender(&self) -> mpsc::UnboundedSender<TuiEvent> {
        self.tx.clone()
    }

    /// Receive the next event (waits until available)
    pub async fn next(&mut self) -> Option<TuiEvent> {
        self.rx.recv().await
    }

    /// Try to receive the next event without waiting
    pub fn try_next(&mut self) -> Option<TuiEvent> {
        self.rx.try_recv().ok()
    }

    /// Forward wizard notifications into the TUI stream.
    pub fn forward_wizard_events(&self, mut events: EventReceiver) {
        let tx = self.sender();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if tx.send(TuiEvent::Wizard(event)).is_err() {
                    break;
                }
            }
        });
    }

    /// Start listening for terminal events
    ///
    /// Uses crossterm's async EventStream instead of blocking poll/read
    /// so the runtime keeps serving step actions and the progress writer.
    pub fn start_terminal_listener(tx: mpsc::UnboundedSender<TuiEvent>) {
        use crossterm::event::{Event, EventStream, KeyEventKind};
        use futures::StreamExt;

        tokio::spawn(async move {
            let mut reader = EventStream::new();
            let tick_interval = std::time::Duration::from_millis(100);

            loop {
                let event = tokio::select! {
                    maybe_event = reader.next() => {
                        match maybe_event {
                            Some(Ok(event)) => Some(event),
                            Some(Err(_)) => None,
                            None => break,
                        }
                    }
                    _ = tokio::time::sleep(tick_interval) => None,
                };

                let sent = match event {
                    // Only key presses; releases would double every action
                    Some(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        tx.send(TuiEvent::Key(key))
                    }
                    Some(Event::Resize(w, h)) => tx.send(TuiEvent::Resize(w, h)),
                    Some(_) => Ok(()),
                    None => tx.send(TuiEvent::Tick),
                };
                if sent.is_err() {
                    break;
                }
            }
        });
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper function to check if a key event matches
pub fn key_matches(event: &KeyEvent, code: KeyCode, modifiers: KeyModifiers) -> bool {
    event.code == code && event.modifiers == modifiers
}

/// Common key bindings
pub mod keys {
    use super::*;

    /// Ctrl+C - Quit
    pub fn is_quit(event: &KeyEvent) -> bool {
        key_matches(event, KeyCode::Char('c'), KeyModifiers::CONTROL)
    }

    /// 'q' - Close the wizard, keeping progress
    pub fn is_close(event: &KeyEvent) -> bool {
        matches!(event.code, KeyCode::Char('q') | KeyCode::Char('Q')) && event.modifiers.is_empty()
    }

    /// Escape - Back
    pub fn is_cancel(event: &KeyEvent) -> bool {
        event.code == KeyCode::Esc
    }

    /// Enter - Continue
    pub fn is_enter(event: &KeyEvent) -> bool {
        event.code == KeyCode::Enter && event.modifiers.is_empty()
    }

    /// Up arrow
    pub fn is_up(event: &KeyEvent) -> bool {
        matches!(event.code, KeyCode::Up | KeyCode::Char('k')) && event.modifiers.is_empty()
    }

    /// Down arrow
    pub fn is_down(event: &KeyEvent) -> bool {
        matches!(event.code, KeyCode::Down | KeyCode::Char('j')) && event.modifiers.is_empty()
    }

    /// Left arrow
    pub fn is_left(event: &KeyEvent) -> bool {
        event.code == KeyCode::Left && event.modifiers.is_empty()
    }

    /// Right arrow
    pub fn is_right(event: &KeyEvent) -> bool {
        event.code == KeyCode::Right && event.modifiers.is_empty()
    }

    /// Space - Toggle / pick
    pub fn is_toggle(event: &KeyEvent) -> bool {
        event.code == KeyCode::Char(' ') && event.modifiers.is_empty()
    }

    /// 'C' - Connect
    pub fn is_connect(event: &KeyEvent) -> bool {
        matches!(event.code, KeyCode::Char('c') | KeyCode::Char('C')) && event.modifiers.is_empty()
    }

    /// 'Y' - Yes
    pub fn is_yes(event: &KeyEvent) -> bool {
        matches!(event.code, KeyCode::Char('y') | KeyCode::Char('Y')) && event.modifiers.is_empty()
    }

    /// 'N' - No
    pub fn is_no(event: &KeyEvent) -> bool {
        matches!(event.code, KeyCode::Char('n') | KeyCode::Char('N')) && event.modifiers.is_empty()
    }

    /// '1'..'9' - zero-based step index
    pub fn step_digit(event: &KeyEvent) -> Option<usize> {
        match event.code {
            KeyCode::Char(c @ '1'..='9') if event.modifiers.is_empty() => {
                c.to_digit(10).map(|d| d as usize - 1)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::empty())
    }

    #[test]
    fn test_event_handler_creation() {
        let mut handler = EventHandler::new();
        let sender = handler.sender();
        assert!(sender.send(TuiEvent::Tick).is_ok());
        assert!(matches!(handler.try_next(), Some(TuiEvent::Tick)));
        assert!(handler.try_next().is_none());
    }

    #[tokio::test]
    async fn test_wizard_events_forwarded() {
        let mut handler = EventHandler::new();
        let (tx, rx) = crate::wizard::events::channel();
        handler.forward_wizard_events(rx);

        tx.send(WizardEvent::StepChanged(2)).unwrap();
        match handler.next().await {
            Some(TuiEvent::Wizard(WizardEvent::StepChanged(2))) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_key_matches() {
        let event = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(key_matches(&event, KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(!key_matches(&event, KeyCode::Char('c'), KeyModifiers::empty()));
    }

    #[test]
    fn test_quit_is_not_connect() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(keys::is_quit(&ctrl_c));
        assert!(!keys::is_connect(&ctrl_c));

        assert!(keys::is_connect(&key(KeyCode::Char('c'))));
        assert!(!keys::is_quit(&key(KeyCode::Char('c'))));
    }

    #[test]
    fn test_step_digit() {
        assert_eq!(keys::step_digit(&key(KeyCode::Char('1'))), Some(0));
        assert_eq!(keys::step_digit(&key(KeyCode::Char('5'))), Some(4));
        assert_eq!(keys::step_digit(&key(KeyCode::Char('0'))), None);
        assert_eq!(keys::step_digit(&key(KeyCode::Char('x'))), None);
    }

    #[test]
    fn test_vim_keys_move_focus() {
        assert!(keys::is_up(&key(KeyCode::Char('k'))));
        assert!(keys::is_down(&key(KeyCode::Down)));
        assert!(!keys::is_down(&KeyEvent::new(KeyCode::Down, KeyModifiers::SHIFT)));
    }
}
