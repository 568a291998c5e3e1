//! Onboarding Screen
//!
//! Presentation state for the onboarding wizard (which row has focus) and
//! the mapping from keys to wizard commands. All wizard state lives in the
//! controller; this only reads the [`WizardView`] it renders.
//!
//! Arrow Left/Right are not handled here: the controller's keyboard binding
//! receives them through the key dispatcher.

use crossterm::event::KeyEvent;

use super::events::keys;
use crate::wizard::WizardView;
use crate::wizard::onboarding::{
    AUTH, CONFIG, PRIORITIES, PRIORITY_KEY, SOURCE, SOURCES, SOURCES_KEY, TEMPLATE_KEY, TEMPLATES,
};

/// What the app should do after a key press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenAction {
    /// Nothing special
    None,
    /// Flip a value in a multi-select list
    Toggle { key: &'static str, value: &'static str },
    /// Set a single-choice field
    Select { key: &'static str, value: &'static str },
    /// Run the current step's action (Connect)
    Connect,
    Advance,
    Retreat,
    Jump(usize),
    /// Accept the resume offer
    Resume,
    /// Decline the resume offer and discard saved progress
    StartOver,
    /// Close the wizard; progress is kept for next time
    Close,
    /// Ctrl+C
    Quit,
}

/// Row focus for the step on screen.
#[derive(Debug, Default)]
pub struct OnboardingScreen {
    focus: usize,
    focus_step: usize,
}

impl OnboardingScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Focused row on the current step
    pub fn focus(&self) -> usize {
        self.focus
    }

    /// Reset focus when the wizard moved to another step.
    pub fn sync(&mut self, view: &WizardView) {
        if view.current_step_index != self.focus_step {
            self.focus_step = view.current_step_index;
            self.focus = 0;
        }
    }

    pub fn handle_key(&mut self, event: &KeyEvent, view: &WizardView) -> ScreenAction {
        self.sync(view);

        if keys::is_quit(event) {
            return ScreenAction::Quit;
        }

        // Resume prompt takes over the keyboard until answered
        if view.resume_offer.is_some() {
            return if keys::is_yes(event) || keys::is_enter(event) {
                ScreenAction::Resume
            } else if keys::is_no(event) {
                ScreenAction::StartOver
            } else if keys::is_close(event) || keys::is_cancel(event) {
                ScreenAction::Close
            } else {
                ScreenAction::None
            };
        }

        if keys::is_close(event) {
            return ScreenAction::Close;
        }
        if keys::is_enter(event) {
            return ScreenAction::Advance;
        }
        if keys::is_cancel(event) {
            return ScreenAction::Retreat;
        }
        if let Some(index) = keys::step_digit(event)
            && index < view.step_count
        {
            return ScreenAction::Jump(index);
        }

        let rows = focus_rows(&view.step.id);
        if keys::is_up(event) {
            self.focus = self.focus.saturating_sub(1);
            return ScreenAction::None;
        }
        if keys::is_down(event) {
            self.focus = (self.focus + 1).min(rows.saturating_sub(1));
            return ScreenAction::None;
        }

        match view.step.id.as_str() {
            SOURCE if keys::is_toggle(event) => SOURCES
                .get(self.focus)
                .map(|&(id, _)| ScreenAction::Toggle {
                    key: SOURCES_KEY,
                    value: id,
                })
                .unwrap_or(ScreenAction::None),
            AUTH if keys::is_connect(event) || keys::is_toggle(event) => ScreenAction::Connect,
            CONFIG if keys::is_toggle(event) => config_choice(self.focus),
            _ => ScreenAction::None,
        }
    }
}

/// Focusable rows on a step
pub fn focus_rows(step_id: &str) -> usize {
    match step_id {
        SOURCE => SOURCES.len(),
        CONFIG => TEMPLATES.len() + PRIORITIES.len(),
        _ => 0,
    }
}

/// Config rows list the templates first, then the priorities.
fn config_choice(row: usize) -> ScreenAction {
    if let Some(&(id, _, _)) = TEMPLATES.get(row) {
        return ScreenAction::Select {
            key: TEMPLATE_KEY,
            value: id,
        };
    }
    match PRIORITIES.get(row - TEMPLATES.len()) {
        Some(&(id, _, _)) => ScreenAction::Select {
            key: PRIORITY_KEY,
            value: id,
        },
        None => ScreenAction::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::onboarding;
    use crate::wizard::{StepInfo, WizardStatus};
    use crossterm::event::{KeyCode, KeyModifiers};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::empty())
    }

    fn view_at(index: usize) -> WizardView {
        let registry = onboarding::registry();
        let step = registry.get(index).unwrap();
        WizardView {
            status: WizardStatus::InProgress,
            current_step_index: index,
            max_visited_index: index,
            step_count: registry.len(),
            step: StepInfo::from(step),
            can_advance: true,
            can_retreat: index > 0,
            busy: false,
            data: registry.defaults().clone(),
            last_error: None,
            resume_offer: None,
        }
    }

    #[test]
    fn test_source_focus_and_toggle() {
        let mut screen = OnboardingScreen::new();
        let view = view_at(0);

        assert_eq!(
            screen.handle_key(&key(KeyCode::Char(' ')), &view),
            ScreenAction::Toggle {
                key: SOURCES_KEY,
                value: "stripe"
            }
        );

        screen.handle_key(&key(KeyCode::Down), &view);
        screen.handle_key(&key(KeyCode::Down), &view);
        assert_eq!(screen.focus(), 2);
        assert_eq!(
            screen.handle_key(&key(KeyCode::Char(' ')), &view),
            ScreenAction::Toggle {
                key: SOURCES_KEY,
                value: "paddle"
            }
        );

        // Focus stops at the last row
        for _ in 0..20 {
            screen.handle_key(&key(KeyCode::Down), &view);
        }
        assert_eq!(screen.focus(), SOURCES.len() - 1);
    }

    #[test]
    fn test_focus_resets_on_step_change() {
        let mut screen = OnboardingScreen::new();
        screen.handle_key(&key(KeyCode::Down), &view_at(0));
        assert_eq!(screen.focus(), 1);

        screen.sync(&view_at(3));
        assert_eq!(screen.focus(), 0);
    }

    #[test]
    fn test_navigation_keys() {
        let mut screen = OnboardingScreen::new();
        let view = view_at(2);
        assert_eq!(screen.handle_key(&key(KeyCode::Enter), &view), ScreenAction::Advance);
        assert_eq!(screen.handle_key(&key(KeyCode::Esc), &view), ScreenAction::Retreat);
        assert_eq!(screen.handle_key(&key(KeyCode::Char('q')), &view), ScreenAction::Close);
        assert_eq!(screen.handle_key(&key(KeyCode::Char('1')), &view), ScreenAction::Jump(0));
        assert_eq!(screen.handle_key(&key(KeyCode::Char('9')), &view), ScreenAction::None);
        // Arrows belong to the keyboard binding
        assert_eq!(screen.handle_key(&key(KeyCode::Right), &view), ScreenAction::None);
    }

    #[test]
    fn test_auth_connect() {
        let mut screen = OnboardingScreen::new();
        let view = view_at(1);
        assert_eq!(screen.handle_key(&key(KeyCode::Char('c')), &view), ScreenAction::Connect);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(screen.handle_key(&ctrl_c, &view), ScreenAction::Quit);
    }

    #[test]
    fn test_config_rows() {
        let mut screen = OnboardingScreen::new();
        let view = view_at(3);
        assert_eq!(
            screen.handle_key(&key(KeyCode::Char(' ')), &view),
            ScreenAction::Select {
                key: TEMPLATE_KEY,
                value: "comprehensive"
            }
        );
        for _ in 0..TEMPLATES.len() + 1 {
            screen.handle_key(&key(KeyCode::Down), &view);
        }
        assert_eq!(
            screen.handle_key(&key(KeyCode::Char(' ')), &view),
            ScreenAction::Select {
                key: PRIORITY_KEY,
                value: "churn-risk"
            }
        );
    }

    #[test]
    fn test_resume_prompt_captures_keys() {
        use crate::store::ProgressSnapshot;

        let mut screen = OnboardingScreen::new();
        let mut view = view_at(0);
        view.resume_offer = Some(ProgressSnapshot {
            session_id: "s".into(),
            step_index: 2,
            max_visited_index: 2,
            data: Default::default(),
            timestamp: chrono::Utc::now(),
        });

        assert_eq!(screen.handle_key(&key(KeyCode::Char('y')), &view), ScreenAction::Resume);
        assert_eq!(screen.handle_key(&key(KeyCode::Enter), &view), ScreenAction::Resume);
        assert_eq!(screen.handle_key(&key(KeyCode::Char('n')), &view), ScreenAction::StartOver);
        assert_eq!(screen.handle_key(&key(KeyCode::Char(' ')), &view), ScreenAction::None);
    }
}
