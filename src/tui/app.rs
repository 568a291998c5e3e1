//! TUI Application State
//!
//! Glue between the terminal and the wizard controller: key presses become
//! controller calls, controller events become redraws. Long-running calls
//! (advance, connect) are spawned so the UI keeps ticking while they run.

use anyhow::Result;
use crossterm::event::KeyEvent;
use ratatui::Frame;
use serde_json::Value;

use super::events::{EventHandler, TuiEvent};
use super::onboarding::{OnboardingScreen, ScreenAction};
use super::onboarding_render::{render_complete, render_onboarding};
use crate::keyboard::KeyDispatcher;
use crate::wizard::events::{self as wizard_events, EventReceiver};
use crate::wizard::{WizardController, WizardControllerBuilder, WizardData, WizardEvent};

pub struct App {
    // UI state
    pub should_quit: bool,
    pub animation_frame: usize,
    pub screen: OnboardingScreen,

    /// Collected data once the wizard completes; the summary is shown
    /// until the next key press.
    pub completed: Option<WizardData>,

    // Wizard
    controller: WizardController,
    dispatcher: Option<KeyDispatcher>,
    wizard_events: Option<EventReceiver>,

    // Events
    event_handler: EventHandler,
}

impl App {
    /// Build the controller from `builder`, wiring its events (and the
    /// arrow-key dispatcher when `keyboard_navigation` is set) into the app.
    pub fn new(builder: WizardControllerBuilder, keyboard_navigation: bool) -> Self {
        let (tx, rx) = wizard_events::channel();
        let dispatcher = keyboard_navigation.then(KeyDispatcher::new);

        let mut builder = builder.events(tx);
        if let Some(dispatcher) = &dispatcher {
            builder = builder.keyboard(dispatcher.clone());
        }

        Self {
            should_quit: false,
            animation_frame: 0,
            screen: OnboardingScreen::new(),
            completed: None,
            controller: builder.build(),
            dispatcher,
            wizard_events: Some(rx),
            event_handler: EventHandler::new(),
        }
    }

    pub fn controller(&self) -> &WizardController {
        &self.controller
    }

    /// Start the wizard session. Must run inside the tokio runtime.
    pub async fn initialize(&mut self) -> Result<()> {
        if let Some(rx) = self.wizard_events.take() {
            self.event_handler.forward_wizard_events(rx);
        }

        let outcome = self.controller.start().await?;
        if let Some(offer) = &outcome.resume_offer {
            tracing::info!(
                "Offering to resume session {} at step {}",
                offer.session_id,
                offer.step_index
            );
        }
        Ok(())
    }

    /// Get event sender
    pub fn event_sender(&self) -> tokio::sync::mpsc::UnboundedSender<TuiEvent> {
        self.event_handler.sender()
    }

    /// Receive next event
    pub async fn next_event(&mut self) -> Option<TuiEvent> {
        self.event_handler.next().await
    }

    /// Next queued event, if any, without waiting
    pub fn try_next_event(&mut self) -> Option<TuiEvent> {
        self.event_handler.try_next()
    }

    /// Handle an event
    pub async fn handle_event(&mut self, event: TuiEvent) -> Result<()> {
        match event {
            TuiEvent::Key(key_event) => self.handle_key_event(key_event),
            TuiEvent::Tick => {
                self.animation_frame = self.animation_frame.wrapping_add(1);
            }
            TuiEvent::Resize(_, _) => {}
            TuiEvent::Wizard(event) => self.handle_wizard_event(event),
        }
        Ok(())
    }

    fn handle_key_event(&mut self, event: KeyEvent) {
        if self.completed.is_some() {
            self.should_quit = true;
            return;
        }

        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.dispatch(&event);
        }

        let Some(view) = self.controller.snapshot() else {
            return;
        };
        let action = self.screen.handle_key(&event, &view);
        self.apply(action);
    }

    fn handle_wizard_event(&mut self, event: WizardEvent) {
        match event {
            WizardEvent::Completed(data) => {
                tracing::info!("Onboarding completed");
                self.completed = Some(data);
            }
            WizardEvent::Closed => {
                if self.completed.is_none() {
                    self.should_quit = true;
                }
            }
            WizardEvent::ActionFailed { step_id, error } => {
                tracing::debug!("{} action failed: {}", step_id, error);
            }
            WizardEvent::StepChanged(index) => {
                tracing::debug!("Step changed to {}", index);
            }
            WizardEvent::Started { .. }
            | WizardEvent::ActionStarted { .. }
            | WizardEvent::ActionSucceeded { .. } => {}
        }
    }

    fn apply(&mut self, action: ScreenAction) {
        let result = match action {
            ScreenAction::None => Ok(()),
            ScreenAction::Toggle { key, value } => self
                .controller
                .toggle(key, Value::from(value))
                .map(|_| ()),
            ScreenAction::Select { key, value } => self.controller.select(key, Value::from(value)),
            ScreenAction::Connect => {
                let controller = self.controller.clone();
                tokio::spawn(async move {
                    if let Err(e) = controller.run_action().await {
                        tracing::warn!("Connect failed: {}", e);
                    }
                });
                Ok(())
            }
            ScreenAction::Advance => {
                let controller = self.controller.clone();
                tokio::spawn(async move {
                    match controller.advance().await {
                        Ok(transition) => tracing::debug!("Advance: {:?}", transition),
                        Err(e) => tracing::warn!("Advance failed: {}", e),
                    }
                });
                Ok(())
            }
            ScreenAction::Retreat => self.controller.retreat().map(|_| ()),
            ScreenAction::Jump(index) => self.controller.jump_to(index).map(|_| ()),
            ScreenAction::Resume => self.controller.resume().map(|_| ()),
            ScreenAction::StartOver => self.controller.decline_resume(true),
            ScreenAction::Close | ScreenAction::Quit => {
                self.controller.close(false);
                self.should_quit = true;
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::warn!("Wizard rejected {:?}: {}", action, e);
        }
    }

    /// Draw the current frame
    pub fn render(&mut self, f: &mut Frame) {
        if let Some(data) = &self.completed {
            render_complete(f, data);
            return;
        }
        if let Some(view) = self.controller.snapshot() {
            self.screen.sync(&view);
            render_onboarding(f, &view, &self.screen, self.animation_frame);
        }
    }

    /// Close the session (keeping saved progress) and wait for pending
    /// writes to land.
    pub async fn shutdown(&self) {
        self.controller.close(false);
        self.controller.flush_progress().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::onboarding::{self, SOURCES_KEY};
    use crossterm::event::{KeyCode, KeyModifiers};
    use serde_json::json;

    fn key(code: KeyCode) -> TuiEvent {
        TuiEvent::Key(KeyEvent::new(code, KeyModifiers::empty()))
    }

    async fn started_app(keyboard: bool) -> App {
        let mut app = App::new(WizardController::builder(onboarding::registry()), keyboard);
        app.initialize().await.unwrap();
        app
    }

    #[tokio::test]
    async fn test_space_toggles_focused_source() {
        let mut app = started_app(false).await;
        app.handle_event(key(KeyCode::Char(' '))).await.unwrap();

        let view = app.controller().snapshot().unwrap();
        assert_eq!(view.list(SOURCES_KEY), vec!["stripe"]);
        assert!(view.can_advance);
    }

    #[tokio::test]
    async fn test_enter_advances_through_controller() {
        let mut app = started_app(false).await;
        app.handle_event(key(KeyCode::Char(' '))).await.unwrap();
        app.handle_event(key(KeyCode::Enter)).await.unwrap();

        // Advance runs in a spawned task; its event arrives on the app stream
        loop {
            match app.next_event().await {
                Some(TuiEvent::Wizard(WizardEvent::StepChanged(1))) => break,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
        assert_eq!(app.controller().snapshot().unwrap().current_step_index, 1);
    }

    #[tokio::test]
    async fn test_arrow_keys_go_through_dispatcher() {
        let mut app = started_app(true).await;
        app.controller()
            .select(SOURCES_KEY, json!(["paddle"]))
            .unwrap();
        app.handle_event(key(KeyCode::Right)).await.unwrap();

        loop {
            match app.next_event().await {
                Some(TuiEvent::Wizard(WizardEvent::StepChanged(1))) => break,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    }

    #[tokio::test]
    async fn test_close_stops_app_and_keeps_nothing_open() {
        let mut app = started_app(false).await;
        app.handle_event(key(KeyCode::Char('q'))).await.unwrap();
        assert!(app.should_quit);
        assert!(!app.controller().is_open());
    }

    #[tokio::test]
    async fn test_completion_shows_summary_until_key() {
        let mut app = started_app(false).await;
        let mut data = WizardData::new();
        data.insert(SOURCES_KEY.into(), json!(["stripe"]));

        app.handle_event(TuiEvent::Wizard(WizardEvent::Completed(data.clone())))
            .await
            .unwrap();
        assert_eq!(app.completed, Some(data));
        assert!(!app.should_quit);

        app.handle_event(key(KeyCode::Enter)).await.unwrap();
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_ticks_advance_animation() {
        let mut app = started_app(false).await;
        app.handle_event(TuiEvent::Tick).await.unwrap();
        app.handle_event(TuiEvent::Tick).await.unwrap();
        assert_eq!(app.animation_frame, 2);
    }
}
