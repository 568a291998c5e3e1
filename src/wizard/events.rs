//! Wizard Event System
//!
//! Notifications the controller pushes to its host. Delivered over an
//! unbounded channel so emitting never blocks a transition.

use tokio::sync::mpsc;

use super::WizardData;
use crate::error::ActionError;

/// Events emitted by the wizard controller
#[derive(Debug, Clone, PartialEq)]
pub enum WizardEvent {
    /// A session started (fresh or re-opened)
    Started { session_id: String },

    /// The active step changed (advance, retreat, jump or resume)
    StepChanged(usize),

    /// A step action started running
    ActionStarted { step_id: String },

    /// A step action finished successfully without moving the wizard
    ActionSucceeded { step_id: String },

    /// A step action failed; the user may retry or skip
    ActionFailed { step_id: String, error: ActionError },

    /// The final step was passed. Fired once per session.
    Completed(WizardData),

    /// The wizard was closed or reset
    Closed,
}

/// Sending half of the wizard event channel
pub type EventSender = mpsc::UnboundedSender<WizardEvent>;

/// Receiving half of the wizard event channel
pub type EventReceiver = mpsc::UnboundedReceiver<WizardEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Drain everything currently queued without waiting.
pub fn drain(rx: &mut EventReceiver) -> Vec<WizardEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
