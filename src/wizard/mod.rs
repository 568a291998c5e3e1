//! Wizard Engine
//!
//! Ordered steps, per-step validation, guarded navigation and async step
//! actions, driven by a single [`WizardController`].

pub mod controller;
pub mod events;
pub mod guard;
pub mod onboarding;
pub mod registry;
pub mod state;
pub mod step;

pub use controller::{
    StartOutcome, Transition, WeakController, WizardController, WizardControllerBuilder,
};
pub use events::{EventReceiver, EventSender, WizardEvent};
pub use registry::StepRegistry;
pub use state::{StepInfo, WizardState, WizardStatus, WizardView};
pub use step::{ActionTrigger, Step, Validator};

/// Data collected across steps, keyed by field name.
pub type WizardData = serde_json::Map<String, serde_json::Value>;
