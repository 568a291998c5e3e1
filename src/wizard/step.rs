//! Step descriptors.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::WizardData;

/// Predicate over the collected data gating forward motion from a step.
pub type Validator = Arc<dyn Fn(&WizardData) -> bool + Send + Sync>;

/// When a step's declared async action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTrigger {
    /// `advance()` runs the action and only moves on if it succeeds.
    OnAdvance,
    /// The action runs only when the user explicitly asks for it
    /// (e.g. a "Connect" button); `advance()` skips it.
    OnDemand,
}

/// One stage of the wizard.
///
/// Built once with the builder methods and never mutated afterwards; the
/// registry hands out shared references.
#[derive(Clone)]
pub struct Step {
    id: String,
    title: String,
    subtitle: String,
    validator: Option<Validator>,
    action: Option<ActionTrigger>,
}

impl Step {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subtitle: String::new(),
            validator: None,
            action: None,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&WizardData) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Declare an async action. The registry only records it; the
    /// controller decides when it runs.
    pub fn with_action(mut self, trigger: ActionTrigger) -> Self {
        self.action = Some(trigger);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }

    pub fn action(&self) -> Option<ActionTrigger> {
        self.action
    }

    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Run the validator. Steps without one never block.
    pub fn validate(&self, data: &WizardData) -> bool {
        self.validator.as_ref().is_none_or(|v| v(data))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("has_validator", &self.validator.is_some())
            .field("action", &self.action)
            .finish()
    }
}
