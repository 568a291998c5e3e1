//! Step Actions
//!
//! The async capability a step may declare (authentication, connection
//! checks). Actions return fields to merge into the collected data; the
//! controller owns when they run, the busy flag and the timeout.

pub mod http;
pub mod simulated;

pub use http::HttpStepAction;
pub use simulated::SimulatedAuthenticator;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AuthConfig;
use crate::error::ActionError;
use crate::wizard::WizardData;

/// An async side effect attached to a step.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Run the action for `step_id` against the data collected so far.
    /// On success, the returned fields are merged into the wizard data.
    async fn run(&self, step_id: &str, data: &WizardData) -> Result<WizardData, ActionError>;
}

/// Routes each step id to the action that serves it.
#[derive(Clone, Default)]
pub struct StepActions {
    actions: HashMap<String, Arc<dyn StepAction>>,
}

impl StepActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, step_id: impl Into<String>, action: Arc<dyn StepAction>) -> Self {
        self.actions.insert(step_id.into(), action);
        self
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.actions.contains_key(step_id)
    }

    /// Actions for the onboarding flow's auth step: the configured HTTP
    /// endpoint when present, the simulated authenticator otherwise.
    pub fn from_config(auth_step_id: &str, config: &AuthConfig) -> anyhow::Result<Self> {
        let action: Arc<dyn StepAction> = match config.endpoint.as_deref() {
            Some(endpoint) => {
                tracing::info!("Using HTTP step action at {}", endpoint);
                Arc::new(HttpStepAction::new(endpoint)?)
            }
            None => Arc::new(SimulatedAuthenticator::new(config.simulated_latency())),
        };
        Ok(Self::new().register(auth_step_id, action))
    }
}

#[async_trait]
impl StepAction for StepActions {
    async fn run(&self, step_id: &str, data: &WizardData) -> Result<WizardData, ActionError> {
        match self.actions.get(step_id) {
            Some(action) => action.run(step_id, data).await,
            None => Err(ActionError::NotRegistered(step_id.to_string())),
        }
    }
}
