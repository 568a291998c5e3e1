//! Simulated authentication: fixed latency, always succeeds.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::StepAction;
use crate::error::ActionError;
use crate::wizard::WizardData;

/// Default delay before the simulated sign-in "completes"
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
pub struct SimulatedAuthenticator {
    latency: Duration,
}

impl SimulatedAuthenticator {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for SimulatedAuthenticator {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY)
    }
}

#[async_trait]
impl StepAction for SimulatedAuthenticator {
    async fn run(&self, step_id: &str, data: &WizardData) -> Result<WizardData, ActionError> {
        tokio::time::sleep(self.latency).await;

        // Every selected source counts as connected.
        let connected = data
            .get("sources")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));

        tracing::info!("Simulated {} action finished after {:?}", step_id, self.latency);

        let mut out = WizardData::new();
        out.insert("authenticated".into(), json!(true));
        out.insert("connected_sources".into(), connected);
        out.insert("authenticated_at".into(), json!(Utc::now().to_rfc3339()));
        Ok(out)
    }
}
