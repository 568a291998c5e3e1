//! Network-bound step action
//!
//! POSTs `{ "step_id": ..., "data": {...} }` to a configured endpoint. A 2xx
//! response whose body is a JSON object is merged into the wizard data; any
//! other status is a recoverable rejection.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::StepAction;
use crate::error::ActionError;
use crate::utils::truncate_str;
use crate::wizard::WizardData;

/// Longest error body quoted back to the user
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpStepAction {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct ActionRequest<'a> {
    step_id: &'a str,
    data: &'a WizardData,
}

impl HttpStepAction {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("stepwise/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StepAction for HttpStepAction {
    async fn run(&self, step_id: &str, data: &WizardData) -> Result<WizardData, ActionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ActionRequest { step_id, data })
            .send()
            .await
            .map_err(|e| ActionError::Transport {
                step_id: step_id.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ActionError::Rejected {
                step_id: step_id.to_string(),
                status: status.as_u16(),
                message: truncate_str(body.trim(), MAX_ERROR_BODY).to_string(),
            });
        }

        let body = response.text().await.map_err(|e| ActionError::Transport {
            step_id: step_id.to_string(),
            message: e.to_string(),
        })?;

        tracing::info!("{} action accepted by {} ({})", step_id, self.endpoint, status);

        // Empty or non-object bodies just mean "ok, nothing to add".
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(fields)) => Ok(fields),
            _ => Ok(WizardData::new()),
        }
    }
}
