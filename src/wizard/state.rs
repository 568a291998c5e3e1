//! Wizard state and the read-only view handed to renderers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::step::{ActionTrigger, Step};
use super::WizardData;
use crate::error::ActionError;
use crate::store::ProgressSnapshot;

/// Overall lifecycle of a wizard session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// Mutable state of an active session. Only the controller holds one.
#[derive(Debug, Clone, PartialEq)]
pub struct WizardState {
    pub current_step_index: usize,
    pub max_visited_index: usize,
    pub data: WizardData,
    pub busy: bool,
    pub status: WizardStatus,
    /// Most recent action failure, cleared when the next attempt starts.
    pub last_error: Option<ActionError>,
}

impl WizardState {
    pub fn new(defaults: WizardData) -> Self {
        Self {
            current_step_index: 0,
            max_visited_index: 0,
            data: defaults,
            busy: false,
            status: WizardStatus::InProgress,
            last_error: None,
        }
    }

    pub fn select(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Add `value` to the array at `key`, or remove it if already present.
    /// Returns whether the value is present afterwards.
    pub fn toggle(&mut self, key: &str, value: Value) -> bool {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        let Value::Array(items) = entry else {
            return false;
        };
        if let Some(pos) = items.iter().position(|v| *v == value) {
            items.remove(pos);
            false
        } else {
            items.push(value);
            true
        }
    }

    pub fn merge(&mut self, fields: WizardData) {
        self.data.extend(fields);
    }

    pub fn step_forward(&mut self) {
        self.current_step_index += 1;
        self.max_visited_index = self.max_visited_index.max(self.current_step_index);
    }

    pub fn step_back(&mut self) {
        self.current_step_index = self.current_step_index.saturating_sub(1);
    }

    pub fn jump(&mut self, index: usize) {
        self.current_step_index = index;
    }

    /// Restore position and data from a persisted snapshot.
    ///
    /// Snapshot data is layered over whatever is already present (the
    /// registry defaults) so newly added defaults survive old records.
    pub fn restore(&mut self, snapshot: &ProgressSnapshot) {
        self.current_step_index = snapshot.step_index;
        self.max_visited_index = snapshot.max_visited_index.max(snapshot.step_index);
        self.merge(snapshot.data.clone());
        self.last_error = None;
    }
}

/// Descriptor of the active step as seen by a renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepInfo {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub action: Option<ActionTrigger>,
}

impl From<&Step> for StepInfo {
    fn from(step: &Step) -> Self {
        Self {
            id: step.id().to_string(),
            title: step.title().to_string(),
            subtitle: step.subtitle().to_string(),
            action: step.action(),
        }
    }
}

/// Immutable snapshot of the wizard for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardView {
    pub status: WizardStatus,
    pub current_step_index: usize,
    pub max_visited_index: usize,
    pub step_count: usize,
    pub step: StepInfo,
    pub can_advance: bool,
    pub can_retreat: bool,
    pub busy: bool,
    pub data: WizardData,
    pub last_error: Option<String>,
    pub resume_offer: Option<ProgressSnapshot>,
}

impl WizardView {
    pub fn is_last_step(&self) -> bool {
        self.current_step_index + 1 == self.step_count
    }

    /// String items of the array at `key`, empty if absent.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.data
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_new_state() {
        let state = WizardState::new(WizardData::new());
        assert_eq!(state.current_step_index, 0);
        assert_eq!(state.max_visited_index, 0);
        assert_eq!(state.status, WizardStatus::InProgress);
        assert!(!state.busy);
    }

    #[test]
    fn test_high_water_mark_only_grows() {
        let mut state = WizardState::new(WizardData::new());
        state.step_forward();
        state.step_forward();
        assert_eq!(state.max_visited_index, 2);
        state.step_back();
        assert_eq!(state.current_step_index, 1);
        assert_eq!(state.max_visited_index, 2);
        state.jump(0);
        state.step_forward();
        assert_eq!(state.max_visited_index, 2);
    }

    #[test]
    fn test_step_back_saturates() {
        let mut state = WizardState::new(WizardData::new());
        state.step_back();
        assert_eq!(state.current_step_index, 0);
    }

    #[test]
    fn test_toggle() {
        let mut state = WizardState::new(WizardData::new());
        assert!(state.toggle("sources", json!("stripe")));
        assert!(state.toggle("sources", json!("paddle")));
        assert_eq!(state.data["sources"], json!(["stripe", "paddle"]));
        assert!(!state.toggle("sources", json!("stripe")));
        assert_eq!(state.data["sources"], json!(["paddle"]));
    }

    #[test]
    fn test_toggle_replaces_scalar() {
        let mut state = WizardState::new(WizardData::new());
        state.select("sources", json!("oops"));
        assert!(state.toggle("sources", json!("stripe")));
        assert_eq!(state.data["sources"], json!(["stripe"]));
    }

    #[test]
    fn test_restore_layers_over_defaults() {
        let mut defaults = WizardData::new();
        defaults.insert("template".into(), json!("comprehensive"));
        defaults.insert("priority".into(), json!("mrr-based"));
        let mut state = WizardState::new(defaults);

        let mut saved = WizardData::new();
        saved.insert("priority".into(), json!("churn-risk"));
        let snapshot = ProgressSnapshot {
            session_id: "s".into(),
            step_index: 2,
            max_visited_index: 0,
            data: saved,
            timestamp: Utc::now(),
        };
        state.restore(&snapshot);

        assert_eq!(state.current_step_index, 2);
        assert_eq!(state.max_visited_index, 2);
        assert_eq!(state.data["template"], json!("comprehensive"));
        assert_eq!(state.data["priority"], json!("churn-risk"));
    }
}
