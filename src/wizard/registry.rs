//! Ordered, immutable step registry.

use std::sync::Arc;

use super::step::Step;
use super::WizardData;
use crate::error::WizardError;

/// The steps of a wizard, in order, plus the data seeded at `start()`.
///
/// Cloning is cheap; all clones share the same step list.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Arc<[Step]>,
    defaults: Arc<WizardData>,
}

impl StepRegistry {
    pub fn new(steps: Vec<Step>) -> Result<Self, WizardError> {
        if steps.is_empty() {
            return Err(WizardError::EmptyRegistry);
        }
        Ok(Self {
            steps: steps.into(),
            defaults: Arc::new(WizardData::new()),
        })
    }

    /// Values present in `data` before the user selects anything.
    pub fn with_defaults(mut self, defaults: WizardData) -> Self {
        self.defaults = Arc::new(defaults);
        self
    }

    pub fn defaults(&self) -> &WizardData {
        &self.defaults
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn last_index(&self) -> usize {
        self.steps.len() - 1
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id() == id)
    }

    /// Whether `data` satisfies the step's validator (no validator = pass).
    pub fn can_advance(&self, step: &Step, data: &WizardData) -> bool {
        step.validate(data)
    }
}
