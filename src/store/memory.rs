//! In-memory progress store for tests and throwaway runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{ProgressSnapshot, ProgressStore};
use crate::error::StoreResult;

#[derive(Debug, Clone, Default)]
pub struct InMemoryProgressStore {
    snapshots: Arc<Mutex<HashMap<String, ProgressSnapshot>>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Synchronous peek, handy in assertions.
    pub fn get(&self, session_id: &str) -> Option<ProgressSnapshot> {
        self.lock().get(session_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProgressSnapshot>> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn save(&self, session_id: &str, snapshot: &ProgressSnapshot) -> StoreResult<()> {
        self.lock()
            .insert(session_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> StoreResult<Option<ProgressSnapshot>> {
        Ok(self.get(session_id))
    }

    async fn clear(&self, session_id: &str) -> StoreResult<()> {
        self.lock().remove(session_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
