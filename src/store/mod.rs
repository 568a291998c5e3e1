//! Progress Store
//!
//! The persistence port the wizard uses to make a session resumable, plus
//! the backends shipped with the crate.
//!
//! Saving is best-effort: a failing store is logged and otherwise ignored,
//! the wizard keeps working as if persistence were absent.

pub mod file;
pub mod memory;
pub mod sqlite;
pub mod writer;

pub use file::FileProgressStore;
pub use memory::InMemoryProgressStore;
pub use sqlite::SqliteProgressStore;
pub use writer::ProgressWriter;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StoreResult;
use crate::wizard::{WizardData, WizardState};

/// Persisted copy of a session, sufficient to resume it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub session_id: String,
    pub step_index: usize,
    /// Older records lack this; `restore` falls back to `step_index`.
    #[serde(default)]
    pub max_visited_index: usize,
    pub data: WizardData,
    pub timestamp: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn capture(session_id: &str, state: &WizardState) -> Self {
        Self {
            session_id: session_id.to_string(),
            step_index: state.current_step_index,
            max_visited_index: state.max_visited_index,
            data: state.data.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Key-value persistence of progress snapshots, keyed by session.
///
/// Last write wins; implementations need no merge logic.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn save(&self, session_id: &str, snapshot: &ProgressSnapshot) -> StoreResult<()>;

    async fn load(&self, session_id: &str) -> StoreResult<Option<ProgressSnapshot>>;

    async fn clear(&self, session_id: &str) -> StoreResult<()>;

    /// Short backend name for log lines
    fn name(&self) -> &'static str;
}

/// Build the store selected in configuration.
pub async fn open(config: &StorageConfig) -> anyhow::Result<Arc<dyn ProgressStore>> {
    let path = config.resolved_path();
    let store: Arc<dyn ProgressStore> = match config.backend {
        StorageBackend::Memory => Arc::new(InMemoryProgressStore::new()),
        StorageBackend::File => Arc::new(FileProgressStore::new(&path)),
        StorageBackend::Sqlite => Arc::new(SqliteProgressStore::connect(&path).await?),
    };
    tracing::debug!("Progress store: {} ({})", store.name(), path.display());
    Ok(store)
}
