//! SQLx-backed progress store
//!
//! Keeps every session's latest snapshot in a single `wizard_progress`
//! table, one row per session. The snapshot body is stored as JSON text so
//! the schema does not follow the shape of the collected data.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use super::{ProgressSnapshot, ProgressStore};
use crate::error::StoreResult;

#[derive(Clone)]
pub struct SqliteProgressStore {
    pool: SqlitePool,
}

impl SqliteProgressStore {
    /// Open (or create) the database at the given path.
    pub async fn connect(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// In-memory database, for tests.
    pub async fn in_memory() -> StoreResult<Self> {
        // A single connection, otherwise every pooled connection gets its own
        // empty in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wizard_progress (
                session_id  TEXT PRIMARY KEY,
                step_index  INTEGER NOT NULL,
                snapshot    TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Timestamp of the latest save for a session.
    pub async fn updated_at(&self, session_id: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT updated_at FROM wizard_progress WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(|r| r.try_get::<DateTime<Utc>, _>("updated_at"))
            .transpose()?)
    }
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn save(&self, session_id: &str, snapshot: &ProgressSnapshot) -> StoreResult<()> {
        let body = serde_json::to_string(snapshot)?;
        sqlx::query(
            r#"
            INSERT INTO wizard_progress (session_id, step_index, snapshot, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                step_index = excluded.step_index,
                snapshot   = excluded.snapshot,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session_id)
        .bind(snapshot.step_index as i64)
        .bind(body)
        .bind(snapshot.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> StoreResult<Option<ProgressSnapshot>> {
        let row = sqlx::query("SELECT snapshot FROM wizard_progress WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.try_get("snapshot")?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn clear(&self, session_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM wizard_progress WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
