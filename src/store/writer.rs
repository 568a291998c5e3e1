//! Background progress writer
//!
//! Transitions hand snapshots to a single writer task instead of awaiting
//! the store, so persistence never delays the user-visible state change.
//! Funnelling every write through one task also keeps last-write-wins
//! ordering on a multi-threaded runtime.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::{ProgressSnapshot, ProgressStore};

enum WriteCommand {
    Save(ProgressSnapshot),
    Clear(String),
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer task. The task exits once every handle is dropped.
#[derive(Clone)]
pub struct ProgressWriter {
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl ProgressWriter {
    /// Spawn the writer task on the current tokio runtime.
    pub fn spawn(store: Arc<dyn ProgressStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteCommand>();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    WriteCommand::Save(snapshot) => {
                        if let Err(e) = store.save(&snapshot.session_id, &snapshot).await {
                            tracing::warn!(
                                "Failed to save progress for session {} ({} store): {}",
                                snapshot.session_id,
                                store.name(),
                                e
                            );
                        } else {
                            tracing::debug!(
                                "Saved progress for session {} at step {}",
                                snapshot.session_id,
                                snapshot.step_index
                            );
                        }
                    }
                    WriteCommand::Clear(session_id) => {
                        if let Err(e) = store.clear(&session_id).await {
                            tracing::warn!(
                                "Failed to clear progress for session {} ({} store): {}",
                                session_id,
                                store.name(),
                                e
                            );
                        }
                    }
                    WriteCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("Progress writer stopped");
        });

        Self { tx }
    }

    /// Queue a save. Never waits.
    pub fn save(&self, snapshot: ProgressSnapshot) {
        if self.tx.send(WriteCommand::Save(snapshot)).is_err() {
            tracing::warn!("Progress writer is gone; snapshot dropped");
        }
    }

    /// Queue removal of a session's snapshot. Never waits.
    pub fn clear(&self, session_id: &str) {
        if self
            .tx
            .send(WriteCommand::Clear(session_id.to_string()))
            .is_err()
        {
            tracing::warn!("Progress writer is gone; clear dropped");
        }
    }

    /// Wait until every command queued so far has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}
