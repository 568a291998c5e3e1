//! File-backed progress store
//!
//! One pretty-printed JSON document per session under a directory, the
//! desktop stand-in for browser local storage. Writes go to a temporary
//! file first and are renamed into place so a crash never leaves half a
//! snapshot behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ProgressSnapshot, ProgressStore};
use crate::error::StoreResult;

#[derive(Debug, Clone)]
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file for a session.
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(session_id)))
    }
}

/// Session ids come from the command line. Percent-encode them so every
/// id maps to its own file and none can escape the directory.
fn file_stem(session_id: &str) -> String {
    urlencoding::encode(session_id).into_owned()
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn save(&self, session_id: &str, snapshot: &ProgressSnapshot) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(session_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(snapshot)?;

        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> StoreResult<Option<ProgressSnapshot>> {
        let path = self.path_for(session_id);
        let content = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&content)?))
    }

    async fn clear(&self, session_id: &str) -> StoreResult<()> {
        match tokio::fs::remove_file(self.path_for(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
