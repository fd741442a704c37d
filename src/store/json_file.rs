//! JSON file store: the whole database lives in one human-readable file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::profiles::ProfileDatabase;

use super::traits::ProfileStore;

/// File-backed profile store.
///
/// Saves go to a uniquely named sibling temp file which is then renamed over
/// the target, so the file on disk is always a complete document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store for `path` without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store and check that any existing file parses.
    ///
    /// A corrupt file is reported here so the process can refuse to start.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(path);
        let db = store.load().await?;
        info!(
            path = %store.path.display(),
            users = db.len(),
            "Profile store opened"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("profiles.json");
        self.path
            .with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()))
    }
}

#[async_trait]
impl ProfileStore for JsonFileStore {
    async fn load(&self) -> Result<ProfileDatabase, StoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No profile file yet, starting empty");
                return Ok(ProfileDatabase::new());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, db: &ProfileDatabase) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(db)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.temp_path();
        fs::write(&tmp, json).await?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), users = db.len(), "Profile store saved");
        Ok(())
    }
}
