//! In-memory store, for tests and throwaway sessions.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::profiles::ProfileDatabase;

use super::traits::ProfileStore;

/// Keeps the database in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    db: RwLock<ProfileDatabase>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `db`.
    pub fn with_database(db: ProfileDatabase) -> Self {
        Self {
            db: RwLock::new(db),
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn load(&self) -> Result<ProfileDatabase, StoreError> {
        Ok(self.db.read().await.clone())
    }

    async fn save(&self, db: &ProfileDatabase) -> Result<(), StoreError> {
        *self.db.write().await = db.clone();
        Ok(())
    }
}
