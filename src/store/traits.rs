//! `ProfileStore` trait: whole-document persistence for the profile database.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::profiles::ProfileDatabase;

/// Backend-agnostic store for the profile database.
///
/// The database is always read and written as a single unit. Callers that
/// mutate it must serialize their load/save pairs; the store itself only
/// guarantees that a reader never sees a half-written document.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Read the whole database. Returns an empty database on first run.
    async fn load(&self) -> Result<ProfileDatabase, StoreError>;

    /// Replace the whole persisted database.
    async fn save(&self, db: &ProfileDatabase) -> Result<(), StoreError>;
}
