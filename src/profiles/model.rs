//! Profile data model: drafts, confirmed versions, and the per-user record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::state::DraftStatus;

/// Field name → value, kept in insertion order.
pub type ProfileFields = IndexMap<String, String>;

/// Source name recorded on drafts started from a saved profile rather than a document.
pub const MANUAL_UPDATE_SOURCE: &str = "manual_update";

/// A user's in-progress, unconfirmed profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub status: DraftStatus,
    /// Name of the uploaded artifact. Older data files call this `file_name`.
    #[serde(alias = "file_name")]
    pub source_name: String,
    #[serde(default)]
    pub fields: ProfileFields,
}

impl Draft {
    /// A freshly submitted document waiting for extraction.
    pub fn processing(source_name: impl Into<String>) -> Self {
        Self {
            status: DraftStatus::Processing,
            source_name: source_name.into(),
            fields: ProfileFields::new(),
        }
    }
}

/// An immutable, numbered snapshot of confirmed fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileVersion {
    pub version: u32,
    pub confirmed_at: DateTime<Utc>,
    pub fields: ProfileFields,
}

/// Everything stored for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub draft: Option<Draft>,
    /// Oldest first; `profiles[i].version == i + 1`.
    #[serde(default)]
    pub profiles: Vec<ProfileVersion>,
}

impl UserRecord {
    /// The most recently confirmed version, if any.
    pub fn latest(&self) -> Option<&ProfileVersion> {
        self.profiles.last()
    }
}

/// The whole persisted state: user id → record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileDatabase {
    users: BTreeMap<String, UserRecord>,
}

impl ProfileDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing record for `user_id`, or a fresh empty one inserted in place.
    pub fn get_or_create_record(&mut self, user_id: &str) -> &mut UserRecord {
        self.users.entry(user_id.to_string()).or_default()
    }

    pub fn record(&self, user_id: &str) -> Option<&UserRecord> {
        self.users.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Display label for a field key: first character upper-cased, the rest
/// lower-cased.
pub fn field_label(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Render fields as `Label: value` lines in field order.
pub fn render_fields(fields: &ProfileFields) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{}: {}", field_label(key), value))
        .collect::<Vec<_>>()
        .join("\n")
}
