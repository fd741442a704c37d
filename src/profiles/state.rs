//! Draft state machine: which stage a user's draft is in.

use serde::{Deserialize, Serialize};

/// The stages of a draft.
///
/// Progresses Processing → Review → Confirmed. Review loops onto itself for
/// edits and re-parses. A draft that reaches Confirmed is removed from the
/// user record in the same step, so Confirmed is never persisted in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Processing,
    Review,
    Confirmed,
}

impl DraftStatus {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: DraftStatus) -> bool {
        use DraftStatus::*;
        matches!(
            (self, target),
            (Processing, Review) | (Review, Review) | (Review, Confirmed)
        )
    }
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Processing => "processing",
            Self::Review => "review",
            Self::Confirmed => "confirmed",
        };
        write!(f, "{s}")
    }
}

/// What the next free-text message from a user should be applied to.
///
/// Conversation-local and never persisted: a restart forgets every cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCursor {
    /// Replace the value of one field with the whole message.
    Field(String),
    /// Bulk mode: every `key: value` line upserts a field.
    Manual,
}
