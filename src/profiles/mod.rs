//! Profile intake core: drafts under review and confirmed, versioned profiles.
//!
//! A user uploads a document, extracted fields land in a draft, the user
//! edits and confirms it, and each confirmation appends a numbered
//! `ProfileVersion` to that user's record.

pub mod machine;
pub mod model;
pub mod state;

pub use machine::parse_manual_lines;
pub use model::{
    Draft, MANUAL_UPDATE_SOURCE, ProfileDatabase, ProfileFields, ProfileVersion, UserRecord,
    field_label, render_fields,
};
pub use state::{DraftStatus, EditCursor};
