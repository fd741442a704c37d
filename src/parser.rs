//! Document parsing: turns a submitted file into draft profile fields.
//!
//! [`DocumentParser`] is the seam for a real extraction engine. The bundled
//! [`FilenameParser`] derives deterministic placeholder fields from the file
//! name alone.

use std::path::Path;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::error::ParserError;
use crate::profiles::ProfileFields;

/// Placeholder phone number emitted by [`FilenameParser`].
pub const PLACEHOLDER_PHONE: &str = "+1-555-0100";

/// Extracts profile fields from a submitted document.
///
/// Called when a draft is created and again on every re-parse; the result
/// always replaces the draft's whole field set.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parser identifier, used in logs and errors.
    fn name(&self) -> &str;

    /// Extract fields for the document identified by `source_name`.
    async fn parse(&self, source_name: &str) -> Result<ProfileFields, ParserError>;
}

/// Stub parser that derives fields from the file name.
#[derive(Debug, Clone, Default)]
pub struct FilenameParser {
    date: Option<NaiveDate>,
}

impl FilenameParser {
    /// Parser stamping summaries with the current UTC date.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser stamping summaries with a fixed date.
    pub fn with_date(date: NaiveDate) -> Self {
        Self { date: Some(date) }
    }

    fn today(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Synchronous core of [`DocumentParser::parse`].
    pub fn fields_for(&self, source_name: &str) -> ProfileFields {
        let stem = Path::new(source_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        let display_name = stem.replace('_', " ");
        let full_name = if display_name.trim().is_empty() {
            "Unknown".to_string()
        } else {
            display_name
        };
        let local_part = if stem.is_empty() {
            "unknown".to_string()
        } else {
            stem.to_lowercase()
        };
        let date = self.today().format("%Y-%m-%d");

        let mut fields = ProfileFields::new();
        fields.insert("full_name".into(), full_name);
        fields.insert("email".into(), format!("{local_part}@example.com"));
        fields.insert("phone".into(), PLACEHOLDER_PHONE.into());
        fields.insert(
            "summary".into(),
            format!("Parsed from {source_name} on {date}."),
        );
        fields
    }
}

#[async_trait]
impl DocumentParser for FilenameParser {
    fn name(&self) -> &str {
        "filename"
    }

    async fn parse(&self, source_name: &str) -> Result<ProfileFields, ParserError> {
        Ok(self.fields_for(source_name))
    }
}
