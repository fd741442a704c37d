//! Draft transitions applied to a single user record.
//!
//! Every operation either mutates the record and returns `Ok`, or leaves it
//! exactly as it was and returns a [`DraftError`] for the user.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::DraftError;

use super::model::{Draft, MANUAL_UPDATE_SOURCE, ProfileFields, ProfileVersion, UserRecord};
use super::state::DraftStatus;

/// Split a bulk edit message into `(key, value)` pairs.
///
/// Each line must contain a `:`; key and value are trimmed. Lines without a
/// separator, or with an empty key, are skipped.
pub fn parse_manual_lines(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

impl UserRecord {
    /// Start a new draft for a submitted document, replacing any prior draft.
    pub fn begin_draft(&mut self, source_name: impl Into<String>) -> &Draft {
        self.draft.insert(Draft::processing(source_name))
    }

    /// Source name of the current draft, used to re-run extraction.
    pub fn draft_source(&self) -> Result<&str, DraftError> {
        self.draft
            .as_ref()
            .map(|d| d.source_name.as_str())
            .ok_or(DraftError::NoDraft)
    }

    /// Install freshly extracted fields and move the draft to review.
    ///
    /// Used both after the initial parse and on re-parse; the previous fields
    /// are discarded entirely.
    pub fn apply_parsed(&mut self, fields: ProfileFields) -> Result<&Draft, DraftError> {
        let draft = self.draft.as_mut().ok_or(DraftError::NoDraft)?;
        if !draft.status.can_transition_to(DraftStatus::Review) {
            return Err(DraftError::InvalidTransition {
                from: draft.status,
                to: DraftStatus::Review,
            });
        }
        draft.status = DraftStatus::Review;
        draft.fields = fields;
        Ok(draft)
    }

    /// Set one field of the draft under review.
    pub fn edit_field(&mut self, field: &str, value: &str) -> Result<(), DraftError> {
        let draft = self.reviewable_draft()?;
        draft.fields.insert(field.to_string(), value.to_string());
        Ok(())
    }

    /// Apply a bulk `key: value` message. Returns how many fields were upserted.
    pub fn apply_manual(&mut self, text: &str) -> Result<usize, DraftError> {
        let draft = self.reviewable_draft()?;
        let updates = parse_manual_lines(text);
        let count = updates.len();
        for (key, value) in updates {
            draft.fields.insert(key, value);
        }
        debug!(count, "Applied manual field updates");
        Ok(count)
    }

    /// Snapshot the draft into a new version and clear the draft.
    ///
    /// The version number is the new length of the profile list, so a number
    /// freed by [`UserRecord::delete_latest`] is handed out again.
    pub fn confirm(&mut self, confirmed_at: DateTime<Utc>) -> Result<&ProfileVersion, DraftError> {
        let draft = self.draft.as_mut().ok_or(DraftError::NoDraft)?;
        if !draft.status.can_transition_to(DraftStatus::Confirmed) {
            return Err(DraftError::InvalidTransition {
                from: draft.status,
                to: DraftStatus::Confirmed,
            });
        }
        draft.status = DraftStatus::Confirmed;
        let fields = std::mem::take(&mut draft.fields);
        self.draft = None;

        let version = self.profiles.len() as u32 + 1;
        self.profiles.push(ProfileVersion {
            version,
            confirmed_at,
            fields,
        });
        Ok(&self.profiles[self.profiles.len() - 1])
    }

    /// Drop the draft without saving anything.
    pub fn discard(&mut self) -> Result<Draft, DraftError> {
        self.draft.take().ok_or(DraftError::NoDraft)
    }

    /// Open a review draft seeded from the latest confirmed version.
    pub fn start_update(&mut self) -> Result<&Draft, DraftError> {
        let fields = self.latest().ok_or(DraftError::NoProfile)?.fields.clone();
        Ok(self.draft.insert(Draft {
            status: DraftStatus::Review,
            source_name: MANUAL_UPDATE_SOURCE.to_string(),
            fields,
        }))
    }

    /// Remove the most recent confirmed version.
    pub fn delete_latest(&mut self) -> Result<ProfileVersion, DraftError> {
        self.profiles.pop().ok_or(DraftError::NoProfile)
    }

    fn reviewable_draft(&mut self) -> Result<&mut Draft, DraftError> {
        let draft = self.draft.as_mut().ok_or(DraftError::NoDraft)?;
        if draft.status != DraftStatus::Review {
            return Err(DraftError::InvalidTransition {
                from: draft.status,
                to: DraftStatus::Review,
            });
        }
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> ProfileFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn record_in_review(pairs: &[(&str, &str)]) -> UserRecord {
        let mut record = UserRecord::default();
        record.begin_draft("cv.pdf");
        record.apply_parsed(fields(pairs)).unwrap();
        record
    }

    #[test]
    fn begin_draft_starts_processing_with_no_fields() {
        let mut record = UserRecord::default();
        let draft = record.begin_draft("cv.pdf");
        assert_eq!(draft.status, DraftStatus::Processing);
        assert_eq!(draft.source_name, "cv.pdf");
        assert!(draft.fields.is_empty());
    }

    #[test]
    fn begin_draft_replaces_existing_draft() {
        let mut record = record_in_review(&[("full_name", "Old")]);
        record.begin_draft("new.pdf");
        let draft = record.draft.as_ref().unwrap();
        assert_eq!(draft.source_name, "new.pdf");
        assert!(draft.fields.is_empty());
    }

    #[test]
    fn apply_parsed_moves_to_review() {
        let record = record_in_review(&[("full_name", "Ada")]);
        let draft = record.draft.as_ref().unwrap();
        assert_eq!(draft.status, DraftStatus::Review);
        assert_eq!(draft.fields["full_name"], "Ada");
    }

    #[test]
    fn reparse_replaces_rather_than_merges() {
        let mut record = record_in_review(&[("full_name", "Ada"), ("extra", "kept?")]);
        record.edit_field("email", "ada@example.com").unwrap();

        record.apply_parsed(fields(&[("full_name", "Fresh")])).unwrap();

        let draft = record.draft.as_ref().unwrap();
        assert_eq!(draft.fields, fields(&[("full_name", "Fresh")]));
    }

    #[test]
    fn edit_field_sets_value() {
        let mut record = record_in_review(&[("phone", "+1-555-0100")]);
        record.edit_field("phone", "+44 20 7946 0000").unwrap();
        assert_eq!(record.draft.unwrap().fields["phone"], "+44 20 7946 0000");
    }

    #[test]
    fn manual_edit_skips_lines_without_separator() {
        let mut record = record_in_review(&[("full_name", "x"), ("email", "y"), ("phone", "z")]);
        let text = "name: Ada Lovelace\ngarbage\nemail: a@b.com";

        let count = record.apply_manual(text).unwrap();

        assert_eq!(count, 2);
        let draft = record.draft.unwrap();
        assert_eq!(draft.fields["name"], "Ada Lovelace");
        assert_eq!(draft.fields["email"], "a@b.com");
        assert_eq!(draft.fields["phone"], "z");
        assert_eq!(draft.fields["full_name"], "x");
        assert_eq!(draft.fields.len(), 4);
    }

    #[test]
    fn manual_lines_are_trimmed_and_split_on_first_colon() {
        let parsed = parse_manual_lines("  website :  https://ada.dev  \n: orphan\n\n");
        assert_eq!(
            parsed,
            vec![("website".to_string(), "https://ada.dev".to_string())]
        );
    }

    #[test]
    fn confirm_appends_next_version_and_clears_draft() {
        let mut record = record_in_review(&[("full_name", "Ada")]);
        let now = Utc::now();

        let version = record.confirm(now).unwrap();
        assert_eq!(version.version, 1);
        assert_eq!(version.confirmed_at, now);
        assert_eq!(version.fields, fields(&[("full_name", "Ada")]));
        assert!(record.draft.is_none());

        record.begin_draft("second.pdf");
        record.apply_parsed(fields(&[("full_name", "Ada L.")])).unwrap();
        assert_eq!(record.confirm(now).unwrap().version, 2);
        for (i, profile) in record.profiles.iter().enumerate() {
            assert_eq!(profile.version as usize, i + 1);
        }
    }

    #[test]
    fn confirm_requires_review() {
        let mut record = UserRecord::default();
        record.begin_draft("cv.pdf");
        let before = record.clone();

        let err = record.confirm(Utc::now()).unwrap_err();
        assert_eq!(
            err,
            DraftError::InvalidTransition {
                from: DraftStatus::Processing,
                to: DraftStatus::Confirmed,
            }
        );
        assert_eq!(record, before);
    }

    #[test]
    fn delete_then_confirm_reuses_version_number() {
        let mut record = UserRecord::default();
        for name in ["a", "b", "c"] {
            record.begin_draft(format!("{name}.pdf"));
            record.apply_parsed(fields(&[("full_name", name)])).unwrap();
            record.confirm(Utc::now()).unwrap();
        }

        let removed = record.delete_latest().unwrap();
        assert_eq!(removed.version, 3);
        assert_eq!(record.profiles.len(), 2);
        assert_eq!(record.latest().unwrap().version, 2);

        record.begin_draft("d.pdf");
        record.apply_parsed(fields(&[("full_name", "d")])).unwrap();
        assert_eq!(record.confirm(Utc::now()).unwrap().version, 3);
    }

    #[test]
    fn start_update_copies_latest_fields_independently() {
        let mut record = UserRecord::default();
        record.begin_draft("one.pdf");
        record.apply_parsed(fields(&[("x", "0")])).unwrap();
        record.confirm(Utc::now()).unwrap();
        record.begin_draft("two.pdf");
        record.apply_parsed(fields(&[("x", "1")])).unwrap();
        record.confirm(Utc::now()).unwrap();

        let draft = record.start_update().unwrap();
        assert_eq!(draft.status, DraftStatus::Review);
        assert_eq!(draft.source_name, MANUAL_UPDATE_SOURCE);
        assert_eq!(draft.fields, fields(&[("x", "1")]));

        record.edit_field("x", "changed").unwrap();
        assert_eq!(record.profiles[1].fields["x"], "1");
        assert_eq!(record.draft.unwrap().fields["x"], "changed");
    }

    #[test]
    fn start_update_without_profile_reports_no_profile() {
        let mut record = UserRecord::default();
        assert_eq!(record.start_update().unwrap_err(), DraftError::NoProfile);
        assert_eq!(record, UserRecord::default());
    }

    #[test]
    fn delete_without_profile_reports_no_profile() {
        let mut record = UserRecord::default();
        assert_eq!(record.delete_latest().unwrap_err(), DraftError::NoProfile);
    }

    #[test]
    fn actions_without_draft_leave_record_unchanged() {
        let mut record = UserRecord::default();
        record.begin_draft("x.pdf");
        record.apply_parsed(fields(&[("k", "v")])).unwrap();
        record.confirm(Utc::now()).unwrap();
        let before = record.clone();

        assert_eq!(record.edit_field("k", "w").unwrap_err(), DraftError::NoDraft);
        assert_eq!(record.apply_manual("k: w").unwrap_err(), DraftError::NoDraft);
        assert_eq!(record.confirm(Utc::now()).unwrap_err(), DraftError::NoDraft);
        assert_eq!(record.discard().unwrap_err(), DraftError::NoDraft);
        assert_eq!(record.draft_source().unwrap_err(), DraftError::NoDraft);
        assert_eq!(
            record.apply_parsed(fields(&[("k", "z")])).unwrap_err(),
            DraftError::NoDraft
        );

        assert_eq!(record, before);
    }

    #[test]
    fn discard_clears_without_versioning() {
        let mut record = record_in_review(&[("k", "v")]);
        let dropped = record.discard().unwrap();
        assert_eq!(dropped.source_name, "cv.pdf");
        assert!(record.draft.is_none());
        assert!(record.profiles.is_empty());
    }
}
