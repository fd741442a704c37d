//! ConversationRouter: maps inbound chat events to draft transitions and
//! renders the replies.
//!
//! Every mutating handler runs load → one transition → save while holding a
//! single write lock, so overlapping events can never lose each other's
//! updates. Editing cursors are kept in memory only.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::channels::{
    Button, CallbackAction, Channel, Command, EventKind, InboundEvent, Keyboard,
    MAX_CALLBACK_ID_BYTES, Reply,
};
use crate::config::DocumentPolicy;
use crate::error::{DraftError, Error, Result, StoreError};
use crate::parser::DocumentParser;
use crate::profiles::{EditCursor, ProfileDatabase, ProfileFields, UserRecord, render_fields};
use crate::store::ProfileStore;

const WELCOME_TEXT: &str = "Send me your CV or profile document to begin. \
Use /my_profile to view your latest saved profile and /history to list every saved version.";
const PROCESSING_TEXT: &str = "Your document is being processed. Please wait…";
const REVIEW_TEXT: &str =
    "I extracted the following fields. Use the buttons below to edit or confirm.";
const NO_PROFILE_TEXT: &str = "No saved profiles yet. Send a document to start.";
const PARSE_FAILED_TEXT: &str =
    "I couldn't read that document. Re-parse to try again or discard it.";
const FAILURE_TEXT: &str = "Something went wrong. Please try again.";

/// Buttons shown while a draft is under review: one edit button per field,
/// then re-parse/manual, then confirm/discard.
///
/// Fields whose edit id would exceed [`MAX_CALLBACK_ID_BYTES`] get no button;
/// they stay editable through manual correction.
pub fn review_keyboard(fields: &ProfileFields) -> Keyboard {
    let mut keyboard = Keyboard::new();
    for field in fields.keys() {
        let action = CallbackAction::EditField(field.clone());
        if action.to_string().len() > MAX_CALLBACK_ID_BYTES {
            debug!(field = %field, "Field key too long for an edit button");
            continue;
        }
        keyboard = keyboard.row(vec![Button::new(format!("Edit {field}"), action)]);
    }
    keyboard
        .row(vec![
            Button::new("Re-parse", CallbackAction::Reparse),
            Button::new("Manual correction", CallbackAction::Manual),
        ])
        .row(vec![
            Button::new("Confirm profile", CallbackAction::Confirm),
            Button::new("Discard", CallbackAction::Discard),
        ])
}

/// Buttons shown under the latest saved profile.
pub fn latest_profile_keyboard() -> Keyboard {
    Keyboard::new()
        .row(vec![Button::new(
            "Update (new draft)",
            CallbackAction::StartUpdate,
        )])
        .row(vec![Button::new(
            "Delete profile",
            CallbackAction::DeleteLatest,
        )])
}

/// Buttons offered when extraction failed and the draft is still processing.
fn retry_keyboard() -> Keyboard {
    Keyboard::new().row(vec![
        Button::new("Re-parse", CallbackAction::Reparse),
        Button::new("Discard", CallbackAction::Discard),
    ])
}

fn review_text(heading: &str, fields: &ProfileFields) -> String {
    if fields.is_empty() {
        heading.to_string()
    } else {
        format!("{heading}\n\n{}", render_fields(fields))
    }
}

/// Dispatches chat events for every user of one deployment.
pub struct ConversationRouter {
    store: Arc<dyn ProfileStore>,
    parser: Arc<dyn DocumentParser>,
    policy: DocumentPolicy,
    write_lock: Mutex<()>,
    cursors: RwLock<HashMap<String, EditCursor>>,
}

impl ConversationRouter {
    pub fn new(store: Arc<dyn ProfileStore>, parser: Arc<dyn DocumentParser>) -> Self {
        Self {
            store,
            parser,
            policy: DocumentPolicy::default(),
            write_lock: Mutex::new(()),
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Apply upload limits to submitted documents.
    pub fn with_policy(mut self, policy: DocumentPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The user's current editing cursor, if any.
    pub async fn cursor(&self, user_id: &str) -> Option<EditCursor> {
        self.cursors.read().await.get(user_id).cloned()
    }

    async fn set_cursor(&self, user_id: &str, cursor: EditCursor) {
        self.cursors
            .write()
            .await
            .insert(user_id.to_string(), cursor);
    }

    async fn clear_cursor(&self, user_id: &str) -> Option<EditCursor> {
        self.cursors.write().await.remove(user_id)
    }

    /// Handle one event and return the replies to deliver, in order.
    ///
    /// Conditions the user can fix (no draft, no profile, ...) come back as
    /// replies. Only store and transport failures are returned as errors.
    pub async fn handle(&self, event: &InboundEvent) -> Result<Vec<Reply>> {
        let user_id = event.user_id.as_str();
        let result = match &event.kind {
            EventKind::Command(command) => self.on_command(user_id, command).await,
            EventKind::Document {
                name,
                mime_type,
                size,
            } => {
                self.on_document(user_id, name, mime_type.as_deref(), *size)
                    .await
            }
            EventKind::Button(action) => self.on_button(user_id, action).await,
            EventKind::Text(text) => self.on_text(user_id, text).await,
        };

        match result {
            Err(Error::Draft(err)) => {
                debug!(user_id, error = %err, "Reporting draft condition to user");
                Ok(vec![describe_draft_error(&err, &event.kind)])
            }
            Err(Error::Parser(err)) => {
                warn!(user_id, error = %err, "Document extraction failed");
                Ok(vec![
                    Reply::edit(PARSE_FAILED_TEXT).with_keyboard(retry_keyboard()),
                ])
            }
            other => other,
        }
    }

    /// Process events from `channel` one at a time until the stream ends or
    /// `shutdown` resolves.
    ///
    /// A corrupt store stops the loop; any other per-event failure is logged
    /// and reported to the user.
    pub async fn serve<F>(&self, channel: &dyn Channel, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let mut events = channel.start().await?;
        tokio::pin!(shutdown);
        info!(channel = channel.name(), "Conversation router listening");

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                next = events.next() => match next {
                    Some(event) => event,
                    None => {
                        info!(channel = channel.name(), "Event stream closed");
                        break;
                    }
                },
            };

            let replies = match self.handle(&event).await {
                Ok(replies) => replies,
                Err(Error::Store(err @ StoreError::Corrupt { .. })) => {
                    error!(error = %err, "Profile store is corrupt, stopping");
                    return Err(err.into());
                }
                Err(err) => {
                    error!(user_id = %event.user_id, error = %err, "Failed to handle event");
                    vec![Reply::send(FAILURE_TEXT)]
                }
            };

            if let Err(err) = channel.deliver(&event, replies).await {
                warn!(channel = channel.name(), error = %err, "Failed to deliver replies");
            }
        }

        channel.shutdown().await?;
        Ok(())
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Run one transition inside the write lock. The database is saved only
    /// when the transition succeeds.
    async fn transition<T, F>(&self, user_id: &str, apply: F) -> Result<T>
    where
        F: FnOnce(&mut UserRecord) -> std::result::Result<T, DraftError>,
    {
        let _guard = self.write_lock.lock().await;
        let mut db = self.store.load().await?;
        let value = apply(db.get_or_create_record(user_id))?;
        self.store.save(&db).await?;
        Ok(value)
    }

    /// Re-run extraction for the current draft and move it to review.
    async fn parse_draft(&self, user_id: &str) -> Result<ProfileFields> {
        let _guard = self.write_lock.lock().await;
        let mut db = self.store.load().await?;
        self.extract(&mut db, user_id).await
    }

    /// Parse the draft's source, install the fields and save. The caller
    /// holds the write lock and has loaded `db`.
    async fn extract(&self, db: &mut ProfileDatabase, user_id: &str) -> Result<ProfileFields> {
        let record = db.get_or_create_record(user_id);
        let source_name = record.draft_source()?.to_string();

        let parsed = self.parser.parse(&source_name).await?;
        let fields = record.apply_parsed(parsed)?.fields.clone();
        self.store.save(db).await?;

        info!(
            user_id,
            source_name = %source_name,
            parser = self.parser.name(),
            fields = fields.len(),
            "Draft ready for review"
        );
        Ok(fields)
    }

    /// Snapshot of a user's record without taking the write lock.
    async fn read_record(&self, user_id: &str) -> Result<UserRecord> {
        let db = self.store.load().await?;
        Ok(db.record(user_id).cloned().unwrap_or_default())
    }

    // ── Commands ────────────────────────────────────────────────────

    async fn on_command(&self, user_id: &str, command: &Command) -> Result<Vec<Reply>> {
        match command {
            Command::Start => Ok(vec![Reply::send(WELCOME_TEXT)]),
            Command::MyProfile => {
                let record = self.read_record(user_id).await?;
                let latest = record.latest().ok_or(DraftError::NoProfile)?;
                Ok(vec![
                    Reply::send(format!(
                        "Latest profile (v{}):\n{}",
                        latest.version,
                        render_fields(&latest.fields)
                    ))
                    .with_keyboard(latest_profile_keyboard()),
                ])
            }
            Command::History => {
                let record = self.read_record(user_id).await?;
                if record.profiles.is_empty() {
                    return Err(DraftError::NoProfile.into());
                }
                let lines: Vec<String> = record
                    .profiles
                    .iter()
                    .map(|p| {
                        format!(
                            "v{} (confirmed {})",
                            p.version,
                            p.confirmed_at.format("%Y-%m-%d %H:%M UTC")
                        )
                    })
                    .collect();
                Ok(vec![Reply::send(format!(
                    "Saved versions:\n{}",
                    lines.join("\n")
                ))])
            }
            Command::Done => {
                self.clear_cursor(user_id)
                    .await
                    .ok_or(DraftError::NothingToFinish)?;
                Ok(vec![Reply::send(
                    "Stopped editing. Use the inline buttons to continue.",
                )])
            }
            Command::Unknown(name) => Ok(vec![Reply::send(format!(
                "Unknown command /{name}. Send /start for help."
            ))]),
        }
    }

    // ── Documents ───────────────────────────────────────────────────

    async fn on_document(
        &self,
        user_id: &str,
        name: &str,
        mime_type: Option<&str>,
        size: Option<u64>,
    ) -> Result<Vec<Reply>> {
        if let Some(reason) = self.policy.check(mime_type, size) {
            info!(user_id, source_name = name, reason = %reason, "Document rejected");
            return Ok(vec![Reply::send(reason)]);
        }

        // One load for the whole intake: the processing draft is saved
        // first, then replaced by the extracted fields.
        let _guard = self.write_lock.lock().await;
        let mut db = self.store.load().await?;
        db.get_or_create_record(user_id).begin_draft(name);
        self.store.save(&db).await?;
        self.clear_cursor(user_id).await;
        info!(user_id, source_name = name, "Draft created, processing document");

        let processing = Reply::send(PROCESSING_TEXT);
        let review = match self.extract(&mut db, user_id).await {
            Ok(fields) => Reply::edit(review_text(REVIEW_TEXT, &fields))
                .with_keyboard(review_keyboard(&fields)),
            Err(Error::Parser(err)) => {
                warn!(user_id, error = %err, "Document extraction failed");
                Reply::edit(PARSE_FAILED_TEXT).with_keyboard(retry_keyboard())
            }
            Err(err) => return Err(err),
        };
        Ok(vec![processing, review])
    }

    // ── Buttons ─────────────────────────────────────────────────────

    async fn on_button(&self, user_id: &str, action: &CallbackAction) -> Result<Vec<Reply>> {
        match action {
            CallbackAction::EditField(field) => {
                self.require_draft(user_id).await?;
                self.set_cursor(user_id, EditCursor::Field(field.clone()))
                    .await;
                Ok(vec![Reply::edit(format!("Send the new value for {field}."))])
            }
            CallbackAction::Manual => {
                self.require_draft(user_id).await?;
                self.set_cursor(user_id, EditCursor::Manual).await;
                Ok(vec![Reply::edit(
                    "Send updates as `field: value` lines. When finished, type /done.",
                )])
            }
            CallbackAction::Reparse => {
                let fields = self.parse_draft(user_id).await?;
                Ok(vec![
                    Reply::edit(review_text(
                        "Re-parsed your document. Review the fields again:",
                        &fields,
                    ))
                    .with_keyboard(review_keyboard(&fields)),
                ])
            }
            CallbackAction::Confirm => {
                let version = self
                    .transition(user_id, |record| {
                        record.confirm(Utc::now()).map(|v| v.version)
                    })
                    .await?;
                info!(user_id, version, "Profile confirmed");
                Ok(vec![Reply::edit(format!(
                    "Profile saved as version {version}. Use /my_profile to view or update."
                ))])
            }
            CallbackAction::Discard => {
                let draft = self.transition(user_id, UserRecord::discard).await?;
                info!(user_id, source_name = %draft.source_name, "Draft discarded");
                Ok(vec![Reply::edit("Draft discarded.")])
            }
            CallbackAction::StartUpdate => {
                let fields = self
                    .transition(user_id, |record| {
                        record.start_update().map(|draft| draft.fields.clone())
                    })
                    .await?;
                info!(user_id, "Draft started from latest profile");
                Ok(vec![
                    Reply::edit(review_text(
                        "Started a new draft based on your latest profile.",
                        &fields,
                    ))
                    .with_keyboard(review_keyboard(&fields)),
                ])
            }
            CallbackAction::DeleteLatest => {
                let removed = self.transition(user_id, UserRecord::delete_latest).await?;
                info!(user_id, version = removed.version, "Latest profile deleted");
                Ok(vec![Reply::edit(format!(
                    "Latest profile (v{}) deleted.",
                    removed.version
                ))])
            }
        }
    }

    async fn require_draft(&self, user_id: &str) -> Result<()> {
        let record = self.read_record(user_id).await?;
        record.draft_source()?;
        Ok(())
    }

    // ── Free text ───────────────────────────────────────────────────

    async fn on_text(&self, user_id: &str, text: &str) -> Result<Vec<Reply>> {
        let Some(cursor) = self.cursor(user_id).await else {
            debug!(user_id, "Ignoring free text with no editing cursor");
            return Ok(Vec::new());
        };

        match cursor {
            EditCursor::Manual => {
                let count = self
                    .transition(user_id, |record| record.apply_manual(text))
                    .await?;
                info!(user_id, count, "Manual updates applied");
                Ok(vec![Reply::send(format!(
                    "Applied {count} manual update(s). Send more lines, or /done to finish."
                ))])
            }
            EditCursor::Field(field) => {
                self.transition(user_id, |record| record.edit_field(&field, text))
                    .await?;
                self.clear_cursor(user_id).await;
                info!(user_id, field = %field, "Field updated");
                Ok(vec![Reply::send(format!(
                    "Updated {field}. Return to the buttons above to continue."
                ))])
            }
        }
    }
}

/// User-facing text for a workflow condition, shaped for the triggering event.
fn describe_draft_error(err: &DraftError, kind: &EventKind) -> Reply {
    let text = match (err, kind) {
        (DraftError::NoDraft, EventKind::Button(_)) => {
            "No draft to review. Send a document first.".to_string()
        }
        (DraftError::NoDraft, _) => "No draft in progress.".to_string(),
        (DraftError::NoProfile, EventKind::Button(CallbackAction::DeleteLatest)) => {
            "No profile to delete.".to_string()
        }
        (DraftError::NoProfile, _) => NO_PROFILE_TEXT.to_string(),
        (DraftError::NothingToFinish, _) => "Nothing to finish right now.".to_string(),
        (DraftError::InvalidTransition { from, .. }, _) => {
            format!("Your draft is still {from}. Re-parse it or discard it to start over.")
        }
    };

    match kind {
        EventKind::Button(_) => Reply::edit(text),
        _ => Reply::send(text),
    }
}
