//! Telegram channel: long-polls the Bot API for messages and button presses.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::channels::{
    CallbackAction, Channel, Command, EventKind, EventStream, InboundEvent, Keyboard, Reply,
    ReplyMode,
};
use crate::config::TelegramConfig;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Pause after a failed poll when the API gives no `retry_after`.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Attempts per outbound call when the API asks us to slow down.
const MAX_SEND_ATTEMPTS: usize = 3;

/// Display name used when an uploaded document carries no file name.
const FALLBACK_DOCUMENT_NAME: &str = "uploaded_file";

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token,
            allowed_users: config.allowed_users,
            poll_timeout_secs: config.poll_timeout_secs,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// POST a Bot API method and return its `result` payload.
    ///
    /// A flood-control reply (`parameters.retry_after`) is retried after the
    /// requested pause, up to [`MAX_SEND_ATTEMPTS`] times.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let mut attempt = 1;
        loop {
            let resp = self
                .client
                .post(self.api_url(method))
                .json(body)
                .send()
                .await
                .map_err(|e| ChannelError::SendFailed {
                    name: "telegram".into(),
                    reason: e.without_url().to_string(),
                })?;

            let status = resp.status();
            let data: Value = resp
                .json()
                .await
                .map_err(|e| ChannelError::Http(format!("{method}: {}", e.without_url())))?;

            let Some(description) = api_error_description(&data) else {
                return Ok(data.get("result").cloned().unwrap_or(Value::Null));
            };

            if let Some(delay) = retry_after(&data)
                && attempt < MAX_SEND_ATTEMPTS
            {
                tracing::warn!(
                    method,
                    retry_after_secs = delay.as_secs(),
                    "Telegram rate limited, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} returned {status}: {description}"),
            });
        }
    }

    /// Send a new message, splitting text over the length limit. The
    /// keyboard goes on the last chunk. Returns the id of the last message.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<Option<i64>, ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);
        let mut message_id = None;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = json!({ "chat_id": chat_id, "text": chunk });
            if i == last
                && let Some(keyboard) = keyboard
            {
                body["reply_markup"] = inline_keyboard_markup(keyboard);
            }
            let result = self.call("sendMessage", &body).await?;
            message_id = result.get("message_id").and_then(Value::as_i64);
        }
        Ok(message_id)
    }

    /// Replace the text and buttons of an existing message. A reply without a
    /// keyboard removes the old buttons.
    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: i64,
        reply: &Reply,
    ) -> Result<(), ChannelError> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": reply.text,
        });
        if let Some(keyboard) = &reply.keyboard {
            body["reply_markup"] = inline_keyboard_markup(keyboard);
        }
        self.call("editMessageText", &body).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_query_id: &str) {
        let body = json!({ "callback_query_id": callback_query_id });
        if let Err(e) = self.call("answerCallbackQuery", &body).await {
            tracing::warn!("Telegram answerCallbackQuery failed: {e}");
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();
        let timeout = self.poll_timeout_secs;

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": timeout,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {}", e.without_url());
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {}", e.without_url());
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                if let Some(description) = api_error_description(&data) {
                    tracing::warn!("Telegram getUpdates failed: {description}");
                    tokio::time::sleep(retry_after(&data).unwrap_or(POLL_ERROR_BACKOFF)).await;
                    continue;
                }

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(event) = parse_update(update, &allowed_users) else {
                        continue;
                    };

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn deliver(&self, event: &InboundEvent, replies: Vec<Reply>) -> Result<(), ChannelError> {
        if let Some(callback_id) = event.metadata.get("callback_query_id").and_then(Value::as_str) {
            self.answer_callback(callback_id).await;
        }

        let chat_id = event
            .metadata
            .get("chat_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in event metadata".into(),
            })?;

        // The message an `Edit` reply targets: the pressed one for button
        // events, then whatever this delivery sent last.
        let mut target = match event.kind {
            EventKind::Button(_) => event.metadata.get("message_id").and_then(Value::as_i64),
            _ => None,
        };

        for reply in &replies {
            match (reply.mode, target) {
                (ReplyMode::Edit, Some(message_id))
                    if reply.text.len() <= TELEGRAM_MAX_MESSAGE_LENGTH =>
                {
                    self.edit_message(chat_id, message_id, reply).await?;
                }
                _ => {
                    target = self
                        .send_message(chat_id, &reply.text, reply.keyboard.as_ref())
                        .await?
                        .or(target);
                }
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.without_url().to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// The error description of a Bot API reply, or `None` if it reports `ok`.
fn api_error_description(data: &Value) -> Option<String> {
    if data.get("ok").and_then(Value::as_bool) == Some(true) {
        return None;
    }
    Some(
        data.get("description")
            .and_then(Value::as_str)
            .unwrap_or("no description")
            .to_string(),
    )
}

/// Pause requested by a flood-control reply.
fn retry_after(data: &Value) -> Option<Duration> {
    data.pointer("/parameters/retry_after")
        .and_then(Value::as_u64)
        .map(Duration::from_secs)
}

/// Convert one `getUpdates` entry into an inbound event.
///
/// Returns `None` for unsupported updates, unauthorized senders and
/// unknown callback ids.
fn parse_update(update: &Value, allowed_users: &[String]) -> Option<InboundEvent> {
    let (from, message, callback) = if let Some(query) = update.get("callback_query") {
        (query.get("from")?, query.get("message"), Some(query))
    } else {
        let message = update.get("message")?;
        (message.get("from")?, Some(message), None)
    };

    let user_id = from.get("id").and_then(Value::as_i64)?.to_string();
    let username = from
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    if !check_user_allowed(allowed_users, [username, user_id.as_str()]) {
        tracing::warn!(
            "Telegram: ignoring update from unauthorized user: \
             username={username}, user_id={user_id}"
        );
        return None;
    }

    let chat_id = message
        .and_then(|m| m.get("chat"))
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_else(|| user_id.clone());
    let message_id = message
        .and_then(|m| m.get("message_id"))
        .and_then(Value::as_i64);

    let mut metadata = json!({
        "chat_id": chat_id,
        "username": username,
        "message_id": message_id,
    });

    let kind = if let Some(query) = callback {
        metadata["callback_query_id"] = query.get("id").cloned().unwrap_or(Value::Null);
        let data = query.get("data").and_then(Value::as_str)?;
        match data.parse::<CallbackAction>() {
            Ok(action) => EventKind::Button(action),
            Err(e) => {
                tracing::warn!(user_id = %user_id, "Telegram: {e}");
                return None;
            }
        }
    } else {
        let message = message?;
        if let Some(document) = message.get("document") {
            EventKind::Document {
                name: document
                    .get("file_name")
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty())
                    .unwrap_or(FALLBACK_DOCUMENT_NAME)
                    .to_string(),
                mime_type: document
                    .get("mime_type")
                    .and_then(Value::as_str)
                    .map(String::from),
                size: document.get("file_size").and_then(Value::as_u64),
            }
        } else {
            let text = message.get("text").and_then(Value::as_str)?;
            match Command::parse(text) {
                Some(command) => EventKind::Command(command),
                None => EventKind::Text(text.to_string()),
            }
        }
    };

    Some(InboundEvent::new(user_id, kind).with_metadata(metadata))
}

/// Render a keyboard as a Bot API `InlineKeyboardMarkup`.
fn inline_keyboard_markup(keyboard: &Keyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.label, "callback_data": b.action.to_string() }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { boundary } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
