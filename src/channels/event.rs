//! Transport-neutral inbound events and outbound replies.

use serde::{Deserialize, Serialize};

/// Something a user did in the chat.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Stable identifier of the user; keys the profile database.
    pub user_id: String,
    pub kind: EventKind,
    /// Channel-specific routing data (chat id, message id, callback id, ...).
    pub metadata: serde_json::Value,
}

impl InboundEvent {
    pub fn new(user_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The variants of inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Command(Command),
    Document {
        name: String,
        mime_type: Option<String>,
        size: Option<u64>,
    },
    Button(CallbackAction),
    Text(String),
}

/// Slash commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    MyProfile,
    History,
    Done,
    Unknown(String),
}

impl Command {
    /// Parse the first word of a `/command` message. Returns `None` if the
    /// text is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        // "/my_profile@SomeBot" addresses a specific bot in group chats
        let name = name.split('@').next().unwrap_or(name);
        Some(match name {
            "start" | "help" => Self::Start,
            "my_profile" => Self::MyProfile,
            "history" => Self::History,
            "done" => Self::Done,
            other => Self::Unknown(other.to_string()),
        })
    }
}

/// Longest callback id a button may carry (Telegram's `callback_data` limit).
pub const MAX_CALLBACK_ID_BYTES: usize = 64;

/// Button actions. Serialized to and from the opaque callback ids carried by
/// the transport (`edit:<field>`, `reparse`, `manual`, `confirm`, `discard`,
/// `start_update`, `delete_latest`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallbackAction {
    EditField(String),
    Reparse,
    Manual,
    Confirm,
    Discard,
    StartUpdate,
    DeleteLatest,
}

impl std::fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EditField(field) => write!(f, "edit:{field}"),
            Self::Reparse => write!(f, "reparse"),
            Self::Manual => write!(f, "manual"),
            Self::Confirm => write!(f, "confirm"),
            Self::Discard => write!(f, "discard"),
            Self::StartUpdate => write!(f, "start_update"),
            Self::DeleteLatest => write!(f, "delete_latest"),
        }
    }
}

impl std::str::FromStr for CallbackAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(field) = s.strip_prefix("edit:") {
            if field.is_empty() {
                return Err("Empty field in edit callback".to_string());
            }
            return Ok(Self::EditField(field.to_string()));
        }
        match s {
            "reparse" => Ok(Self::Reparse),
            "manual" => Ok(Self::Manual),
            "confirm" => Ok(Self::Confirm),
            "discard" => Ok(Self::Discard),
            "start_update" => Ok(Self::StartUpdate),
            "delete_latest" => Ok(Self::DeleteLatest),
            _ => Err(format!("Unknown callback action: {}", s)),
        }
    }
}

impl Serialize for CallbackAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CallbackAction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One inline button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub action: CallbackAction,
}

impl Button {
    pub fn new(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Ordered rows of buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }

    /// All actions in display order.
    pub fn actions(&self) -> impl Iterator<Item = &CallbackAction> {
        self.rows.iter().flatten().map(|b| &b.action)
    }
}

/// How a reply reaches the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    /// Post a new message.
    Send,
    /// Replace the text and buttons of an earlier message: the pressed one
    /// for button events, otherwise the previous reply to the same event.
    Edit,
}

/// Rendered response for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<Keyboard>,
    pub mode: ReplyMode,
}

impl Reply {
    pub fn send(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            mode: ReplyMode::Send,
        }
    }

    pub fn edit(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            mode: ReplyMode::Edit,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}
