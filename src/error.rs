//! Error types for the profile intake bot.

use crate::profiles::DraftStatus;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Draft error: {0}")]
    Draft(#[from] DraftError),
}

/// Configuration-related errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored profiles at {path} are corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Document extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    #[error("Parser {parser} failed on {source_name}: {reason}")]
    Failed {
        parser: String,
        source_name: String,
        reason: String,
    },
}

/// Workflow conditions reported back to the user. State is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("No draft in progress")]
    NoDraft,

    #[error("No saved profile")]
    NoProfile,

    #[error("Nothing to finish")]
    NothingToFinish,

    #[error("Draft is {from}, cannot move to {to}")]
    InvalidTransition { from: DraftStatus, to: DraftStatus },
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
