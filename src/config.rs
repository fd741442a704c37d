//! Configuration types, read from environment variables.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default location of the profile database.
pub const DEFAULT_DATA_FILE: &str = "profiles.json";

/// Which transport to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Telegram,
    Cli,
}

/// Telegram Bot API settings.
#[derive(Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric user ids; `*` allows everyone.
    pub allowed_users: Vec<String>,
    /// Long-poll timeout passed to `getUpdates`, in seconds.
    pub poll_timeout_secs: u64,
}

/// Limits applied to uploaded documents before a draft is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPolicy {
    pub max_bytes: Option<u64>,
    /// Empty means any MIME type is accepted.
    pub allowed_mime_types: Vec<String>,
}

impl DocumentPolicy {
    /// Returns the reason a document is refused, or `None` if it is accepted.
    ///
    /// An unknown size is accepted. An unknown MIME type is refused whenever
    /// an allow-list is set.
    pub fn check(&self, mime_type: Option<&str>, size: Option<u64>) -> Option<String> {
        if let (Some(max), Some(size)) = (self.max_bytes, size)
            && size > max
        {
            return Some(format!("File too large (max {max} bytes)."));
        }
        if self.allowed_mime_types.is_empty() {
            return None;
        }
        let allowed = mime_type.is_some_and(|mime| {
            self.allowed_mime_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(mime))
        });
        if allowed {
            None
        } else {
            Some(format!(
                "Unsupported mime type: {}",
                mime_type.unwrap_or("unknown")
            ))
        }
    }
}

/// Process-wide configuration.
#[derive(Debug)]
pub struct IntakeConfig {
    pub channel: ChannelKind,
    /// Present whenever `channel` is `Telegram`.
    pub telegram: Option<TelegramConfig>,
    pub data_file: PathBuf,
    pub documents: DocumentPolicy,
    /// Port for the read-only status API; disabled when unset.
    pub http_port: Option<u16>,
    /// Directory for daily-rolling log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl IntakeConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let channel = match get("PROFILE_INTAKE_CHANNEL").as_deref() {
            None | Some("telegram") => ChannelKind::Telegram,
            Some("cli") => ChannelKind::Cli,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "PROFILE_INTAKE_CHANNEL".into(),
                    message: format!("expected `telegram` or `cli`, got `{other}`"),
                });
            }
        };

        let telegram = if channel == ChannelKind::Telegram {
            let token = get("TELEGRAM_BOT_TOKEN")
                .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;
            let allowed_users =
                split_list(&get("TELEGRAM_ALLOWED_USERS").unwrap_or_else(|| "*".into()));
            let poll_timeout_secs =
                parse_number("TELEGRAM_POLL_TIMEOUT_SECS", get("TELEGRAM_POLL_TIMEOUT_SECS"))?
                    .unwrap_or(30);
            Some(TelegramConfig {
                bot_token: SecretString::from(token),
                allowed_users,
                poll_timeout_secs,
            })
        } else {
            None
        };

        let data_file = get("PROFILE_INTAKE_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE));

        let documents = DocumentPolicy {
            max_bytes: parse_number(
                "PROFILE_INTAKE_MAX_DOCUMENT_BYTES",
                get("PROFILE_INTAKE_MAX_DOCUMENT_BYTES"),
            )?,
            allowed_mime_types: get("PROFILE_INTAKE_ALLOWED_MIME_TYPES")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        };

        Ok(Self {
            channel,
            telegram,
            data_file,
            documents,
            http_port: parse_number("PROFILE_INTAKE_HTTP_PORT", get("PROFILE_INTAKE_HTTP_PORT"))?,
            log_dir: get("PROFILE_INTAKE_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_number<T>(key: &str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}
