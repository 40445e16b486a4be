//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// AI completion call failed or returned unusable output.
    Ai(String),
    /// Mail transport (receive or send) failure.
    Mail(String),
    /// Marketplace client failure (inbox read, bid submission).
    Marketplace(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Attempted to write a project field outside the update allowlist.
    FieldNotAllowed(String),
    /// State transition rejected (terminal state or stale precondition).
    InvalidTransition(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Ai(msg) => write!(f, "ai: {msg}"),
            Self::Mail(msg) => write!(f, "mail: {msg}"),
            Self::Marketplace(msg) => write!(f, "marketplace: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::FieldNotAllowed(msg) => write!(f, "field not allowed: {msg}"),
            Self::InvalidTransition(msg) => write!(f, "invalid transition: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Ai(format!("malformed json payload: {err}"))
    }
}
