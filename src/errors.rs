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
    /// File-system or I/O operation failure.
    Io(String),
    /// Requested entity (user, tool, or session) does not exist.
    NotFound(String),
    /// Caller is not authorized to perform the requested action.
    Unauthorized(String),
    /// The requested tool is disabled and cannot be launched.
    ToolInactive(String),
    /// The user's balance does not cover the affordability gate or a
    /// strict debit.
    InsufficientCredits(String),
    /// The supervised tool process failed to start.
    ProcessStart(String),
    /// The supervised tool process could not be stopped cleanly.
    ProcessStop(String),
    /// Ledger invariant violation (e.g. a non-positive amount).
    Ledger(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::ToolInactive(msg) => write!(f, "tool inactive: {msg}"),
            Self::InsufficientCredits(msg) => write!(f, "insufficient credits: {msg}"),
            Self::ProcessStart(msg) => write!(f, "process start: {msg}"),
            Self::ProcessStop(msg) => write!(f, "process stop: {msg}"),
            Self::Ledger(msg) => write!(f, "ledger: {msg}"),
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

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
