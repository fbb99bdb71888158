use std::io;

use http::status::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The error kinds named in the ingestion error taxonomy, independent of the
/// Rust variant carrying them. Used to correlate logs/metrics with the
/// taxonomy rather than with `IngestError`'s Rust shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Parse,
    Relations,
    Embed,
    InvalidTransition,
    LockTimeout,
    Integrity,
    Config,
    NotFound,
    Io,
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum IngestError {
    #[error("parse failed for {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("reference resolution failed for {path}: {message}")]
    RelationsError { path: String, message: String },

    #[error("embedding failed for field {field} on {uuid}: {message}")]
    EmbedError {
        uuid: String,
        field: String,
        message: String,
    },

    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: String, to: String },

    #[error("lock acquisition timed out after {timeout_ms}ms for key {key}")]
    LockTimeout { key: String, timeout_ms: u64 },

    #[error("integrity error: {0}")]
    IntegrityError(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("(de)serialization error: {0}")]
    Serialization(String),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::ParseError { .. } => ErrorKind::Parse,
            IngestError::RelationsError { .. } => ErrorKind::Relations,
            IngestError::EmbedError { .. } => ErrorKind::Embed,
            IngestError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            IngestError::LockTimeout { .. } => ErrorKind::LockTimeout,
            IngestError::IntegrityError(_) => ErrorKind::Integrity,
            IngestError::Config(_) => ErrorKind::Config,
            IngestError::NotFound(_) => ErrorKind::NotFound,
            IngestError::Io(_) | IngestError::Serialization(_) => ErrorKind::Io,
        }
    }

    /// Whether this error is fatal to the whole batch rather than scoped to
    /// the one file that raised it. Only integrity failures halt the
    /// orchestrator; everything else is per-file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::IntegrityError(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::ParseError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::RelationsError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::EmbedError { .. } => StatusCode::BAD_GATEWAY,
            IngestError::InvalidTransition { .. } => StatusCode::CONFLICT,
            IngestError::LockTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            IngestError::IntegrityError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IngestError::Config(_) => StatusCode::BAD_REQUEST,
            IngestError::NotFound(_) => StatusCode::NOT_FOUND,
            IngestError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IngestError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<io::Error> for IngestError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => IngestError::NotFound(format!("{e}")),
            _ => IngestError::Io(format!("{e}")),
        }
    }
}

impl From<toml::de::Error> for IngestError {
    fn from(e: toml::de::Error) -> Self {
        IngestError::Serialization(format!("toml deserialization error: {e}"))
    }
}

impl From<toml::ser::Error> for IngestError {
    fn from(e: toml::ser::Error) -> Self {
        IngestError::Serialization(format!("toml serialization error: {e}"))
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Serialization(format!("json (de)serialization error: {e}"))
    }
}

impl From<uuid::Error> for IngestError {
    fn from(e: uuid::Error) -> Self {
        IngestError::Serialization(format!("uuid conversion failed: {e}"))
    }
}

impl From<url::ParseError> for IngestError {
    fn from(e: url::ParseError) -> Self {
        IngestError::Serialization(format!("invalid url: {e}"))
    }
}

#[cfg(feature = "service")]
impl From<sqlx::Error> for IngestError {
    fn from(e: sqlx::Error) -> Self {
        IngestError::Io(format!("database error: {e}"))
    }
}

#[cfg(feature = "service")]
impl From<notify::Error> for IngestError {
    fn from(e: notify::Error) -> Self {
        IngestError::Io(format!("filesystem watcher error: {e}"))
    }
}
