//! Application-wide error types.

use thiserror::Error;

use crate::backend::{DownloadError, ExtractError};

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// Infrastructure failures (store, IO) surface as errors; "not possible
/// right now" conditions (invalid transition, gate full, missing item)
/// are reported as `Ok(false)` by the operations themselves.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Playlist error: {0}")]
    Playlist(String),

    #[error("Format error: {message}")]
    Format {
        message: String,
        #[source]
        source: ExtractError,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Corrupt status '{value}' stored for queue item {id}")]
    CorruptStatus { id: String, value: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    pub fn playlist(msg: impl Into<String>) -> Self {
        Self::Playlist(msg.into())
    }

    pub fn format(msg: impl Into<String>, source: ExtractError) -> Self {
        Self::Format {
            message: msg.into(),
            source,
        }
    }

    pub fn corrupt_status(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self::CorruptStatus {
            id: id.into(),
            value: value.into(),
        }
    }
}
