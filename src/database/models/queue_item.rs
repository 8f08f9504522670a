//! Queue item database model and lifecycle state machine.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::PathBuf;

use crate::{Error, Result};

/// Queue item database model.
/// Represents one pending or in-flight download request.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueueItemDbModel {
    pub id: String,
    pub url: String,
    /// Nullable until metadata is known.
    pub title: Option<String>,
    /// None means "best available".
    pub format_id: Option<String>,
    pub output_path: String,
    /// Status: PENDING, DOWNLOADING, PAUSED, COMPLETED, FAILED, CANCELLED
    pub status: String,
    /// Progress percentage, clamped to [0, 100].
    pub progress: f64,
    /// Queue priority; lower = earlier. Dense 1..=N among active items.
    pub position: i64,
    /// Set only while the item is in FAILED.
    pub error_message: Option<String>,
    /// ISO 8601 timestamp when the item was created
    pub created_at: String,
    /// ISO 8601 timestamp when the item was last updated
    pub updated_at: String,
}

impl QueueItemDbModel {
    pub fn new(request: NewQueueItem, position: i64) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: request.url,
            title: request.title,
            format_id: request.format_id,
            output_path: request.output_path.display().to_string(),
            status: DownloadStatus::Pending.as_str().to_string(),
            progress: 0.0,
            position,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Parse the persisted status, failing loudly on a corrupted value.
    pub fn parsed_status(&self) -> Result<DownloadStatus> {
        DownloadStatus::parse(&self.status)
            .ok_or_else(|| Error::corrupt_status(&self.id, &self.status))
    }
}

/// Request to enqueue a new download.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub url: String,
    pub output_path: PathBuf,
    pub format_id: Option<String>,
    pub title: Option<String>,
}

/// Download lifecycle states.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadStatus {
    /// Queued and waiting to be started.
    Pending,
    /// Currently occupying a concurrency slot.
    Downloading,
    /// Suspended by the user; resumable.
    Paused,
    /// Terminal: finished successfully and recorded in history.
    Completed,
    /// Failed; eligible for retry.
    Failed,
    /// Terminal: abandoned by the user.
    Cancelled,
}

impl DownloadStatus {
    pub const ALL: [DownloadStatus; 6] = [
        Self::Pending,
        Self::Downloading,
        Self::Paused,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Downloading => "DOWNLOADING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "DOWNLOADING" => Some(Self::Downloading),
            "PAUSED" => Some(Self::Paused),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal status.
    ///
    /// Terminal items are excluded from default listings and from
    /// position renumbering entirely.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the state machine allows moving to `next` from here.
    ///
    /// A rejected transition is a no-op for callers, never an error.
    pub fn can_transition_to(&self, next: DownloadStatus) -> bool {
        use DownloadStatus::*;
        matches!(
            (self, next),
            (Pending, Downloading)
                | (Pending, Cancelled)
                | (Downloading, Paused)
                | (Downloading, Completed)
                | (Downloading, Failed)
                | (Downloading, Cancelled)
                | (Paused, Downloading)
                | (Paused, Cancelled)
                | (Failed, Pending)
        )
    }
}
