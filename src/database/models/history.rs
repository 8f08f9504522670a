//! Download history database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::Path;

/// History entry database model.
/// An immutable record of a finished download; only ever deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HistoryEntryDbModel {
    pub id: String,
    pub url: String,
    pub title: String,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub format_id: Option<String>,
    /// Duration in seconds.
    pub duration: Option<i64>,
    pub uploader: Option<String>,
    /// ISO 8601 timestamp when the download finished
    pub downloaded_at: String,
    /// Free-form status, defaults to "completed".
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl HistoryEntryDbModel {
    pub fn new(entry: NewHistoryEntry) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: entry.url,
            title: entry.title,
            file_path: entry.file_path,
            file_size: entry.file_size,
            format_id: entry.format_id,
            duration: entry.duration,
            uploader: entry.uploader,
            downloaded_at: now.clone(),
            status: entry.status,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Whether the downloaded file still exists on disk.
    ///
    /// Derived live against `file_path`, never stored.
    pub fn file_exists(&self) -> bool {
        Path::new(&self.file_path).exists()
    }
}

/// Request to record a finished download.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub url: String,
    pub title: String,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub format_id: Option<String>,
    pub duration: Option<i64>,
    pub uploader: Option<String>,
    pub status: String,
}

impl NewHistoryEntry {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            file_path: file_path.into(),
            file_size: None,
            format_id: None,
            duration: None,
            uploader: None,
            status: "completed".to_string(),
        }
    }

    pub fn with_file_size(mut self, size: Option<i64>) -> Self {
        self.file_size = size;
        self
    }

    pub fn with_format_id(mut self, format_id: Option<String>) -> Self {
        self.format_id = format_id;
        self
    }

    pub fn with_duration(mut self, duration: Option<i64>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_uploader(mut self, uploader: Option<String>) -> Self {
        self.uploader = uploader;
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_history_entry_defaults() {
        let entry = HistoryEntryDbModel::new(NewHistoryEntry::new(
            "https://example.com/v",
            "A title",
            "/tmp/a.mp4",
        ));
        assert_eq!(entry.status, "completed");
        assert!(entry.file_size.is_none());
        assert_eq!(entry.downloaded_at, entry.created_at);
    }

    #[test]
    fn test_file_exists_is_derived() {
        let entry = HistoryEntryDbModel::new(NewHistoryEntry::new(
            "https://example.com/v",
            "A title",
            "/nonexistent/path/a.mp4",
        ));
        assert!(!entry.file_exists());
    }
}
