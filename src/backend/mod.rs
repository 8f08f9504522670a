//! Video backend contract and related types.
//!
//! The backend performs the actual network extraction and file transfer
//! (a yt-dlp equivalent). This crate never parses any wire protocol; it
//! only calls the backend's operations and interprets its error taxonomy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// One encoding/container/quality variant offered for a source video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFormat {
    pub format_id: String,
    /// Container extension (e.g., "mp4", "webm", "m4a").
    pub extension: String,
    /// Video resolution string (e.g., "1080p"), None for audio-only.
    pub resolution: Option<String>,
    /// Estimated file size in bytes, if known.
    pub filesize: Option<u64>,
    /// Primary codec information for display.
    pub codec: Option<String>,
    pub is_audio_only: bool,
    /// Comparable quality score: resolution height, or bitrate when no height.
    pub quality: u32,
    /// Video codec name, None when the format carries no video track.
    pub vcodec: Option<String>,
    /// Audio codec name, None when the format carries no audio track.
    pub acodec: Option<String>,
    /// Audio bitrate in kbps.
    pub audio_bitrate: Option<f64>,
}

impl VideoFormat {
    /// Whether the format carries both a video and an audio track.
    pub fn has_both_codecs(&self) -> bool {
        self.vcodec.is_some() && self.acodec.is_some()
    }
}

/// Metadata for a single source video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub url: String,
    pub title: String,
    pub uploader: Option<String>,
    /// Duration in seconds.
    pub duration: Option<i64>,
    pub formats: Vec<VideoFormat>,
    /// 1-indexed position when the item came from a playlist enumeration.
    pub playlist_index: Option<u32>,
    pub playlist_title: Option<String>,
    pub playlist_count: Option<u32>,
}

/// Basic playlist metadata, cheaper than a full enumeration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub title: String,
    pub uploader: Option<String>,
    pub count: u32,
}

/// Status of an in-flight transfer, carried on every progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Downloading,
    /// Terminal: the transfer finished successfully.
    Completed,
    /// Terminal: the transfer failed.
    Failed,
}

/// A single progress report from the backend.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub status: TransferStatus,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Bytes per second.
    pub speed: Option<f64>,
    pub eta_secs: Option<u64>,
    pub percent: f64,
}

/// Typed progress callback handed to [`VideoBackend::download`].
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Errors from metadata/playlist extraction.
#[derive(Error, Debug, Clone)]
pub enum ExtractError {
    #[error("Video is unavailable: {0}")]
    Unavailable(String),

    #[error("URL is not supported: {0}")]
    Unsupported(String),

    #[error("Extractor failure: {0}")]
    Extractor(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Extraction timed out: {0}")]
    Timeout(String),
}

/// Errors from the transfer itself.
///
/// All categories stay distinguishable so the presentation layer can
/// choose user wording.
#[derive(Error, Debug, Clone)]
pub enum DownloadError {
    #[error("Video is unavailable: {0}")]
    Unavailable(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Rate limited, try again later: {0}")]
    RateLimited(String),

    #[error("Not enough disk space: {0}")]
    DiskFull(String),

    #[error("Permission denied writing output: {0}")]
    PermissionDenied(String),

    #[error("Download failed: {0}")]
    Other(String),
}

/// Contract implemented by the video backend collaborator.
///
/// `download` must check `cancel` between chunks; cancellation is
/// cooperative and the caller discards the result of a cancelled transfer.
#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Extract metadata and the available formats for a single video.
    async fn extract_info(&self, url: &str) -> Result<VideoInfo, ExtractError>;

    /// Transfer a video to disk, reporting progress through `on_progress`.
    ///
    /// The terminal progress update has status Completed or Failed.
    /// Returns the path of the finished file.
    async fn download(
        &self,
        url: &str,
        output_path: &Path,
        format_id: Option<&str>,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<PathBuf, DownloadError>;

    /// Flat-extract every entry of a playlist.
    async fn extract_playlist(&self, url: &str) -> Result<Vec<VideoInfo>, ExtractError>;

    /// Probe whether a URL resolves to a playlist.
    async fn is_playlist(&self, url: &str) -> bool;

    /// Fetch playlist metadata without enumerating every entry.
    async fn playlist_info(&self, url: &str) -> Result<PlaylistInfo, ExtractError>;
}
