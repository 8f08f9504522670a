//! Playlist enumeration and batch downloads.
//!
//! A parallel, simpler path than the persisted queue: many independent
//! videos fetched at once through a bounded worker pool, with per-video
//! failure isolation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backend::{DownloadError, ProgressCallback, VideoBackend, VideoInfo};
use crate::utils::{fs, url};
use crate::{Error, Result};

/// Callback invoked after each completed attempt:
/// `(url, completed_count, total)`. The count includes failures.
pub type BatchProgressCallback = Arc<dyn Fn(&str, usize, usize) + Send + Sync>;

/// Result of a batch download operation.
///
/// One video's failure never aborts the batch; failures are data here,
/// never errors.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Paths of successfully downloaded files.
    pub successes: Vec<PathBuf>,
    /// `(url, error message)` per failed download.
    pub failures: Vec<(String, String)>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Human-readable summary listing each failed URL with its error.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Batch Download Summary".to_string(),
            "=".repeat(40),
            format!("Total videos: {}", self.total()),
            format!("Successful: {}", self.success_count()),
            format!("Failed: {}", self.failure_count()),
        ];

        if !self.failures.is_empty() {
            lines.push(String::new());
            lines.push("Failed downloads:".to_string());
            for (url, error) in &self.failures {
                // Truncate on a char boundary; raw-Unicode URLs are valid input.
                let display_url = if url.chars().count() > 50 {
                    format!("{}...", url.chars().take(50).collect::<String>())
                } else {
                    url.clone()
                };
                lines.push(format!("  - {display_url}: {error}"));
            }
        }

        lines.join("\n")
    }
}

/// Orchestrates playlist enumeration and bounded-concurrency batches.
pub struct PlaylistOrchestrator {
    backend: Arc<dyn VideoBackend>,
}

impl PlaylistOrchestrator {
    pub const MIN_CONCURRENT: usize = 1;
    pub const MAX_CONCURRENT: usize = 5;
    pub const DEFAULT_CONCURRENT: usize = 3;

    pub fn new(backend: Arc<dyn VideoBackend>) -> Self {
        Self { backend }
    }

    /// Enumerate every video in a playlist.
    ///
    /// Each returned entry carries its 1-indexed `playlist_index` and the
    /// shared `playlist_title`/`playlist_count`, stamped here when the
    /// backend left them unset.
    pub async fn enumerate_playlist(&self, url: &str) -> Result<Vec<VideoInfo>> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::playlist("URL cannot be empty"));
        }

        let mut videos = self
            .backend
            .extract_playlist(url)
            .await
            .map_err(|e| Error::playlist(format!("Failed to enumerate playlist: {e}")))?;

        if videos.is_empty() {
            return Err(Error::playlist("Playlist is empty or could not be accessed"));
        }

        let count = videos.len() as u32;
        let shared_title = videos.iter().find_map(|v| v.playlist_title.clone());
        for (idx, video) in videos.iter_mut().enumerate() {
            if video.playlist_index.is_none() {
                video.playlist_index = Some(idx as u32 + 1);
            }
            if video.playlist_count.is_none() {
                video.playlist_count = Some(count);
            }
            if video.playlist_title.is_none() {
                video.playlist_title = shared_title.clone();
            }
        }

        info!("Enumerated {} videos from playlist: {}", videos.len(), url);
        Ok(videos)
    }

    /// Select a 1-indexed, inclusive range of an enumerated playlist.
    ///
    /// `end` past the playlist length is silently clamped.
    pub fn get_range(
        &self,
        videos: &[VideoInfo],
        start: usize,
        end: usize,
    ) -> Result<Vec<VideoInfo>> {
        if videos.is_empty() {
            return Err(Error::playlist("Video list is empty"));
        }
        if start < 1 {
            return Err(Error::validation("Start position must be at least 1"));
        }
        if end < start {
            return Err(Error::validation(
                "End position must be greater than or equal to start",
            ));
        }

        let total = videos.len();
        if start > total {
            return Err(Error::playlist(format!(
                "Start position {start} exceeds playlist length ({total})"
            )));
        }

        let end = end.min(total);
        let selected = videos[start - 1..end].to_vec();
        info!("Selected {} videos (positions {}-{})", selected.len(), start, end);
        Ok(selected)
    }

    /// Download many videos concurrently through a bounded worker pool.
    ///
    /// Blocks until every video has been attempted. `progress_callback`
    /// fires after each attempt, success or failure, with a strictly
    /// increasing completed count.
    pub async fn download_batch(
        &self,
        videos: Vec<VideoInfo>,
        output_dir: &Path,
        format_id: Option<&str>,
        max_concurrent: usize,
        progress_callback: Option<BatchProgressCallback>,
    ) -> Result<BatchResult> {
        if videos.is_empty() {
            return Ok(BatchResult::default());
        }

        let max_concurrent = max_concurrent.clamp(Self::MIN_CONCURRENT, Self::MAX_CONCURRENT);

        fs::ensure_dir_all(output_dir)
            .await
            .map_err(|e| Error::playlist(format!("Cannot create output directory: {e}")))?;

        let total = videos.len();
        info!(
            "Starting batch download of {} videos with {} concurrent downloads",
            total, max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut workers: JoinSet<(String, std::result::Result<PathBuf, DownloadError>)> =
            JoinSet::new();
        // Task id -> url, so a panicked worker still gets accounted for.
        let mut spawned: HashMap<tokio::task::Id, String> = HashMap::with_capacity(total);

        for video in videos {
            let backend = self.backend.clone();
            let semaphore = semaphore.clone();
            let output_dir = output_dir.to_path_buf();
            let format_id = format_id.map(str::to_string);
            let url = video.url;

            let worker_url = url.clone();
            let handle = workers.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            worker_url,
                            Err(DownloadError::Other("worker pool closed".into())),
                        );
                    }
                };

                let on_progress: ProgressCallback = Arc::new(|_| {});
                let outcome = backend
                    .download(
                        &worker_url,
                        &output_dir,
                        format_id.as_deref(),
                        on_progress,
                        CancellationToken::new(),
                    )
                    .await;
                (worker_url, outcome)
            });
            spawned.insert(handle.id(), url);
        }

        let mut result = BatchResult::default();
        let mut completed = 0;

        while let Some(joined) = workers.join_next().await {
            let (url, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Batch worker task failed: {}", e);
                    let url = spawned.get(&e.id()).cloned().unwrap_or_default();
                    (
                        url,
                        Err(DownloadError::Other(format!("worker task failed: {e}"))),
                    )
                }
            };

            completed += 1;
            match outcome {
                Ok(file_path) => {
                    info!("Downloaded ({}/{}): {}", completed, total, url);
                    result.successes.push(file_path);
                }
                Err(e) => {
                    warn!("Failed ({}/{}): {} - {}", completed, total, url, e);
                    result.failures.push((url.clone(), e.to_string()));
                }
            }

            if let Some(callback) = &progress_callback {
                callback(&url, completed, total);
            }
        }

        info!(
            "Batch download complete: {} succeeded, {} failed",
            result.success_count(),
            result.failure_count()
        );
        Ok(result)
    }

    /// Check whether a URL points at a playlist.
    ///
    /// Well-known URL shapes short-circuit; ambiguous URLs fall back to
    /// a flattened-extraction probe against the backend.
    pub async fn is_playlist(&self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() {
            return false;
        }
        if url::looks_like_playlist(url) {
            return true;
        }
        self.backend.is_playlist(url).await
    }

    /// Playlist metadata without a full enumeration.
    pub async fn playlist_info(&self, url: &str) -> Result<crate::backend::PlaylistInfo> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::playlist("URL cannot be empty"));
        }
        self.backend
            .playlist_info(url)
            .await
            .map_err(|e| Error::playlist(format!("Failed to get playlist info: {e}")))
    }

    /// Composition of enumerate -> (optional) range -> batch download.
    #[allow(clippy::too_many_arguments)]
    pub async fn download_playlist(
        &self,
        url: &str,
        output_dir: &Path,
        format_id: Option<&str>,
        start: Option<usize>,
        end: Option<usize>,
        max_concurrent: usize,
        progress_callback: Option<BatchProgressCallback>,
    ) -> Result<BatchResult> {
        let mut videos = self.enumerate_playlist(url).await?;

        if start.is_some() || end.is_some() {
            let start = start.unwrap_or(1);
            let end = end.unwrap_or(videos.len());
            videos = self.get_range(&videos, start, end)?;
        }

        self.download_batch(videos, output_dir, format_id, max_concurrent, progress_callback)
            .await
    }
}
