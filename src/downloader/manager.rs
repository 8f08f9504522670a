//! Download Manager implementation.
//!
//! Owns the queue's persisted state and an advisory concurrency gate.
//! Every public method performs a single persisted-state mutation and
//! returns; the manager never calls the video backend itself. When a
//! slot frees up it hands the next eligible item id to a registered
//! start-callback, and the caller dispatches the actual transfer.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info, warn};

use crate::database::DbPool;
use crate::database::models::{
    DownloadStatus, HistoryEntryDbModel, NewHistoryEntry, NewQueueItem, QueueItemDbModel,
};
use crate::database::repositories::{
    HistoryRepository, HistoryTxOps, QueueRepository, QueueTxOps,
};
use crate::utils::fs::cleanup_partial_artifacts;
use crate::{Error, Result};

/// Callback invoked with the id of the next item allowed to start.
pub type StartCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Configuration for the Download Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadManagerConfig {
    /// Destination for items enqueued without an explicit output path.
    pub default_output_dir: PathBuf,
    /// Maximum concurrent downloads, clamped to [1, 5].
    pub max_concurrent: usize,
}

impl Default for DownloadManagerConfig {
    fn default() -> Self {
        Self {
            default_output_dir: PathBuf::from("downloads"),
            max_concurrent: DownloadManager::DEFAULT_CONCURRENT,
        }
    }
}

/// Snapshot of queue occupancy and gate state.
#[derive(Debug, Clone, Serialize)]
pub struct QueueState {
    pub total_items: i64,
    pub status_counts: HashMap<String, i64>,
    pub active_downloads: usize,
    pub max_concurrent: usize,
    pub can_start_more: bool,
}

/// The Download Manager service.
pub struct DownloadManager {
    pool: DbPool,
    queue: Arc<dyn QueueRepository>,
    history: Arc<dyn HistoryRepository>,
    default_output_dir: PathBuf,
    /// Concurrency limit, clamped to [MIN_CONCURRENT, MAX_CONCURRENT].
    max_concurrent: AtomicUsize,
    /// Advisory bookkeeping of items occupying a concurrency slot.
    /// Persisted status stays authoritative for recovery.
    active: Mutex<HashSet<String>>,
    start_callback: RwLock<Option<StartCallback>>,
}

impl DownloadManager {
    pub const MIN_CONCURRENT: usize = 1;
    pub const MAX_CONCURRENT: usize = 5;
    pub const DEFAULT_CONCURRENT: usize = 3;

    pub fn new(
        pool: DbPool,
        queue: Arc<dyn QueueRepository>,
        history: Arc<dyn HistoryRepository>,
        config: DownloadManagerConfig,
    ) -> Self {
        Self {
            pool,
            queue,
            history,
            default_output_dir: config.default_output_dir,
            max_concurrent: AtomicUsize::new(Self::clamp_concurrent(config.max_concurrent)),
            active: Mutex::new(HashSet::new()),
            start_callback: RwLock::new(None),
        }
    }

    fn clamp_concurrent(value: usize) -> usize {
        value.clamp(Self::MIN_CONCURRENT, Self::MAX_CONCURRENT)
    }

    /// Register the callback that dispatches authorized starts.
    pub fn set_start_callback(&self, callback: Option<StartCallback>) {
        *self.start_callback.write() = callback;
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::Acquire)
    }

    /// Change the concurrency limit; out-of-range values are clamped.
    pub fn set_max_concurrent(&self, count: usize) {
        let clamped = Self::clamp_concurrent(count);
        self.max_concurrent.store(clamped, Ordering::Release);
        info!("Set max concurrent downloads to {}", clamped);
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn can_start_download(&self) -> bool {
        self.active_count() < self.max_concurrent()
    }

    /// Open a transaction for a multi-statement queue mutation.
    async fn begin_queue_tx(&self) -> Result<Transaction<'_, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| Error::queue(format!("Failed to open queue transaction: {e}")))
    }

    /// Add a download to the end of the queue with PENDING status.
    pub async fn add_to_queue(
        &self,
        url: &str,
        output_path: Option<PathBuf>,
        format_id: Option<String>,
        title: Option<String>,
    ) -> Result<QueueItemDbModel> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::validation("URL cannot be empty"));
        }

        let request = NewQueueItem {
            url: url.to_string(),
            output_path: output_path.unwrap_or_else(|| self.default_output_dir.clone()),
            format_id,
            title,
        };

        let mut tx = self.begin_queue_tx().await?;
        let position = QueueTxOps::next_position(&mut tx).await?;
        let item = QueueItemDbModel::new(request, position);
        QueueTxOps::insert(&mut tx, &item).await?;
        tx.commit()
            .await
            .map_err(|e| Error::queue(format!("Failed to add item to queue: {e}")))?;

        info!(id = %item.id, position, "Added download to queue: {}", item.url);
        Ok(item)
    }

    /// List queue items ordered by position.
    pub async fn get_queue(&self, include_completed: bool) -> Result<Vec<QueueItemDbModel>> {
        self.queue.list(include_completed).await
    }

    pub async fn get_queue_item(&self, id: &str) -> Result<Option<QueueItemDbModel>> {
        self.queue.get(id).await
    }

    /// Fetch an item and apply one state-machine transition.
    ///
    /// `Ok(false)` covers both "no such item" and "transition not
    /// allowed from the current state".
    async fn apply_transition(&self, id: &str, next: DownloadStatus) -> Result<bool> {
        let Some(item) = self.queue.get(id).await? else {
            warn!("Queue item not found: {}", id);
            return Ok(false);
        };

        let current = item.parsed_status()?;
        if !current.can_transition_to(next) {
            warn!(
                "Cannot move item {} to {}: current status is {}",
                id,
                next.as_str(),
                current.as_str()
            );
            return Ok(false);
        }

        self.queue.update_status(id, next).await?;
        Ok(true)
    }

    /// Pause a download. Valid only from DOWNLOADING.
    pub async fn pause_download(&self, id: &str) -> Result<bool> {
        if !self.apply_transition(id, DownloadStatus::Paused).await? {
            return Ok(false);
        }
        self.active.lock().remove(id);
        info!("Paused download: {}", id);
        Ok(true)
    }

    /// Resume a paused download.
    ///
    /// Re-registers the item as active without consulting the gate;
    /// only fresh starts are gated.
    pub async fn resume_download(&self, id: &str) -> Result<bool> {
        if !self
            .apply_transition(id, DownloadStatus::Downloading)
            .await?
        {
            return Ok(false);
        }
        self.active.lock().insert(id.to_string());
        info!("Resumed download: {}", id);
        Ok(true)
    }

    /// Cancel a download from any non-terminal state.
    ///
    /// With `cleanup`, partial artifacts at the stored output path are
    /// removed best-effort; cleanup failure is logged, not propagated.
    pub async fn cancel_download(&self, id: &str, cleanup: bool) -> Result<bool> {
        let Some(item) = self.queue.get(id).await? else {
            warn!("Queue item not found: {}", id);
            return Ok(false);
        };

        let current = item.parsed_status()?;
        if !current.can_transition_to(DownloadStatus::Cancelled) {
            warn!(
                "Cannot cancel item {}: current status is {}",
                id,
                current.as_str()
            );
            return Ok(false);
        }

        self.queue
            .update_status(id, DownloadStatus::Cancelled)
            .await?;
        self.active.lock().remove(id);

        if cleanup {
            cleanup_partial_artifacts(Path::new(&item.output_path)).await;
        }

        info!("Cancelled download: {}", id);
        Ok(true)
    }

    /// Move an item to a new position among active items.
    ///
    /// Negative positions are rejected; anything else is clamped into
    /// `[1, active count]`. The shift happens in one transaction so no
    /// observer ever sees a duplicate or missing position.
    pub async fn reorder_queue(&self, id: &str, new_position: i64) -> Result<bool> {
        if new_position < 0 {
            return Err(Error::validation("Position cannot be negative"));
        }

        let mut tx = self.begin_queue_tx().await?;

        let Some(item) = QueueTxOps::fetch(&mut tx, id).await? else {
            warn!("Queue item not found: {}", id);
            return Ok(false);
        };
        if item.parsed_status()?.is_terminal() {
            warn!("Cannot reorder item {}: already {}", id, item.status);
            return Ok(false);
        }

        let active_count = QueueTxOps::active_count(&mut tx).await?;
        let target = new_position.clamp(1, active_count.max(1));
        let old_position = item.position;

        if target == old_position {
            return Ok(true);
        }

        if old_position < target {
            QueueTxOps::shift_up_between(&mut tx, old_position, target).await?;
        } else {
            QueueTxOps::shift_down_between(&mut tx, target, old_position).await?;
        }
        QueueTxOps::set_position(&mut tx, id, target).await?;
        tx.commit()
            .await
            .map_err(|e| Error::queue(format!("Failed to reorder queue item {id}: {e}")))?;

        info!(
            "Reordered item {} from position {} to {}",
            id, old_position, target
        );
        Ok(true)
    }

    /// Remove an item entirely, closing the position gap it leaves.
    pub async fn remove_from_queue(&self, id: &str) -> Result<bool> {
        let mut tx = self.begin_queue_tx().await?;

        let Some(item) = QueueTxOps::fetch(&mut tx, id).await? else {
            warn!("Queue item not found: {}", id);
            return Ok(false);
        };

        QueueTxOps::delete(&mut tx, id).await?;
        QueueTxOps::shift_down_after(&mut tx, item.position).await?;
        tx.commit()
            .await
            .map_err(|e| Error::queue(format!("Failed to remove queue item {id}: {e}")))?;

        self.active.lock().remove(id);
        info!("Removed item from queue: {}", id);
        Ok(true)
    }

    /// Authorize a fresh start for a pending or resumed item.
    ///
    /// Returns `Ok(false)` without touching the row when the gate is
    /// closed or the item cannot move into DOWNLOADING.
    pub async fn start_download(&self, id: &str) -> Result<bool> {
        if !self.can_start_download() {
            warn!("Cannot start download {}: concurrent limit reached", id);
            return Ok(false);
        }

        if !self
            .apply_transition(id, DownloadStatus::Downloading)
            .await?
        {
            return Ok(false);
        }

        self.active.lock().insert(id.to_string());
        info!("Started download: {}", id);
        Ok(true)
    }

    /// Mark a download finished and record it in history.
    ///
    /// The status flip and the history insert land in one transaction.
    pub async fn complete_download(
        &self,
        id: &str,
        file_path: &Path,
        file_size: Option<i64>,
    ) -> Result<bool> {
        let mut tx = self.begin_queue_tx().await?;

        let Some(item) = QueueTxOps::fetch(&mut tx, id).await? else {
            warn!("Queue item not found: {}", id);
            return Ok(false);
        };
        let current = item.parsed_status()?;
        if !current.can_transition_to(DownloadStatus::Completed) {
            warn!(
                "Cannot complete item {}: current status is {}",
                id,
                current.as_str()
            );
            return Ok(false);
        }

        QueueTxOps::complete(&mut tx, id).await?;

        let entry = HistoryEntryDbModel::new(
            NewHistoryEntry::new(
                item.url,
                item.title.unwrap_or_else(|| "Unknown".to_string()),
                file_path.display().to_string(),
            )
            .with_file_size(file_size)
            .with_format_id(item.format_id),
        );
        HistoryTxOps::insert(&mut tx, &entry).await?;

        tx.commit()
            .await
            .map_err(|e| Error::queue(format!("Failed to complete download {id}: {e}")))?;

        self.active.lock().remove(id);
        info!("Completed download: {}", id);

        self.auto_start_next().await;
        Ok(true)
    }

    /// Mark a download failed and free its slot.
    pub async fn fail_download(&self, id: &str, error_message: &str) -> Result<bool> {
        let Some(item) = self.queue.get(id).await? else {
            warn!("Queue item not found: {}", id);
            return Ok(false);
        };

        let current = item.parsed_status()?;
        if !current.can_transition_to(DownloadStatus::Failed) {
            warn!(
                "Cannot fail item {}: current status is {}",
                id,
                current.as_str()
            );
            return Ok(false);
        }

        self.queue.mark_failed(id, error_message).await?;
        self.active.lock().remove(id);
        info!("Failed download: {} - {}", id, error_message);

        self.auto_start_next().await;
        Ok(true)
    }

    /// Reset a FAILED item back to PENDING for another attempt.
    pub async fn retry_failed(&self, id: &str) -> Result<bool> {
        let Some(item) = self.queue.get(id).await? else {
            warn!("Queue item not found: {}", id);
            return Ok(false);
        };

        if item.parsed_status()? != DownloadStatus::Failed {
            warn!("Cannot retry item {}: status is {}", id, item.status);
            return Ok(false);
        }

        self.queue.mark_retry(id).await?;
        info!("Reset failed download for retry: {}", id);
        Ok(true)
    }

    /// Record progress for an item; no state transition.
    pub async fn update_progress(&self, id: &str, percent: f64) -> Result<bool> {
        let clamped = percent.clamp(0.0, 100.0);
        let rows = self.queue.set_progress(id, clamped).await?;
        Ok(rows > 0)
    }

    /// Bulk-delete COMPLETED and CANCELLED rows.
    pub async fn clear_completed(&self) -> Result<u64> {
        let count = self.queue.clear_completed().await?;
        info!("Cleared {} completed/cancelled items from queue", count);
        Ok(count)
    }

    /// Startup recovery. Must run before any new `start_download`.
    ///
    /// Items interrupted mid-transfer by a crash come back as PENDING;
    /// their recorded progress is kept for display but not trusted.
    pub async fn restore_queue(&self) -> Result<Vec<QueueItemDbModel>> {
        let reset = self.queue.reset_downloading_to_pending().await?;
        if reset > 0 {
            info!("Reset {} interrupted downloads to pending", reset);
        }

        let items = self.queue.list(false).await?;
        info!("Restored {} queue items", items.len());
        Ok(items)
    }

    /// Snapshot of status counts and gate occupancy.
    pub async fn queue_state(&self) -> Result<QueueState> {
        let counts = self.queue.count_by_status().await?;

        let mut status_counts: HashMap<String, i64> = DownloadStatus::ALL
            .iter()
            .map(|status| (status.as_str().to_string(), 0))
            .collect();
        let mut total = 0;
        for (status, count) in counts {
            total += count;
            status_counts.insert(status, count);
        }

        Ok(QueueState {
            total_items: total,
            status_counts,
            active_downloads: self.active_count(),
            max_concurrent: self.max_concurrent(),
            can_start_more: self.can_start_download(),
        })
    }

    /// Hand the next pending item to the start-callback when a slot is
    /// free. Lookup failures are logged, never propagated; this runs on
    /// the tail of complete/fail and must not mask their result.
    async fn auto_start_next(&self) {
        if !self.can_start_download() {
            return;
        }

        match self.queue.find_next_pending().await {
            Ok(Some(next)) => {
                let callback = self.start_callback.read().clone();
                if let Some(callback) = callback {
                    debug!("Auto-starting next pending item: {}", next.id);
                    callback(next.id);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to auto-start next download: {}", e),
        }
    }

    /// Most recent history entry for a URL, if any.
    pub async fn check_duplicate(&self, url: &str) -> Result<Option<HistoryEntryDbModel>> {
        let url = url.trim();
        if url.is_empty() {
            return Ok(None);
        }
        self.history.latest_by_url(url).await
    }

    /// Record a finished download directly in history.
    pub async fn add_to_history(&self, entry: NewHistoryEntry) -> Result<HistoryEntryDbModel> {
        let entry = HistoryEntryDbModel::new(entry);
        self.history.insert(&entry).await?;
        info!(id = %entry.id, "Added to history: {}", entry.title);
        Ok(entry)
    }

    pub async fn get_history(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryEntryDbModel>> {
        self.history.list(search, limit, offset).await
    }

    pub async fn get_history_count(&self, search: Option<&str>) -> Result<i64> {
        self.history.count(search).await
    }

    pub async fn remove_from_history(&self, id: &str) -> Result<bool> {
        let rows = self.history.delete(id).await?;
        Ok(rows > 0)
    }

    pub async fn clear_history(&self) -> Result<u64> {
        let count = self.history.clear().await?;
        info!("Cleared {} history entries", count);
        Ok(count)
    }
}
