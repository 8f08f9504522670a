//! Download executor.
//!
//! Consumes the manager's start signals, runs backend transfers in
//! spawned tasks, forwards progress into the manager, and settles each
//! item as completed or failed. Cancellation is cooperative: `cancel`
//! only trips the per-download token; flipping the row is the manager's
//! job, and a cancelled worker discards its result.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::backend::{ProgressCallback, VideoBackend};
use crate::database::models::QueueItemDbModel;
use crate::downloader::manager::DownloadManager;

/// Bridges the download manager's start-callback to the video backend.
pub struct DownloadExecutor {
    manager: Arc<DownloadManager>,
    backend: Arc<dyn VideoBackend>,
    start_tx: mpsc::UnboundedSender<String>,
    /// Cancellation tokens for in-flight transfers.
    active_tokens: Arc<DashMap<String, CancellationToken>>,
    shutdown: CancellationToken,
}

impl DownloadExecutor {
    /// Create the executor, register it as the manager's start-callback,
    /// and spawn the dispatch loop.
    pub fn start(manager: Arc<DownloadManager>, backend: Arc<dyn VideoBackend>) -> Arc<Self> {
        let (start_tx, start_rx) = mpsc::unbounded_channel();

        let executor = Arc::new(Self {
            manager,
            backend,
            start_tx: start_tx.clone(),
            active_tokens: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        });

        executor.manager.set_start_callback(Some(Arc::new(move |id| {
            let _ = start_tx.send(id);
        })));

        let dispatcher = executor.clone();
        tokio::spawn(async move {
            dispatcher.dispatch_loop(start_rx).await;
        });

        executor
    }

    /// Request a start for an item explicitly (same path as auto-start).
    pub fn kick(&self, id: impl Into<String>) {
        let _ = self.start_tx.send(id.into());
    }

    /// Cancel the in-flight transfer for an item, if any.
    pub fn cancel(&self, id: &str) -> bool {
        match self.active_tokens.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop the dispatch loop. In-flight transfers keep their tokens and
    /// finish or get cancelled individually.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn dispatch_loop(self: Arc<Self>, mut start_rx: mpsc::UnboundedReceiver<String>) {
        debug!("Download executor dispatch loop started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Download executor shutting down");
                    break;
                }
                id = start_rx.recv() => {
                    let Some(id) = id else { break };
                    Arc::clone(&self).try_launch(id).await;
                }
            }
        }
    }

    /// Ask the manager for authorization, then hand the item to a worker.
    async fn try_launch(self: Arc<Self>, id: String) {
        let authorized = match self.manager.start_download(&id).await {
            Ok(ok) => ok,
            Err(e) => {
                error!("Failed to start download {}: {}", id, e);
                return;
            }
        };
        if !authorized {
            debug!("Start signal for {} not authorized, skipping", id);
            return;
        }

        let item = match self.manager.get_queue_item(&id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                warn!("Authorized item {} vanished before launch", id);
                return;
            }
            Err(e) => {
                error!("Failed to load queue item {}: {}", id, e);
                return;
            }
        };

        let token = CancellationToken::new();
        self.active_tokens.insert(id.clone(), token.clone());

        let executor = self.clone();
        tokio::spawn(async move {
            executor.run_transfer(item, token).await;
        });
    }

    async fn run_transfer(self: Arc<Self>, item: QueueItemDbModel, token: CancellationToken) {
        let id = item.id.clone();

        // Forward backend progress into the persisted row off the
        // backend's callback thread.
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<f64>();
        let forward_manager = self.manager.clone();
        let forward_id = id.clone();
        tokio::spawn(async move {
            while let Some(percent) = progress_rx.recv().await {
                if let Err(e) = forward_manager.update_progress(&forward_id, percent).await {
                    debug!("Progress update for {} failed: {}", forward_id, e);
                }
            }
        });

        let on_progress: ProgressCallback = Arc::new(move |update| {
            let _ = progress_tx.send(update.percent);
        });

        let result = self
            .backend
            .download(
                &item.url,
                Path::new(&item.output_path),
                item.format_id.as_deref(),
                on_progress,
                token.clone(),
            )
            .await;

        self.active_tokens.remove(&id);

        if token.is_cancelled() {
            // The row was already flipped by cancel_download.
            debug!("Discarding result of cancelled transfer {}", id);
            return;
        }

        match result {
            Ok(file_path) => {
                let file_size = tokio::fs::metadata(&file_path)
                    .await
                    .ok()
                    .map(|meta| meta.len() as i64);
                if let Err(e) = self
                    .manager
                    .complete_download(&id, &file_path, file_size)
                    .await
                {
                    error!("Failed to record completion of {}: {}", id, e);
                }
            }
            Err(e) => {
                if let Err(err) = self.manager.fail_download(&id, &e.to_string()).await {
                    error!("Failed to record failure of {}: {}", id, err);
                }
            }
        }
    }
}
