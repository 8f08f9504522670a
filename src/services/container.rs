//! Service container for dependency injection.
//!
//! Wires the pool, repositories, and services from an `AppConfig` and a
//! caller-supplied video backend.

use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::backend::VideoBackend;
use crate::config::AppConfig;
use crate::database::models::QueueItemDbModel;
use crate::database::repositories::{
    SqlxHistoryRepository, SqlxPreferenceRepository, SqlxQueueRepository,
};
use crate::database::{self, DbPool};
use crate::downloader::{DownloadExecutor, DownloadManager};
use crate::format::FormatSelector;
use crate::playlist::PlaylistOrchestrator;

/// Service container holding all application services.
pub struct ServiceContainer {
    /// Database connection pool.
    pub pool: DbPool,
    /// Download queue manager.
    pub download_manager: Arc<DownloadManager>,
    /// Worker bridge between the manager and the backend.
    pub executor: Arc<DownloadExecutor>,
    /// Format selection service.
    pub format_selector: Arc<FormatSelector>,
    /// Playlist and batch orchestration.
    pub playlist: Arc<PlaylistOrchestrator>,
}

impl ServiceContainer {
    /// Build the full service graph: pool, migrations, repositories,
    /// manager, executor, selector, and orchestrator.
    pub async fn build(config: AppConfig, backend: Arc<dyn VideoBackend>) -> Result<Self> {
        info!("Initializing service container");

        let pool = database::init_pool(&config.database_url).await?;
        database::run_migrations(&pool).await?;

        let queue_repo = Arc::new(SqlxQueueRepository::new(pool.clone()));
        let history_repo = Arc::new(SqlxHistoryRepository::new(pool.clone()));
        let preference_repo = Arc::new(SqlxPreferenceRepository::new(pool.clone()));

        let download_manager = Arc::new(DownloadManager::new(
            pool.clone(),
            queue_repo,
            history_repo,
            config.manager_config(),
        ));

        let executor = DownloadExecutor::start(download_manager.clone(), backend.clone());
        let format_selector = Arc::new(FormatSelector::new(backend.clone(), preference_repo));
        let playlist = Arc::new(PlaylistOrchestrator::new(backend));

        info!("Service container initialized");

        Ok(Self {
            pool,
            download_manager,
            executor,
            format_selector,
            playlist,
        })
    }

    /// Startup recovery. Run once before authorizing any new start.
    pub async fn restore_queue(&self) -> Result<Vec<QueueItemDbModel>> {
        self.download_manager.restore_queue().await
    }

    /// Stop dispatching new starts.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }
}
