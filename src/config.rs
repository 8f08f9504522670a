//! Application configuration.
//!
//! Explicit configuration structs passed into each component's
//! constructor; there is no process-wide mutable state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::downloader::DownloadManagerConfig;

/// Top-level configuration used to wire the service container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database URL.
    pub database_url: String,
    /// Default destination directory for downloads.
    pub output_dir: PathBuf,
    /// Maximum concurrent queued downloads, clamped to [1, 5].
    pub max_concurrent: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:vdq.db?mode=rwc".to_string(),
            output_dir: PathBuf::from("downloads"),
            max_concurrent: 3,
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// Reads a `.env` file when present, then `VDQ_DATABASE_URL`,
    /// `VDQ_OUTPUT_DIR`, and `VDQ_MAX_CONCURRENT`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Ok(value) = std::env::var("VDQ_DATABASE_URL") {
            config.database_url = value;
        }
        if let Ok(value) = std::env::var("VDQ_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("VDQ_MAX_CONCURRENT")
            && let Ok(count) = value.parse()
        {
            config.max_concurrent = count;
        }
        config
    }

    pub fn manager_config(&self) -> DownloadManagerConfig {
        DownloadManagerConfig {
            default_output_dir: self.output_dir.clone(),
            max_concurrent: self.max_concurrent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.output_dir, PathBuf::from("downloads"));
    }
}
