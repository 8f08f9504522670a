//! Download queue management.
//!
//! [`manager`] owns the persisted queue state machine and the
//! concurrency gate; [`executor`] bridges its start signals to the
//! video backend.

pub mod executor;
pub mod manager;

pub use executor::DownloadExecutor;
pub use manager::{DownloadManager, DownloadManagerConfig, QueueState, StartCallback};
