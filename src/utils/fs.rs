//! Filesystem helpers shared across modules.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(Error::Io)
}

/// Partial-artifact suffix candidates for a download output path.
///
/// Covers both `<file>.<ext>.part` and `<file>.part` plus the
/// resume-metadata file the backend leaves beside interrupted transfers.
fn partial_candidates(output_path: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(3);

    let mut appended = output_path.as_os_str().to_os_string();
    appended.push(".part");
    candidates.push(PathBuf::from(appended));

    candidates.push(output_path.with_extension("part"));

    let mut ytdl = output_path.as_os_str().to_os_string();
    ytdl.push(".ytdl");
    candidates.push(PathBuf::from(ytdl));

    candidates
}

/// Best-effort removal of partial download artifacts.
///
/// Removal failures are logged and never propagated; cleanup must not
/// turn a successful cancel into an error.
pub async fn cleanup_partial_artifacts(output_path: &Path) {
    for candidate in partial_candidates(output_path) {
        match tokio::fs::remove_file(&candidate).await {
            Ok(()) => debug!(path = %candidate.display(), "Removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %candidate.display(), error = %e, "Failed to cleanup partial file")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_part_and_ytdl_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("video.mp4");
        let part = dir.path().join("video.mp4.part");
        let ytdl = dir.path().join("video.mp4.ytdl");
        tokio::fs::write(&part, b"x").await.unwrap();
        tokio::fs::write(&ytdl, b"x").await.unwrap();

        cleanup_partial_artifacts(&output).await;

        assert!(!part.exists());
        assert!(!ytdl.exists());
    }

    #[tokio::test]
    async fn missing_artifacts_are_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        cleanup_partial_artifacts(&dir.path().join("never-downloaded.mp4")).await;
    }
}
