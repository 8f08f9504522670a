//! Integration tests for playlist orchestration and format selection,
//! driven against a scripted backend stub.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use vdq::Error;
use vdq::backend::{
    DownloadError, ExtractError, PlaylistInfo, ProgressCallback, VideoBackend, VideoFormat,
    VideoInfo,
};
use vdq::database::repositories::SqlxPreferenceRepository;
use vdq::database::{init_pool, run_migrations};
use vdq::format::{FormatPreset, FormatSelector};
use vdq::playlist::PlaylistOrchestrator;

fn make_video(n: usize) -> VideoInfo {
    VideoInfo {
        url: format!("https://example.com/watch?v={n}"),
        title: format!("Video {n}"),
        uploader: Some("channel".to_string()),
        duration: Some(60),
        formats: Vec::new(),
        playlist_index: None,
        playlist_title: None,
        playlist_count: None,
    }
}

fn video_format(format_id: &str, extension: &str, resolution: &str, quality: u32) -> VideoFormat {
    VideoFormat {
        format_id: format_id.to_string(),
        extension: extension.to_string(),
        resolution: Some(resolution.to_string()),
        filesize: Some(1024 * 1024),
        codec: Some("avc1".to_string()),
        is_audio_only: false,
        quality,
        vcodec: Some("avc1".to_string()),
        acodec: Some("mp4a".to_string()),
        audio_bitrate: None,
    }
}

fn audio_format(format_id: &str, extension: &str, bitrate: f64) -> VideoFormat {
    VideoFormat {
        format_id: format_id.to_string(),
        extension: extension.to_string(),
        resolution: None,
        filesize: None,
        codec: Some("mp4a".to_string()),
        is_audio_only: true,
        quality: 0,
        vcodec: None,
        acodec: Some("mp4a".to_string()),
        audio_bitrate: Some(bitrate),
    }
}

/// Scripted backend: fixed playlist, fixed format table, and lists of
/// URLs whose downloads fail or panic.
#[derive(Default)]
struct ScriptedBackend {
    playlist: Vec<VideoInfo>,
    formats: Vec<VideoFormat>,
    fail_urls: Vec<String>,
    panic_urls: Vec<String>,
    fail_extract: bool,
    probe_result: bool,
    probes: AtomicUsize,
}

#[async_trait]
impl VideoBackend for ScriptedBackend {
    async fn extract_info(&self, url: &str) -> Result<VideoInfo, ExtractError> {
        if self.fail_extract {
            return Err(ExtractError::Network("connection reset".to_string()));
        }
        let mut video = make_video(0);
        video.url = url.to_string();
        video.formats = self.formats.clone();
        Ok(video)
    }

    async fn download(
        &self,
        url: &str,
        output_path: &Path,
        _format_id: Option<&str>,
        _on_progress: ProgressCallback,
        _cancel: CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        if self.fail_urls.iter().any(|failing| failing == url) {
            return Err(DownloadError::Unavailable("scripted failure".to_string()));
        }
        if self.panic_urls.iter().any(|panicking| panicking == url) {
            panic!("scripted panic");
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let name = url.rsplit('=').next().unwrap_or("video");
        Ok(output_path.join(format!("{name}.mp4")))
    }

    async fn extract_playlist(&self, _url: &str) -> Result<Vec<VideoInfo>, ExtractError> {
        Ok(self.playlist.clone())
    }

    async fn is_playlist(&self, _url: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.probe_result
    }

    async fn playlist_info(&self, _url: &str) -> Result<PlaylistInfo, ExtractError> {
        Ok(PlaylistInfo {
            title: "Scripted Playlist".to_string(),
            uploader: Some("channel".to_string()),
            count: self.playlist.len() as u32,
        })
    }
}

mod playlist_tests {
    use super::*;

    #[tokio::test]
    async fn enumerate_stamps_indexes_and_count() {
        let backend = Arc::new(ScriptedBackend {
            playlist: (1..=3).map(make_video).collect(),
            ..Default::default()
        });
        let orchestrator = PlaylistOrchestrator::new(backend);

        let videos = orchestrator
            .enumerate_playlist("https://example.com/playlist?list=PL1")
            .await
            .unwrap();

        assert_eq!(videos.len(), 3);
        for (idx, video) in videos.iter().enumerate() {
            assert_eq!(video.playlist_index, Some(idx as u32 + 1));
            assert_eq!(video.playlist_count, Some(3));
        }
    }

    #[tokio::test]
    async fn enumerate_rejects_empty_url_and_empty_playlist() {
        let orchestrator = PlaylistOrchestrator::new(Arc::new(ScriptedBackend::default()));

        assert!(matches!(
            orchestrator.enumerate_playlist("  ").await,
            Err(Error::Playlist(_))
        ));
        assert!(matches!(
            orchestrator
                .enumerate_playlist("https://example.com/playlist?list=empty")
                .await,
            Err(Error::Playlist(_))
        ));
    }

    #[tokio::test]
    async fn get_range_validates_and_clamps() {
        let orchestrator = PlaylistOrchestrator::new(Arc::new(ScriptedBackend::default()));
        let videos: Vec<VideoInfo> = (1..=5).map(make_video).collect();

        assert!(matches!(
            orchestrator.get_range(&videos, 0, 3),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            orchestrator.get_range(&videos, 3, 2),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            orchestrator.get_range(&videos, 6, 9),
            Err(Error::Playlist(_))
        ));
        assert!(matches!(
            orchestrator.get_range(&[], 1, 1),
            Err(Error::Playlist(_))
        ));

        let selected = orchestrator.get_range(&videos, 2, 100).unwrap();
        assert_eq!(selected.len(), 4);
        assert_eq!(selected[0].url, videos[1].url);

        let exact = orchestrator.get_range(&videos, 1, 3).unwrap();
        assert_eq!(exact.len(), 3);
    }

    #[tokio::test]
    async fn batch_isolates_failures_and_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let videos: Vec<VideoInfo> = (1..=5).map(make_video).collect();
        let failing_url = videos[2].url.clone();

        let backend = Arc::new(ScriptedBackend {
            fail_urls: vec![failing_url.clone()],
            ..Default::default()
        });
        let orchestrator = PlaylistOrchestrator::new(backend);

        let calls: Arc<Mutex<Vec<(String, usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();

        let result = orchestrator
            .download_batch(
                videos,
                dir.path(),
                None,
                2,
                Some(Arc::new(move |url, completed, total| {
                    sink.lock().unwrap().push((url.to_string(), completed, total));
                })),
            )
            .await
            .unwrap();

        assert_eq!(result.total(), 5);
        assert_eq!(result.success_count(), 4);
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.failures[0].0, failing_url);
        assert!(result.failures[0].1.contains("scripted failure"));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 5);
        let counts: Vec<usize> = calls.iter().map(|(_, completed, _)| *completed).collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 5]);
        assert!(calls.iter().all(|(_, _, total)| *total == 5));
    }

    #[tokio::test]
    async fn batch_counts_panicked_worker_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let videos: Vec<VideoInfo> = (1..=3).map(make_video).collect();
        let panicking_url = videos[1].url.clone();

        let backend = Arc::new(ScriptedBackend {
            panic_urls: vec![panicking_url.clone()],
            ..Default::default()
        });
        let orchestrator = PlaylistOrchestrator::new(backend);

        let calls: Arc<Mutex<Vec<(String, usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();

        let result = orchestrator
            .download_batch(
                videos,
                dir.path(),
                None,
                2,
                Some(Arc::new(move |url, completed, total| {
                    sink.lock().unwrap().push((url.to_string(), completed, total));
                })),
            )
            .await
            .unwrap();

        // The crashed worker's video is still attempted and accounted for.
        assert_eq!(result.total(), 3);
        assert_eq!(result.success_count(), 2);
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.failures[0].0, panicking_url);
        assert!(result.failures[0].1.contains("worker task failed"));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        let counts: Vec<usize> = calls.iter().map(|(_, completed, _)| *completed).collect();
        assert_eq!(counts, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn batch_of_nothing_is_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = PlaylistOrchestrator::new(Arc::new(ScriptedBackend::default()));

        let result = orchestrator
            .download_batch(Vec::new(), dir.path(), None, 3, None)
            .await
            .unwrap();
        assert_eq!(result.total(), 0);
    }

    #[tokio::test]
    async fn batch_clamps_concurrency_to_valid_range() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = PlaylistOrchestrator::new(Arc::new(ScriptedBackend::default()));
        let videos: Vec<VideoInfo> = (1..=3).map(make_video).collect();

        // 0 clamps to 1; the batch still completes every video.
        let result = orchestrator
            .download_batch(videos, dir.path(), None, 0, None)
            .await
            .unwrap();
        assert_eq!(result.success_count(), 3);
    }

    #[tokio::test]
    async fn is_playlist_short_circuits_on_url_shape() {
        let backend = Arc::new(ScriptedBackend {
            probe_result: true,
            ..Default::default()
        });
        let orchestrator = PlaylistOrchestrator::new(backend.clone());

        assert!(
            orchestrator
                .is_playlist("https://example.com/playlist?list=PL1")
                .await
        );
        assert_eq!(backend.probes.load(Ordering::SeqCst), 0);

        // Ambiguous URLs fall back to the backend probe.
        assert!(orchestrator.is_playlist("https://example.com/watch?v=1").await);
        assert_eq!(backend.probes.load(Ordering::SeqCst), 1);

        assert!(!orchestrator.is_playlist("").await);
        assert_eq!(backend.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn download_playlist_applies_range() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend {
            playlist: (1..=5).map(make_video).collect(),
            ..Default::default()
        });
        let orchestrator = PlaylistOrchestrator::new(backend);

        let result = orchestrator
            .download_playlist(
                "https://example.com/playlist?list=PL1",
                dir.path(),
                None,
                Some(2),
                Some(3),
                2,
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.total(), 2);
        assert_eq!(result.success_count(), 2);
    }

    #[tokio::test]
    async fn playlist_info_requires_url() {
        let backend = Arc::new(ScriptedBackend {
            playlist: (1..=4).map(make_video).collect(),
            ..Default::default()
        });
        let orchestrator = PlaylistOrchestrator::new(backend);

        assert!(matches!(
            orchestrator.playlist_info("").await,
            Err(Error::Playlist(_))
        ));

        let info = orchestrator
            .playlist_info("https://example.com/playlist?list=PL1")
            .await
            .unwrap();
        assert_eq!(info.title, "Scripted Playlist");
        assert_eq!(info.count, 4);
    }
}

mod selector_tests {
    use super::*;

    fn fixture_formats() -> Vec<VideoFormat> {
        vec![
            video_format("360-mp4", "mp4", "360p", 360),
            video_format("1080-mp4", "mp4", "1080p", 1080),
            video_format("720-webm", "webm", "720p", 720),
            audio_format("m4a-128", "m4a", 128.0),
            audio_format("opus-160", "opus", 160.0),
        ]
    }

    async fn setup_selector(backend: Arc<ScriptedBackend>) -> (TempDir, FormatSelector) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("vdq-test.db").display());
        let pool = init_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let selector = FormatSelector::new(backend, Arc::new(SqlxPreferenceRepository::new(pool)));
        (dir, selector)
    }

    #[tokio::test]
    async fn best_format_prefers_highest_quality_then_respects_ceiling() {
        let backend = Arc::new(ScriptedBackend {
            formats: fixture_formats(),
            ..Default::default()
        });
        let (_dir, selector) = setup_selector(backend).await;
        let formats = fixture_formats();

        let best = selector.get_best_format(&formats, None, None).unwrap();
        assert_eq!(best.format_id, "1080-mp4");

        let capped = selector.get_best_format(&formats, Some(720), None).unwrap();
        assert_eq!(capped.format_id, "720-webm");

        assert!(selector.get_best_format(&[], None, None).is_none());
    }

    #[tokio::test]
    async fn best_format_falls_back_when_filters_would_empty() {
        let backend = Arc::new(ScriptedBackend::default());
        let (_dir, selector) = setup_selector(backend).await;

        // Only audio available: audio exclusion falls back to the full list.
        let audio_only = vec![audio_format("m4a-128", "m4a", 128.0)];
        let best = selector.get_best_format(&audio_only, None, None).unwrap();
        assert_eq!(best.format_id, "m4a-128");

        // No format under the ceiling: the filter is skipped.
        let formats = vec![video_format("1080-mp4", "mp4", "1080p", 1080)];
        let best = selector.get_best_format(&formats, Some(480), None).unwrap();
        assert_eq!(best.format_id, "1080-mp4");
    }

    #[tokio::test]
    async fn audio_and_resolution_filters() {
        let backend = Arc::new(ScriptedBackend::default());
        let (_dir, selector) = setup_selector(backend).await;
        let formats = fixture_formats();

        let audio = selector.get_audio_formats(&formats);
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[0].format_id, "opus-160");

        let best_audio = selector.get_best_audio_format(&formats).unwrap();
        assert_eq!(best_audio.format_id, "opus-160");

        let video = selector.get_video_formats(&formats);
        assert_eq!(video.len(), 3);
        assert_eq!(video[0].format_id, "1080-mp4");

        let at_720 = selector.get_formats_by_resolution(&formats, 720);
        assert_eq!(at_720.len(), 1);
        assert_eq!(at_720[0].format_id, "720-webm");
    }

    #[tokio::test]
    async fn available_formats_come_back_ranked_or_wrapped() {
        let backend = Arc::new(ScriptedBackend {
            formats: fixture_formats(),
            ..Default::default()
        });
        let (_dir, selector) = setup_selector(backend).await;

        let formats = selector
            .get_available_formats("https://example.com/watch?v=1")
            .await
            .unwrap();
        assert_eq!(formats[0].format_id, "1080-mp4");

        assert!(matches!(
            selector.get_available_formats("  ").await,
            Err(Error::Validation(_))
        ));

        let failing = Arc::new(ScriptedBackend {
            fail_extract: true,
            ..Default::default()
        });
        let (_dir2, failing_selector) = setup_selector(failing).await;
        assert!(matches!(
            failing_selector
                .get_available_formats("https://example.com/watch?v=1")
                .await,
            Err(Error::Format { .. })
        ));
    }

    #[tokio::test]
    async fn preferences_round_trip_through_the_store() {
        let backend = Arc::new(ScriptedBackend::default());
        let (_dir, selector) = setup_selector(backend).await;

        assert_eq!(selector.get_default_format().await.unwrap(), None);
        assert!(!selector.get_prefer_audio_only().await.unwrap());

        selector.set_default_format("720p").await.unwrap();
        assert_eq!(
            selector.get_default_format().await.unwrap(),
            Some(FormatPreset::P720)
        );

        selector.set_default_format("best").await.unwrap();
        assert_eq!(
            selector.get_default_format().await.unwrap(),
            Some(FormatPreset::Best)
        );

        assert!(matches!(
            selector.set_default_format("4k").await,
            Err(Error::Validation(_))
        ));

        selector.set_prefer_audio_only(true).await.unwrap();
        assert!(selector.get_prefer_audio_only().await.unwrap());
        selector.set_prefer_audio_only(false).await.unwrap();
        assert!(!selector.get_prefer_audio_only().await.unwrap());
    }

    #[tokio::test]
    async fn format_for_download_resolution_order() {
        let backend = Arc::new(ScriptedBackend {
            formats: fixture_formats(),
            ..Default::default()
        });
        let (_dir, selector) = setup_selector(backend).await;
        let url = "https://example.com/watch?v=1";

        // Explicit, present format id wins over everything.
        selector.set_prefer_audio_only(true).await.unwrap();
        let explicit = selector
            .get_format_for_download(url, Some("360-mp4"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(explicit.format_id, "360-mp4");

        // Audio-only preference applies when no explicit id is given.
        let audio = selector
            .get_format_for_download(url, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(audio.format_id, "opus-160");
        selector.set_prefer_audio_only(false).await.unwrap();

        // Unknown explicit id falls through to the preset.
        selector.set_default_format("720p").await.unwrap();
        let fallback = selector
            .get_format_for_download(url, Some("does-not-exist"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fallback.format_id, "720-webm");

        // The audio preset selects the best audio format.
        selector.set_default_format("audio").await.unwrap();
        let preset_audio = selector
            .get_format_for_download(url, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(preset_audio.format_id, "opus-160");

        // "best" preset and no preferences both mean best quality.
        selector.set_default_format("best").await.unwrap();
        let best = selector
            .get_format_for_download(url, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.format_id, "1080-mp4");
    }
}
