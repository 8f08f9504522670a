//! Format selection and persisted format preferences.

pub mod selector;

pub use selector::{FormatRankingConfig, resolution_height};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backend::{VideoBackend, VideoFormat};
use crate::database::repositories::PreferenceRepository;
use crate::{Error, Result};

/// Preference key for the persisted default format preset.
pub const PREF_DEFAULT_FORMAT: &str = "default_format";
/// Preference key for the persisted audio-only preference.
pub const PREF_PREFER_AUDIO_ONLY: &str = "prefer_audio_only";

/// Recognized default-format presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatPreset {
    Best,
    P1080,
    P720,
    P480,
    P360,
    Audio,
}

impl FormatPreset {
    pub const ALL: [FormatPreset; 6] = [
        Self::Best,
        Self::P1080,
        Self::P720,
        Self::P480,
        Self::P360,
        Self::Audio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::P1080 => "1080p",
            Self::P720 => "720p",
            Self::P480 => "480p",
            Self::P360 => "360p",
            Self::Audio => "audio",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "best" => Some(Self::Best),
            "1080p" => Some(Self::P1080),
            "720p" => Some(Self::P720),
            "480p" => Some(Self::P480),
            "360p" => Some(Self::P360),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }

    /// Resolution ceiling implied by the preset, when it has one.
    pub fn max_resolution(&self) -> Option<u32> {
        match self {
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
            Self::P360 => Some(360),
            Self::Best | Self::Audio => None,
        }
    }
}

/// Ranks and filters the formats a backend offers for a source video.
pub struct FormatSelector {
    backend: Arc<dyn VideoBackend>,
    preferences: Arc<dyn PreferenceRepository>,
    config: FormatRankingConfig,
}

impl FormatSelector {
    pub fn new(
        backend: Arc<dyn VideoBackend>,
        preferences: Arc<dyn PreferenceRepository>,
    ) -> Self {
        Self::with_config(backend, preferences, FormatRankingConfig::default())
    }

    pub fn with_config(
        backend: Arc<dyn VideoBackend>,
        preferences: Arc<dyn PreferenceRepository>,
        config: FormatRankingConfig,
    ) -> Self {
        Self {
            backend,
            preferences,
            config,
        }
    }

    /// All formats the backend offers for a URL, best first.
    pub async fn get_available_formats(&self, url: &str) -> Result<Vec<VideoFormat>> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::validation("URL cannot be empty"));
        }

        let info = self
            .backend
            .extract_info(url)
            .await
            .map_err(|e| Error::format("Failed to get available formats", e))?;

        let mut formats = info.formats;
        formats.sort_by(|a, b| self.config.compare_video(a, b));
        Ok(formats)
    }

    /// Best video format under the optional resolution/codec filters.
    ///
    /// Audio-only formats are excluded unless nothing else qualifies;
    /// a filter that would empty the candidate set is skipped.
    pub fn get_best_format(
        &self,
        formats: &[VideoFormat],
        max_resolution: Option<u32>,
        prefer_codec: Option<&str>,
    ) -> Option<VideoFormat> {
        if formats.is_empty() {
            return None;
        }

        let mut candidates: Vec<&VideoFormat> =
            formats.iter().filter(|f| !f.is_audio_only).collect();
        if candidates.is_empty() {
            candidates = formats.iter().collect();
        }

        if let Some(max) = max_resolution {
            let filtered: Vec<&VideoFormat> = candidates
                .iter()
                .copied()
                .filter(|f| {
                    !f.is_audio_only
                        && f.resolution
                            .as_deref()
                            .map(resolution_height)
                            .is_some_and(|height| height > 0 && height <= max)
                })
                .collect();
            if !filtered.is_empty() {
                candidates = filtered;
            }
        }

        if let Some(codec) = prefer_codec {
            let codec_lower = codec.to_lowercase();
            let filtered: Vec<&VideoFormat> = candidates
                .iter()
                .copied()
                .filter(|f| {
                    f.codec
                        .as_deref()
                        .is_some_and(|c| c.to_lowercase().contains(&codec_lower))
                })
                .collect();
            if !filtered.is_empty() {
                candidates = filtered;
            }
        }

        candidates.sort_by(|a, b| self.config.compare_video(a, b));
        candidates.first().map(|f| (*f).clone())
    }

    /// Audio-only formats, best first.
    pub fn get_audio_formats(&self, formats: &[VideoFormat]) -> Vec<VideoFormat> {
        let mut audio: Vec<VideoFormat> = formats
            .iter()
            .filter(|f| f.is_audio_only)
            .cloned()
            .collect();
        audio.sort_by(|a, b| self.config.compare_audio(a, b));
        audio
    }

    /// Formats with a video track, best first.
    pub fn get_video_formats(&self, formats: &[VideoFormat]) -> Vec<VideoFormat> {
        let mut video: Vec<VideoFormat> = formats
            .iter()
            .filter(|f| !f.is_audio_only)
            .cloned()
            .collect();
        video.sort_by(|a, b| self.config.compare_video(a, b));
        video
    }

    pub fn get_best_audio_format(&self, formats: &[VideoFormat]) -> Option<VideoFormat> {
        self.get_audio_formats(formats).into_iter().next()
    }

    /// Video formats whose parsed height matches `resolution` exactly.
    pub fn get_formats_by_resolution(
        &self,
        formats: &[VideoFormat],
        resolution: u32,
    ) -> Vec<VideoFormat> {
        let mut matching: Vec<VideoFormat> = formats
            .iter()
            .filter(|f| {
                !f.is_audio_only
                    && f.resolution
                        .as_deref()
                        .is_some_and(|r| resolution_height(r) == resolution)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| self.config.compare_video(a, b));
        matching
    }

    /// Resolve the format to use for a download.
    ///
    /// An explicit, present `format_id` wins; otherwise the persisted
    /// preferences decide, falling back to best-quality video.
    pub async fn get_format_for_download(
        &self,
        url: &str,
        format_id: Option<&str>,
    ) -> Result<Option<VideoFormat>> {
        let formats = self.get_available_formats(url).await?;
        if formats.is_empty() {
            return Ok(None);
        }

        if let Some(requested) = format_id {
            if let Some(format) = formats.iter().find(|f| f.format_id == requested) {
                return Ok(Some(format.clone()));
            }
            warn!("Requested format '{}' not found, using default", requested);
        }

        if self.get_prefer_audio_only().await? {
            return Ok(self.get_best_audio_format(&formats));
        }

        if let Some(preset) = self.get_default_format().await? {
            if preset == FormatPreset::Audio {
                return Ok(self.get_best_audio_format(&formats));
            }
            if let Some(max) = preset.max_resolution() {
                return Ok(self.get_best_format(&formats, Some(max), None));
            }
        }

        Ok(self.get_best_format(&formats, None, None))
    }

    /// Persist the default format preset.
    pub async fn set_default_format(&self, preference: &str) -> Result<()> {
        let Some(preset) = FormatPreset::parse(preference) else {
            let valid = FormatPreset::ALL
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::validation(format!(
                "Invalid format preference '{preference}'. Valid options: {valid}"
            )));
        };

        self.preferences
            .set(PREF_DEFAULT_FORMAT, preset.as_str())
            .await
    }

    pub async fn get_default_format(&self) -> Result<Option<FormatPreset>> {
        let Some(value) = self.preferences.get(PREF_DEFAULT_FORMAT).await? else {
            return Ok(None);
        };
        match FormatPreset::parse(&value) {
            Some(preset) => Ok(Some(preset)),
            None => {
                warn!("Ignoring unrecognized stored format preference '{}'", value);
                Ok(None)
            }
        }
    }

    pub async fn set_prefer_audio_only(&self, prefer_audio: bool) -> Result<()> {
        self.preferences
            .set(PREF_PREFER_AUDIO_ONLY, if prefer_audio { "true" } else { "false" })
            .await
    }

    pub async fn get_prefer_audio_only(&self) -> Result<bool> {
        let value = self.preferences.get(PREF_PREFER_AUDIO_ONLY).await?;
        Ok(value.as_deref() == Some("true"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_round_trip() {
        for preset in FormatPreset::ALL {
            assert_eq!(FormatPreset::parse(preset.as_str()), Some(preset));
        }
        assert_eq!(FormatPreset::parse("4k"), None);
    }

    #[test]
    fn preset_resolution_ceilings() {
        assert_eq!(FormatPreset::P1080.max_resolution(), Some(1080));
        assert_eq!(FormatPreset::P360.max_resolution(), Some(360));
        assert_eq!(FormatPreset::Best.max_resolution(), None);
        assert_eq!(FormatPreset::Audio.max_resolution(), None);
    }
}
