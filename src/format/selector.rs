//! Format ranking: comparators and resolution parsing.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::backend::VideoFormat;

/// Configuration for format ranking preferences.
///
/// Extension priorities are configurable tables; a higher value ranks
/// earlier. Extensions missing from a table score 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatRankingConfig {
    /// Container preference for video formats (mp4 > webm > mkv).
    pub video_extension_priority: HashMap<String, u32>,
    /// Container preference for audio-only formats (m4a > mp3 > opus).
    pub audio_extension_priority: HashMap<String, u32>,
}

impl Default for FormatRankingConfig {
    fn default() -> Self {
        Self {
            video_extension_priority: HashMap::from([
                ("mp4".to_string(), 3),
                ("webm".to_string(), 2),
                ("mkv".to_string(), 1),
            ]),
            audio_extension_priority: HashMap::from([
                ("m4a".to_string(), 3),
                ("mp3".to_string(), 2),
                ("opus".to_string(), 1),
            ]),
        }
    }
}

impl FormatRankingConfig {
    fn video_extension_score(&self, format: &VideoFormat) -> u32 {
        self.video_extension_priority
            .get(&format.extension)
            .copied()
            .unwrap_or(0)
    }

    fn audio_extension_score(&self, format: &VideoFormat) -> u32 {
        self.audio_extension_priority
            .get(&format.extension)
            .copied()
            .unwrap_or(0)
    }

    /// Video ordering: quality desc, then extension priority desc, then
    /// formats carrying both codecs above video-only ones.
    pub fn compare_video(&self, a: &VideoFormat, b: &VideoFormat) -> Ordering {
        b.quality
            .cmp(&a.quality)
            .then_with(|| self.video_extension_score(b).cmp(&self.video_extension_score(a)))
            .then_with(|| b.has_both_codecs().cmp(&a.has_both_codecs()))
    }

    /// Audio ordering: bitrate desc, then extension priority desc.
    pub fn compare_audio(&self, a: &VideoFormat, b: &VideoFormat) -> Ordering {
        let bitrate_a = a.audio_bitrate.unwrap_or(0.0);
        let bitrate_b = b.audio_bitrate.unwrap_or(0.0);
        bitrate_b
            .partial_cmp(&bitrate_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.audio_extension_score(b).cmp(&self.audio_extension_score(a)))
    }
}

/// Parse a resolution string ("1080p", "640w") into an integer height.
///
/// Unparsable strings yield 0 so they rank last without raising.
pub fn resolution_height(resolution: &str) -> u32 {
    resolution
        .trim_end_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .unwrap_or(0)
}
