//! URL helpers.

use url::Url;

/// Path segments that identify playlist pages on well-known platforms.
const PLAYLIST_PATH_MARKERS: [&str; 3] = [
    "/playlist",
    // SoundCloud
    "/sets/",
    // Bandcamp, Spotify
    "/album/",
];

/// Fast heuristic for playlist-shaped URLs.
///
/// Matches the `list` query parameter and well-known playlist path
/// segments. A `false` here is inconclusive; callers fall back to a
/// flattened-extraction probe against the backend.
pub fn looks_like_playlist(raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw) else {
        return false;
    };

    if parsed.query_pairs().any(|(key, _)| key == "list") {
        return true;
    }

    let path = parsed.path().to_lowercase();
    PLAYLIST_PATH_MARKERS
        .iter()
        .any(|marker| path.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_list_query_parameter() {
        assert!(looks_like_playlist(
            "https://www.youtube.com/playlist?list=PLx"
        ));
        assert!(looks_like_playlist(
            "https://www.youtube.com/watch?v=abc&list=PLx"
        ));
    }

    #[test]
    fn matches_path_segments() {
        assert!(looks_like_playlist("https://soundcloud.com/artist/sets/mix"));
        assert!(looks_like_playlist("https://artist.bandcamp.com/album/lp"));
    }

    #[test]
    fn is_case_insensitive_on_paths() {
        assert!(looks_like_playlist("https://example.com/PLAYLIST/123"));
    }

    #[test]
    fn plain_video_url_is_inconclusive() {
        assert!(!looks_like_playlist("https://www.youtube.com/watch?v=abc"));
        assert!(!looks_like_playlist("not a url"));
        assert!(!looks_like_playlist(""));
    }
}
