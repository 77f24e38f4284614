//! Track descriptor produced by the external resolver.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::TrackDuration;

/// Where a track came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(rename = "youtube")]
    YouTube,
    SoundCloud,
    Local,
    Radio,
    #[default]
    Other,
}

/// Stream URL or local file path handed to the decoder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TrackSource(String);

impl TrackSource {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for filesystem paths and `file://` URLs.
    ///
    /// Single-letter schemes are drive letters (`C:\music\a.mp3`), not URLs.
    pub fn is_local(&self) -> bool {
        match Url::parse(&self.0) {
            Ok(url) => url.scheme() == "file" || url.scheme().len() == 1,
            Err(_) => true,
        }
    }

    /// The argument the decoder should open: `file://` URLs become plain paths.
    pub fn decoder_input(&self) -> String {
        Url::parse(&self.0)
            .ok()
            .filter(|url| url.scheme() == "file")
            .and_then(|url| url.to_file_path().ok())
            .map_or_else(|| self.0.clone(), |path| path.display().to_string())
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackSource {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<String> for TrackSource {
    fn from(uri: String) -> Self {
        Self(uri)
    }
}

/// A resolved, playable track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    /// Track title.
    pub title: String,
    /// Stream URL or file path.
    pub source: TrackSource,
    /// Thumbnail image, if the platform has one.
    pub thumbnail: Option<String>,
    /// Track duration.
    pub duration: TrackDuration,
    /// Platform the resolver found the track on.
    pub platform: Platform,
}

impl Track {
    pub fn new(title: impl Into<String>, source: impl Into<TrackSource>) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
            thumbnail: None,
            duration: TrackDuration::Unknown,
            platform: Platform::Other,
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: TrackDuration) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(url.into());
        self
    }

    /// Live streams never end on their own.
    pub const fn is_live(&self) -> bool {
        self.duration.is_infinite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_creation() {
        let track = Track::new("Test Song", "https://example.com/a.opus")
            .with_duration(TrackDuration::Finite(200))
            .with_platform(Platform::SoundCloud);
        assert_eq!(track.title, "Test Song");
        assert_eq!(track.duration.as_seconds(), Some(200));
        assert_eq!(track.platform, Platform::SoundCloud);
        assert!(!track.is_live());
    }

    #[test]
    fn test_source_locality() {
        assert!(TrackSource::new("/music/song.flac").is_local());
        assert!(TrackSource::new("relative/song.mp3").is_local());
        assert!(TrackSource::new("file:///music/song.flac").is_local());
        assert!(TrackSource::new("C:\\music\\song.mp3").is_local());
        assert!(!TrackSource::new("https://cdn.example.com/stream").is_local());
        assert!(!TrackSource::new("http://radio.example.com:8000/live").is_local());
    }

    #[test]
    fn test_decoder_input_strips_file_scheme() {
        assert_eq!(
            TrackSource::new("file:///music/song.flac").decoder_input(),
            "/music/song.flac"
        );
        assert_eq!(
            TrackSource::new("https://cdn.example.com/a").decoder_input(),
            "https://cdn.example.com/a"
        );
    }

    #[test]
    fn test_platform_serde() {
        assert_eq!(
            serde_json::to_string(&Platform::YouTube).ok().as_deref(),
            Some("\"youtube\"")
        );
        assert_eq!(
            serde_json::to_string(&Platform::SoundCloud).ok().as_deref(),
            Some("\"soundcloud\"")
        );
    }
}
