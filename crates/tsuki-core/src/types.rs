//! Core types for Tsuki

use crate::skip::SkipWindows;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a source is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    /// Segmented adaptive-bitrate stream (HLS)
    Adaptive,
    /// Single progressive file
    Progressive,
}

impl StreamKind {
    /// Detect the stream kind from the shape of a source URL.
    ///
    /// A source is adaptive when its path ends in `.m3u8` or passes through
    /// an `/hls/` segment. Query strings and fragments are ignored.
    pub fn detect(source_url: &str) -> Self {
        let path = match Url::parse(source_url) {
            Ok(url) => url.path().to_lowercase(),
            Err(_) => source_url
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_lowercase(),
        };

        if path.ends_with(".m3u8") || path.contains("/hls/") {
            StreamKind::Adaptive
        } else {
            StreamKind::Progressive
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Adaptive => write!(f, "adaptive"),
            StreamKind::Progressive => write!(f, "progressive"),
        }
    }
}

/// One playback session per media source string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSession {
    /// Unique session ID
    pub id: SessionId,
    /// Source the session plays
    pub source_url: String,
    /// Derived from the URL shape
    pub is_adaptive_stream: bool,
    /// Position to continue from once the media is ready
    pub resume_offset_seconds: Option<f64>,
}

impl PlaybackSession {
    pub fn new(source_url: impl Into<String>, resume_offset_seconds: Option<f64>) -> Self {
        let source_url = source_url.into();
        let is_adaptive_stream = StreamKind::detect(&source_url) == StreamKind::Adaptive;
        Self {
            id: SessionId::new(),
            source_url,
            is_adaptive_stream,
            resume_offset_seconds,
        }
    }

    pub fn kind(&self) -> StreamKind {
        if self.is_adaptive_stream {
            StreamKind::Adaptive
        } else {
            StreamKind::Progressive
        }
    }
}

/// Mutable playback snapshot.
///
/// Owned by [`crate::clock::PlaybackClock`]; every other component reads a
/// copy of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub current_time_seconds: f64,
    /// 0 until the surface reports a duration
    pub duration_seconds: f64,
    /// Furthest buffered end as a percentage of duration, in [0, 100]
    pub buffered_percent: f64,
    pub is_playing: bool,
    pub is_loading: bool,
    pub is_fullscreen: bool,
    /// In [0, 1]
    pub volume: f64,
    pub is_muted: bool,
    pub playback_rate: f64,
    /// Index into the native text track list, -1 when captions are off
    pub selected_subtitle_index: i32,
    /// Display brightness in [0, 1]
    pub brightness: f64,
    pub show_skip_intro: bool,
    pub show_skip_outro: bool,
    /// Set when the session reached its terminal "failed to load" state
    pub load_error: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_time_seconds: 0.0,
            duration_seconds: 0.0,
            buffered_percent: 0.0,
            is_playing: false,
            is_loading: false,
            is_fullscreen: false,
            volume: 1.0,
            is_muted: false,
            playback_rate: 1.0,
            selected_subtitle_index: -1,
            brightness: 1.0,
            show_skip_intro: false,
            show_skip_outro: false,
            load_error: None,
        }
    }
}

impl PlaybackState {
    /// Returns true once the surface has reported a usable duration
    pub fn has_duration(&self) -> bool {
        self.duration_seconds.is_finite() && self.duration_seconds > 0.0
    }

    /// Playback position as a fraction of duration
    pub fn progress_fraction(&self) -> f64 {
        if self.has_duration() {
            (self.current_time_seconds / self.duration_seconds).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Text track type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextTrackKind {
    /// Closed captions (includes speaker identification, sound effects)
    Captions,
    /// Subtitles (dialogue translation)
    #[default]
    Subtitles,
    /// Chapter titles
    Chapters,
    /// Thumbnail sprite metadata
    Thumbnails,
}

impl std::fmt::Display for TextTrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextTrackKind::Captions => write!(f, "captions"),
            TextTrackKind::Subtitles => write!(f, "subtitles"),
            TextTrackKind::Chapters => write!(f, "chapters"),
            TextTrackKind::Thumbnails => write!(f, "thumbnails"),
        }
    }
}

/// Caption metadata supplied by the caller for each media item.
///
/// The player never owns the cue data; it only projects these entries onto
/// the surface's native text tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    /// URL of the track file
    pub file: String,
    /// Human-readable label (e.g. "English")
    #[serde(default)]
    pub label: Option<String>,
    /// BCP-47 language code
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub kind: TextTrackKind,
}

impl SubtitleTrack {
    pub fn new(file: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            label: Some(label.into()),
            language: None,
            kind: TextTrackKind::Subtitles,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_kind(mut self, kind: TextTrackKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Everything the caller supplies for one media item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    #[serde(default)]
    pub resume_offset_seconds: Option<f64>,
    #[serde(default)]
    pub subtitles: Vec<SubtitleTrack>,
    #[serde(default)]
    pub skip: SkipWindows,
    /// Label selected by default, if any
    #[serde(default)]
    pub default_subtitle: Option<String>,
}

impl MediaItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_resume(mut self, seconds: f64) -> Self {
        self.resume_offset_seconds = Some(seconds);
        self
    }

    pub fn with_skip(mut self, skip: SkipWindows) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_subtitles(mut self, subtitles: Vec<SubtitleTrack>) -> Self {
        self.subtitles = subtitles;
        self
    }
}

/// A buffered time range on the surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Surface dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: f64,
    pub height: f64,
}

impl SurfaceSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A single pointer/touch sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub x: f64,
    pub y: f64,
    /// Event timestamp in milliseconds
    pub time_ms: u64,
}

impl TouchPoint {
    pub fn new(x: f64, y: f64, time_ms: u64) -> Self {
        Self { x, y, time_ms }
    }
}

/// Horizontal third of the surface a touch started in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    /// Left third, swipes adjust brightness, double taps seek back
    Brightness,
    /// Middle third, taps toggle playback
    Center,
    /// Right third, swipes adjust volume, double taps seek forward
    Volume,
}

impl Zone {
    /// Map a horizontal position to its zone.
    ///
    /// `x < W/3` is brightness, `x > 2W/3` is volume, anything else
    /// (including a degenerate width) is center.
    pub fn from_position(x: f64, width: f64) -> Self {
        if !(width.is_finite() && width > 0.0) {
            return Zone::Center;
        }
        let fraction = x / width;
        if fraction < 1.0 / 3.0 {
            Zone::Brightness
        } else if fraction > 2.0 / 3.0 {
            Zone::Volume
        } else {
            Zone::Center
        }
    }

    pub fn is_side(&self) -> bool {
        !matches!(self, Zone::Center)
    }

    /// Seek direction for double taps in this zone
    pub fn seek_sign(&self) -> f64 {
        match self {
            Zone::Brightness => -1.0,
            Zone::Center => 0.0,
            Zone::Volume => 1.0,
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Zone::Brightness => write!(f, "brightness"),
            Zone::Center => write!(f, "center"),
            Zone::Volume => write!(f, "volume"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_kind_detection() {
        assert_eq!(StreamKind::detect("https://cdn.example.com/ep1/master.m3u8"), StreamKind::Adaptive);
        assert_eq!(StreamKind::detect("https://cdn.example.com/ep1/index.M3U8?token=abc"), StreamKind::Adaptive);
        assert_eq!(StreamKind::detect("https://cdn.example.com/hls/ep1"), StreamKind::Adaptive);
        assert_eq!(StreamKind::detect("https://cdn.example.com/ep1.mp4"), StreamKind::Progressive);
        assert_eq!(StreamKind::detect("/local/ep1.m3u8#t=10"), StreamKind::Adaptive);
    }

    #[test]
    fn test_zone_partition() {
        let width = 900.0;
        assert_eq!(Zone::from_position(0.0, width), Zone::Brightness);
        assert_eq!(Zone::from_position(299.0, width), Zone::Brightness);
        assert_eq!(Zone::from_position(300.0, width), Zone::Center);
        assert_eq!(Zone::from_position(450.0, width), Zone::Center);
        assert_eq!(Zone::from_position(600.0, width), Zone::Center);
        assert_eq!(Zone::from_position(601.0, width), Zone::Volume);
        assert_eq!(Zone::from_position(899.0, width), Zone::Volume);
        assert_eq!(Zone::from_position(100.0, 0.0), Zone::Center);
    }

    #[test]
    fn test_session_derives_kind() {
        let session = PlaybackSession::new("https://cdn.example.com/a.m3u8", Some(120.0));
        assert!(session.is_adaptive_stream);
        assert_eq!(session.kind(), StreamKind::Adaptive);

        let session = PlaybackSession::new("https://cdn.example.com/a.mp4", None);
        assert!(!session.is_adaptive_stream);
    }

    #[test]
    fn test_progress_fraction_without_duration() {
        let state = PlaybackState {
            current_time_seconds: 12.0,
            ..Default::default()
        };
        assert_eq!(state.progress_fraction(), 0.0);
    }
}
