//! Rendering surface abstraction
//!
//! The surface is the single media-decoding element the controller drives.
//! It raises [`SurfaceEvent`]s which the player drains and funnels into the
//! playback clock; events carry no payload, the clock reads the surface
//! properties it needs when it handles them.

use crate::types::TimeRange;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Lifecycle and property-change notifications raised by a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceEvent {
    LoadedMetadata,
    DurationChange,
    TimeUpdate,
    /// Buffered ranges changed
    Progress,
    Play,
    Pause,
    /// Playback stalled waiting for data
    Waiting,
    CanPlay,
    Seeked,
    VolumeChange,
    RateChange,
    Ended,
    /// Source was replaced or removed
    Emptied,
    TextTracksChanged,
    FullscreenChange,
}

/// Display mode of a native text track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTrackMode {
    Showing,
    Hidden,
    Disabled,
}

/// A text track as the surface exposes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeTextTrack {
    /// Label the surface derived itself, possibly empty
    pub label: String,
    pub language: String,
    pub mode: TextTrackMode,
}

impl NativeTextTrack {
    pub fn new(label: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            language: language.into(),
            mode: TextTrackMode::Disabled,
        }
    }
}

/// The media element the controller owns.
///
/// Methods take `&self`; implementations synchronize internally so the
/// surface can be shared between the clock, the stream attacher and the
/// subtitle synchronizer.
pub trait MediaSurface: Send + Sync {
    /// Current source, if any
    fn source(&self) -> Option<String>;
    /// Assign (or clear) the source directly, bypassing any streaming client
    fn set_source(&self, url: Option<&str>);

    fn current_time(&self) -> f64;
    fn set_current_time(&self, seconds: f64);
    /// NaN until metadata is loaded
    fn duration(&self) -> f64;
    fn buffered(&self) -> Vec<TimeRange>;

    fn is_paused(&self) -> bool;
    fn play(&self);
    fn pause(&self);

    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);
    fn is_muted(&self) -> bool;
    fn set_muted(&self, muted: bool);

    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&self, rate: f64);

    fn is_fullscreen(&self) -> bool;
    fn set_fullscreen(&self, fullscreen: bool);

    /// Display brightness filter in [0, 1]
    fn set_brightness(&self, brightness: f64);

    fn text_tracks(&self) -> Vec<NativeTextTrack>;
    fn set_text_track_mode(&self, index: usize, mode: TextTrackMode);
    /// Caption line position as a percentage from the bottom edge
    fn set_caption_line(&self, percent_from_bottom: f64);

    /// Take every event raised since the last call, oldest first
    fn drain_events(&self) -> Vec<SurfaceEvent>;
}

#[derive(Debug)]
struct MemoryState {
    source: Option<String>,
    current_time: f64,
    duration: f64,
    paused: bool,
    stalled: bool,
    volume: f64,
    muted: bool,
    rate: f64,
    fullscreen: bool,
    brightness: f64,
    caption_line: f64,
    buffered: Vec<TimeRange>,
    text_tracks: Vec<NativeTextTrack>,
    events: VecDeque<SurfaceEvent>,
    seek_log: Vec<f64>,
    source_log: Vec<Option<String>>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            source: None,
            current_time: 0.0,
            duration: f64::NAN,
            paused: true,
            stalled: false,
            volume: 1.0,
            muted: false,
            rate: 1.0,
            fullscreen: false,
            brightness: 1.0,
            caption_line: 0.0,
            buffered: Vec::new(),
            text_tracks: Vec::new(),
            events: VecDeque::new(),
            seek_log: Vec::new(),
            source_log: Vec::new(),
        }
    }
}

/// In-memory surface with deterministic playback.
///
/// Time only moves when [`MemorySurface::advance`] is called. Every seek and
/// source assignment is logged so callers can assert on exactly what the
/// controller asked for.
#[derive(Debug, Default)]
pub struct MemorySurface {
    state: Mutex<MemoryState>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate metadata arriving for the current source
    pub fn load_metadata(&self, duration: f64) {
        let mut state = self.state.lock();
        state.duration = duration;
        state.events.push_back(SurfaceEvent::DurationChange);
        state.events.push_back(SurfaceEvent::LoadedMetadata);
        state.events.push_back(SurfaceEvent::CanPlay);
    }

    /// Attach a native text track, as a `<track>` element would
    pub fn add_text_track(&self, track: NativeTextTrack) {
        let mut state = self.state.lock();
        state.text_tracks.push(track);
        state.events.push_back(SurfaceEvent::TextTracksChanged);
    }

    /// Play forward by `seconds` of wall time, scaled by the playback rate.
    ///
    /// Buffers up to 30 seconds ahead of the new position and ends playback
    /// at the duration.
    pub fn advance(&self, seconds: f64) {
        let mut state = self.state.lock();
        if state.paused || state.stalled || !state.duration.is_finite() {
            return;
        }
        let target = (state.current_time + seconds * state.rate).min(state.duration);
        state.current_time = target;
        state.buffered = vec![TimeRange::new(0.0, (target + 30.0).min(state.duration))];
        state.events.push_back(SurfaceEvent::TimeUpdate);
        state.events.push_back(SurfaceEvent::Progress);

        if target >= state.duration {
            state.paused = true;
            state.events.push_back(SurfaceEvent::Pause);
            state.events.push_back(SurfaceEvent::Ended);
        }
    }

    /// Simulate a buffer underrun
    pub fn stall(&self) {
        let mut state = self.state.lock();
        state.stalled = true;
        state.events.push_back(SurfaceEvent::Waiting);
    }

    /// Simulate enough data arriving to continue
    pub fn recover(&self) {
        let mut state = self.state.lock();
        state.stalled = false;
        state.events.push_back(SurfaceEvent::CanPlay);
    }

    pub fn set_buffered(&self, ranges: Vec<TimeRange>) {
        let mut state = self.state.lock();
        state.buffered = ranges;
        state.events.push_back(SurfaceEvent::Progress);
    }

    /// Every seek target requested, in order
    pub fn seek_log(&self) -> Vec<f64> {
        self.state.lock().seek_log.clone()
    }

    /// Every direct source assignment, in order
    pub fn source_log(&self) -> Vec<Option<String>> {
        self.state.lock().source_log.clone()
    }

    pub fn brightness(&self) -> f64 {
        self.state.lock().brightness
    }

    pub fn caption_line(&self) -> f64 {
        self.state.lock().caption_line
    }
}

impl MediaSurface for MemorySurface {
    fn source(&self) -> Option<String> {
        self.state.lock().source.clone()
    }

    fn set_source(&self, url: Option<&str>) {
        let mut state = self.state.lock();
        let source = url.map(str::to_string);
        state.source_log.push(source.clone());
        state.source = source;
        state.current_time = 0.0;
        state.duration = f64::NAN;
        state.paused = true;
        state.stalled = false;
        state.buffered.clear();
        state.text_tracks.clear();
        state.events.push_back(SurfaceEvent::Emptied);
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&self, seconds: f64) {
        let mut state = self.state.lock();
        let upper = if state.duration.is_finite() { state.duration } else { f64::MAX };
        let target = seconds.clamp(0.0, upper);
        state.current_time = target;
        state.seek_log.push(target);
        state.events.push_back(SurfaceEvent::Seeked);
        state.events.push_back(SurfaceEvent::TimeUpdate);
    }

    fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.state.lock().buffered.clone()
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn play(&self) {
        let mut state = self.state.lock();
        if state.paused {
            state.paused = false;
            state.events.push_back(SurfaceEvent::Play);
        }
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        if !state.paused {
            state.paused = true;
            state.events.push_back(SurfaceEvent::Pause);
        }
    }

    fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    fn set_volume(&self, volume: f64) {
        let mut state = self.state.lock();
        state.volume = volume.clamp(0.0, 1.0);
        state.events.push_back(SurfaceEvent::VolumeChange);
    }

    fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    fn set_muted(&self, muted: bool) {
        let mut state = self.state.lock();
        state.muted = muted;
        state.events.push_back(SurfaceEvent::VolumeChange);
    }

    fn playback_rate(&self) -> f64 {
        self.state.lock().rate
    }

    fn set_playback_rate(&self, rate: f64) {
        let mut state = self.state.lock();
        state.rate = rate;
        state.events.push_back(SurfaceEvent::RateChange);
    }

    fn is_fullscreen(&self) -> bool {
        self.state.lock().fullscreen
    }

    fn set_fullscreen(&self, fullscreen: bool) {
        let mut state = self.state.lock();
        state.fullscreen = fullscreen;
        state.events.push_back(SurfaceEvent::FullscreenChange);
    }

    fn set_brightness(&self, brightness: f64) {
        self.state.lock().brightness = brightness.clamp(0.0, 1.0);
    }

    fn text_tracks(&self) -> Vec<NativeTextTrack> {
        self.state.lock().text_tracks.clone()
    }

    fn set_text_track_mode(&self, index: usize, mode: TextTrackMode) {
        if let Some(track) = self.state.lock().text_tracks.get_mut(index) {
            track.mode = mode;
        }
    }

    fn set_caption_line(&self, percent_from_bottom: f64) {
        self.state.lock().caption_line = percent_from_bottom;
    }

    fn drain_events(&self) -> Vec<SurfaceEvent> {
        self.state.lock().events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_requires_playing_and_metadata() {
        let surface = MemorySurface::new();
        surface.set_source(Some("https://cdn.example.com/ep1.mp4"));
        surface.play();
        surface.advance(5.0);
        assert_eq!(surface.current_time(), 0.0);

        surface.load_metadata(100.0);
        surface.advance(5.0);
        assert_eq!(surface.current_time(), 5.0);
        assert_eq!(surface.buffered(), vec![TimeRange::new(0.0, 35.0)]);
    }

    #[test]
    fn test_playback_ends_at_duration() {
        let surface = MemorySurface::new();
        surface.set_source(Some("a.mp4"));
        surface.load_metadata(10.0);
        surface.play();
        surface.drain_events();

        surface.advance(20.0);
        assert_eq!(surface.current_time(), 10.0);
        assert!(surface.is_paused());
        assert_eq!(
            surface.drain_events(),
            vec![SurfaceEvent::TimeUpdate, SurfaceEvent::Progress, SurfaceEvent::Pause, SurfaceEvent::Ended]
        );
    }

    #[test]
    fn test_seek_is_clamped_and_logged() {
        let surface = MemorySurface::new();
        surface.set_source(Some("a.mp4"));
        surface.load_metadata(60.0);
        surface.set_current_time(90.0);
        surface.set_current_time(-4.0);
        assert_eq!(surface.seek_log(), vec![60.0, 0.0]);
    }

    #[test]
    fn test_source_changes_are_logged() {
        let surface = MemorySurface::new();
        surface.set_source(Some("a.mp4"));
        surface.load_metadata(60.0);
        surface.set_source(None);
        surface.set_source(Some("b.m3u8"));
        assert_eq!(surface.source().as_deref(), Some("b.m3u8"));
        assert_eq!(
            surface.source_log(),
            vec![Some("a.mp4".to_string()), None, Some("b.m3u8".to_string())]
        );
        assert!(surface.duration().is_nan());
    }

    #[test]
    fn test_stall_blocks_advance() {
        let surface = MemorySurface::new();
        surface.set_source(Some("a.mp4"));
        surface.load_metadata(60.0);
        surface.play();
        surface.stall();
        surface.advance(5.0);
        assert_eq!(surface.current_time(), 0.0);
        surface.recover();
        surface.advance(5.0);
        assert_eq!(surface.current_time(), 5.0);
    }
}
