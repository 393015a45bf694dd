//! Subtitle synchronization
//!
//! Projects caller-supplied [`SubtitleTrack`] metadata onto the surface's
//! native text tracks. The synchronizer is the only writer of track modes
//! and of the caption line offset.

use crate::{
    clock::PlaybackClock,
    config::ControlsConfig,
    surface::{MediaSurface, NativeTextTrack, TextTrackMode},
    types::SubtitleTrack,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Menu label that turns captions off
pub const SUBTITLES_OFF: &str = "Off";

/// Display label for the native track at `index`.
///
/// Prefers the external metadata label, then the surface's own label, then
/// a 1-based placeholder.
pub fn derive_label(index: usize, external: &[SubtitleTrack], native: &NativeTextTrack) -> String {
    external
        .get(index)
        .and_then(|t| t.label.as_deref())
        .filter(|l| !l.trim().is_empty())
        .or_else(|| Some(native.label.as_str()).filter(|l| !l.trim().is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Track {}", index + 1))
}

#[derive(Debug, Default)]
struct SyncState {
    tracks: Vec<SubtitleTrack>,
    selected: Option<String>,
    controls_visible: bool,
}

/// Keeps native text track modes in line with the selected label
pub struct SubtitleSynchronizer {
    surface: Arc<dyn MediaSurface>,
    clock: PlaybackClock,
    offset_with_controls: f64,
    offset_without_controls: f64,
    state: Mutex<SyncState>,
}

impl SubtitleSynchronizer {
    pub fn new(surface: Arc<dyn MediaSurface>, clock: PlaybackClock, config: &ControlsConfig) -> Self {
        Self {
            surface,
            clock,
            offset_with_controls: config.caption_offset_with_controls_pct,
            offset_without_controls: config.caption_offset_without_controls_pct,
            state: Mutex::new(SyncState::default()),
        }
    }

    /// Replace the track metadata for a new media item
    pub fn set_tracks(&self, tracks: Vec<SubtitleTrack>, default_label: Option<String>) {
        {
            let mut state = self.state.lock();
            state.tracks = tracks;
            state.selected = default_label.filter(|l| l != SUBTITLES_OFF);
        }
        self.apply();
    }

    /// Select a track by label; [`SUBTITLES_OFF`] disables all tracks
    pub fn select(&self, label: &str) {
        self.state.lock().selected = (label != SUBTITLES_OFF).then(|| label.to_string());
        self.apply();
    }

    pub fn selected_label(&self) -> Option<String> {
        self.state.lock().selected.clone()
    }

    /// Caption placement depends on whether the control bar is on screen
    pub fn set_controls_visible(&self, visible: bool) {
        self.state.lock().controls_visible = visible;
        self.apply();
    }

    /// Labels for the settings menu, "Off" first
    pub fn menu_labels(&self) -> Vec<String> {
        let tracks = self.state.lock().tracks.clone();
        std::iter::once(SUBTITLES_OFF.to_string())
            .chain(
                self.surface
                    .text_tracks()
                    .iter()
                    .enumerate()
                    .map(|(i, native)| derive_label(i, &tracks, native)),
            )
            .collect()
    }

    /// Advance to the next label in menu order, wrapping back to "Off"
    pub fn cycle(&self) {
        let labels = self.menu_labels();
        let current = self.selected_label().unwrap_or_else(|| SUBTITLES_OFF.to_string());
        let position = labels.iter().position(|l| *l == current).unwrap_or(0);
        let next = labels
            .get((position + 1) % labels.len().max(1))
            .cloned()
            .unwrap_or_else(|| SUBTITLES_OFF.to_string());
        self.select(&next);
    }

    /// Re-project the selection onto the native tracks.
    ///
    /// Runs on every track list change, selection change and control bar
    /// visibility change. Returns the index of the showing track, or -1.
    pub fn apply(&self) -> i32 {
        let (tracks, selected, controls_visible) = {
            let state = self.state.lock();
            (state.tracks.clone(), state.selected.clone(), state.controls_visible)
        };

        let mut showing = -1;
        for (index, native) in self.surface.text_tracks().iter().enumerate() {
            let label = derive_label(index, &tracks, native);
            let is_selected = selected.as_deref() == Some(label.as_str()) && showing < 0;
            let mode = if is_selected {
                showing = index as i32;
                TextTrackMode::Showing
            } else {
                TextTrackMode::Disabled
            };
            if native.mode != mode {
                self.surface.set_text_track_mode(index, mode);
            }
        }

        let offset = if controls_visible {
            self.offset_with_controls
        } else {
            self.offset_without_controls
        };
        self.surface.set_caption_line(offset);

        debug!(showing, ?selected, controls_visible, "Subtitles synchronized");
        self.clock.set_selected_subtitle(showing);
        showing
    }
}
