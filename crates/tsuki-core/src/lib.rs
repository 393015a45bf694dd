//! Tsuki Core - Playback Controller for Adaptive Streams
//!
//! This crate drives a single media surface:
//! - HLS / progressive source attachment with one client per surface
//! - Playback state ownership and throttled progress reporting
//! - Resume-from-offset applied exactly once per session
//! - Subtitle track selection and caption placement
//! - Touch gesture disambiguation (swipe, tap, double-tap seek)
//! - Intro/outro skip windows and the control surface model
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Tsuki Core                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Gesture    │  │   Controls   │  │  Subtitle    │           │
//! │  │ Disambiguator│  │   Surface    │  │ Synchronizer │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │◄──── Skip Windows            │
//! │                    │    Clock    │────► Progress Sink           │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐                              │
//! │  │    Stream    │─►│    Media    │                              │
//! │  │   Attacher   │  │   Surface   │                              │
//! │  └──────────────┘  └─────────────┘                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod surface;
pub mod timer;
pub mod skip;
pub mod clock;
pub mod stream;
pub mod subtitles;
pub mod controls;
pub mod gesture;
pub mod player;

pub use error::{Error, Result};
pub use types::*;
pub use config::{ControlsConfig, GestureConfig, PlayerConfig, ProgressConfig, ResumeConfig, StreamConfig};
pub use surface::{MediaSurface, MemorySurface, NativeTextTrack, SurfaceEvent, TextTrackMode};
pub use skip::{is_in_window, SkipKind, SkipWindow, SkipWindows};
pub use clock::{PlaybackClock, ProgressReason, ProgressSink, ProgressUpdate};
pub use stream::{AdaptiveClient, AdaptiveClientFactory, AttachOutcome, PlaybackPath, StreamAttacher, StreamEvent};
pub use subtitles::{SubtitleSynchronizer, SUBTITLES_OFF};
pub use controls::{format_time, ControlAction, ControlsView, SeekPreview, SettingsMenu};
pub use gesture::{GestureDisambiguator, GestureFeedback, GesturePhase, GestureResolution};
pub use player::Player;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Tsuki Core initialized");
}
