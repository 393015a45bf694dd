//! Scripted playback scenarios
//!
//! A scenario is a JSON document describing one media item and a timeline of
//! steps (taps, swipes, control actions, playback) replayed against an
//! in-memory surface on a virtual clock.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tsuki_core::stream::StreamEvent;
use tsuki_core::{ControlAction, MediaItem, PlayerConfig, SurfaceSize};

fn default_surface() -> SurfaceSize {
    SurfaceSize::new(1280.0, 720.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub item: MediaItem,
    /// Duration reported when metadata loads; omit to never load metadata
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default = "default_surface")]
    pub surface: SurfaceSize,
    /// Labels of the text tracks the surface exposes once loaded
    #[serde(default)]
    pub native_tracks: Vec<String>,
    /// Streaming client events per source URL
    #[serde(default)]
    pub scripts: HashMap<String, Vec<StreamEvent>>,
    /// Pretend the environment has no streaming client
    #[serde(default)]
    pub client_unsupported: bool,
    #[serde(default)]
    pub config: PlayerConfig,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// One timeline entry, `at_ms` after the source was set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: StepAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepAction {
    /// Play for this many seconds of wall time
    Advance { seconds: f64 },
    Tap { x: f64, y: f64 },
    Swipe { x: f64, from_y: f64, to_y: f64 },
    Control { action: ControlAction },
    Key { key: String },
    Stall,
    Recover,
    /// Load metadata for the current source
    Metadata { duration: f64 },
    /// Switch to another media item
    Source { item: MediaItem },
}

impl StepAction {
    pub fn describe(&self) -> String {
        match self {
            StepAction::Advance { seconds } => format!("advance {}s", seconds),
            StepAction::Tap { x, y } => format!("tap ({}, {})", x, y),
            StepAction::Swipe { x, from_y, to_y } => format!("swipe x={} {}->{}", x, from_y, to_y),
            StepAction::Control { action } => format!("control {:?}", action),
            StepAction::Key { key } => format!("key {:?}", key),
            StepAction::Stall => "stall".to_string(),
            StepAction::Recover => "recover".to_string(),
            StepAction::Metadata { duration } => format!("metadata {}s", duration),
            StepAction::Source { item } => format!("source {}", item.url),
        }
    }
}
