//! Player configuration
//!
//! All tunables live here so callers can load them from a JSON file and
//! override individual values. Every struct defaults to the values the
//! player ships with.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub stream: StreamConfig,
    pub gesture: GestureConfig,
    pub progress: ProgressConfig,
    pub resume: ResumeConfig,
    pub controls: ControlsConfig,
    /// Allowed playback rates, in menu order
    pub playback_rates: Vec<f64>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            gesture: GestureConfig::default(),
            progress: ProgressConfig::default(),
            resume: ResumeConfig::default(),
            controls: ControlsConfig::default(),
            playback_rates: vec![0.5, 0.75, 1.0, 1.25, 1.5, 2.0],
        }
    }
}

impl PlayerConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Reject values the controller cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.playback_rates.is_empty() {
            return Err(Error::InvalidConfig("playback_rates must not be empty".into()));
        }
        if self.playback_rates.iter().any(|r| !(r.is_finite() && *r > 0.0)) {
            return Err(Error::InvalidConfig("playback rates must be positive".into()));
        }
        let sensitivity = self.gesture.swipe_sensitivity;
        if !(sensitivity > 0.0 && sensitivity <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "swipe_sensitivity must be in (0, 1], got {}",
                sensitivity
            )));
        }
        if self.gesture.tap_window_ms == 0
            || self.gesture.seek_commit_delay_ms == 0
            || self.gesture.single_tap_defer_ms == 0
        {
            return Err(Error::InvalidConfig("gesture windows must be non-zero".into()));
        }
        if self.gesture.seek_step_secs <= 0.0 {
            return Err(Error::InvalidConfig("seek_step_secs must be positive".into()));
        }
        if self.progress.report_interval_secs <= 0.0 {
            return Err(Error::InvalidConfig("report_interval_secs must be positive".into()));
        }
        if self.stream.max_buffer_length_secs <= 0.0 {
            return Err(Error::InvalidConfig("max_buffer_length_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn is_allowed_rate(&self, rate: f64) -> bool {
        self.playback_rates.iter().any(|r| (r - rate).abs() < f64::EPSILON)
    }
}

/// Adaptive streaming client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Seconds of already-played media retained behind the playhead
    pub back_buffer_length_secs: f64,
    /// Target forward buffer in seconds
    pub max_buffer_length_secs: f64,
    /// Hard cap on the forward buffer in seconds
    pub max_max_buffer_length_secs: f64,
    /// Manifest request timeout
    pub request_timeout_ms: u64,
    /// Extra headers sent with every manifest and segment request
    pub headers: BTreeMap<String, String>,
    /// Play HLS through the surface itself instead of the streaming client
    pub native_hls: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            back_buffer_length_secs: 90.0,
            max_buffer_length_secs: 60.0,
            max_max_buffer_length_secs: 600.0,
            request_timeout_ms: 10_000,
            headers: BTreeMap::new(),
            native_hls: false,
        }
    }
}

impl StreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Add a request header (e.g. `Referer`)
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Touch gesture timing and sensitivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Max gap between two taps of a double tap
    pub tap_window_ms: u64,
    /// Max horizontal distance between two taps of a double tap
    pub double_tap_max_distance_px: f64,
    /// Seconds added per qualifying side tap
    pub seek_step_secs: f64,
    /// Quiet period before an accumulated seek is performed
    pub seek_commit_delay_ms: u64,
    /// Delay before a single side tap reveals the controls
    pub single_tap_defer_ms: u64,
    /// Movement needed before a swipe direction locks
    pub swipe_lock_threshold_px: f64,
    /// Fraction of surface height that maps to a full-scale change
    pub swipe_sensitivity: f64,
    /// Delay before swipe feedback is cleared after release
    pub swipe_feedback_clear_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            tap_window_ms: 300,
            double_tap_max_distance_px: 100.0,
            seek_step_secs: 10.0,
            seek_commit_delay_ms: 600,
            single_tap_defer_ms: 300,
            swipe_lock_threshold_px: 10.0,
            swipe_sensitivity: 0.6,
            swipe_feedback_clear_ms: 500,
        }
    }
}

impl GestureConfig {
    pub fn seek_commit_delay(&self) -> Duration {
        Duration::from_millis(self.seek_commit_delay_ms)
    }

    pub fn single_tap_defer(&self) -> Duration {
        Duration::from_millis(self.single_tap_defer_ms)
    }

    pub fn swipe_feedback_clear(&self) -> Duration {
        Duration::from_millis(self.swipe_feedback_clear_ms)
    }
}

/// Progress reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Minimum playback advance between two periodic reports
    pub report_interval_secs: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 10.0,
        }
    }
}

/// Resume ("continue watching") handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeConfig {
    /// Offsets at or below this are treated as a cold start
    pub min_resume_secs: f64,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self { min_resume_secs: 1.0 }
    }
}

/// Control bar behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub auto_hide_ms: u64,
    /// Seconds skipped by the transport buttons and arrow keys
    pub seek_button_step_secs: f64,
    /// Volume change per arrow key press
    pub volume_step: f64,
    /// Caption line position (percent from bottom) while controls are shown
    pub caption_offset_with_controls_pct: f64,
    pub caption_offset_without_controls_pct: f64,
    /// Spacing of seek-bar thumbnail sprites
    pub thumbnail_interval_secs: f64,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            auto_hide_ms: 3000,
            seek_button_step_secs: 10.0,
            volume_step: 0.1,
            caption_offset_with_controls_pct: 15.0,
            caption_offset_without_controls_pct: 5.0,
            thumbnail_interval_secs: 10.0,
        }
    }
}

impl ControlsConfig {
    pub fn auto_hide(&self) -> Duration {
        Duration::from_millis(self.auto_hide_ms)
    }
}
