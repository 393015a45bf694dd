//! Control surface
//!
//! Everything the transport bar needs: a [`ControlsView`] snapshot to
//! render, the [`ControlAction`]s it can emit, keyboard shortcuts, the
//! seek-bar thumbnail preview, and the settings menu model. Visibility is
//! tracked by [`ControlsVisibility`], which hides the bar again after
//! `auto_hide_ms` unless playback is paused.

use crate::{
    config::ControlsConfig,
    timer::CancelableTimer,
    types::PlaybackState,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Format seconds as `m:ss`, or `h:mm:ss` past an hour
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Menu label for a playback rate
pub fn rate_label(rate: f64) -> String {
    if (rate - 1.0).abs() < f64::EPSILON {
        "Normal".to_string()
    } else {
        format!("{}x", rate)
    }
}

/// User commands emitted by the control surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlAction {
    TogglePlay,
    ToggleMute,
    ToggleFullscreen,
    /// Relative seek
    Skip { seconds: f64 },
    SkipIntro,
    SkipOutro,
    /// Seek bar click, as a fraction of the duration
    Seek { fraction: f64 },
    SetVolume { value: f64 },
    VolumeBy { delta: f64 },
    SelectSubtitle { label: String },
    CycleSubtitles,
    SetPlaybackRate { rate: f64 },
    ShowControls,
}

impl ControlAction {
    /// Keyboard shortcut mapping (DOM `KeyboardEvent.key` names)
    pub fn from_key(key: &str, config: &ControlsConfig) -> Option<Self> {
        let step = config.seek_button_step_secs;
        let volume = config.volume_step;
        let action = match key {
            " " | "k" | "K" => ControlAction::TogglePlay,
            "ArrowLeft" | "j" | "J" => ControlAction::Skip { seconds: -step },
            "ArrowRight" | "l" | "L" => ControlAction::Skip { seconds: step },
            "ArrowUp" => ControlAction::VolumeBy { delta: volume },
            "ArrowDown" => ControlAction::VolumeBy { delta: -volume },
            "m" | "M" => ControlAction::ToggleMute,
            "f" | "F" => ControlAction::ToggleFullscreen,
            "c" | "C" => ControlAction::CycleSubtitles,
            _ => return None,
        };
        Some(action)
    }
}

/// Render snapshot for the transport bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlsView {
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f64,
    pub is_muted: bool,
    pub is_fullscreen: bool,
    /// Buffered percentage, 0-100
    pub buffered: f64,
    pub show_skip_intro: bool,
    pub show_skip_outro: bool,
    pub selected_subtitle: Option<String>,
    pub controls_visible: bool,
    pub is_loading: bool,
    pub playback_rate: f64,
    pub load_error: Option<String>,
    pub current_time_label: String,
    pub duration_label: String,
}

impl ControlsView {
    pub fn new(state: &PlaybackState, controls_visible: bool, selected_subtitle: Option<String>) -> Self {
        Self {
            is_playing: state.is_playing,
            current_time: state.current_time_seconds,
            duration: state.duration_seconds,
            volume: state.volume,
            is_muted: state.is_muted,
            is_fullscreen: state.is_fullscreen,
            buffered: state.buffered_percent,
            show_skip_intro: state.show_skip_intro,
            show_skip_outro: state.show_skip_outro,
            selected_subtitle,
            controls_visible,
            is_loading: state.is_loading,
            playback_rate: state.playback_rate,
            load_error: state.load_error.clone(),
            current_time_label: format_time(state.current_time_seconds),
            duration_label: format_time(state.duration_seconds),
        }
    }

    /// Icon the volume button should show
    pub fn volume_icon(&self) -> &'static str {
        if self.is_muted || self.volume == 0.0 {
            "muted"
        } else if self.volume < 0.5 {
            "low"
        } else {
            "high"
        }
    }
}

/// Hover preview over the seek bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeekPreview {
    pub time: f64,
    pub label: String,
    /// Index into the thumbnail sprite sheet
    pub thumbnail_index: usize,
}

/// Preview for a pointer at `fraction` of the seek bar width
pub fn seek_preview(fraction: f64, duration: f64, thumbnail_interval_secs: f64) -> Option<SeekPreview> {
    if !(duration.is_finite() && duration > 0.0) || !fraction.is_finite() {
        return None;
    }
    let time = fraction.clamp(0.0, 1.0) * duration;
    let thumbnail_index = if thumbnail_interval_secs > 0.0 {
        (time / thumbnail_interval_secs).floor() as usize
    } else {
        0
    };
    Some(SeekPreview {
        time,
        label: format_time(time),
        thumbnail_index,
    })
}

/// One selectable settings entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuOption {
    pub label: String,
    pub selected: bool,
}

/// Settings menu model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsMenu {
    pub playback_rates: Vec<MenuOption>,
    pub subtitles: Vec<MenuOption>,
}

impl SettingsMenu {
    pub fn new(rates: &[f64], current_rate: f64, subtitle_labels: &[String], selected_subtitle: Option<&str>) -> Self {
        let selected_subtitle = selected_subtitle.unwrap_or(crate::subtitles::SUBTITLES_OFF);
        Self {
            playback_rates: rates
                .iter()
                .map(|r| MenuOption {
                    label: rate_label(*r),
                    selected: (r - current_rate).abs() < f64::EPSILON,
                })
                .collect(),
            subtitles: subtitle_labels
                .iter()
                .map(|l| MenuOption {
                    label: l.clone(),
                    selected: l == selected_subtitle,
                })
                .collect(),
        }
    }
}

struct VisibilityInner {
    tx: watch::Sender<bool>,
    hide_timer: Mutex<Option<CancelableTimer>>,
    /// Set while paused; the bar then stays up
    hold: AtomicBool,
    auto_hide: Duration,
    runtime: Handle,
    token: CancellationToken,
}

/// Control bar visibility with auto-hide
#[derive(Clone)]
pub struct ControlsVisibility {
    inner: Arc<VisibilityInner>,
}

impl ControlsVisibility {
    pub fn new(config: &ControlsConfig, runtime: Handle, token: CancellationToken) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(VisibilityInner {
                tx,
                hide_timer: Mutex::new(None),
                hold: AtomicBool::new(true),
                auto_hide: config.auto_hide(),
                runtime,
                token,
            }),
        }
    }

    pub fn is_visible(&self) -> bool {
        *self.inner.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.tx.subscribe()
    }

    /// Show the bar and restart the auto-hide countdown
    pub fn show(&self) {
        if self.inner.token.is_cancelled() {
            return;
        }
        self.inner.tx.send_if_modified(|v| !std::mem::replace(v, true));

        let weak: Weak<VisibilityInner> = Arc::downgrade(&self.inner);
        let timer = CancelableTimer::schedule(&self.inner.runtime, &self.inner.token, self.inner.auto_hide, move || {
            if let Some(inner) = weak.upgrade() {
                if !inner.hold.load(Ordering::SeqCst) {
                    inner.tx.send_if_modified(|v| std::mem::replace(v, false));
                }
            }
        });
        *self.inner.hide_timer.lock() = Some(timer);
    }

    pub fn hide(&self) {
        if let Some(timer) = self.inner.hide_timer.lock().take() {
            timer.cancel();
        }
        self.inner.tx.send_if_modified(|v| std::mem::replace(v, false));
    }

    /// Keep the bar up (while paused); releasing restarts the countdown
    pub fn set_hold(&self, hold: bool) {
        let was = self.inner.hold.swap(hold, Ordering::SeqCst);
        if was && !hold && self.is_visible() {
            self.show();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(65.9), "1:05");
        assert_eq!(format_time(3725.0), "1:02:05");
        assert_eq!(format_time(f64::NAN), "0:00");
        assert_eq!(format_time(-3.0), "0:00");
    }

    #[test]
    fn test_key_mapping() {
        let config = ControlsConfig::default();
        assert_eq!(ControlAction::from_key(" ", &config), Some(ControlAction::TogglePlay));
        assert_eq!(ControlAction::from_key("ArrowLeft", &config), Some(ControlAction::Skip { seconds: -10.0 }));
        assert_eq!(ControlAction::from_key("ArrowUp", &config), Some(ControlAction::VolumeBy { delta: 0.1 }));
        assert_eq!(ControlAction::from_key("c", &config), Some(ControlAction::CycleSubtitles));
        assert_eq!(ControlAction::from_key("q", &config), None);
    }

    #[test]
    fn test_seek_preview() {
        let preview = seek_preview(0.5, 1440.0, 10.0).unwrap();
        assert_eq!(preview.time, 720.0);
        assert_eq!(preview.label, "12:00");
        assert_eq!(preview.thumbnail_index, 72);
        assert_eq!(seek_preview(1.4, 100.0, 10.0).unwrap().time, 100.0);
        assert!(seek_preview(0.5, f64::NAN, 10.0).is_none());
    }

    #[test]
    fn test_settings_menu_marks_selection() {
        let labels = vec!["Off".to_string(), "English".to_string()];
        let menu = SettingsMenu::new(&[0.5, 1.0, 2.0], 1.0, &labels, Some("English"));
        assert_eq!(menu.playback_rates[1].label, "Normal");
        assert!(menu.playback_rates[1].selected);
        assert_eq!(menu.playback_rates[2].label, "2x");
        assert!(!menu.subtitles[0].selected);
        assert!(menu.subtitles[1].selected);

        let menu = SettingsMenu::new(&[1.0], 1.0, &labels, None);
        assert!(menu.subtitles[0].selected);
    }

    #[test]
    fn test_action_json_shape() {
        let action: ControlAction = serde_json::from_str(r#"{"action":"skip","seconds":-10}"#).unwrap();
        assert_eq!(action, ControlAction::Skip { seconds: -10.0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_hide_only_while_playing() {
        let controls = ControlsVisibility::new(&ControlsConfig::default(), Handle::current(), CancellationToken::new());

        controls.show();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(controls.is_visible(), "held while paused");

        controls.set_hold(false);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(controls.is_visible());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!controls.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_show_restarts_countdown() {
        let controls = ControlsVisibility::new(&ControlsConfig::default(), Handle::current(), CancellationToken::new());
        controls.set_hold(false);

        controls.show();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        controls.show();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(controls.is_visible());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(!controls.is_visible());
    }
}
