//! Touch gesture disambiguation
//!
//! Classifies touch sequences on the surface into exactly one of:
//! - vertical swipe in a side zone: brightness (left) or volume (right)
//! - center tap: toggle playback immediately
//! - side single tap: show controls, deferred until a double tap is ruled out
//! - side double tap: accumulate a +/- seek for both taps, committed once
//!   taps stop; each further qualifying tap before the commit adds a step
//!
//! Zones are the horizontal thirds of the surface. Once a swipe direction
//! locks, the touch can no longer become a tap.

use crate::{
    clock::PlaybackClock,
    config::GestureConfig,
    controls::ControlsVisibility,
    timer::CancelableTimer,
    types::{SurfaceSize, TouchPoint, Zone},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Transient overlay shown while a gesture is in progress
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GestureFeedback {
    /// Pending double-tap seek, signed seconds
    Seeking { seconds: f64 },
    Volume { level: f64 },
    Brightness { level: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GesturePhase {
    #[default]
    Idle,
    TouchActive,
    Swiping,
    /// A deferred single tap or a seek commit is scheduled
    AwaitingTapClassification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeDirection {
    Horizontal,
    Vertical,
}

/// How a completed touch was classified
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gesture", rename_all = "snake_case")]
pub enum GestureResolution {
    /// No touch was in progress, or no surface is attached
    Ignored,
    Swipe { direction: SwipeDirection },
    TogglePlay,
    /// Controls will be shown unless a second tap arrives
    SingleTapDeferred,
    /// Double tap; the seek accumulator now holds `seconds`
    SeekAccumulated { seconds: f64 },
}

#[derive(Debug, Clone, Copy)]
struct TapRecord {
    time_ms: u64,
    x: f64,
    zone: Zone,
}

#[derive(Debug, Default)]
struct GestureState {
    phase: GesturePhase,
    touch_start: Option<TouchPoint>,
    zone: Option<Zone>,
    /// Volume or brightness when the touch started
    baseline: f64,
    direction: Option<SwipeDirection>,
    last_tap: Option<TapRecord>,
    /// Most recent tap that fed the seek accumulator
    last_seek_tap: Option<TapRecord>,
    seek_accumulator: f64,
    pending_single_tap: Option<CancelableTimer>,
    pending_seek_commit: Option<CancelableTimer>,
    pending_feedback_clear: Option<CancelableTimer>,
    single_tap_generation: u64,
    seek_generation: u64,
}

impl GestureState {
    fn settle_phase(&mut self) {
        self.phase = if self.touch_start.is_some() {
            GesturePhase::TouchActive
        } else if self.pending_single_tap.is_some() || self.pending_seek_commit.is_some() {
            GesturePhase::AwaitingTapClassification
        } else {
            GesturePhase::Idle
        };
    }
}

struct GestureInner {
    config: GestureConfig,
    clock: PlaybackClock,
    controls: ControlsVisibility,
    runtime: Handle,
    token: CancellationToken,
    size: Mutex<Option<SurfaceSize>>,
    state: Mutex<GestureState>,
    feedback: watch::Sender<Option<GestureFeedback>>,
}

impl GestureInner {
    /// Deferred single tap fired
    fn commit_single_tap(&self, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.single_tap_generation != generation || state.pending_single_tap.is_none() {
                return;
            }
            state.pending_single_tap = None;
            state.settle_phase();
        }
        if self.size.lock().is_some() {
            trace!("Single tap confirmed");
            self.controls.show();
        }
    }

    /// Seek commit timer fired
    fn commit_seek(&self, generation: u64) {
        let amount = {
            let mut state = self.state.lock();
            if state.seek_generation != generation || state.pending_seek_commit.is_none() {
                return;
            }
            state.pending_seek_commit = None;
            state.last_seek_tap = None;
            let amount = std::mem::take(&mut state.seek_accumulator);
            state.settle_phase();
            amount
        };

        self.feedback.send_replace(None);
        if amount != 0.0 && self.size.lock().is_some() {
            debug!(seconds = amount, "Committing double-tap seek");
            self.clock.seek_by(amount);
        }
    }

    fn clear_feedback(&self) {
        self.state.lock().pending_feedback_clear = None;
        self.feedback.send_replace(None);
    }
}

/// Touch state machine for the playback surface
#[derive(Clone)]
pub struct GestureDisambiguator {
    inner: Arc<GestureInner>,
}

impl GestureDisambiguator {
    pub fn new(
        config: GestureConfig,
        clock: PlaybackClock,
        controls: ControlsVisibility,
        runtime: Handle,
        token: CancellationToken,
    ) -> Self {
        let (feedback, _) = watch::channel(None);
        Self {
            inner: Arc::new(GestureInner {
                config,
                clock,
                controls,
                runtime,
                token,
                size: Mutex::new(None),
                state: Mutex::new(GestureState::default()),
                feedback,
            }),
        }
    }

    /// Surface dimensions used for zone partitioning and swipe scaling
    pub fn set_surface_size(&self, size: SurfaceSize) {
        *self.inner.size.lock() = Some(size);
    }

    /// The surface went away; pending actions become no-ops
    pub fn clear_surface(&self) {
        *self.inner.size.lock() = None;
        self.reset();
    }

    pub fn phase(&self) -> GesturePhase {
        self.inner.state.lock().phase
    }

    /// Seconds accumulated by double taps and not yet committed
    pub fn pending_seek(&self) -> f64 {
        self.inner.state.lock().seek_accumulator
    }

    pub fn feedback(&self) -> Option<GestureFeedback> {
        *self.inner.feedback.borrow()
    }

    pub fn subscribe_feedback(&self) -> watch::Receiver<Option<GestureFeedback>> {
        self.inner.feedback.subscribe()
    }

    pub fn touch_start(&self, point: TouchPoint) {
        let Some(size) = *self.inner.size.lock() else {
            return;
        };
        let zone = Zone::from_position(point.x, size.width);
        let snapshot = self.inner.clock.snapshot();
        let baseline = match zone {
            Zone::Brightness => snapshot.brightness,
            Zone::Volume => snapshot.volume,
            Zone::Center => 0.0,
        };

        let mut state = self.inner.state.lock();
        state.touch_start = Some(point);
        state.zone = Some(zone);
        state.baseline = baseline;
        state.direction = None;
        state.phase = GesturePhase::TouchActive;
        trace!(%zone, x = point.x, y = point.y, "Touch start");
    }

    pub fn touch_move(&self, point: TouchPoint) {
        let Some(size) = *self.inner.size.lock() else {
            return;
        };

        let (zone, baseline, dy) = {
            let mut state = self.inner.state.lock();
            let Some(start) = state.touch_start else {
                return;
            };
            let dx = point.x - start.x;
            let dy = point.y - start.y;

            if state.direction.is_none() {
                let threshold = self.inner.config.swipe_lock_threshold_px;
                if dx.abs() <= threshold && dy.abs() <= threshold {
                    return;
                }
                let direction = if dy.abs() > dx.abs() {
                    SwipeDirection::Vertical
                } else {
                    SwipeDirection::Horizontal
                };
                debug!(?direction, "Swipe direction locked");
                state.direction = Some(direction);
                state.phase = GesturePhase::Swiping;
                state.pending_feedback_clear = None;
            }

            if state.direction != Some(SwipeDirection::Vertical) {
                return;
            }
            (state.zone.unwrap_or(Zone::Center), state.baseline, dy)
        };

        let span = size.height * self.inner.config.swipe_sensitivity;
        if !(span.is_finite() && span > 0.0) {
            return;
        }
        let level = (baseline - dy / span).clamp(0.0, 1.0);

        match zone {
            Zone::Brightness => {
                self.inner.clock.set_brightness(level);
                self.inner.feedback.send_replace(Some(GestureFeedback::Brightness { level }));
            }
            Zone::Volume => {
                self.inner.clock.set_volume(level);
                self.inner.feedback.send_replace(Some(GestureFeedback::Volume { level }));
            }
            Zone::Center => {}
        }
    }

    pub fn touch_end(&self, point: TouchPoint) -> GestureResolution {
        if self.inner.size.lock().is_none() {
            return GestureResolution::Ignored;
        }

        let mut state = self.inner.state.lock();
        let Some(start) = state.touch_start.take() else {
            return GestureResolution::Ignored;
        };
        let zone = state.zone.take().unwrap_or(Zone::Center);

        if let Some(direction) = state.direction.take() {
            if direction == SwipeDirection::Vertical && zone.is_side() {
                let weak = Arc::downgrade(&self.inner);
                state.pending_feedback_clear = Some(self.schedule(self.inner.config.swipe_feedback_clear(), move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.clear_feedback();
                    }
                }));
            }
            state.settle_phase();
            return GestureResolution::Swipe { direction };
        }

        let tap = TapRecord {
            time_ms: point.time_ms.max(start.time_ms),
            x: point.x,
            zone,
        };

        if zone == Zone::Center {
            state.last_tap = Some(tap);
            state.settle_phase();
            drop(state);

            debug!("Center tap");
            self.inner.clock.toggle_play();
            self.inner.controls.show();
            return GestureResolution::TogglePlay;
        }

        let seek_pending = state
            .pending_seek_commit
            .as_ref()
            .is_some_and(CancelableTimer::is_pending);
        let continues_seek = seek_pending && state.last_seek_tap.is_some_and(|prev| self.qualifies(prev, tap));
        let is_double = state.last_tap.is_some_and(|prev| self.qualifies(prev, tap));

        if continues_seek || is_double {
            if let Some(pending) = state.pending_single_tap.take() {
                pending.cancel();
            }
            state.last_tap = None;
            state.last_seek_tap = Some(tap);

            let step = zone.seek_sign() * self.inner.config.seek_step_secs;
            if state.seek_accumulator != 0.0 && state.seek_accumulator.signum() != step.signum() {
                state.seek_accumulator = 0.0;
            }
            // A fresh pair counts its first tap as well
            state.seek_accumulator += if continues_seek { step } else { 2.0 * step };
            let seconds = state.seek_accumulator;

            state.seek_generation += 1;
            let generation = state.seek_generation;
            let weak = Arc::downgrade(&self.inner);
            state.pending_seek_commit = Some(self.schedule(self.inner.config.seek_commit_delay(), move || {
                if let Some(inner) = weak.upgrade() {
                    inner.commit_seek(generation);
                }
            }));
            state.settle_phase();
            drop(state);

            debug!(%zone, seconds, "Double tap");
            self.inner.feedback.send_replace(Some(GestureFeedback::Seeking { seconds }));
            return GestureResolution::SeekAccumulated { seconds };
        }

        state.last_tap = Some(tap);
        state.single_tap_generation += 1;
        let generation = state.single_tap_generation;
        let weak = Arc::downgrade(&self.inner);
        state.pending_single_tap = Some(self.schedule(self.inner.config.single_tap_defer(), move || {
            if let Some(inner) = weak.upgrade() {
                inner.commit_single_tap(generation);
            }
        }));
        state.settle_phase();
        GestureResolution::SingleTapDeferred
    }

    /// The platform cancelled the touch; nothing is classified
    pub fn touch_cancel(&self) {
        let mut state = self.inner.state.lock();
        state.touch_start = None;
        state.zone = None;
        state.direction = None;
        state.settle_phase();
    }

    /// Drop every pending action and the in-progress touch
    pub fn reset(&self) {
        {
            let mut state = self.inner.state.lock();
            let generations = (state.single_tap_generation, state.seek_generation);
            *state = GestureState::default();
            (state.single_tap_generation, state.seek_generation) = generations;
        }
        self.inner.feedback.send_replace(None);
    }

    /// Cancel all timers; later touches are ignored
    pub fn shutdown(&self) {
        self.inner.token.cancel();
        self.clear_surface();
    }

    /// Second-tap gates: same zone, inside the tap window, close enough
    fn qualifies(&self, prev: TapRecord, tap: TapRecord) -> bool {
        prev.zone == tap.zone
            && tap.time_ms.saturating_sub(prev.time_ms) < self.inner.config.tap_window_ms
            && (tap.x - prev.x).abs() < self.inner.config.double_tap_max_distance_px
    }

    fn schedule<F>(&self, delay: std::time::Duration, action: F) -> CancelableTimer
    where
        F: FnOnce() + Send + 'static,
    {
        CancelableTimer::schedule(&self.inner.runtime, &self.inner.token, delay, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;
    use crate::surface::{MediaSurface, MemorySurface};
    use std::time::Duration;

    const WIDTH: f64 = 900.0;
    const HEIGHT: f64 = 500.0;
    const RIGHT: f64 = 800.0;
    const LEFT: f64 = 100.0;
    const CENTER: f64 = 450.0;

    struct Harness {
        surface: Arc<MemorySurface>,
        clock: PlaybackClock,
        controls: ControlsVisibility,
        gestures: GestureDisambiguator,
    }

    impl Harness {
        fn new() -> Self {
            let surface = Arc::new(MemorySurface::new());
            let config = PlayerConfig::default();
            let token = CancellationToken::new();
            let clock = PlaybackClock::new(surface.clone(), &config, None, &Handle::current(), &token);
            let controls = ControlsVisibility::new(&config.controls, Handle::current(), token.clone());
            let gestures = GestureDisambiguator::new(
                config.gesture.clone(),
                clock.clone(),
                controls.clone(),
                Handle::current(),
                token,
            );
            gestures.set_surface_size(SurfaceSize::new(WIDTH, HEIGHT));

            surface.set_source(Some("movie.mp4"));
            surface.load_metadata(1000.0);
            clock.seek_to(100.0);
            Self::pump(&surface, &clock);

            Self {
                surface,
                clock,
                controls,
                gestures,
            }
        }

        fn pump(surface: &MemorySurface, clock: &PlaybackClock) {
            for event in surface.drain_events() {
                clock.handle_event(event);
            }
        }

        fn tap(&self, x: f64, time_ms: u64) -> GestureResolution {
            self.gestures.touch_start(TouchPoint::new(x, 250.0, time_ms));
            self.gestures.touch_end(TouchPoint::new(x, 250.0, time_ms + 40))
        }

        /// Seeks issued after the initial positioning
        fn seeks(&self) -> Vec<f64> {
            self.surface.seek_log().into_iter().skip(1).collect()
        }
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_center_tap_toggles_immediately() {
        let h = Harness::new();
        assert_eq!(h.tap(CENTER, 0), GestureResolution::TogglePlay);
        assert!(!h.surface.is_paused());
        assert!(h.controls.is_visible());

        advance(100).await;
        h.tap(CENTER, 100);
        assert!(h.surface.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_side_single_tap_shows_controls_after_defer() {
        let h = Harness::new();
        assert_eq!(h.tap(RIGHT, 0), GestureResolution::SingleTapDeferred);
        assert_eq!(h.gestures.phase(), GesturePhase::AwaitingTapClassification);

        advance(250).await;
        assert!(!h.controls.is_visible());
        advance(100).await;
        assert!(h.controls.is_visible());
        assert_eq!(h.gestures.phase(), GesturePhase::Idle);
        assert!(h.seeks().is_empty());
        assert!(h.surface.is_paused(), "side taps never toggle playback");
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_tap_seeks_without_showing_controls() {
        let h = Harness::new();
        h.tap(RIGHT, 0);
        advance(150).await;
        assert_eq!(h.tap(RIGHT + 20.0, 150), GestureResolution::SeekAccumulated { seconds: 20.0 });
        assert_eq!(h.gestures.feedback(), Some(GestureFeedback::Seeking { seconds: 20.0 }));

        advance(500).await;
        assert!(h.seeks().is_empty(), "commit waits for the full delay");
        advance(200).await;
        assert_eq!(h.seeks(), vec![120.0]);
        assert_eq!(h.gestures.feedback(), None);
        assert_eq!(h.gestures.pending_seek(), 0.0);

        advance(1000).await;
        assert!(!h.controls.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_rapid_taps_commit_one_seek() {
        let h = Harness::new();
        h.tap(RIGHT, 0);
        advance(100).await;
        h.tap(RIGHT, 100);
        advance(100).await;
        assert_eq!(h.tap(RIGHT, 200), GestureResolution::SeekAccumulated { seconds: 30.0 });
        assert_eq!(h.gestures.pending_seek(), 30.0);

        // Each tap restarted the commit timer
        advance(550).await;
        assert!(h.seeks().is_empty());
        advance(100).await;
        assert_eq!(h.seeks(), vec![130.0]);
        assert!(!h.controls.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_rapid_left_taps_seek_back() {
        let h = Harness::new();
        for t in [0u64, 100, 200] {
            h.tap(LEFT, t);
            advance(100).await;
        }
        advance(700).await;
        assert_eq!(h.seeks(), vec![70.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_distant_tap_during_pending_seek_is_single() {
        let h = Harness::new();
        h.tap(RIGHT, 0);
        advance(100).await;
        h.tap(RIGHT, 100);

        advance(450).await;
        assert_eq!(h.tap(RIGHT - 150.0, 550), GestureResolution::SingleTapDeferred);
        assert_eq!(h.gestures.pending_seek(), 20.0);

        advance(1000).await;
        assert_eq!(h.seeks(), vec![120.0]);
        assert!(h.controls.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opposite_side_pair_restarts_accumulation() {
        let h = Harness::new();
        h.tap(RIGHT, 0);
        advance(100).await;
        h.tap(RIGHT, 100);
        advance(100).await;
        assert_eq!(h.tap(LEFT, 200), GestureResolution::SingleTapDeferred);
        advance(100).await;
        assert_eq!(h.tap(LEFT, 300), GestureResolution::SeekAccumulated { seconds: -20.0 });

        advance(1000).await;
        assert_eq!(h.seeks(), vec![80.0]);
        assert!(!h.controls.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_left_double_tap_seeks_back() {
        let h = Harness::new();
        h.tap(LEFT, 0);
        advance(100).await;
        h.tap(LEFT, 100);
        advance(700).await;
        assert_eq!(h.seeks(), vec![80.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_or_distant_taps_are_singles() {
        let h = Harness::new();
        h.tap(RIGHT, 0);
        advance(400).await;
        assert_eq!(h.tap(RIGHT, 400), GestureResolution::SingleTapDeferred);

        advance(100).await;
        assert_eq!(h.tap(RIGHT - 150.0, 500), GestureResolution::SingleTapDeferred);
        advance(1000).await;
        assert!(h.seeks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_vertical_swipe_adjusts_volume_and_suppresses_tap() {
        let h = Harness::new();
        h.clock.set_volume(0.5);

        h.gestures.touch_start(TouchPoint::new(RIGHT, 300.0, 0));
        h.gestures.touch_move(TouchPoint::new(RIGHT, 295.0, 10));
        assert_eq!(h.gestures.phase(), GesturePhase::TouchActive);

        // 30% of the height at 0.6 sensitivity
        h.gestures.touch_move(TouchPoint::new(RIGHT, 210.0, 20));
        assert_eq!(h.gestures.phase(), GesturePhase::Swiping);
        assert!((h.clock.snapshot().volume - 0.8).abs() < 1e-9);

        let resolution = h.gestures.touch_end(TouchPoint::new(RIGHT, 210.0, 30));
        assert_eq!(resolution, GestureResolution::Swipe { direction: SwipeDirection::Vertical });
        assert!(matches!(h.gestures.feedback(), Some(GestureFeedback::Volume { .. })));

        advance(600).await;
        assert_eq!(h.gestures.feedback(), None);
        assert!(!h.controls.is_visible());
        assert!(h.seeks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_swipe_clamps_brightness() {
        let h = Harness::new();
        h.gestures.touch_start(TouchPoint::new(LEFT, 50.0, 0));
        h.gestures.touch_move(TouchPoint::new(LEFT, 480.0, 10));
        assert_eq!(h.clock.snapshot().brightness, 0.0);
        assert_eq!(h.surface.brightness(), 0.0);

        h.gestures.touch_move(TouchPoint::new(LEFT, -2000.0, 20));
        assert_eq!(h.clock.snapshot().brightness, 1.0);
        h.gestures.touch_end(TouchPoint::new(LEFT, -2000.0, 30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_horizontal_swipe_in_center_does_not_toggle() {
        let h = Harness::new();
        h.gestures.touch_start(TouchPoint::new(CENTER, 250.0, 0));
        h.gestures.touch_move(TouchPoint::new(CENTER + 60.0, 255.0, 10));
        let resolution = h.gestures.touch_end(TouchPoint::new(CENTER + 60.0, 255.0, 20));
        assert_eq!(resolution, GestureResolution::Swipe { direction: SwipeDirection::Horizontal });
        assert!(h.surface.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_surface_ignores_touches() {
        let h = Harness::new();
        h.tap(RIGHT, 0);
        h.gestures.clear_surface();
        advance(1000).await;
        assert!(!h.controls.is_visible());

        assert_eq!(h.tap(CENTER, 2000), GestureResolution::Ignored);
        assert!(h.surface.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_commit() {
        let h = Harness::new();
        h.tap(RIGHT, 0);
        advance(100).await;
        h.tap(RIGHT, 100);
        h.gestures.shutdown();

        advance(1000).await;
        assert!(h.seeks().is_empty());
        assert_eq!(h.gestures.phase(), GesturePhase::Idle);
    }
}
