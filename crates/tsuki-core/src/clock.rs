//! Playback Clock - single owner of [`PlaybackState`]
//!
//! Every surface event and every playback command goes through this type,
//! so the state invariants are enforced in one place:
//! - `0 <= current_time <= duration` once the duration is known
//! - `buffered_percent` in `[0, 100]`
//! - `volume` and `brightness` in `[0, 1]`
//!
//! Progress is reported to a [`ProgressSink`] at most once per
//! `report_interval_secs` of playback, plus immediately on play, pause and
//! seek completion. Reports are queued to a drain task so the clock never
//! waits on the sink.

use crate::{
    config::{PlayerConfig, ProgressConfig},
    skip::{SkipKind, SkipWindows},
    surface::{MediaSurface, SurfaceEvent},
    types::{PlaybackState, TimeRange},
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a progress report was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressReason {
    /// Periodic report during playback
    Interval,
    Play,
    Pause,
    Seeked,
}

/// A progress report for the persistence sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub current_time: f64,
    pub duration: f64,
    pub reason: ProgressReason,
    pub reported_at: DateTime<Utc>,
}

/// Receives progress reports. Fire-and-forget from the clock's side.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_progress_update(&self, update: ProgressUpdate);
}

/// Percentage of `duration` covered up to the furthest buffered end.
///
/// Reports 0 while the duration is unknown (NaN) or zero.
pub fn buffered_percent(ranges: &[TimeRange], duration: f64) -> f64 {
    if !(duration.is_finite() && duration > 0.0) {
        return 0.0;
    }
    let furthest = ranges.iter().map(|r| r.end).fold(0.0_f64, f64::max);
    (furthest / duration * 100.0).clamp(0.0, 100.0)
}

struct ClockState {
    snapshot: PlaybackState,
    skip: SkipWindows,
    /// Position of the last report; periodic reports measure from here
    last_reported: f64,
    detached: bool,
}

impl ClockState {
    /// Pull time, duration and buffered ranges from the surface
    fn refresh_timing(&mut self, surface: &dyn MediaSurface) {
        let duration = surface.duration();
        let time = surface.current_time();
        let time = if time.is_finite() { time.max(0.0) } else { 0.0 };

        if duration.is_finite() && duration > 0.0 {
            self.snapshot.duration_seconds = duration;
            self.snapshot.current_time_seconds = time.min(duration);
        } else {
            self.snapshot.current_time_seconds = time;
        }
        self.snapshot.buffered_percent = buffered_percent(&surface.buffered(), duration);
        self.refresh_skip_flags();
    }

    fn refresh_skip_flags(&mut self) {
        let (intro, outro) = self.skip.visibility(self.snapshot.current_time_seconds);
        self.snapshot.show_skip_intro = intro;
        self.snapshot.show_skip_outro = outro;
    }

    fn set_position(&mut self, seconds: f64) {
        self.snapshot.current_time_seconds = seconds;
        self.refresh_skip_flags();
    }

    fn make_report(&mut self, reason: ProgressReason) -> Option<ProgressUpdate> {
        if !self.snapshot.has_duration() {
            return None;
        }
        self.last_reported = self.snapshot.current_time_seconds;
        Some(ProgressUpdate {
            current_time: self.snapshot.current_time_seconds,
            duration: self.snapshot.duration_seconds,
            reason,
            reported_at: Utc::now(),
        })
    }
}

struct ClockInner {
    surface: Arc<dyn MediaSurface>,
    config: ProgressConfig,
    rates: Vec<f64>,
    state: Mutex<ClockState>,
    state_tx: watch::Sender<PlaybackState>,
    progress_tx: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

/// Cheaply clonable handle to the playback clock
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<ClockInner>,
}

impl PlaybackClock {
    /// Create a clock observing `surface`.
    ///
    /// When a sink is given, a drain task is spawned on `runtime`; it stops
    /// when `shutdown` is cancelled, after delivering anything still queued.
    pub fn new(
        surface: Arc<dyn MediaSurface>,
        config: &PlayerConfig,
        sink: Option<Arc<dyn ProgressSink>>,
        runtime: &Handle,
        shutdown: &CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::default());

        let progress_tx = sink.map(|sink| {
            let (tx, rx) = mpsc::unbounded_channel();
            runtime.spawn(drain_progress(rx, sink, shutdown.clone()));
            tx
        });

        Self {
            inner: Arc::new(ClockInner {
                surface,
                config: config.progress.clone(),
                rates: config.playback_rates.clone(),
                state: Mutex::new(ClockState {
                    snapshot: PlaybackState::default(),
                    skip: SkipWindows::default(),
                    last_reported: 0.0,
                    detached: false,
                }),
                state_tx,
                progress_tx,
            }),
        }
    }

    /// Current state
    pub fn snapshot(&self) -> PlaybackState {
        self.inner.state.lock().snapshot.clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state_tx.subscribe()
    }

    /// Apply a mutation and publish the result
    fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut ClockState, &dyn MediaSurface) -> Option<ProgressReason>,
    {
        let (snapshot, report) = {
            let mut state = self.inner.state.lock();
            if state.detached {
                return;
            }
            let reason = f(&mut state, self.inner.surface.as_ref());
            let report = reason.and_then(|r| state.make_report(r));
            (state.snapshot.clone(), report)
        };

        self.inner.state_tx.send_replace(snapshot);

        if let (Some(update), Some(tx)) = (report, &self.inner.progress_tx) {
            debug!(time = update.current_time, reason = ?update.reason, "Progress report");
            let _ = tx.send(update);
        }
    }

    /// Fold one surface event into the state
    pub fn handle_event(&self, event: SurfaceEvent) {
        let interval = self.inner.config.report_interval_secs;

        self.update(|state, surface| match event {
            SurfaceEvent::TimeUpdate => {
                state.refresh_timing(surface);
                let advanced = state.snapshot.current_time_seconds - state.last_reported;
                (advanced >= interval).then_some(ProgressReason::Interval)
            }
            SurfaceEvent::Seeked => {
                state.refresh_timing(surface);
                Some(ProgressReason::Seeked)
            }
            SurfaceEvent::Play => {
                state.snapshot.is_playing = true;
                state.refresh_timing(surface);
                Some(ProgressReason::Play)
            }
            SurfaceEvent::Pause => {
                state.snapshot.is_playing = false;
                state.refresh_timing(surface);
                Some(ProgressReason::Pause)
            }
            SurfaceEvent::Ended => {
                state.snapshot.is_playing = false;
                None
            }
            SurfaceEvent::Waiting => {
                state.snapshot.is_loading = true;
                None
            }
            SurfaceEvent::CanPlay => {
                state.snapshot.is_loading = false;
                None
            }
            SurfaceEvent::LoadedMetadata | SurfaceEvent::DurationChange | SurfaceEvent::Progress => {
                state.refresh_timing(surface);
                None
            }
            SurfaceEvent::VolumeChange => {
                state.snapshot.volume = surface.volume().clamp(0.0, 1.0);
                state.snapshot.is_muted = surface.is_muted();
                None
            }
            SurfaceEvent::RateChange => {
                state.snapshot.playback_rate = surface.playback_rate();
                None
            }
            SurfaceEvent::FullscreenChange => {
                state.snapshot.is_fullscreen = surface.is_fullscreen();
                None
            }
            SurfaceEvent::Emptied => {
                state.snapshot.current_time_seconds = 0.0;
                state.snapshot.duration_seconds = 0.0;
                state.snapshot.buffered_percent = 0.0;
                state.snapshot.is_playing = false;
                state.last_reported = 0.0;
                state.refresh_skip_flags();
                None
            }
            SurfaceEvent::TextTracksChanged => None,
        });
    }

    /// Prepare for a new media item: new skip windows, timing reset,
    /// loading flag raised. User preferences (volume, rate, brightness)
    /// carry over.
    pub fn begin_session(&self, skip: SkipWindows) {
        self.update(|state, _| {
            state.skip = skip;
            state.last_reported = 0.0;
            state.snapshot.current_time_seconds = 0.0;
            state.snapshot.duration_seconds = 0.0;
            state.snapshot.buffered_percent = 0.0;
            state.snapshot.is_playing = false;
            state.snapshot.is_loading = true;
            state.snapshot.selected_subtitle_index = -1;
            state.snapshot.load_error = None;
            state.refresh_skip_flags();
            None
        });
    }

    /// Enter the terminal "failed to load" state
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "Playback failed to load");
        self.update(|state, _| {
            state.snapshot.is_loading = false;
            state.snapshot.is_playing = false;
            state.snapshot.load_error = Some(message);
            None
        });
    }

    /// Stop accepting commands and events. Used on teardown.
    pub fn detach(&self) {
        self.inner.state.lock().detached = true;
    }

    pub fn is_detached(&self) -> bool {
        self.inner.state.lock().detached
    }

    pub fn play(&self) {
        if self.is_detached() {
            return;
        }
        self.inner.surface.play();
    }

    pub fn pause(&self) {
        if self.is_detached() {
            return;
        }
        self.inner.surface.pause();
    }

    pub fn toggle_play(&self) {
        if self.inner.surface.is_paused() {
            self.play();
        } else {
            self.pause();
        }
    }

    /// Seek to an absolute position, clamped to `[0, duration]`
    pub fn seek_to(&self, seconds: f64) {
        if self.is_detached() {
            return;
        }
        if !seconds.is_finite() {
            warn!(seconds, "Ignoring non-finite seek target");
            return;
        }

        let duration = self.inner.surface.duration();
        let target = if duration.is_finite() && duration > 0.0 {
            seconds.clamp(0.0, duration)
        } else {
            seconds.max(0.0)
        };

        debug!(target, "Seeking");
        self.inner.surface.set_current_time(target);
        self.update(|state, _| {
            state.set_position(target);
            None
        });
    }

    /// Seek relative to the current position
    pub fn seek_by(&self, delta_seconds: f64) {
        let current = self.inner.surface.current_time();
        info!(from = current, delta = delta_seconds, "Relative seek");
        self.seek_to(current + delta_seconds);
    }

    /// Seek to a fraction of the duration (seek bar)
    pub fn seek_to_fraction(&self, fraction: f64) {
        let duration = self.snapshot().duration_seconds;
        if duration > 0.0 && fraction.is_finite() {
            self.seek_to(fraction.clamp(0.0, 1.0) * duration);
        }
    }

    /// Jump to the end of the intro/outro window and hide its affordance
    pub fn skip(&self, kind: SkipKind) {
        let window = self.inner.state.lock().skip.get(kind).copied();
        let Some(window) = window else {
            return;
        };

        info!(kind = ?kind, to = window.end, "Skipping window");
        self.seek_to(window.end);
        self.update(|state, _| {
            match kind {
                SkipKind::Intro => state.snapshot.show_skip_intro = false,
                SkipKind::Outro => state.snapshot.show_skip_outro = false,
            }
            None
        });
    }

    pub fn set_volume(&self, volume: f64) {
        if self.is_detached() {
            return;
        }
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        self.inner.surface.set_volume(volume);
        self.inner.surface.set_muted(volume == 0.0);
        self.update(|state, _| {
            state.snapshot.volume = volume;
            state.snapshot.is_muted = volume == 0.0;
            None
        });
    }

    pub fn toggle_mute(&self) {
        if self.is_detached() {
            return;
        }
        let muted = !self.inner.surface.is_muted();
        self.inner.surface.set_muted(muted);
        self.update(|state, _| {
            state.snapshot.is_muted = muted;
            None
        });
    }

    pub fn set_brightness(&self, brightness: f64) {
        if self.is_detached() {
            return;
        }
        let brightness = if brightness.is_finite() { brightness.clamp(0.0, 1.0) } else { 1.0 };
        self.inner.surface.set_brightness(brightness);
        self.update(|state, _| {
            state.snapshot.brightness = brightness;
            None
        });
    }

    /// Change speed. Only rates from the configured set are accepted.
    pub fn set_rate(&self, rate: f64) -> Result<()> {
        if !self.inner.rates.iter().any(|r| (r - rate).abs() < f64::EPSILON) {
            return Err(Error::UnsupportedRate { rate });
        }
        if self.is_detached() {
            return Ok(());
        }
        self.inner.surface.set_playback_rate(rate);
        self.update(|state, _| {
            state.snapshot.playback_rate = rate;
            None
        });
        Ok(())
    }

    pub fn allowed_rates(&self) -> &[f64] {
        &self.inner.rates
    }

    pub fn toggle_fullscreen(&self) {
        if self.is_detached() {
            return;
        }
        let fullscreen = !self.inner.surface.is_fullscreen();
        self.inner.surface.set_fullscreen(fullscreen);
    }

    /// Record which native text track is showing (-1 for none)
    pub fn set_selected_subtitle(&self, index: i32) {
        self.update(|state, _| {
            state.snapshot.selected_subtitle_index = index;
            None
        });
    }
}

async fn drain_progress(
    mut rx: mpsc::UnboundedReceiver<ProgressUpdate>,
    sink: Arc<dyn ProgressSink>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            update = rx.recv() => match update {
                Some(update) => sink.on_progress_update(update).await,
                None => return,
            },
        }
    }

    // Flush what was reported before teardown
    while let Ok(update) = rx.try_recv() {
        sink.on_progress_update(update).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skip::SkipWindow;
    use crate::surface::MemorySurface;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<ProgressUpdate>>,
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn on_progress_update(&self, update: ProgressUpdate) {
            self.updates.lock().push(update);
        }
    }

    impl RecordingSink {
        fn reasons(&self) -> Vec<ProgressReason> {
            self.updates.lock().iter().map(|u| u.reason).collect()
        }
    }

    fn setup(sink: Option<Arc<RecordingSink>>) -> (Arc<MemorySurface>, PlaybackClock, CancellationToken) {
        let surface = Arc::new(MemorySurface::new());
        let token = CancellationToken::new();
        let clock = PlaybackClock::new(
            surface.clone(),
            &PlayerConfig::default(),
            sink.map(|s| s as Arc<dyn ProgressSink>),
            &Handle::current(),
            &token,
        );
        (surface, clock, token)
    }

    fn pump(surface: &MemorySurface, clock: &PlaybackClock) {
        for event in surface.drain_events() {
            clock.handle_event(event);
        }
    }

    #[test]
    fn test_buffered_percent_guards_duration() {
        let ranges = vec![TimeRange::new(0.0, 30.0), TimeRange::new(40.0, 50.0)];
        assert_eq!(buffered_percent(&ranges, f64::NAN), 0.0);
        assert_eq!(buffered_percent(&ranges, 0.0), 0.0);
        assert_eq!(buffered_percent(&ranges, 100.0), 50.0);
        assert_eq!(buffered_percent(&[TimeRange::new(0.0, 150.0)], 100.0), 100.0);
        assert_eq!(buffered_percent(&[], 100.0), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_throttled() {
        let sink = Arc::new(RecordingSink::default());
        let (surface, clock, _token) = setup(Some(sink.clone()));

        surface.set_source(Some("a.mp4"));
        surface.load_metadata(600.0);
        clock.play();
        pump(&surface, &clock);

        // 60 seconds of playback in quarter-second ticks
        for _ in 0..240 {
            surface.advance(0.25);
            pump(&surface, &clock);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let updates = sink.updates.lock().clone();
        assert_eq!(updates[0].reason, ProgressReason::Play);
        let interval: Vec<_> = updates.iter().filter(|u| u.reason == ProgressReason::Interval).collect();
        assert_eq!(interval.len(), 6);
        for pair in interval.windows(2) {
            assert!(pair[1].current_time - pair[0].current_time >= 10.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_report_immediately() {
        let sink = Arc::new(RecordingSink::default());
        let (surface, clock, _token) = setup(Some(sink.clone()));

        surface.set_source(Some("a.mp4"));
        surface.load_metadata(600.0);
        clock.play();
        pump(&surface, &clock);
        surface.advance(2.0);
        pump(&surface, &clock);
        clock.pause();
        pump(&surface, &clock);
        clock.seek_by(3.0);
        pump(&surface, &clock);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            sink.reasons(),
            vec![ProgressReason::Play, ProgressReason::Pause, ProgressReason::Seeked]
        );
        assert_eq!(sink.updates.lock()[2].current_time, 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reports_before_duration() {
        let sink = Arc::new(RecordingSink::default());
        let (surface, clock, _token) = setup(Some(sink.clone()));

        surface.set_source(Some("a.mp4"));
        clock.play();
        pump(&surface, &clock);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sink.updates.lock().is_empty());
    }

    #[tokio::test]
    async fn test_loading_flag_independent_of_playing() {
        let (surface, clock, _token) = setup(None);
        surface.set_source(Some("a.mp4"));
        surface.load_metadata(100.0);
        clock.play();
        pump(&surface, &clock);

        surface.stall();
        pump(&surface, &clock);
        let state = clock.snapshot();
        assert!(state.is_loading);
        assert!(state.is_playing);

        surface.recover();
        pump(&surface, &clock);
        assert!(!clock.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_skip_flags_follow_time() {
        let (surface, clock, _token) = setup(None);
        clock.begin_session(SkipWindows::new(Some(SkipWindow::new(0.0, 90.0)), Some(SkipWindow::new(1300.0, 1400.0))));
        surface.set_source(Some("a.mp4"));
        surface.load_metadata(1440.0);
        pump(&surface, &clock);
        assert!(clock.snapshot().show_skip_intro);

        clock.skip(SkipKind::Intro);
        let state = clock.snapshot();
        assert_eq!(state.current_time_seconds, 90.0);
        assert!(!state.show_skip_intro);

        clock.seek_to(1350.0);
        pump(&surface, &clock);
        assert!(clock.snapshot().show_skip_outro);
        clock.skip(SkipKind::Outro);
        assert_eq!(surface.current_time(), 1400.0);
        assert!(!clock.snapshot().show_skip_outro);
    }

    #[tokio::test]
    async fn test_seek_and_volume_clamping() {
        let (surface, clock, _token) = setup(None);
        surface.set_source(Some("a.mp4"));
        surface.load_metadata(100.0);
        pump(&surface, &clock);

        clock.seek_to(250.0);
        assert_eq!(clock.snapshot().current_time_seconds, 100.0);
        clock.seek_by(-500.0);
        assert_eq!(clock.snapshot().current_time_seconds, 0.0);
        clock.seek_to_fraction(0.25);
        assert_eq!(clock.snapshot().current_time_seconds, 25.0);

        clock.set_volume(1.7);
        assert_eq!(clock.snapshot().volume, 1.0);
        clock.set_volume(-0.2);
        let state = clock.snapshot();
        assert_eq!(state.volume, 0.0);
        assert!(state.is_muted);
    }

    #[tokio::test]
    async fn test_rate_must_be_allowed() {
        let (surface, clock, _token) = setup(None);
        tokio_test::assert_ok!(clock.set_rate(1.5));
        assert_eq!(surface.playback_rate(), 1.5);
        let err = tokio_test::assert_err!(clock.set_rate(3.0));
        assert!(matches!(err, Error::UnsupportedRate { .. }));
        assert_eq!(clock.snapshot().playback_rate, 1.5);
    }

    #[tokio::test]
    async fn test_detached_clock_ignores_commands() {
        let (surface, clock, _token) = setup(None);
        surface.set_source(Some("a.mp4"));
        surface.load_metadata(100.0);
        clock.detach();
        clock.play();
        clock.seek_to(10.0);
        assert!(surface.is_paused());
        assert!(surface.seek_log().is_empty());
    }

    #[tokio::test]
    async fn test_fail_clears_loading() {
        let (_surface, clock, _token) = setup(None);
        clock.begin_session(SkipWindows::default());
        assert!(clock.snapshot().is_loading);
        clock.fail("manifest unreachable");
        let state = clock.snapshot();
        assert!(!state.is_loading);
        assert_eq!(state.load_error.as_deref(), Some("manifest unreachable"));
    }
}
