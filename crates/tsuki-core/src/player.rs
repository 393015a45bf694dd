//! Player - composition root
//!
//! Wires one surface to the playback clock, stream attacher, subtitle
//! synchronizer, control bar and gesture engine. The host feeds it surface
//! events (via [`Player::pump`]), touches and control actions; everything
//! it renders comes from [`Player::view`].

use crate::{
    clock::{PlaybackClock, ProgressSink},
    config::PlayerConfig,
    controls::{seek_preview, ControlAction, ControlsView, ControlsVisibility, SeekPreview, SettingsMenu},
    gesture::{GestureDisambiguator, GestureFeedback, GestureResolution},
    skip::SkipKind,
    stream::{AdaptiveClientFactory, AttachOutcome, FatalCallback, PlaybackPath, ReadyCallback, StreamAttacher},
    subtitles::SubtitleSynchronizer,
    surface::{MediaSurface, SurfaceEvent},
    types::{MediaItem, PlaybackSession, PlaybackState, SurfaceSize, TouchPoint},
    Error, Result,
};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// A playback controller bound to one surface
pub struct Player {
    config: PlayerConfig,
    surface: Arc<dyn MediaSurface>,
    clock: PlaybackClock,
    attacher: StreamAttacher,
    subtitles: Arc<SubtitleSynchronizer>,
    controls: ControlsVisibility,
    gestures: GestureDisambiguator,
    token: CancellationToken,
    item: Option<MediaItem>,
}

impl Player {
    /// Build a player. Must be called from within a tokio runtime.
    pub fn new(
        surface: Arc<dyn MediaSurface>,
        factory: Arc<dyn AdaptiveClientFactory>,
        config: PlayerConfig,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime =
            Handle::try_current().map_err(|e| Error::Internal(format!("player requires a tokio runtime: {}", e)))?;
        let token = CancellationToken::new();

        let clock = PlaybackClock::new(surface.clone(), &config, sink, &runtime, &token);
        let attacher = StreamAttacher::new(
            surface.clone(),
            clock.clone(),
            factory,
            config.stream.clone(),
            config.resume.clone(),
            runtime.clone(),
            token.clone(),
        );
        let subtitles = Arc::new(SubtitleSynchronizer::new(surface.clone(), clock.clone(), &config.controls));
        let controls = ControlsVisibility::new(&config.controls, runtime.clone(), token.clone());
        let gestures = GestureDisambiguator::new(
            config.gesture.clone(),
            clock.clone(),
            controls.clone(),
            runtime.clone(),
            token.clone(),
        );

        runtime.spawn(follow_controls_visibility(controls.subscribe(), subtitles.clone(), token.clone()));

        info!(version = crate::VERSION, "Player created");

        Ok(Self {
            config,
            surface,
            clock,
            attacher,
            subtitles,
            controls,
            gestures,
            token,
            item: None,
        })
    }

    /// Load a media item, replacing whatever is playing.
    ///
    /// The same URL again is a no-op. Playback starts automatically once
    /// the stream is ready, at the item's resume offset when it has one.
    #[instrument(skip(self, item), fields(url = %item.url))]
    pub fn set_source(&mut self, item: MediaItem) -> Result<AttachOutcome> {
        if self.token.is_cancelled() {
            return Err(Error::NotAttached);
        }
        if self.attacher.session().is_some_and(|s| s.source_url == item.url) {
            debug!("Source unchanged");
            return Ok(AttachOutcome::AlreadyAttached);
        }

        self.gestures.reset();
        self.clock.begin_session(item.skip);

        let clock = self.clock.clone();
        let on_ready: ReadyCallback = Arc::new(move |session: &PlaybackSession| {
            info!(session_id = %session.id, "Stream ready, starting playback");
            clock.play();
        });
        let on_fatal: FatalCallback = Arc::new(|session: &PlaybackSession, error: &Error| {
            error!(session_id = %session.id, code = error.error_code(), error = %error, "Stream failed");
        });

        let session = PlaybackSession::new(item.url.clone(), item.resume_offset_seconds);
        let outcome = match self.attacher.attach(session, on_ready, on_fatal) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.clock.fail(e.to_string());
                self.item = None;
                return Err(e);
            }
        };

        self.subtitles.set_tracks(item.subtitles.clone(), item.default_subtitle.clone());
        self.item = Some(item);
        Ok(outcome)
    }

    /// Drain pending surface events and handle them in order. Returns how
    /// many events were handled.
    pub fn pump(&self) -> usize {
        let events = self.surface.drain_events();
        for event in &events {
            self.handle_surface_event(*event);
        }
        events.len()
    }

    /// Fold one surface event into the clock, then let the components that
    /// react to it catch up
    pub fn handle_surface_event(&self, event: SurfaceEvent) {
        self.clock.handle_event(event);
        match event {
            SurfaceEvent::LoadedMetadata => {
                self.attacher.on_metadata_loaded();
                self.subtitles.apply();
            }
            SurfaceEvent::TextTracksChanged => {
                self.subtitles.apply();
            }
            SurfaceEvent::Play | SurfaceEvent::Pause | SurfaceEvent::Ended => {
                self.controls.set_hold(self.surface.is_paused());
            }
            _ => {}
        }
    }

    /// Apply a control surface command
    pub fn dispatch(&self, action: ControlAction) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::NotAttached);
        }
        debug!(?action, "Control action");

        match action {
            ControlAction::TogglePlay => self.clock.toggle_play(),
            ControlAction::ToggleMute => self.clock.toggle_mute(),
            ControlAction::ToggleFullscreen => self.clock.toggle_fullscreen(),
            ControlAction::Skip { seconds } => self.clock.seek_by(seconds),
            ControlAction::SkipIntro => self.clock.skip(SkipKind::Intro),
            ControlAction::SkipOutro => self.clock.skip(SkipKind::Outro),
            ControlAction::Seek { fraction } => self.clock.seek_to_fraction(fraction),
            ControlAction::SetVolume { value } => self.clock.set_volume(value),
            ControlAction::VolumeBy { delta } => self.clock.set_volume(self.clock.snapshot().volume + delta),
            ControlAction::SelectSubtitle { label } => self.subtitles.select(&label),
            ControlAction::CycleSubtitles => self.subtitles.cycle(),
            ControlAction::SetPlaybackRate { rate } => self.clock.set_rate(rate)?,
            ControlAction::ShowControls => {}
        }

        self.controls.show();
        Ok(())
    }

    /// Keyboard shortcut; false when the key is not bound
    pub fn handle_key(&self, key: &str) -> Result<bool> {
        match ControlAction::from_key(key, &self.config.controls) {
            Some(action) => self.dispatch(action).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn set_surface_size(&self, size: SurfaceSize) {
        self.gestures.set_surface_size(size);
    }

    pub fn touch_start(&self, point: TouchPoint) {
        self.gestures.touch_start(point);
    }

    pub fn touch_move(&self, point: TouchPoint) {
        self.gestures.touch_move(point);
    }

    pub fn touch_end(&self, point: TouchPoint) -> GestureResolution {
        self.gestures.touch_end(point)
    }

    pub fn touch_cancel(&self) {
        self.gestures.touch_cancel();
    }

    /// Snapshot for rendering the control bar
    pub fn view(&self) -> ControlsView {
        ControlsView::new(
            &self.clock.snapshot(),
            self.controls.is_visible(),
            self.subtitles.selected_label(),
        )
    }

    pub fn settings_menu(&self) -> SettingsMenu {
        let selected = self.subtitles.selected_label();
        SettingsMenu::new(
            self.clock.allowed_rates(),
            self.clock.snapshot().playback_rate,
            &self.subtitles.menu_labels(),
            selected.as_deref(),
        )
    }

    pub fn seek_preview(&self, fraction: f64) -> Option<SeekPreview> {
        seek_preview(
            fraction,
            self.clock.snapshot().duration_seconds,
            self.config.controls.thumbnail_interval_secs,
        )
    }

    pub fn state(&self) -> PlaybackState {
        self.clock.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.clock.subscribe()
    }

    pub fn gesture_feedback(&self) -> Option<GestureFeedback> {
        self.gestures.feedback()
    }

    pub fn current_item(&self) -> Option<&MediaItem> {
        self.item.as_ref()
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.attacher.session()
    }

    pub fn playback_path(&self) -> Option<PlaybackPath> {
        self.attacher.path()
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn controls(&self) -> &ControlsVisibility {
        &self.controls
    }

    pub fn gestures(&self) -> &GestureDisambiguator {
        &self.gestures
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Tear down: pending timers are cancelled, the streaming client is
    /// destroyed and the clock stops writing state. Idempotent.
    pub fn shutdown(&mut self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        self.gestures.shutdown();
        self.clock.detach();
        self.attacher.detach();
        self.surface.set_source(None);
        self.item = None;
        info!("Player shut down");
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Caption placement tracks the control bar
async fn follow_controls_visibility(
    mut visible: watch::Receiver<bool>,
    subtitles: Arc<SubtitleSynchronizer>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            changed = visible.changed() => {
                if changed.is_err() {
                    return;
                }
                let is_visible = *visible.borrow_and_update();
                subtitles.set_controls_visible(is_visible);
            }
        }
    }
}
