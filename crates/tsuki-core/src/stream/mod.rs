//! Stream attachment
//!
//! The [`StreamAttacher`] owns exactly one streaming session per surface.
//! Adaptive sources go through an [`AdaptiveClient`] when the environment
//! supports one, otherwise the source is assigned to the surface directly.
//! Switching sources destroys the previous client handle before the next
//! one is created.

#[cfg(feature = "hls")]
mod hls;
mod scripted;

#[cfg(feature = "hls")]
pub use hls::{probe_manifest, BufferWindow, HlsClient, HlsClientFactory, LevelInfo, ManifestSummary, PlaylistKind};
pub use scripted::{ClientLifecycle, ScriptedClientFactory};

use crate::{
    clock::PlaybackClock,
    config::{ResumeConfig, StreamConfig},
    surface::MediaSurface,
    types::PlaybackSession,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Events raised by an adaptive client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Manifest loaded and parsed; playback can begin
    ManifestParsed {
        levels: usize,
        duration: Option<f64>,
    },
    /// Loading or decoding error. Non-fatal errors are retried by the client.
    Error { fatal: bool, details: String },
}

/// An adaptive-bitrate streaming client bound to one source.
///
/// Lifecycle: created by a factory, `load_source`, `attach_media`, events,
/// then `destroy`. Destroying is mandatory before another client is created
/// for the same surface.
pub trait AdaptiveClient: Send {
    /// Start loading the manifest. Completion is reported as a [`StreamEvent`].
    fn load_source(&mut self, url: &str);
    /// Bind the client to the rendering surface
    fn attach_media(&mut self, surface: Arc<dyn MediaSurface>);
    /// Event stream; can be taken once
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<StreamEvent>>;
    /// Release every resource held by the client
    fn destroy(&mut self);
}

/// Constructs adaptive clients
pub trait AdaptiveClientFactory: Send + Sync {
    /// False when the environment cannot run the client, in which case the
    /// surface is expected to play the stream natively
    fn is_supported(&self) -> bool;
    fn create(&self, config: &StreamConfig) -> Box<dyn AdaptiveClient>;
}

/// Which playback path a session took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPath {
    /// Adaptive stream through the streaming client
    Library,
    /// Adaptive stream played by the surface itself
    NativeHls,
    /// Progressive source assigned to the surface
    Direct,
}

/// Result of an [`StreamAttacher::attach`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached(PlaybackPath),
    /// The source is already attached; nothing was created
    AlreadyAttached,
}

/// Called once per session when playback can start
pub type ReadyCallback = Arc<dyn Fn(&PlaybackSession) + Send + Sync>;
/// Called when the session fails terminally
pub type FatalCallback = Arc<dyn Fn(&PlaybackSession, &Error) + Send + Sync>;

/// Clamp a requested resume offset into something safe to apply.
///
/// Non-finite offsets are dropped, negative ones become 0, offsets beyond a
/// known duration are clamped to it, and anything at or below
/// `min_resume_secs` is treated as a cold start (`None`).
pub fn normalize_resume_offset(offset: Option<f64>, duration: Option<f64>, min_resume_secs: f64) -> Option<f64> {
    let offset = offset?;
    if !offset.is_finite() {
        return None;
    }
    let mut target = offset.max(0.0);
    if let Some(duration) = duration.filter(|d| d.is_finite() && *d > 0.0) {
        target = target.min(duration);
    }
    (target > min_resume_secs).then_some(target)
}

/// Per-session once-only flags
#[derive(Debug, Default)]
struct SessionGuard {
    restored: AtomicBool,
    ready: AtomicBool,
}

/// Shared by the event task and the metadata-loaded path
#[derive(Clone)]
struct SessionContext {
    session: PlaybackSession,
    guard: Arc<SessionGuard>,
    clock: PlaybackClock,
    surface: Arc<dyn MediaSurface>,
    min_resume_secs: f64,
    on_ready: ReadyCallback,
    on_fatal: FatalCallback,
}

impl SessionContext {
    /// Apply the resume offset, at most once per session
    fn restore(&self, duration_hint: Option<f64>) {
        if self.guard.restored.swap(true, Ordering::SeqCst) {
            return;
        }

        let duration = Some(self.surface.duration())
            .filter(|d| d.is_finite() && *d > 0.0)
            .or(duration_hint);
        let requested = self.session.resume_offset_seconds;

        match normalize_resume_offset(requested, duration, self.min_resume_secs) {
            Some(target) => {
                if requested != Some(target) {
                    warn!(requested = ?requested, applied = target, "Resume offset clamped");
                }
                info!(session_id = %self.session.id, target, "Restoring playback position");
                self.clock.seek_to(target);
            }
            None => debug!(session_id = %self.session.id, "No resume needed"),
        }
    }

    fn ready(&self) {
        if !self.guard.ready.swap(true, Ordering::SeqCst) {
            (self.on_ready)(&self.session);
        }
    }

    fn fail(&self, error: Error) {
        self.clock.fail(error.to_string());
        (self.on_fatal)(&self.session, &error);
    }
}

struct ActiveStream {
    context: SessionContext,
    path: PlaybackPath,
    client: Option<Box<dyn AdaptiveClient>>,
    token: CancellationToken,
}

/// Owns the streaming session attached to one surface
pub struct StreamAttacher {
    surface: Arc<dyn MediaSurface>,
    clock: PlaybackClock,
    factory: Arc<dyn AdaptiveClientFactory>,
    config: StreamConfig,
    resume: ResumeConfig,
    runtime: Handle,
    shutdown: CancellationToken,
    active: Option<ActiveStream>,
}

impl StreamAttacher {
    pub fn new(
        surface: Arc<dyn MediaSurface>,
        clock: PlaybackClock,
        factory: Arc<dyn AdaptiveClientFactory>,
        config: StreamConfig,
        resume: ResumeConfig,
        runtime: Handle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            surface,
            clock,
            factory,
            config,
            resume,
            runtime,
            shutdown,
            active: None,
        }
    }

    /// The attached session, if any
    pub fn session(&self) -> Option<&PlaybackSession> {
        self.active.as_ref().map(|a| &a.context.session)
    }

    pub fn path(&self) -> Option<PlaybackPath> {
        self.active.as_ref().map(|a| a.path)
    }

    /// Attach a session to the surface.
    ///
    /// Re-attaching the current source is a no-op. Any other source first
    /// tears down the active session synchronously.
    #[instrument(skip(self, on_ready, on_fatal), fields(url = %session.source_url))]
    pub fn attach(
        &mut self,
        session: PlaybackSession,
        on_ready: ReadyCallback,
        on_fatal: FatalCallback,
    ) -> Result<AttachOutcome> {
        if let Some(active) = &self.active {
            if active.context.session.source_url == session.source_url {
                debug!("Source already attached");
                return Ok(AttachOutcome::AlreadyAttached);
            }
        }

        self.detach();

        if session.source_url.trim().is_empty() {
            return Err(Error::InvalidSource {
                url: session.source_url,
                reason: "empty source".into(),
            });
        }

        let path = if !session.is_adaptive_stream {
            PlaybackPath::Direct
        } else if !self.config.native_hls && self.factory.is_supported() {
            PlaybackPath::Library
        } else {
            PlaybackPath::NativeHls
        };

        let context = SessionContext {
            session,
            guard: Arc::new(SessionGuard::default()),
            clock: self.clock.clone(),
            surface: self.surface.clone(),
            min_resume_secs: self.resume.min_resume_secs,
            on_ready,
            on_fatal,
        };
        let token = self.shutdown.child_token();

        let client = match path {
            PlaybackPath::Library => {
                let mut client = self.factory.create(&self.config);
                let events = client.take_events();
                client.load_source(&context.session.source_url);
                client.attach_media(self.surface.clone());

                match events {
                    Some(events) => {
                        self.runtime.spawn(forward_events(events, context.clone(), token.clone()));
                    }
                    None => warn!("Streaming client exposed no event channel"),
                }
                Some(client)
            }
            PlaybackPath::NativeHls | PlaybackPath::Direct => {
                self.surface.set_source(Some(&context.session.source_url));
                None
            }
        };

        info!(
            session_id = %context.session.id,
            path = ?path,
            resume = ?context.session.resume_offset_seconds,
            "Stream attached"
        );

        self.active = Some(ActiveStream {
            context,
            path,
            client,
            token,
        });

        Ok(AttachOutcome::Attached(path))
    }

    /// Metadata arrived on the surface.
    ///
    /// Native and direct sessions resume and start here; library sessions
    /// normally resumed on manifest parse already and the guard makes this a
    /// no-op for them.
    pub fn on_metadata_loaded(&self) {
        let Some(active) = &self.active else {
            return;
        };
        active.context.restore(None);
        if active.path != PlaybackPath::Library {
            active.context.ready();
        }
    }

    /// Destroy the active session's client and stop its event task
    pub fn detach(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.token.cancel();
            if let Some(client) = active.client.as_mut() {
                client.destroy();
            }
            info!(session_id = %active.context.session.id, "Stream detached");
        }
    }
}

impl Drop for StreamAttacher {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn forward_events(
    mut events: mpsc::UnboundedReceiver<StreamEvent>,
    context: SessionContext,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            event = events.recv() => event,
        };

        match event {
            Some(StreamEvent::ManifestParsed { levels, duration }) => {
                info!(levels, ?duration, "Manifest parsed");
                context.restore(duration);
                context.ready();
            }
            Some(StreamEvent::Error { fatal: true, details }) => {
                context.fail(Error::fatal(details));
                return;
            }
            Some(StreamEvent::Error { fatal: false, details }) => {
                debug!(%details, "Non-fatal stream error, client will retry");
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_resume_offset() {
        assert_eq!(normalize_resume_offset(None, Some(100.0), 1.0), None);
        assert_eq!(normalize_resume_offset(Some(f64::NAN), Some(100.0), 1.0), None);
        assert_eq!(normalize_resume_offset(Some(-30.0), Some(100.0), 1.0), None);
        assert_eq!(normalize_resume_offset(Some(0.8), Some(100.0), 1.0), None);
        assert_eq!(normalize_resume_offset(Some(1.0), Some(100.0), 1.0), None);
        assert_eq!(normalize_resume_offset(Some(42.0), Some(100.0), 1.0), Some(42.0));
        assert_eq!(normalize_resume_offset(Some(420.0), Some(100.0), 1.0), Some(100.0));
        assert_eq!(normalize_resume_offset(Some(420.0), None, 1.0), Some(420.0));
        assert_eq!(normalize_resume_offset(Some(420.0), Some(f64::NAN), 1.0), Some(420.0));
    }
}
