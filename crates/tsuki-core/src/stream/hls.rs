//! HLS client
//!
//! Fetches the manifest with the configured request headers and parses it
//! with `m3u8-rs`. Segment fetching and decoding is left to the surface the
//! client is attached to; the client's job is to validate the stream and
//! report a parsed manifest (or a fatal error) before playback begins.

use super::{AdaptiveClient, AdaptiveClientFactory, StreamEvent};
use crate::{config::StreamConfig, surface::MediaSurface, Error, Result};
use m3u8_rs::Playlist;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Master (multivariant) or media playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistKind {
    Master,
    Media,
}

/// One quality level of a master playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub bandwidth: u64,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub codecs: Option<String>,
    pub uri: String,
}

/// What a manifest probe found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub url: String,
    pub kind: PlaylistKind,
    pub levels: Vec<LevelInfo>,
    /// Total duration for VOD playlists
    pub duration: Option<f64>,
    pub is_live: bool,
    pub target_duration: Option<f64>,
    /// Configured buffer limits for this playlist's segment length
    pub buffer: Option<BufferWindow>,
}

/// Buffer limits from [`StreamConfig`] expressed in whole segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferWindow {
    /// Segments to keep buffered ahead of the playhead
    pub ahead: u32,
    /// Never buffer more than this many segments ahead
    pub ahead_cap: u32,
    /// Played segments retained behind the playhead
    pub behind: u32,
}

impl BufferWindow {
    pub fn new(config: &StreamConfig, target_duration: f64) -> Option<Self> {
        if !(target_duration.is_finite() && target_duration > 0.0) {
            return None;
        }
        let segments = |secs: f64| (secs.max(0.0) / target_duration).ceil() as u32;
        let ahead = segments(config.max_buffer_length_secs).max(1);
        Some(Self {
            ahead,
            ahead_cap: segments(config.max_max_buffer_length_secs).max(ahead),
            behind: segments(config.back_buffer_length_secs),
        })
    }
}

fn build_client(config: &StreamConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidConfig(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidConfig(format!("Invalid header value for '{}': {}", name, e)))?;
        headers.insert(name, value);
    }

    Client::builder()
        .timeout(config.request_timeout())
        .default_headers(headers)
        .build()
        .map_err(Error::from)
}

async fn fetch_playlist(client: &Client, url: &Url) -> Result<Vec<u8>> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| Error::ManifestFetch(format!("{}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::ManifestFetch(format!("{}: HTTP {}", url, status)));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| Error::ManifestFetch(format!("{}: {}", url, e)))?;
    Ok(body.to_vec())
}

fn parse_playlist(body: &[u8]) -> Result<Playlist> {
    m3u8_rs::parse_playlist_res(body).map_err(|e| Error::ManifestParse(format!("{:?}", e)))
}

fn media_duration(media: &m3u8_rs::MediaPlaylist) -> Option<f64> {
    media
        .end_list
        .then(|| media.segments.iter().map(|s| s.duration as f64).sum())
}

/// Fetch and parse a manifest.
///
/// For a master playlist the lowest-bandwidth variant is fetched as well to
/// learn the duration; failures there are logged and leave the duration
/// unknown.
#[instrument(skip(config))]
pub async fn probe_manifest(url: &str, config: &StreamConfig) -> Result<ManifestSummary> {
    let parsed_url = Url::parse(url).map_err(|e| Error::InvalidSource {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let client = build_client(config)?;

    let body = fetch_playlist(&client, &parsed_url).await?;
    match parse_playlist(&body)? {
        Playlist::MasterPlaylist(master) => {
            let mut levels: Vec<LevelInfo> = master
                .variants
                .iter()
                .filter(|v| !v.is_i_frame)
                .map(|v| LevelInfo {
                    bandwidth: v.bandwidth,
                    width: v.resolution.as_ref().map(|r| r.width),
                    height: v.resolution.as_ref().map(|r| r.height),
                    codecs: v.codecs.clone(),
                    uri: v.uri.clone(),
                })
                .collect();
            levels.sort_by_key(|l| l.bandwidth);

            if levels.is_empty() {
                return Err(Error::ManifestParse("master playlist has no variants".into()));
            }

            let mut summary = ManifestSummary {
                url: url.to_string(),
                kind: PlaylistKind::Master,
                levels,
                duration: None,
                is_live: false,
                target_duration: None,
                buffer: None,
            };

            let variant_url = parsed_url.join(&summary.levels[0].uri);
            match variant_url {
                Ok(variant_url) => match fetch_playlist(&client, &variant_url).await.and_then(|b| parse_playlist(&b)) {
                    Ok(Playlist::MediaPlaylist(media)) => {
                        summary.duration = media_duration(&media);
                        summary.is_live = !media.end_list;
                        summary.target_duration = Some(media.target_duration as f64);
                        summary.buffer = BufferWindow::new(config, media.target_duration as f64);
                    }
                    Ok(Playlist::MasterPlaylist(_)) => warn!(url = %variant_url, "Variant is itself a master playlist"),
                    Err(e) => warn!(url = %variant_url, error = %e, "Could not read variant playlist"),
                },
                Err(e) => warn!(error = %e, "Invalid variant URI"),
            }

            Ok(summary)
        }
        Playlist::MediaPlaylist(media) => Ok(ManifestSummary {
            url: url.to_string(),
            kind: PlaylistKind::Media,
            levels: Vec::new(),
            duration: media_duration(&media),
            is_live: !media.end_list,
            target_duration: Some(media.target_duration as f64),
            buffer: BufferWindow::new(config, media.target_duration as f64),
        }),
    }
}

/// Factory for [`HlsClient`]s
#[derive(Debug, Default, Clone)]
pub struct HlsClientFactory;

impl HlsClientFactory {
    pub fn new() -> Self {
        Self
    }
}

impl AdaptiveClientFactory for HlsClientFactory {
    fn is_supported(&self) -> bool {
        tokio::runtime::Handle::try_current().is_ok()
    }

    fn create(&self, config: &StreamConfig) -> Box<dyn AdaptiveClient> {
        Box::new(HlsClient::new(config.clone()))
    }
}

/// Manifest-level HLS client
pub struct HlsClient {
    config: StreamConfig,
    source: Option<String>,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<StreamEvent>>,
    buffer: Arc<Mutex<Option<BufferWindow>>>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HlsClient {
    pub fn new(config: StreamConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            source: None,
            events_tx,
            events_rx: Some(events_rx),
            buffer: Arc::new(Mutex::new(None)),
            token: CancellationToken::new(),
            task: None,
        }
    }

    /// Buffer window derived once the manifest has loaded
    pub fn buffer_window(&self) -> Option<BufferWindow> {
        *self.buffer.lock()
    }
}

impl AdaptiveClient for HlsClient {
    fn load_source(&mut self, url: &str) {
        self.source = Some(url.to_string());

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let _ = self.events_tx.send(StreamEvent::Error {
                fatal: true,
                details: "no async runtime available to load the manifest".into(),
            });
            return;
        };

        let url = url.to_string();
        let config = self.config.clone();
        let tx = self.events_tx.clone();
        let token = self.token.clone();
        let buffer = self.buffer.clone();

        self.task = Some(runtime.spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = probe_manifest(&url, &config) => result,
            };

            let event = match result {
                Ok(summary) => {
                    info!(url = %url, levels = summary.levels.len(), "HLS manifest loaded");
                    if let Some(window) = summary.buffer {
                        debug!(ahead = window.ahead, cap = window.ahead_cap, behind = window.behind, "Buffer window");
                    }
                    *buffer.lock() = summary.buffer;
                    StreamEvent::ManifestParsed {
                        levels: summary.levels.len().max(1),
                        duration: summary.duration,
                    }
                }
                Err(e) => StreamEvent::Error {
                    fatal: e.is_fatal(),
                    details: e.to_string(),
                },
            };
            let _ = tx.send(event);
        }));
    }

    fn attach_media(&mut self, surface: Arc<dyn MediaSurface>) {
        if let Some(source) = &self.source {
            debug!(url = %source, "Attaching HLS source to surface");
            surface.set_source(Some(source));
        }
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<StreamEvent>> {
        self.events_rx.take()
    }

    fn destroy(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for HlsClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720,CODECS=\"avc1.64001f,mp4a.40.2\"
720p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
360p.m3u8
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXTINF:6.0,
seg0.ts
#EXTINF:6.0,
seg1.ts
#EXTINF:4.5,
seg2.ts
#EXT-X-ENDLIST
";

    #[test]
    fn test_parse_master() {
        match parse_playlist(MASTER.as_bytes()).unwrap() {
            Playlist::MasterPlaylist(master) => assert_eq!(master.variants.len(), 2),
            Playlist::MediaPlaylist(_) => panic!("expected master playlist"),
        }
    }

    #[test]
    fn test_media_duration() {
        match parse_playlist(MEDIA.as_bytes()).unwrap() {
            Playlist::MediaPlaylist(media) => assert_eq!(media_duration(&media), Some(16.5)),
            Playlist::MasterPlaylist(_) => panic!("expected media playlist"),
        }
    }

    #[test]
    fn test_buffer_window_in_segments() {
        let window = BufferWindow::new(&StreamConfig::default(), 6.0).unwrap();
        assert_eq!(
            window,
            BufferWindow {
                ahead: 10,
                ahead_cap: 100,
                behind: 15
            }
        );

        let config = StreamConfig {
            max_buffer_length_secs: 1.0,
            max_max_buffer_length_secs: 0.0,
            back_buffer_length_secs: 0.0,
            ..StreamConfig::default()
        };
        let window = BufferWindow::new(&config, 10.0).unwrap();
        assert_eq!((window.ahead, window.ahead_cap, window.behind), (1, 1, 0));
        assert_eq!(BufferWindow::new(&config, 0.0), None);
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let err = parse_playlist(b"<html>not a playlist</html>").unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.error_code(), "MANIFEST_PARSE");
    }

    #[test]
    fn test_invalid_header_rejected() {
        let config = StreamConfig::default().with_header("Bad Header", "x");
        assert!(matches!(build_client(&config), Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_probe_rejects_relative_url() {
        let err = probe_manifest("not a url", &StreamConfig::default()).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_SOURCE");
    }
}
