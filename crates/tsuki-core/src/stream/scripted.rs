//! Scripted adaptive client
//!
//! Replays a fixed list of [`StreamEvent`]s per source URL and records every
//! lifecycle call. Used by tests and the CLI simulator, where no network is
//! available.

use super::{AdaptiveClient, AdaptiveClientFactory, StreamEvent};
use crate::{config::StreamConfig, surface::MediaSurface};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A lifecycle call made on a scripted client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLifecycle {
    Created { id: u64 },
    Loaded { id: u64, url: String },
    Attached { id: u64 },
    Destroyed { id: u64 },
}

#[derive(Default)]
struct Shared {
    scripts: Mutex<HashMap<String, Vec<StreamEvent>>>,
    log: Mutex<Vec<ClientLifecycle>>,
}

/// Factory for scripted clients
pub struct ScriptedClientFactory {
    supported: bool,
    next_id: AtomicU64,
    shared: Arc<Shared>,
}

impl ScriptedClientFactory {
    /// A supported factory whose clients report a parsed manifest by default
    pub fn new() -> Self {
        Self {
            supported: true,
            next_id: AtomicU64::new(1),
            shared: Arc::new(Shared::default()),
        }
    }

    /// A factory reporting that the environment cannot run the client
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Events replayed when `url` is loaded
    pub fn script(&self, url: impl Into<String>, events: Vec<StreamEvent>) {
        self.shared.scripts.lock().insert(url.into(), events);
    }

    /// Every lifecycle call so far, in order
    pub fn log(&self) -> Vec<ClientLifecycle> {
        self.shared.log.lock().clone()
    }

    pub fn created_count(&self) -> usize {
        self.log()
            .iter()
            .filter(|e| matches!(e, ClientLifecycle::Created { .. }))
            .count()
    }

    /// Clients created and not yet destroyed
    pub fn live_count(&self) -> usize {
        let log = self.log();
        let destroyed = log
            .iter()
            .filter(|e| matches!(e, ClientLifecycle::Destroyed { .. }))
            .count();
        self.created_count() - destroyed
    }
}

impl Default for ScriptedClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveClientFactory for ScriptedClientFactory {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create(&self, _config: &StreamConfig) -> Box<dyn AdaptiveClient> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared.log.lock().push(ClientLifecycle::Created { id });

        let (tx, rx) = mpsc::unbounded_channel();
        Box::new(ScriptedClient {
            id,
            shared: self.shared.clone(),
            source: None,
            events_tx: Some(tx),
            events_rx: Some(rx),
            destroyed: false,
        })
    }
}

struct ScriptedClient {
    id: u64,
    shared: Arc<Shared>,
    source: Option<String>,
    events_tx: Option<mpsc::UnboundedSender<StreamEvent>>,
    events_rx: Option<mpsc::UnboundedReceiver<StreamEvent>>,
    destroyed: bool,
}

impl AdaptiveClient for ScriptedClient {
    fn load_source(&mut self, url: &str) {
        self.shared.log.lock().push(ClientLifecycle::Loaded {
            id: self.id,
            url: url.to_string(),
        });
        self.source = Some(url.to_string());

        let script = self.shared.scripts.lock().get(url).cloned().unwrap_or_else(|| {
            vec![StreamEvent::ManifestParsed {
                levels: 1,
                duration: None,
            }]
        });
        if let Some(tx) = &self.events_tx {
            for event in script {
                let _ = tx.send(event);
            }
        }
    }

    fn attach_media(&mut self, surface: Arc<dyn MediaSurface>) {
        self.shared.log.lock().push(ClientLifecycle::Attached { id: self.id });
        if let Some(source) = &self.source {
            surface.set_source(Some(&format!("blob:{}", source)));
        }
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<StreamEvent>> {
        self.events_rx.take()
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.events_tx = None;
        self.shared.log.lock().push(ClientLifecycle::Destroyed { id: self.id });
    }
}

impl Drop for ScriptedClient {
    fn drop(&mut self) {
        self.destroy();
    }
}
