//! Session registry
//!
//! Maps session ids to live sessions. Insert on `init`, remove on `close`;
//! the map is the only state shared between sessions.
//!
//! Closing a session joins its engine's pipeline thread, so closes run on the
//! blocking pool rather than an async worker.

use crate::engine::EngineFactory;
use crate::error::{Error, Result};
use crate::playback::session::{Session, SessionSettings};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use wavetap_common::EventBus;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    factory: Arc<dyn EngineFactory>,
    bus: Arc<EventBus>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn EngineFactory>, bus: Arc<EventBus>, settings: SessionSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            bus,
            settings,
        }
    }

    /// Create a session under `id`
    ///
    /// An existing session with the same id is closed and replaced.
    pub async fn init(&self, id: &str) -> Result<Arc<Session>> {
        if id.is_empty() {
            return Err(Error::MissingId);
        }

        let session = Arc::new(Session::open(
            id,
            self.factory.as_ref(),
            Arc::clone(&self.bus),
            self.settings,
        )?);

        let previous = self
            .sessions
            .write()
            .await
            .insert(id.to_string(), Arc::clone(&session));

        if let Some(previous) = previous {
            info!("Session {} re-initialised, closing previous instance", id);
            close_off_runtime(previous).await;
        }

        Ok(session)
    }

    /// Look up a live session
    pub async fn get(&self, id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownSession(id.to_string()))
    }

    /// Remove and close a session. Returns false if no session had this id.
    pub async fn close(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                close_off_runtime(session).await;
                true
            }
            None => {
                debug!("close() for unknown session {}", id);
                false
            }
        }
    }

    /// Close every session (service shutdown)
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Session>> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();

        let count = drained.len();
        futures::future::join_all(drained.into_iter().map(close_off_runtime)).await;
        info!("Closed {} sessions", count);
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }
}

/// Close a session on the blocking pool
async fn close_off_runtime(session: Arc<Session>) {
    let id = session.id().to_string();
    if let Err(e) = tokio::task::spawn_blocking(move || session.close()).await {
        error!("Closing session {} failed: {}", id, e);
    }
}
