//! Playback controller
//!
//! Translates session commands into engine calls. Owns the session's engine
//! handle until `shutdown`, after which every command fails with
//! `EngineReleased` and `shutdown` itself is a no-op.

use crate::engine::PlaybackEngine;
use crate::error::{Error, Result};
use crate::playback::events::SessionSignal;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Convert seconds to whole milliseconds, truncating
///
/// Negative input clamps to zero.
pub fn seconds_to_millis(seconds: f64) -> u64 {
    (seconds * 1000.0) as u64
}

/// Convert an engine millisecond value to seconds, unset mapping to 0.0
pub fn millis_to_seconds(millis: Option<u64>) -> f64 {
    millis.map(|ms| ms as f64 / 1000.0).unwrap_or(0.0)
}

pub struct PlaybackController {
    session_id: String,
    engine: Mutex<Option<Box<dyn PlaybackEngine>>>,
    signals: UnboundedSender<SessionSignal>,
    autoplay_on_set_source: bool,
}

impl PlaybackController {
    pub fn new(
        session_id: impl Into<String>,
        engine: Box<dyn PlaybackEngine>,
        signals: UnboundedSender<SessionSignal>,
        autoplay_on_set_source: bool,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            engine: Mutex::new(Some(engine)),
            signals,
            autoplay_on_set_source,
        }
    }

    /// Run `f` against the engine, failing once it has been released
    fn with_engine<T>(&self, f: impl FnOnce(&mut dyn PlaybackEngine) -> Result<T>) -> Result<T> {
        let mut guard = self
            .engine
            .lock()
            .map_err(|_| Error::Internal(format!("Engine lock poisoned for {}", self.session_id)))?;
        match guard.as_mut() {
            Some(engine) => f(engine.as_mut()),
            None => Err(Error::EngineReleased(self.session_id.clone())),
        }
    }

    /// Bind a new source
    ///
    /// The previous source is stopped first so none of its callbacks can
    /// arrive after the state machine has been re-armed.
    pub fn set_source(&self, path: &str) -> Result<()> {
        info!("Session {}: binding source {}", self.session_id, path);
        self.with_engine(|engine| {
            engine.stop()?;
            if self.signals.send(SessionSignal::SourceBound).is_err() {
                warn!("Session {}: event pump gone during setSource", self.session_id);
            }
            engine.set_source(path)?;
            if self.autoplay_on_set_source {
                debug!("Session {}: autoplay on setSource", self.session_id);
                engine.play()?;
            }
            Ok(())
        })
    }

    pub fn play(&self) -> Result<()> {
        self.with_engine(|engine| engine.play())
    }

    pub fn pause(&self) -> Result<()> {
        self.with_engine(|engine| engine.pause())
    }

    pub fn stop(&self) -> Result<()> {
        self.with_engine(|engine| engine.stop())
    }

    /// Absolute seek; the position is truncated to whole milliseconds
    pub fn seek(&self, position_seconds: f64) -> Result<()> {
        let position_ms = seconds_to_millis(position_seconds);
        debug!("Session {}: seek to {} ms", self.session_id, position_ms);
        self.with_engine(|engine| engine.seek_to(position_ms))
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.with_engine(|engine| engine.set_volume(volume))
    }

    pub fn set_rate(&self, rate: f32) -> Result<()> {
        self.with_engine(|engine| engine.set_rate(rate))
    }

    /// Current position in seconds (0.0 while unset)
    pub fn position(&self) -> Result<f64> {
        self.with_engine(|engine| Ok(millis_to_seconds(engine.position_ms())))
    }

    /// Duration in seconds (0.0 while unresolved)
    pub fn duration(&self) -> Result<f64> {
        self.with_engine(|engine| Ok(millis_to_seconds(engine.duration_ms())))
    }

    /// Stop playback and release the engine. A second call does nothing.
    pub fn shutdown(&self) {
        let engine = match self.engine.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(mut engine) = engine {
            if let Err(e) = engine.stop() {
                debug!("Session {}: stop during shutdown failed: {}", self.session_id, e);
            }
            engine.release();
            info!("Session {}: engine released", self.session_id);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        match self.engine.lock() {
            Ok(guard) => guard.is_none(),
            Err(_) => true,
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
