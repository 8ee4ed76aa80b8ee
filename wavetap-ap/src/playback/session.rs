//! Playback sessions
//!
//! A session ties together one engine, its buffer tap, its sample deliverer,
//! its controller and an event pump:
//!
//! ```text
//!  engine threads ──▶ SessionListener ──▶ tap ──▶ deliverer ─┐
//!                          │                                 │ (push)
//!                          └────────── SessionSignal ◀───────┘
//!                                          │ unbounded mpsc
//!                                          ▼
//!                                   pump task: StateReconciler ──▶ EventBus
//! ```
//!
//! The pump task is the only consumer of the channel, so events for one
//! session are published in the order the engine reported them.

use crate::audio::{BufferTap, Encoding, SampleBatch, SampleScale};
use crate::engine::{EngineFactory, EngineListener, RawPlaybackState};
use crate::error::Result;
use crate::playback::controller::PlaybackController;
use crate::playback::deliverer::{DeliveryMode, SampleDeliverer};
use crate::playback::events::SessionSignal;
use crate::playback::reconciler::{ReconcilerInput, StateReconciler};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use wavetap_common::{CanonicalState, EventBus, EventPayload, SessionEvent, TrackMetadata};

/// Per-session behaviour taken from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSettings {
    pub delivery_mode: DeliveryMode,
    pub autoplay_on_set_source: bool,
    pub sample_scale: SampleScale,
}

/// Engine listener for one session
///
/// Format and buffer callbacks are handled in place on the calling thread;
/// everything else is forwarded to the pump.
struct SessionListener {
    session_id: String,
    tap: Arc<BufferTap>,
    deliverer: Arc<SampleDeliverer>,
    signals: UnboundedSender<SessionSignal>,
    closed: Arc<AtomicBool>,
}

impl SessionListener {
    fn forward(&self, signal: SessionSignal) {
        if self.closed.load(Ordering::Acquire) {
            trace!("Session {} closed, dropping {:?}", self.session_id, signal);
            return;
        }
        let _ = self.signals.send(signal);
    }
}

impl EngineListener for SessionListener {
    fn on_format_changed(&self, sample_rate: u32, channel_count: u16, encoding: Encoding) {
        if let Err(e) = self.tap.on_format_changed(sample_rate, channel_count, encoding) {
            self.forward(SessionSignal::Error(e.to_string()));
        }
    }

    fn on_buffer(&self, interleaved: &[i16]) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Some(batch) = self.tap.on_buffer(interleaved) {
            self.deliverer.deliver(batch);
        }
    }

    fn on_playback_state(&self, state: RawPlaybackState) {
        self.forward(SessionSignal::RawState(state));
    }

    fn on_is_playing_changed(&self, is_playing: bool) {
        self.forward(SessionSignal::IsPlaying(is_playing));
    }

    fn on_timeline_changed(&self, duration_ms: Option<u64>) {
        self.forward(SessionSignal::Timeline(duration_ms));
    }

    fn on_metadata(&self, metadata: TrackMetadata) {
        self.forward(SessionSignal::Metadata(metadata));
    }

    fn on_error(&self, message: String) {
        warn!("Session {}: engine error: {}", self.session_id, message);
        self.forward(SessionSignal::Error(message));
    }
}

/// One playback session
pub struct Session {
    id: String,
    controller: PlaybackController,
    tap: Arc<BufferTap>,
    deliverer: Arc<SampleDeliverer>,
    state: Arc<AtomicU8>,
    closed: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session and start its event pump
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Whatever the factory returns when it cannot build an engine.
    pub fn open(
        id: &str,
        factory: &dyn EngineFactory,
        bus: Arc<EventBus>,
        settings: SessionSettings,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let tap = Arc::new(BufferTap::new(settings.sample_scale));
        let deliverer = Arc::new(SampleDeliverer::new(settings.delivery_mode, tx.clone()));
        let closed = Arc::new(AtomicBool::new(false));

        let listener = Arc::new(SessionListener {
            session_id: id.to_string(),
            tap: Arc::clone(&tap),
            deliverer: Arc::clone(&deliverer),
            signals: tx.clone(),
            closed: Arc::clone(&closed),
        });
        let engine = factory.create(id, listener)?;
        let controller = PlaybackController::new(id, engine, tx, settings.autoplay_on_set_source);

        let state = Arc::new(AtomicU8::new(CanonicalState::Idle.code()));
        let pump = tokio::spawn(run_pump(id.to_string(), rx, bus, Arc::clone(&state)));

        info!(
            "Session {} created ({} delivery, autoplay {})",
            id, settings.delivery_mode, settings.autoplay_on_set_source
        );

        Ok(Self {
            id: id.to_string(),
            controller,
            tap,
            deliverer,
            state,
            closed,
            pump: Mutex::new(Some(pump)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn tap(&self) -> &BufferTap {
        &self.tap
    }

    /// Canonical state as last published by the pump
    pub fn state(&self) -> CanonicalState {
        CanonicalState::from_code(self.state.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.deliverer.mode()
    }

    /// Latest extracted batch (pull mode)
    pub fn samples(&self) -> Arc<SampleBatch> {
        self.deliverer.snapshot()
    }

    /// Shut the session down. A second call does nothing.
    ///
    /// Signals still in flight are discarded.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.controller.shutdown();

        let pump = match self.pump.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(pump) = pump {
            pump.abort();
        }
        info!("Session {} closed", self.id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drain one session's signals through the reconciler onto the bus
async fn run_pump(
    session_id: String,
    mut rx: UnboundedReceiver<SessionSignal>,
    bus: Arc<EventBus>,
    state: Arc<AtomicU8>,
) {
    let mut reconciler = StateReconciler::new();

    while let Some(signal) = rx.recv().await {
        let payloads = match signal {
            SessionSignal::Samples(batch) => vec![EventPayload::Samples(batch)],
            SessionSignal::Metadata(metadata) => vec![EventPayload::Metadata(metadata)],
            SessionSignal::SourceBound => reconciler.apply(ReconcilerInput::SourceBound),
            SessionSignal::RawState(raw) => reconciler.apply(ReconcilerInput::RawState(raw)),
            SessionSignal::IsPlaying(p) => reconciler.apply(ReconcilerInput::IsPlaying(p)),
            SessionSignal::Timeline(d) => reconciler.apply(ReconcilerInput::Timeline(d)),
            SessionSignal::Error(message) => reconciler.apply(ReconcilerInput::Error(message)),
        };

        state.store(reconciler.state().code(), Ordering::Release);

        for payload in payloads {
            if let EventPayload::State(s) = &payload {
                debug!("Session {}: state -> {}", session_id, s);
            }
            bus.emit_lossy(SessionEvent::new(session_id.as_str(), payload));
        }
    }

    debug!("Session {}: event pump finished", session_id);
}
