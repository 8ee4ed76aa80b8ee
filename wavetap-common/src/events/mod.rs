//! Event types for the wavetap event system
//!
//! Provides the canonical session event definitions and the EventBus that
//! carries them to every subscriber (SSE clients, tests, embedding hosts).

mod playback_types;

pub use playback_types::{CanonicalState, TrackMetadata};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tokio::sync::broadcast;

/// Value carried by `completed` events
pub const COMPLETED_SENTINEL: u8 = 1;

/// Payload of a session event
///
/// Serialized as the `event`/`value` pair of the wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Canonical state changed (`state`, value 0..=5)
    State(CanonicalState),
    /// Duration resolved or reset (`duration`, seconds)
    Duration(f64),
    /// One extracted sample batch (`samples`, push delivery only)
    Samples(Vec<f32>),
    /// Engine playback error (`error`, message)
    Error(String),
    /// Playback reached the end of the source (`completed`, value 1)
    Completed,
    /// Container metadata reported by the engine (`metadata`)
    Metadata(TrackMetadata),
}

impl EventPayload {
    /// Wire name of this payload kind
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::State(_) => "state",
            EventPayload::Duration(_) => "duration",
            EventPayload::Samples(_) => "samples",
            EventPayload::Error(_) => "error",
            EventPayload::Completed => "completed",
            EventPayload::Metadata(_) => "metadata",
        }
    }
}

/// Event published for one playback session
///
/// Wire format: `{ "id": <session id>, "event": <kind>, "value": <payload> }`
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    /// Owning session id
    pub id: String,
    /// Event payload
    pub payload: EventPayload,
}

impl SessionEvent {
    pub fn new(id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Wire name of the payload kind
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

impl Serialize for SessionEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("event", self.kind())?;
        match &self.payload {
            EventPayload::State(state) => map.serialize_entry("value", state)?,
            EventPayload::Duration(seconds) => map.serialize_entry("value", seconds)?,
            EventPayload::Samples(samples) => map.serialize_entry("value", samples)?,
            EventPayload::Error(message) => map.serialize_entry("value", message)?,
            EventPayload::Completed => map.serialize_entry("value", &COMPLETED_SENTINEL)?,
            EventPayload::Metadata(metadata) => map.serialize_entry("value", metadata)?,
        }
        map.end()
    }
}

/// Central event distribution bus
///
/// A single logical channel multiplexed by session id. Per-session ordering
/// is preserved because each session publishes from exactly one pump task.
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events buffered per subscriber before the
    ///   slowest subscriber starts lagging
    ///
    /// # Examples
    ///
    /// ```
    /// use wavetap_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(1024);
    /// assert_eq!(event_bus.capacity(), 1024);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// # Examples
    ///
    /// ```
    /// use wavetap_common::events::{EventBus, EventPayload, SessionEvent};
    ///
    /// let event_bus = EventBus::new(16);
    /// event_bus.emit_lossy(SessionEvent::new("p1", EventPayload::Duration(5.0)));
    /// ```
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
