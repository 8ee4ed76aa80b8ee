//! Event bus subscriber for tests

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;
use wavetap_common::{CanonicalState, EventBus, EventPayload, SessionEvent};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct EventCollector {
    rx: broadcast::Receiver<SessionEvent>,
}

impl EventCollector {
    pub fn new(bus: &EventBus) -> Self {
        Self { rx: bus.subscribe() }
    }

    /// Next event, or None after the default timeout
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.next_within(DEFAULT_TIMEOUT).await
    }

    pub async fn next_within(&mut self, wait: Duration) -> Option<SessionEvent> {
        loop {
            match timeout(wait, self.rx.recv()).await {
                Ok(Ok(event)) => return Some(event),
                Ok(Err(RecvError::Lagged(_))) => continue,
                Ok(Err(RecvError::Closed)) | Err(_) => return None,
            }
        }
    }

    /// Collect events for `id` up to and including the first one matching
    /// `done`. Panics on timeout.
    pub async fn until(
        &mut self,
        id: &str,
        done: impl Fn(&EventPayload) -> bool,
    ) -> Vec<EventPayload> {
        let mut seen = Vec::new();
        loop {
            let event = self
                .next()
                .await
                .unwrap_or_else(|| panic!("timed out waiting for {}; saw {:?}", id, seen));
            if event.id != id {
                continue;
            }
            let finished = done(&event.payload);
            seen.push(event.payload);
            if finished {
                return seen;
            }
        }
    }

    /// Next `count` state codes published for `id`
    pub async fn states(&mut self, id: &str, count: usize) -> Vec<u8> {
        let mut codes = Vec::new();
        while codes.len() < count {
            let payloads = self
                .until(id, |p| matches!(p, EventPayload::State(_)))
                .await;
            if let Some(EventPayload::State(state)) = payloads.last() {
                codes.push(state.code());
            }
        }
        codes
    }

    /// Wait until `id` publishes `state`
    pub async fn wait_for_state(&mut self, id: &str, state: CanonicalState) {
        self.until(id, |p| *p == EventPayload::State(state)).await;
    }

    /// Everything published until the bus stays quiet for `quiet`
    pub async fn drain(&mut self, quiet: Duration) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_within(quiet).await {
            events.push(event);
        }
        events
    }
}
