//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE implementations for wavetap services.

use crate::events::SessionEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Heartbeat interval for every wavetap SSE stream
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Convert one session event into an SSE frame
///
/// The SSE event name is the payload kind (`state`, `samples`, ...) and the
/// data is the full `{id, event, value}` JSON object.
pub fn to_sse_event(event: &SessionEvent) -> Option<Event> {
    match Event::default().event(event.kind()).json_data(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Failed to serialize {} event for {}: {}", event.kind(), event.id, e);
            None
        }
    }
}

/// Create an SSE stream that forwards every event from a bus subscription
///
/// A lagging client loses the events it fell behind on; it is warned about
/// and the stream continues from the oldest retained event. The stream ends
/// when the bus is dropped.
///
/// # Example
/// ```rust,ignore
/// pub async fn event_stream(
///     State(ctx): State<AppContext>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     wavetap_common::sse::create_event_sse_stream(ctx.bus.subscribe())
/// }
/// ```
pub fn create_event_sse_stream(
    mut rx: broadcast::Receiver<SessionEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to session events");

    let stream = async_stream::stream! {
        // Send initial connected status
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    debug!("SSE: forwarding {} event for {}", event.kind(), event.id);
                    if let Some(frame) = to_sse_event(&event) {
                        yield Ok(frame);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("SSE client lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("SSE: event bus closed, ending stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
