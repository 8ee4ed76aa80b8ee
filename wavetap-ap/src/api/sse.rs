//! Server-Sent Events endpoint
//!
//! Streams every session event to the connected client. The SSE event name
//! is the payload kind and the data is the `{id, event, value}` object.

use crate::api::server::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use tracing::debug;

/// GET /api/v1/events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(
        "New SSE client ({} already subscribed)",
        ctx.bus.subscriber_count()
    );
    wavetap_common::sse::create_event_sse_stream(ctx.bus.subscribe())
}
