//! Internal session signals (not exposed via SSE)
//!
//! Everything a session learns from its engine, plus the source-bound marker
//! from its controller, travels as a `SessionSignal` over one unbounded
//! channel into the session's event pump. The pump is the only place that
//! mutates reconciler state, so signals are applied in the order they were
//! sent. The pump converts them into `wavetap_common::SessionEvent`s before
//! publishing.

use crate::audio::SampleBatch;
use crate::engine::RawPlaybackState;
use wavetap_common::TrackMetadata;

/// Input to a session's event pump
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    /// A new source was bound: reset and re-arm the state machine
    SourceBound,

    /// Raw playback state reported by the engine
    RawState(RawPlaybackState),

    /// Engine is-playing flag changed
    IsPlaying(bool),

    /// Duration resolved or reset (`None` = unknown)
    Timeline(Option<u64>),

    /// Engine playback error
    Error(String),

    /// Extracted batch to publish (push delivery)
    Samples(SampleBatch),

    /// Container metadata reported after binding
    Metadata(TrackMetadata),
}
