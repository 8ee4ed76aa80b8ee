//! Playback engine boundary
//!
//! A playback session drives exactly one engine through [`PlaybackEngine`]
//! and receives everything the engine reports through [`EngineListener`].
//! Engines are built per session by an [`EngineFactory`], so the service can
//! run against the local reference engine in production and a scripted fake
//! in tests.
//!
//! Listener callbacks may arrive on any thread. Format and buffer callbacks
//! arrive on the engine's audio-pipeline thread and must return quickly.

pub mod local;
pub mod metadata;

use crate::audio::Encoding;
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;
use wavetap_common::TrackMetadata;

pub use local::{LocalEngine, LocalEngineFactory};
pub use metadata::SymphoniaMetadataReader;

/// Playback state as reported by the engine, before fusion with the
/// is-playing flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawPlaybackState {
    /// No source, or stopped
    Idle,
    /// Source bound, not enough data to start
    Buffering,
    /// Data available; playing or paused depends on the is-playing flag
    Ready,
    /// Source played to its end
    Ended,
}

/// Notifications from an engine to its owning session
pub trait EngineListener: Send + Sync {
    /// Format of the buffers that follow. Called before the first buffer of
    /// each playback segment.
    fn on_format_changed(&self, sample_rate: u32, channel_count: u16, encoding: Encoding);

    /// One interleaved 16-bit buffer, observed before it reaches the sink
    fn on_buffer(&self, interleaved: &[i16]);

    fn on_playback_state(&self, state: RawPlaybackState);

    fn on_is_playing_changed(&self, is_playing: bool);

    /// Duration resolved or reset (`None` = unknown)
    fn on_timeline_changed(&self, duration_ms: Option<u64>);

    /// Container metadata for the bound source
    fn on_metadata(&self, metadata: TrackMetadata);

    fn on_error(&self, message: String);
}

/// Transport controls of one engine instance
///
/// Every call is synchronous; results of a command (state changes, errors)
/// arrive through the listener. `set_source`, `stop` and `release` may wait
/// for an audio-pipeline thread to wind down, so async callers run them on
/// the blocking pool.
pub trait PlaybackEngine: Send {
    /// Bind a new source. Any previous source is discarded.
    fn set_source(&mut self, path: &str) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Stop playback and discard buffered audio; the engine reports idle
    fn stop(&mut self) -> Result<()>;

    /// Absolute seek in milliseconds
    fn seek_to(&mut self, position_ms: u64) -> Result<()>;

    /// Linear output gain (1.0 = unity)
    fn set_volume(&mut self, volume: f32) -> Result<()>;

    /// Playback rate multiplier (1.0 = normal speed)
    fn set_rate(&mut self, rate: f32) -> Result<()>;

    /// Current position, `None` while unset
    fn position_ms(&self) -> Option<u64>;

    /// Source duration, `None` while unresolved
    fn duration_ms(&self) -> Option<u64>;

    /// Stop and free every resource held by the engine. Called exactly once.
    fn release(&mut self);
}

/// Builds one engine per session
pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        session_id: &str,
        listener: Arc<dyn EngineListener>,
    ) -> Result<Box<dyn PlaybackEngine>>;
}

/// Reads container metadata without a session
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<TrackMetadata>;
}
