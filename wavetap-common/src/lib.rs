//! # wavetap Common Library
//!
//! Shared code for wavetap services including:
//! - Canonical playback event types (`SessionEvent`, `CanonicalState`)
//! - The broadcast `EventBus`
//! - SSE streaming helpers
//! - Configuration file resolution

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
pub use events::{CanonicalState, EventBus, EventPayload, SessionEvent, TrackMetadata};
