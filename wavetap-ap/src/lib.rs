//! # wavetap Audio Tap Library (wavetap-ap)
//!
//! Drives one playback engine per session, taps every decoded PCM buffer
//! before it reaches the output device, extracts the first channel, and
//! publishes canonical playback state, duration, errors and sample batches as
//! session events.
//!
//! **Architecture:** engine callbacks → buffer tap → sample deliverer /
//! state reconciler → per-session event pump → `EventBus` → SSE clients.

pub mod api;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod playback;

pub use error::{Error, Result};
