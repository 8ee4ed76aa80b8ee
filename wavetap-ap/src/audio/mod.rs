//! Audio processing components
//!
//! - `types`: PCM format description and sample batches
//! - `tap`: first-channel extraction on the audio-pipeline thread
//! - `output`: output sinks for the local engine (cpal in production)

pub mod output;
pub mod tap;
pub mod types;

pub use tap::{extract_first_channel, BufferTap};
pub use types::{AudioFormat, Encoding, SampleBatch, SampleScale};
