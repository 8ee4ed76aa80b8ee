//! Core audio data types
//!
//! Defines the PCM format description announced by the engine and the sample
//! batch produced by the buffer tap.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Channel count assumed until the engine announces a format
pub const DEFAULT_CHANNEL_COUNT: u16 = 2;

/// Sample rate assumed until the engine announces a format
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// One extracted single-channel batch, in temporal order
pub type SampleBatch = Vec<f32>;

/// Opaque PCM encoding tag passed through from the engine
///
/// The tap only interprets 16-bit interleaved PCM; the tag is stored so
/// callers can inspect what the engine announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Encoding(pub i32);

impl Encoding {
    /// Signed 16-bit little-endian PCM
    pub const PCM_16BIT: Encoding = Encoding(2);
}

/// Audio format announced by the engine's format-change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz (positive)
    pub sample_rate: u32,
    /// Interleaved channel count (positive)
    pub channel_count: u16,
    /// Engine encoding tag
    pub encoding: Encoding,
}

impl AudioFormat {
    /// Build a validated format
    ///
    /// # Errors
    /// `Error::InvalidFormat` when the sample rate or channel count is zero.
    pub fn new(sample_rate: u32, channel_count: u16, encoding: Encoding) -> Result<Self> {
        if channel_count == 0 {
            return Err(Error::InvalidFormat(format!(
                "channel count must be positive (got {})",
                channel_count
            )));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidFormat(format!(
                "sample rate must be positive (got {})",
                sample_rate
            )));
        }
        Ok(Self {
            sample_rate,
            channel_count,
            encoding,
        })
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channel_count: DEFAULT_CHANNEL_COUNT,
            encoding: Encoding::PCM_16BIT,
        }
    }
}

/// Numeric scale of delivered samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleScale {
    /// 16-bit integer values as-is (`-32768..=32767`)
    #[default]
    Raw,
    /// Values divided by 32768 (`-1.0..1.0`)
    Normalized,
}

impl SampleScale {
    #[inline]
    pub fn apply(self, sample: i16) -> f32 {
        match self {
            SampleScale::Raw => sample as f32,
            SampleScale::Normalized => sample as f32 / 32768.0,
        }
    }
}
