//! Buffer tap: first-channel extraction from interleaved PCM
//!
//! The tap sits on the engine's audio-pipeline thread, between the decoder
//! and the output sink. It observes each 16-bit interleaved buffer, pulls out
//! the samples of channel 0 and hands back a fresh batch. It never blocks,
//! never performs I/O, and never modifies the buffer it observes.
//!
//! The current format is packed into a single atomic word, so format changes
//! and buffer callbacks need no lock and a reader never sees fields from two
//! different announcements.

use crate::audio::types::{AudioFormat, Encoding, SampleBatch, SampleScale};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{error, trace};

/// Packed word of a disabled tap (channel count 0)
const DISABLED: u64 = 0;

/// `sample_rate << 32 | channel_count << 16 | encoding as i16`
fn pack_format(format: &AudioFormat) -> Result<u64> {
    let encoding = i16::try_from(format.encoding.0).map_err(|_| {
        Error::InvalidFormat(format!("encoding {} out of range", format.encoding.0))
    })?;
    Ok((u64::from(format.sample_rate) << 32)
        | (u64::from(format.channel_count) << 16)
        | u64::from(encoding as u16))
}

fn unpack_format(packed: u64) -> AudioFormat {
    AudioFormat {
        sample_rate: (packed >> 32) as u32,
        channel_count: (packed >> 16) as u16,
        encoding: Encoding(i32::from(packed as u16 as i16)),
    }
}

/// Extract the samples of channel 0 from an interleaved buffer
///
/// Produces `floor(len / channel_count)` samples in temporal order; a
/// trailing partial frame is dropped. Allocates exactly one output vector.
///
/// # Examples
///
/// ```
/// use wavetap_ap::audio::tap::extract_first_channel;
/// use wavetap_ap::audio::SampleScale;
///
/// let left = extract_first_channel(&[10, 20, 30, 40], 2, SampleScale::Raw);
/// assert_eq!(left, vec![10.0, 30.0]);
/// ```
pub fn extract_first_channel(
    interleaved: &[i16],
    channel_count: usize,
    scale: SampleScale,
) -> SampleBatch {
    debug_assert!(channel_count > 0);
    interleaved
        .chunks_exact(channel_count)
        .map(|frame| scale.apply(frame[0]))
        .collect()
}

/// Per-session buffer tap
pub struct BufferTap {
    /// Packed current format. Channel count zero after a rejected
    /// announcement: buffers are ignored until a valid format arrives
    format: AtomicU64,
    /// Set once the engine has announced any format
    announced: AtomicBool,
    scale: SampleScale,
}

impl BufferTap {
    /// Create a tap using the documented fallback format (2 channels)
    pub fn new(scale: SampleScale) -> Self {
        Self {
            format: AtomicU64::new(pack_format(&AudioFormat::default()).unwrap_or(DISABLED)),
            announced: AtomicBool::new(false),
            scale,
        }
    }

    /// Store the format announced by the engine
    ///
    /// Applies to every buffer processed after this call and only those.
    ///
    /// # Errors
    /// A non-positive channel count or sample rate, or an encoding code that
    /// does not fit in 16 bits, is a configuration error: it is returned to
    /// the caller and the tap stops producing batches until a valid format is
    /// announced.
    pub fn on_format_changed(
        &self,
        sample_rate: u32,
        channel_count: u16,
        encoding: Encoding,
    ) -> Result<AudioFormat> {
        self.announced.store(true, Ordering::Release);

        let packed = AudioFormat::new(sample_rate, channel_count, encoding)
            .and_then(|format| pack_format(&format).map(|packed| (format, packed)));
        match packed {
            Ok((format, packed)) => {
                self.format.store(packed, Ordering::Release);
                trace!(
                    "Tap format: {} Hz, {} channels, encoding {}",
                    format.sample_rate,
                    format.channel_count,
                    format.encoding.0
                );
                Ok(format)
            }
            Err(e) => {
                self.format.store(DISABLED, Ordering::Release);
                error!("Rejected audio format, tap disabled: {}", e);
                Err(e)
            }
        }
    }

    /// Extract channel 0 from one interleaved buffer
    ///
    /// Returns `None` while the tap is disabled by a rejected format.
    pub fn on_buffer(&self, interleaved: &[i16]) -> Option<SampleBatch> {
        let channels = unpack_format(self.format.load(Ordering::Acquire)).channel_count as usize;
        if channels == 0 {
            trace!("Tap disabled, dropping {} samples", interleaved.len());
            return None;
        }
        Some(extract_first_channel(interleaved, channels, self.scale))
    }

    /// Current format, or `None` while disabled
    ///
    /// Before any announcement this is the 2-channel fallback.
    pub fn format(&self) -> Option<AudioFormat> {
        let format = unpack_format(self.format.load(Ordering::Acquire));
        (format.channel_count > 0).then_some(format)
    }

    /// Whether the engine has announced a format yet
    pub fn format_announced(&self) -> bool {
        self.announced.load(Ordering::Acquire)
    }

    pub fn scale(&self) -> SampleScale {
        self.scale
    }
}

impl Default for BufferTap {
    fn default() -> Self {
        Self::new(SampleScale::default())
    }
}
