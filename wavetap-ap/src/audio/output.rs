//! Audio output
//!
//! Plays interleaved 16-bit PCM pulled from a ring buffer. The stream is
//! opened at the source's native sample rate and channel count; nothing is
//! resampled. Volume and playback rate are applied inside the device
//! callback, so changes take effect on the next callback.
//!
//! The local engine opens its sink through [`SinkFactory`]. Production uses
//! [`CpalSinkFactory`]; anything else that drains the consumer through a
//! [`FrameRenderer`] behaves the same from the engine's side.

use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::{traits::*, HeapCons};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// State shared between the engine, its pipeline thread and the device
/// callback
pub struct OutputControls {
    /// Linear gain, 0.0..=1.0
    volume: Mutex<f32>,
    /// Source frames consumed per output frame
    rate: Mutex<f32>,
    /// When false the callback outputs silence and consumes nothing
    playing: AtomicBool,
    /// Set by the pipeline after a seek; the callback discards queued audio
    /// and clears it
    flush_requested: AtomicBool,
    /// Source frames consumed since the last position reset
    frames_consumed: AtomicU64,
    /// Set by the stream error callback
    error_flag: AtomicBool,
}

impl OutputControls {
    pub fn new() -> Self {
        Self {
            volume: Mutex::new(1.0),
            rate: Mutex::new(1.0),
            playing: AtomicBool::new(false),
            flush_requested: AtomicBool::new(false),
            frames_consumed: AtomicU64::new(0),
            error_flag: AtomicBool::new(false),
        }
    }

    /// Set output volume, clamped to [0.0, 1.0]
    pub fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        if let Ok(mut guard) = self.volume.lock() {
            *guard = clamped;
        }
        debug!("Volume set to {:.2}", clamped);
    }

    pub fn volume(&self) -> f32 {
        self.volume.lock().map(|v| *v).unwrap_or(1.0)
    }

    pub fn set_rate(&self, rate: f32) {
        if let Ok(mut guard) = self.rate.lock() {
            *guard = rate;
        }
        debug!("Playback rate set to {:.2}", rate);
    }

    pub fn rate(&self) -> f32 {
        self.rate.lock().map(|r| *r).unwrap_or(1.0)
    }

    /// Returns the previous value
    pub fn set_playing(&self, playing: bool) -> bool {
        self.playing.swap(playing, Ordering::AcqRel)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn request_flush(&self) {
        self.flush_requested.store(true, Ordering::Release);
    }

    /// True until the callback has discarded queued audio
    pub fn flush_pending(&self) -> bool {
        self.flush_requested.load(Ordering::Acquire)
    }

    pub fn frames_consumed(&self) -> u64 {
        self.frames_consumed.load(Ordering::Acquire)
    }

    pub fn reset_frames_consumed(&self) {
        self.frames_consumed.store(0, Ordering::Release);
    }

    /// Read and clear the stream error flag
    pub fn take_error(&self) -> bool {
        self.error_flag.swap(false, Ordering::AcqRel)
    }
}

impl Default for OutputControls {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulls frames from the ring buffer on behalf of the device callback
///
/// Playback rate is applied by stepping through source frames with a phase
/// accumulator: at rate 2.0 every other frame is skipped, at rate 0.5 every
/// frame is held for two output frames.
pub struct FrameRenderer {
    consumer: HeapCons<i16>,
    channels: usize,
    current: Vec<i16>,
    has_frame: bool,
    phase: f64,
    controls: Arc<OutputControls>,
}

impl FrameRenderer {
    pub fn new(consumer: HeapCons<i16>, channels: usize, controls: Arc<OutputControls>) -> Self {
        Self {
            consumer,
            channels,
            current: vec![0; channels],
            has_frame: false,
            phase: 0.0,
            controls,
        }
    }

    /// Fill one device buffer
    ///
    /// `convert` maps a source sample and the current volume to the device
    /// sample type. Paused output and underruns are filled with `silence`.
    pub fn render<T: Copy>(&mut self, data: &mut [T], silence: T, convert: impl Fn(i16, f32) -> T) {
        if self.controls.flush_pending() {
            self.consumer.clear();
            self.has_frame = false;
            self.phase = 0.0;
            self.controls.flush_requested.store(false, Ordering::Release);
        }

        let playing = self.controls.is_playing();
        let volume = self.controls.volume();
        let rate = f64::from(self.controls.rate());

        for frame in data.chunks_mut(self.channels) {
            if playing && self.advance(rate) {
                for (out, &sample) in frame.iter_mut().zip(self.current.iter()) {
                    *out = convert(sample, volume);
                }
            } else {
                frame.fill(silence);
            }
        }
    }

    /// Step the phase accumulator; false on underrun
    fn advance(&mut self, rate: f64) -> bool {
        self.phase += rate;
        while self.phase >= 1.0 {
            if self.consumer.occupied_len() < self.channels {
                self.phase = 0.0;
                return false;
            }
            self.consumer.pop_slice(&mut self.current);
            self.has_frame = true;
            self.phase -= 1.0;
            self.controls.frames_consumed.fetch_add(1, Ordering::Relaxed);
        }
        self.has_frame
    }
}

/// An open output for one bound source
///
/// Created and dropped on the pipeline thread, so it need not be `Send`.
pub trait OutputSink {
    /// Stop pulling audio and release the device
    fn stop(&mut self);
}

/// Opens the sink for each bound source
pub trait SinkFactory: Send + Sync {
    fn open(
        &self,
        sample_rate: u32,
        channels: u16,
        consumer: HeapCons<i16>,
        controls: Arc<OutputControls>,
    ) -> Result<Box<dyn OutputSink>>;
}

/// Default output device through cpal
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalSinkFactory;

impl SinkFactory for CpalSinkFactory {
    fn open(
        &self,
        sample_rate: u32,
        channels: u16,
        consumer: HeapCons<i16>,
        controls: Arc<OutputControls>,
    ) -> Result<Box<dyn OutputSink>> {
        let output = AudioOutput::open(sample_rate, channels, consumer, controls)?;
        Ok(Box::new(output))
    }
}

/// An open cpal output stream
///
/// `cpal::Stream` is not `Send`; an `AudioOutput` stays on the thread that
/// opened it.
pub struct AudioOutput {
    stream: Option<Stream>,
    sample_rate: u32,
    channels: u16,
}

impl AudioOutput {
    /// Open the default output device at the given format and start the stream
    ///
    /// # Errors
    /// `Error::AudioOutput` if no device is available, the device cannot be
    /// configured, or the stream fails to start.
    pub fn open(
        sample_rate: u32,
        channels: u16,
        consumer: HeapCons<i16>,
        controls: Arc<OutputControls>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using default audio device: {}", name);

        let sample_format = Self::pick_sample_format(&device, sample_rate, channels)?;
        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            sample_rate, channels, sample_format
        );

        let renderer = FrameRenderer::new(consumer, channels as usize, Arc::clone(&controls));
        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream_f32(&device, &config, renderer, controls)?,
            SampleFormat::I16 => Self::build_stream_i16(&device, &config, renderer, controls)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        info!("Audio stream started at {} Hz, {} channels", sample_rate, channels);
        Ok(Self {
            stream: Some(stream),
            sample_rate,
            channels,
        })
    }

    /// Prefer a device configuration that supports the source format exactly
    fn pick_sample_format(device: &Device, sample_rate: u32, channels: u16) -> Result<SampleFormat> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let matching = supported.find(|config| {
            config.channels() == channels
                && config.min_sample_rate().0 <= sample_rate
                && config.max_sample_rate().0 >= sample_rate
                && matches!(config.sample_format(), SampleFormat::F32 | SampleFormat::I16)
        });

        if let Some(config) = matching {
            return Ok(config.sample_format());
        }

        let fallback = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        Ok(fallback.sample_format())
    }

    fn build_stream_f32(
        device: &Device,
        config: &StreamConfig,
        mut renderer: FrameRenderer,
        controls: Arc<OutputControls>,
    ) -> Result<Stream> {
        device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.render(data, 0.0, |sample, volume| {
                        (sample as f32 / 32768.0 * volume).clamp(-1.0, 1.0)
                    });
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    controls.error_flag.store(true, Ordering::Release);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    fn build_stream_i16(
        device: &Device,
        config: &StreamConfig,
        mut renderer: FrameRenderer,
        controls: Arc<OutputControls>,
    ) -> Result<Stream> {
        device
            .build_output_stream(
                config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    renderer.render(data, 0, |sample, volume| {
                        (sample as f32 * volume).clamp(i16::MIN as f32, i16::MAX as f32) as i16
                    });
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    controls.error_flag.store(true, Ordering::Release);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Stop the stream and drop it
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("Failed to pause stream during stop: {}", e);
            }
            info!("Audio stream stopped");
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl OutputSink for AudioOutput {
    fn stop(&mut self) {
        AudioOutput::stop(self);
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::HeapRb;

    fn renderer_with(samples: &[i16], channels: usize) -> (FrameRenderer, Arc<OutputControls>) {
        let rb = HeapRb::<i16>::new(1024);
        let (mut prod, cons) = rb.split();
        prod.push_slice(samples);
        let controls = Arc::new(OutputControls::new());
        (FrameRenderer::new(cons, channels, Arc::clone(&controls)), controls)
    }

    #[test]
    fn test_paused_renders_silence_without_consuming() {
        let (mut renderer, controls) = renderer_with(&[100, 200, 300, 400], 2);
        let mut out = [1i16; 4];
        renderer.render(&mut out, 0, |s, _| s);

        assert_eq!(out, [0, 0, 0, 0]);
        assert_eq!(controls.frames_consumed(), 0);
    }

    #[test]
    fn test_unity_rate_copies_frames() {
        let (mut renderer, controls) = renderer_with(&[1, 2, 3, 4, 5, 6], 2);
        controls.set_playing(true);
        let mut out = [0i16; 6];
        renderer.render(&mut out, 0, |s, _| s);

        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
        assert_eq!(controls.frames_consumed(), 3);
    }

    #[test]
    fn test_double_rate_skips_frames() {
        let (mut renderer, controls) = renderer_with(&[1, 2, 3, 4, 5, 6, 7, 8], 1);
        controls.set_playing(true);
        controls.set_rate(2.0);
        let mut out = [0i16; 4];
        renderer.render(&mut out, 0, |s, _| s);

        assert_eq!(out, [2, 4, 6, 8]);
        assert_eq!(controls.frames_consumed(), 8);
    }

    #[test]
    fn test_half_rate_holds_frames() {
        let (mut renderer, controls) = renderer_with(&[1, 2], 1);
        controls.set_playing(true);
        controls.set_rate(0.5);
        let mut out = [9i16; 4];
        renderer.render(&mut out, 0, |s, _| s);

        // First output frame precedes the first whole source step
        assert_eq!(out, [0, 1, 1, 2]);
    }

    #[test]
    fn test_underrun_outputs_silence() {
        let (mut renderer, controls) = renderer_with(&[7, 7], 2);
        controls.set_playing(true);
        let mut out = [1i16; 6];
        renderer.render(&mut out, 0, |s, _| s);

        assert_eq!(out, [7, 7, 0, 0, 0, 0]);
    }

    #[test]
    fn test_flush_discards_queued_audio() {
        let (mut renderer, controls) = renderer_with(&[1, 2, 3, 4], 2);
        controls.set_playing(true);
        controls.request_flush();
        let mut out = [5i16; 4];
        renderer.render(&mut out, 0, |s, _| s);

        assert_eq!(out, [0, 0, 0, 0]);
        assert!(!controls.flush_pending());
    }

    #[test]
    fn test_volume_passed_to_conversion() {
        let (mut renderer, controls) = renderer_with(&[16384, 16384], 2);
        controls.set_playing(true);
        controls.set_volume(0.5);
        let mut out = [0.0f32; 2];
        renderer.render(&mut out, 0.0, |s, v| s as f32 / 32768.0 * v);

        assert_eq!(out, [0.25, 0.25]);
    }

    #[test]
    fn test_volume_clamped() {
        let controls = OutputControls::new();
        controls.set_volume(3.0);
        assert_eq!(controls.volume(), 1.0);
        controls.set_volume(-1.0);
        assert_eq!(controls.volume(), 0.0);
    }
}
