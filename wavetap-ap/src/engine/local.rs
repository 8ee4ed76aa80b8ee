//! Local-file playback engine
//!
//! Decodes a local file with symphonia on a dedicated audio-pipeline thread,
//! shows every decoded buffer to the listener, then hands it to an output
//! sink (cpal unless told otherwise) through a lock-free ring buffer.
//!
//! ```text
//!  control thread                 pipeline thread                device thread
//!  LocalEngine ──commands──▶ decode ─▶ on_buffer ─▶ HeapProd ─▶ HeapCons ─▶ sink
//! ```
//!
//! One pipeline thread exists per bound source. Binding a new source, `stop`
//! and `release` shut the current thread down and join it.

use crate::audio::output::{CpalSinkFactory, OutputControls, OutputSink, SinkFactory};
use crate::audio::Encoding;
use crate::engine::metadata::{collect_metadata, probe_file};
use crate::engine::{EngineFactory, EngineListener, PlaybackEngine, RawPlaybackState};
use crate::error::{Error, Result};
use ringbuf::{traits::*, HeapProd, HeapRb};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatReader, SeekMode, SeekTo};
use symphonia::core::units::Time;
use tracing::{debug, error, info, trace, warn};

/// Ring buffer length in milliseconds of source audio
const RING_BUFFER_MS: u64 = 500;

/// How long the pipeline sleeps waiting for ring space or commands
const PIPELINE_POLL: Duration = Duration::from_millis(5);

/// Upper bound on waiting for the device callback to acknowledge a flush
const FLUSH_TIMEOUT: Duration = Duration::from_millis(250);

/// Sentinel for "duration unknown" in the atomic
const UNKNOWN_DURATION: u64 = u64::MAX;

enum PipelineCommand {
    Seek(u64),
    Shutdown,
}

/// Position and duration bookkeeping shared with the pipeline thread
struct Timeline {
    /// Position of the first frame after the last seek
    base_ms: AtomicU64,
    /// Source sample rate, 0 until the pipeline has opened the source
    sample_rate: AtomicU32,
    duration_ms: AtomicU64,
}

impl Timeline {
    fn new() -> Self {
        Self {
            base_ms: AtomicU64::new(0),
            sample_rate: AtomicU32::new(0),
            duration_ms: AtomicU64::new(UNKNOWN_DURATION),
        }
    }

    fn reset(&self) {
        self.base_ms.store(0, Ordering::Release);
        self.sample_rate.store(0, Ordering::Release);
        self.duration_ms.store(UNKNOWN_DURATION, Ordering::Release);
    }
}

/// Handle to a running pipeline thread
struct PipelineHandle {
    commands: Sender<PipelineCommand>,
    thread: JoinHandle<()>,
}

/// Reference engine for local audio files
pub struct LocalEngine {
    session_id: String,
    listener: Arc<dyn EngineListener>,
    sinks: Arc<dyn SinkFactory>,
    controls: Arc<OutputControls>,
    timeline: Arc<Timeline>,
    pipeline: Option<PipelineHandle>,
    released: bool,
}

impl LocalEngine {
    /// Engine playing to the default output device
    pub fn new(session_id: impl Into<String>, listener: Arc<dyn EngineListener>) -> Self {
        Self::with_sink(session_id, listener, Arc::new(CpalSinkFactory))
    }

    pub fn with_sink(
        session_id: impl Into<String>,
        listener: Arc<dyn EngineListener>,
        sinks: Arc<dyn SinkFactory>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            listener,
            sinks,
            controls: Arc::new(OutputControls::new()),
            timeline: Arc::new(Timeline::new()),
            pipeline: None,
            released: false,
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released {
            return Err(Error::EngineReleased(self.session_id.clone()));
        }
        Ok(())
    }

    /// Flip the playing flag and report the change
    fn set_playing(&self, playing: bool) {
        let was_playing = self.controls.set_playing(playing);
        if was_playing != playing {
            self.listener.on_is_playing_changed(playing);
        }
    }

    /// Stop and join the current pipeline thread, if any
    fn shutdown_pipeline(&mut self) {
        if let Some(handle) = self.pipeline.take() {
            let _ = handle.commands.send(PipelineCommand::Shutdown);
            if handle.thread.join().is_err() {
                error!("Pipeline thread for session {} panicked", self.session_id);
            }
            debug!("Pipeline for session {} shut down", self.session_id);
        }
    }
}

impl PlaybackEngine for LocalEngine {
    fn set_source(&mut self, path: &str) -> Result<()> {
        self.ensure_live()?;
        self.shutdown_pipeline();
        self.set_playing(false);
        self.timeline.reset();
        self.controls.reset_frames_consumed();

        let path = PathBuf::from(path);
        let (tx, rx) = mpsc::channel();
        let listener = Arc::clone(&self.listener);
        let sinks = Arc::clone(&self.sinks);
        let controls = Arc::clone(&self.controls);
        let timeline = Arc::clone(&self.timeline);
        let thread_name = format!("wavetap-pipeline-{}", self.session_id);

        let thread = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_pipeline(path, listener, sinks, controls, timeline, rx))
            .map_err(|e| Error::Engine(format!("Failed to spawn pipeline thread: {}", e)))?;

        self.pipeline = Some(PipelineHandle {
            commands: tx,
            thread,
        });
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.ensure_live()?;
        if self.pipeline.is_none() {
            warn!("play() on session {} with no source bound", self.session_id);
            return Ok(());
        }
        self.set_playing(true);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.set_playing(false);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.ensure_live()?;
        let was_playing = self.controls.set_playing(false);
        if self.pipeline.is_some() {
            self.shutdown_pipeline();
            self.timeline.reset();
            self.controls.reset_frames_consumed();
            self.listener.on_playback_state(RawPlaybackState::Idle);
        }
        // Idle first, so a stop from playing never publishes paused
        if was_playing {
            self.listener.on_is_playing_changed(false);
        }
        Ok(())
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.ensure_live()?;
        let Some(handle) = self.pipeline.as_ref() else {
            return Err(Error::Engine("No source bound".to_string()));
        };

        self.timeline.base_ms.store(position_ms, Ordering::Release);
        self.controls.reset_frames_consumed();
        handle
            .commands
            .send(PipelineCommand::Seek(position_ms))
            .map_err(|_| Error::Engine("Pipeline thread has exited".to_string()))
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.ensure_live()?;
        self.controls.set_volume(volume);
        Ok(())
    }

    fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.ensure_live()?;
        self.controls.set_rate(rate);
        Ok(())
    }

    fn position_ms(&self) -> Option<u64> {
        let sample_rate = self.timeline.sample_rate.load(Ordering::Acquire);
        if self.pipeline.is_none() || sample_rate == 0 {
            return None;
        }
        let base = self.timeline.base_ms.load(Ordering::Acquire);
        let frames = self.controls.frames_consumed();
        Some(base + frames * 1000 / u64::from(sample_rate))
    }

    fn duration_ms(&self) -> Option<u64> {
        match self.timeline.duration_ms.load(Ordering::Acquire) {
            UNKNOWN_DURATION => None,
            ms => Some(ms),
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.controls.set_playing(false);
        self.shutdown_pipeline();
        self.released = true;
        info!("Local engine for session {} released", self.session_id);
    }
}

impl Drop for LocalEngine {
    fn drop(&mut self) {
        self.release();
    }
}

/// Builds a [`LocalEngine`] per session
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalEngineFactory;

impl LocalEngineFactory {
    pub fn new() -> Self {
        Self
    }
}

impl EngineFactory for LocalEngineFactory {
    fn create(
        &self,
        session_id: &str,
        listener: Arc<dyn EngineListener>,
    ) -> Result<Box<dyn PlaybackEngine>> {
        Ok(Box::new(LocalEngine::new(session_id, listener)))
    }
}

/// Pipeline thread entry point
fn run_pipeline(
    path: PathBuf,
    listener: Arc<dyn EngineListener>,
    sinks: Arc<dyn SinkFactory>,
    controls: Arc<OutputControls>,
    timeline: Arc<Timeline>,
    commands: Receiver<PipelineCommand>,
) {
    listener.on_playback_state(RawPlaybackState::Buffering);

    match Pipeline::open(&path, Arc::clone(&listener), sinks.as_ref(), controls, timeline) {
        Ok(pipeline) => pipeline.run(commands),
        Err(e) => {
            error!("Failed to open {}: {}", path.display(), e);
            listener.on_error(e.to_string());
            listener.on_playback_state(RawPlaybackState::Idle);
        }
    }
}

/// Decoder, ring producer and output sink for one bound source
struct Pipeline {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_buf: Option<SampleBuffer<i16>>,
    producer: HeapProd<i16>,
    output: Box<dyn OutputSink>,
    listener: Arc<dyn EngineListener>,
    controls: Arc<OutputControls>,
}

impl Pipeline {
    fn open(
        path: &Path,
        listener: Arc<dyn EngineListener>,
        sinks: &dyn SinkFactory,
        controls: Arc<OutputControls>,
        timeline: Arc<Timeline>,
    ) -> Result<Self> {
        let mut probed = probe_file(path)?;
        let metadata = collect_metadata(&mut probed);
        let format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| Error::Decode(format!("No audio track found in {}", path.display())))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode(format!("Unknown sample rate in {}", path.display())))?;
        let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Unsupported codec in {}: {}", path.display(), e)))?;

        let duration_ms = codec_params
            .n_frames
            .map(|frames| frames * 1000 / u64::from(sample_rate));
        timeline.sample_rate.store(sample_rate, Ordering::Release);
        timeline
            .duration_ms
            .store(duration_ms.unwrap_or(UNKNOWN_DURATION), Ordering::Release);
        listener.on_timeline_changed(duration_ms);
        listener.on_metadata(metadata);

        let capacity = (u64::from(sample_rate) * RING_BUFFER_MS / 1000) as usize * channels as usize;
        let (producer, consumer) = HeapRb::<i16>::new(capacity.max(channels as usize)).split();

        let output = sinks.open(sample_rate, channels, consumer, Arc::clone(&controls))?;
        listener.on_format_changed(sample_rate, channels, Encoding::PCM_16BIT);

        info!(
            "Opened {} ({} Hz, {} channels, duration {:?} ms)",
            path.display(),
            sample_rate,
            channels,
            duration_ms
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_buf: None,
            producer,
            output,
            listener,
            controls,
        })
    }

    fn run(mut self, commands: Receiver<PipelineCommand>) {
        let mut pending: Vec<i16> = Vec::new();
        let mut pending_pos = 0;
        let mut ready_sent = false;
        let mut at_eof = false;
        let mut ended = false;

        loop {
            if self.controls.take_error() {
                self.listener.on_error("Audio output stream error".to_string());
            }

            // Block only when there is nothing to decode or push
            let idle = ended
                || (pending_pos < pending.len() && self.producer.is_full())
                || (at_eof && pending_pos >= pending.len());
            let command = if idle {
                match commands.recv_timeout(PIPELINE_POLL) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match commands.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(mpsc::TryRecvError::Empty) => None,
                    Err(mpsc::TryRecvError::Disconnected) => break,
                }
            };

            match command {
                Some(PipelineCommand::Shutdown) => break,
                Some(PipelineCommand::Seek(position_ms)) => {
                    if let Err(e) = self.seek(position_ms) {
                        warn!("Seek to {} ms failed: {}", position_ms, e);
                        self.listener.on_error(e.to_string());
                    }
                    pending.clear();
                    pending_pos = 0;
                    at_eof = false;
                    ended = false;
                    continue;
                }
                None => {}
            }

            if ended {
                continue;
            }

            if pending_pos < pending.len() {
                pending_pos += self.producer.push_slice(&pending[pending_pos..]);
                if pending_pos < pending.len() && !ready_sent {
                    // Ring full: enough audio queued to start
                    ready_sent = true;
                    self.listener.on_playback_state(RawPlaybackState::Ready);
                }
                continue;
            }

            if at_eof {
                if !ready_sent {
                    ready_sent = true;
                    self.listener.on_playback_state(RawPlaybackState::Ready);
                }
                if self.controls.is_playing() && self.producer.is_empty() {
                    ended = true;
                    self.listener.on_playback_state(RawPlaybackState::Ended);
                    if self.controls.set_playing(false) {
                        self.listener.on_is_playing_changed(false);
                    }
                    debug!("Reached end of stream");
                }
                continue;
            }

            match self.decode_next() {
                Ok(Some(samples)) => {
                    trace!("Decoded {} samples", samples.len());
                    self.listener.on_buffer(&samples);
                    pending = samples;
                    pending_pos = 0;
                }
                Ok(None) => at_eof = true,
                Err(e) => {
                    error!("Decode failed: {}", e);
                    self.listener.on_error(e.to_string());
                    at_eof = true;
                }
            }
        }

        self.output.stop();
        debug!("Pipeline thread exiting");
    }

    /// Decode the next packet of the selected track into interleaved i16
    ///
    /// Returns `Ok(None)` at end of stream. Corrupt packets are skipped.
    fn decode_next(&mut self) -> Result<Option<Vec<i16>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let needed = decoded.capacity() as u64;
                    let spec = *decoded.spec();
                    let reuse = self
                        .sample_buf
                        .as_ref()
                        .is_some_and(|buf| buf.capacity() as u64 >= needed * spec.channels.count() as u64);
                    if !reuse {
                        self.sample_buf = Some(SampleBuffer::<i16>::new(needed, spec));
                    }
                    let Some(buf) = self.sample_buf.as_mut() else {
                        continue;
                    };
                    buf.copy_interleaved_ref(decoded);
                    return Ok(Some(buf.samples().to_vec()));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            }
        }
    }

    /// Seek the source and discard audio queued for the device
    fn seek(&mut self, position_ms: u64) -> Result<()> {
        self.controls.request_flush();

        let time = Time::new(position_ms / 1000, (position_ms % 1000) as f64 / 1000.0);
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Decode(format!("Seek failed: {}", e)))?;
        self.decoder.reset();

        // Audio pushed before the device callback flushes would be discarded
        let deadline = Instant::now() + FLUSH_TIMEOUT;
        while self.controls.flush_pending() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.controls.reset_frames_consumed();

        debug!("Seeked to {} ms", position_ms);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::FrameRenderer;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;
    use wavetap_common::TrackMetadata;

    const WAIT: Duration = Duration::from_secs(5);

    /// Drains the ring on its own thread at roughly real time
    struct ClockedSink {
        running: Arc<AtomicBool>,
        thread: Option<JoinHandle<()>>,
    }

    impl OutputSink for ClockedSink {
        fn stop(&mut self) {
            self.running.store(false, Ordering::Release);
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }

    impl Drop for ClockedSink {
        fn drop(&mut self) {
            self.stop();
        }
    }

    struct ClockedSinkFactory;

    impl SinkFactory for ClockedSinkFactory {
        fn open(
            &self,
            sample_rate: u32,
            channels: u16,
            consumer: ringbuf::HeapCons<i16>,
            controls: Arc<OutputControls>,
        ) -> Result<Box<dyn OutputSink>> {
            let running = Arc::new(AtomicBool::new(true));
            let flag = Arc::clone(&running);
            let mut renderer = FrameRenderer::new(consumer, channels as usize, controls);
            // 2 ms of audio per 2 ms tick
            let mut buffer = vec![0i16; (sample_rate as usize / 500).max(1) * channels as usize];
            let thread = std::thread::spawn(move || {
                while flag.load(Ordering::Acquire) {
                    renderer.render(&mut buffer, 0, |sample, _| sample);
                    std::thread::sleep(Duration::from_millis(2));
                }
            });
            Ok(Box::new(ClockedSink {
                running,
                thread: Some(thread),
            }))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Heard {
        Format(u32, u16),
        Raw(RawPlaybackState),
        IsPlaying(bool),
        Timeline(Option<u64>),
        Error(String),
    }

    #[derive(Default)]
    struct RecordingListener {
        heard: Mutex<Vec<Heard>>,
        buffers: AtomicU64,
    }

    impl RecordingListener {
        fn push(&self, heard: Heard) {
            self.heard.lock().unwrap().push(heard);
        }

        fn heard(&self) -> Vec<Heard> {
            self.heard.lock().unwrap().clone()
        }

        fn buffers(&self) -> u64 {
            self.buffers.load(Ordering::Acquire)
        }

        /// Poll until `wanted` has been heard, returning everything so far
        fn wait_for(&self, wanted: &Heard) -> Vec<Heard> {
            let deadline = Instant::now() + WAIT;
            loop {
                let heard = self.heard();
                if heard.contains(wanted) {
                    return heard;
                }
                if Instant::now() > deadline {
                    panic!("never heard {:?}; heard {:?}", wanted, heard);
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }

    impl EngineListener for RecordingListener {
        fn on_format_changed(&self, sample_rate: u32, channel_count: u16, _encoding: Encoding) {
            self.push(Heard::Format(sample_rate, channel_count));
        }

        fn on_buffer(&self, _interleaved: &[i16]) {
            self.buffers.fetch_add(1, Ordering::AcqRel);
        }

        fn on_playback_state(&self, state: RawPlaybackState) {
            self.push(Heard::Raw(state));
        }

        fn on_is_playing_changed(&self, is_playing: bool) {
            self.push(Heard::IsPlaying(is_playing));
        }

        fn on_timeline_changed(&self, duration_ms: Option<u64>) {
            self.push(Heard::Timeline(duration_ms));
        }

        fn on_metadata(&self, _metadata: TrackMetadata) {}

        fn on_error(&self, message: String) {
            self.push(Heard::Error(message));
        }
    }

    fn index_of(heard: &[Heard], wanted: &Heard) -> usize {
        heard
            .iter()
            .position(|h| h == wanted)
            .unwrap_or_else(|| panic!("{:?} missing from {:?}", wanted, heard))
    }

    fn write_wav(dir: &Path, sample_rate: u32, channels: u16, frames: u32) -> String {
        let path = dir.join(format!("tone-{}-{}-{}.wav", sample_rate, channels, frames));
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames * u32::from(channels) {
            writer.write_sample(((i % 100) as i16 - 50) * 100).unwrap();
        }
        writer.finalize().unwrap();
        path.to_string_lossy().into_owned()
    }

    fn engine_for(listener: &Arc<RecordingListener>) -> LocalEngine {
        LocalEngine::with_sink(
            "test",
            Arc::clone(listener) as Arc<dyn EngineListener>,
            Arc::new(ClockedSinkFactory),
        )
    }

    #[test]
    fn test_set_source_reports_buffering_format_then_ready() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 8_000, 2, 8_000);
        let listener = Arc::new(RecordingListener::default());
        let mut engine = engine_for(&listener);

        engine.set_source(&path).unwrap();
        let heard = listener.wait_for(&Heard::Raw(RawPlaybackState::Ready));

        assert_eq!(heard[0], Heard::Raw(RawPlaybackState::Buffering));
        let format_at = index_of(&heard, &Heard::Format(8_000, 2));
        let ready_at = index_of(&heard, &Heard::Raw(RawPlaybackState::Ready));
        assert!(format_at < ready_at, "{:?}", heard);
        assert!(heard.contains(&Heard::Timeline(Some(1000))));
        assert!(!heard.iter().any(|h| matches!(h, Heard::IsPlaying(_))));

        assert_eq!(engine.duration_ms(), Some(1000));
        assert_eq!(engine.position_ms(), Some(0));
        assert!(listener.buffers() > 0);
        engine.release();
    }

    #[test]
    fn test_missing_file_reports_error_then_idle() {
        let listener = Arc::new(RecordingListener::default());
        let mut engine = engine_for(&listener);

        engine.set_source("/definitely/not/here.wav").unwrap();
        let heard = listener.wait_for(&Heard::Raw(RawPlaybackState::Idle));

        assert_eq!(heard.len(), 3, "{:?}", heard);
        assert_eq!(heard[0], Heard::Raw(RawPlaybackState::Buffering));
        assert!(matches!(heard[1], Heard::Error(_)));
        assert_eq!(heard[2], Heard::Raw(RawPlaybackState::Idle));
        assert_eq!(engine.duration_ms(), None);
    }

    #[test]
    fn test_play_to_end_reports_ended_before_flag_drops() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 8_000, 1, 2_000);
        let listener = Arc::new(RecordingListener::default());
        let mut engine = engine_for(&listener);

        engine.set_source(&path).unwrap();
        listener.wait_for(&Heard::Raw(RawPlaybackState::Ready));
        engine.play().unwrap();
        let heard = listener.wait_for(&Heard::IsPlaying(false));

        let playing_at = index_of(&heard, &Heard::IsPlaying(true));
        let ended_at = index_of(&heard, &Heard::Raw(RawPlaybackState::Ended));
        let dropped_at = index_of(&heard, &Heard::IsPlaying(false));
        assert!(playing_at < ended_at && ended_at < dropped_at, "{:?}", heard);
        assert_eq!(
            heard.iter().filter(|h| **h == Heard::Raw(RawPlaybackState::Ended)).count(),
            1
        );

        // The whole 250 ms went through the sink
        assert!(engine.position_ms().unwrap_or(0) >= 200);
    }

    #[test]
    fn test_stop_reports_idle_before_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 8_000, 1, 40_000);
        let listener = Arc::new(RecordingListener::default());
        let mut engine = engine_for(&listener);

        engine.set_source(&path).unwrap();
        listener.wait_for(&Heard::Raw(RawPlaybackState::Ready));
        engine.play().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        engine.stop().unwrap();

        let heard = listener.heard();
        assert_eq!(
            &heard[heard.len() - 2..],
            &[Heard::Raw(RawPlaybackState::Idle), Heard::IsPlaying(false)]
        );
        assert!(!heard.contains(&Heard::Raw(RawPlaybackState::Ended)));
        assert_eq!(engine.position_ms(), None);

        // Nothing arrives from the joined pipeline afterwards
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(listener.heard().len(), heard.len());
    }

    #[test]
    fn test_seek_restarts_position_at_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 8_000, 1, 40_000);
        let listener = Arc::new(RecordingListener::default());
        let mut engine = engine_for(&listener);

        engine.set_source(&path).unwrap();
        listener.wait_for(&Heard::Raw(RawPlaybackState::Ready));

        engine.seek_to(3_000).unwrap();
        assert_eq!(engine.position_ms(), Some(3_000));

        engine.play().unwrap();
        let deadline = Instant::now() + WAIT;
        let position = loop {
            let position = engine.position_ms().unwrap_or(0);
            if position > 3_000 || Instant::now() > deadline {
                break position;
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        assert!((3_001..4_000).contains(&position), "position {}", position);

        let heard = listener.heard();
        assert!(!heard.iter().any(|h| matches!(h, Heard::Error(_))), "{:?}", heard);
        assert!(!heard.contains(&Heard::Raw(RawPlaybackState::Ended)));
        engine.stop().unwrap();
    }

    #[test]
    fn test_play_without_source_does_nothing() {
        let listener = Arc::new(RecordingListener::default());
        let mut engine = engine_for(&listener);

        engine.play().unwrap();
        engine.stop().unwrap();

        assert!(listener.heard().is_empty());
        assert_eq!(engine.position_ms(), None);
        assert!(engine.seek_to(1_000).is_err());
    }

    #[test]
    fn test_commands_after_release_fail() {
        let listener = Arc::new(RecordingListener::default());
        let mut engine = engine_for(&listener);

        engine.release();
        engine.release();

        assert!(matches!(engine.play(), Err(Error::EngineReleased(_))));
        assert!(matches!(
            engine.set_source("/music/a.wav"),
            Err(Error::EngineReleased(_))
        ));
    }
}
