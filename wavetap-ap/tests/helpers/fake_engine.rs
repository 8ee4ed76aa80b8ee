//! Scripted playback engine
//!
//! Behaves like a well-mannered engine without touching audio hardware:
//! binding a source reports buffering then ready, play/pause flip the
//! is-playing flag, stop reports idle. Tests drive everything else (buffers,
//! format changes, end of stream, errors) through [`FakeEngineHandle`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wavetap_ap::audio::Encoding;
use wavetap_ap::engine::{EngineFactory, EngineListener, PlaybackEngine, RawPlaybackState};
use wavetap_ap::Result;
use wavetap_common::TrackMetadata;

/// One transport call received by a fake engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    SetSource(String),
    Play,
    Pause,
    Stop,
    SeekTo(u64),
    SetVolume(f32),
    SetRate(f32),
    Release,
}

#[derive(Debug, Default)]
struct EngineState {
    calls: Vec<EngineCall>,
    has_source: bool,
    playing: bool,
    position_ms: Option<u64>,
    duration_ms: Option<u64>,
    /// How long `stop` holds the calling thread, like joining a pipeline
    stop_delay: Duration,
}

/// Test-side view of one fake engine
#[derive(Clone)]
pub struct FakeEngineHandle {
    listener: Arc<dyn EngineListener>,
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngineHandle {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn release_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == EngineCall::Release)
            .count()
    }

    /// Make every later `stop` block the caller for `delay`
    pub fn set_stop_delay(&self, delay: Duration) {
        self.state.lock().unwrap().stop_delay = delay;
    }

    pub fn format(&self, sample_rate: u32, channel_count: u16) {
        self.listener
            .on_format_changed(sample_rate, channel_count, Encoding::PCM_16BIT);
    }

    pub fn buffer(&self, interleaved: &[i16]) {
        self.listener.on_buffer(interleaved);
    }

    pub fn raw_state(&self, state: RawPlaybackState) {
        self.listener.on_playback_state(state);
    }

    /// Resolve the duration the way an engine does once the container is read
    pub fn resolve_duration(&self, duration_ms: u64) {
        self.state.lock().unwrap().duration_ms = Some(duration_ms);
        self.listener.on_timeline_changed(Some(duration_ms));
    }

    pub fn metadata(&self, metadata: TrackMetadata) {
        self.listener.on_metadata(metadata);
    }

    pub fn error(&self, message: &str) {
        self.listener.on_error(message.to_string());
    }

    /// Play to the end: ended first, then the engine drops its playing flag
    pub fn finish(&self) {
        self.listener.on_playback_state(RawPlaybackState::Ended);
        let was_playing = {
            let mut state = self.state.lock().unwrap();
            std::mem::replace(&mut state.playing, false)
        };
        if was_playing {
            self.listener.on_is_playing_changed(false);
        }
    }
}

struct FakeEngine {
    handle: FakeEngineHandle,
}

impl FakeEngine {
    fn record(&self, call: EngineCall) {
        self.handle.state.lock().unwrap().calls.push(call);
    }

    fn listener(&self) -> &Arc<dyn EngineListener> {
        &self.handle.listener
    }

    /// Flip the playing flag, returning true when it changed
    fn set_playing(&self, playing: bool) -> bool {
        let mut state = self.handle.state.lock().unwrap();
        if !state.has_source || state.playing == playing {
            return false;
        }
        state.playing = playing;
        true
    }
}

impl PlaybackEngine for FakeEngine {
    fn set_source(&mut self, path: &str) -> Result<()> {
        self.record(EngineCall::SetSource(path.to_string()));
        {
            let mut state = self.handle.state.lock().unwrap();
            state.has_source = true;
            state.playing = false;
            state.position_ms = Some(0);
            state.duration_ms = None;
        }
        self.listener().on_playback_state(RawPlaybackState::Buffering);
        self.listener().on_playback_state(RawPlaybackState::Ready);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.record(EngineCall::Play);
        if self.set_playing(true) {
            self.listener().on_is_playing_changed(true);
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.record(EngineCall::Pause);
        if self.set_playing(false) {
            self.listener().on_is_playing_changed(false);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.record(EngineCall::Stop);
        let delay = self.handle.state.lock().unwrap().stop_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let (had_source, was_playing) = {
            let mut state = self.handle.state.lock().unwrap();
            let snapshot = (state.has_source, state.playing);
            state.has_source = false;
            state.playing = false;
            state.position_ms = None;
            snapshot
        };
        if had_source {
            self.listener().on_playback_state(RawPlaybackState::Idle);
        }
        if was_playing {
            self.listener().on_is_playing_changed(false);
        }
        Ok(())
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.record(EngineCall::SeekTo(position_ms));
        self.handle.state.lock().unwrap().position_ms = Some(position_ms);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.record(EngineCall::SetVolume(volume));
        Ok(())
    }

    fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.record(EngineCall::SetRate(rate));
        Ok(())
    }

    fn position_ms(&self) -> Option<u64> {
        self.handle.state.lock().unwrap().position_ms
    }

    fn duration_ms(&self) -> Option<u64> {
        self.handle.state.lock().unwrap().duration_ms
    }

    fn release(&mut self) {
        self.record(EngineCall::Release);
    }
}

/// Factory handing out fake engines, remembering the latest one per session
#[derive(Default)]
pub struct FakeEngineFactory {
    engines: Mutex<HashMap<String, Vec<FakeEngineHandle>>>,
}

impl FakeEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent engine created for `session_id`
    pub fn handle(&self, session_id: &str) -> FakeEngineHandle {
        self.engines
            .lock()
            .unwrap()
            .get(session_id)
            .and_then(|handles| handles.last().cloned())
            .unwrap_or_else(|| panic!("no engine created for session {}", session_id))
    }

    /// Every engine ever created for `session_id`, oldest first
    pub fn handles(&self, session_id: &str) -> Vec<FakeEngineHandle> {
        self.engines
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl EngineFactory for FakeEngineFactory {
    fn create(
        &self,
        session_id: &str,
        listener: Arc<dyn EngineListener>,
    ) -> Result<Box<dyn PlaybackEngine>> {
        let handle = FakeEngineHandle {
            listener,
            state: Arc::new(Mutex::new(EngineState::default())),
        };
        self.engines
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_default()
            .push(handle.clone());
        Ok(Box::new(FakeEngine { handle }))
    }
}
