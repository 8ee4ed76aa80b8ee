//! Canonical playback-state reconciliation
//!
//! The engine reports its playback state and its is-playing flag separately
//! and in no guaranteed order. This module fuses them into the single
//! canonical state published to clients:
//!
//! | raw state  | is-playing | primed | canonical  |
//! |------------|------------|--------|------------|
//! | idle       | any        | any    | Idle       |
//! | buffering  | unknown    | any    | Buffering  |
//! | buffering  | known      | no     | Buffering  |
//! | buffering  | true       | yes    | Playing    |
//! | buffering  | false      | yes    | Paused     |
//! | ready      | unknown    | any    | Ready      |
//! | ready      | true       | any    | Playing    |
//! | ready      | false      | any    | Paused     |
//! | ended      | any        | any    | Ended      |
//!
//! Once a source is primed (Ready has been published for it) a known
//! is-playing flag outranks raw buffering, so a mid-stream rebuffer keeps
//! Playing or Paused. Raw idle means no source is loaded: it un-primes the
//! machine, so `stop` lands on Idle whichever order the engine reports it in.
//!
//! Ended is terminal until a new source is bound. For a freshly bound source,
//! Buffering and Ready are always published before Playing or Paused; stages
//! the engine skipped are emitted on its behalf.
//!
//! The transition function [`step`] is pure, so every ordering of engine
//! callbacks can be tested without an engine.

use crate::engine::RawPlaybackState;
use wavetap_common::{CanonicalState, EventPayload};

/// One input to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcilerInput {
    /// New source bound: reset to Idle and re-arm
    SourceBound,
    RawState(RawPlaybackState),
    IsPlaying(bool),
    /// Duration resolved or reset (`None` = unknown)
    Timeline(Option<u64>),
    Error(String),
}

/// State machine snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Machine {
    /// Last published canonical state
    pub state: CanonicalState,
    /// Last raw state reported by the engine
    pub raw: RawPlaybackState,
    /// Last is-playing flag, `None` until reported for the current source
    pub is_playing: Option<bool>,
    /// Ready (or later) has been published for the current source
    pub primed: bool,
}

impl Default for Machine {
    fn default() -> Self {
        Self {
            state: CanonicalState::Idle,
            raw: RawPlaybackState::Idle,
            is_playing: None,
            primed: false,
        }
    }
}

/// Advance the machine by one input
///
/// Returns the new machine and the events to publish, in order. Most inputs
/// produce zero or one event; entering Ended produces the state change plus
/// `Completed`, and a skipped Buffering/Ready stage produces its own state
/// change ahead of the target state.
pub fn step(machine: Machine, input: ReconcilerInput) -> (Machine, Vec<EventPayload>) {
    let mut next = machine;
    let mut events = Vec::new();

    match input {
        ReconcilerInput::SourceBound => {
            next = Machine::default();
            if machine.state != CanonicalState::Idle {
                events.push(EventPayload::State(CanonicalState::Idle));
            }
        }
        ReconcilerInput::Timeline(duration_ms) => {
            let seconds = duration_ms.map(|ms| ms as f64 / 1000.0).unwrap_or(0.0);
            events.push(EventPayload::Duration(seconds));
        }
        ReconcilerInput::Error(message) => {
            events.push(EventPayload::Error(message));
        }
        // Terminal until the next SourceBound
        _ if machine.state == CanonicalState::Ended => {}
        ReconcilerInput::RawState(raw) => {
            next.raw = raw;
            if raw == RawPlaybackState::Idle {
                next.primed = false;
            }
            advance(&mut next, &mut events);
        }
        ReconcilerInput::IsPlaying(is_playing) => {
            next.is_playing = Some(is_playing);
            advance(&mut next, &mut events);
        }
    }

    (next, events)
}

/// Fused value of the machine's current inputs
fn target(machine: &Machine) -> CanonicalState {
    match (machine.raw, machine.is_playing) {
        (RawPlaybackState::Ended, _) => CanonicalState::Ended,
        (RawPlaybackState::Idle, _) => CanonicalState::Idle,
        (RawPlaybackState::Ready, Some(playing)) => playing_or_paused(playing),
        (RawPlaybackState::Buffering, Some(playing)) if machine.primed => {
            playing_or_paused(playing)
        }
        (RawPlaybackState::Buffering, _) => CanonicalState::Buffering,
        (RawPlaybackState::Ready, None) => CanonicalState::Ready,
    }
}

fn playing_or_paused(playing: bool) -> CanonicalState {
    if playing {
        CanonicalState::Playing
    } else {
        CanonicalState::Paused
    }
}

fn advance(machine: &mut Machine, events: &mut Vec<EventPayload>) {
    let target = target(machine);

    let past_buffering = matches!(
        target,
        CanonicalState::Ready | CanonicalState::Playing | CanonicalState::Paused
    );
    if past_buffering && !machine.primed {
        if machine.state == CanonicalState::Idle {
            enter(machine, CanonicalState::Buffering, events);
        }
        enter(machine, CanonicalState::Ready, events);
    }

    enter(machine, target, events);
}

fn enter(machine: &mut Machine, state: CanonicalState, events: &mut Vec<EventPayload>) {
    if machine.state == state {
        return;
    }
    machine.state = state;
    if matches!(
        state,
        CanonicalState::Ready | CanonicalState::Playing | CanonicalState::Paused
    ) {
        machine.primed = true;
    }
    events.push(EventPayload::State(state));
    if state == CanonicalState::Ended {
        events.push(EventPayload::Completed);
    }
}

/// Owned wrapper around [`step`] for the session pump
#[derive(Debug, Default)]
pub struct StateReconciler {
    machine: Machine,
}

impl StateReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one input, returning the events to publish
    pub fn apply(&mut self, input: ReconcilerInput) -> Vec<EventPayload> {
        let (next, events) = step(self.machine, input);
        self.machine = next;
        events
    }

    pub fn state(&self) -> CanonicalState {
        self.machine.state
    }

    pub fn machine(&self) -> Machine {
        self.machine
    }
}
