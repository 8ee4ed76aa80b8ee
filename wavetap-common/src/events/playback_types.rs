//! Playback-related type definitions
//!
//! Supporting types for canonical session state and track metadata.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical playback state reported for every session
///
/// Serialized as its numeric code (0..=5), which is the value carried by
/// `state` events on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CanonicalState {
    #[default]
    Idle,
    Buffering,
    Ready,
    Playing,
    Paused,
    Ended,
}

impl CanonicalState {
    /// Wire code for this state
    pub fn code(self) -> u8 {
        match self {
            CanonicalState::Idle => 0,
            CanonicalState::Buffering => 1,
            CanonicalState::Ready => 2,
            CanonicalState::Playing => 3,
            CanonicalState::Paused => 4,
            CanonicalState::Ended => 5,
        }
    }

    /// Inverse of [`CanonicalState::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CanonicalState::Idle),
            1 => Some(CanonicalState::Buffering),
            2 => Some(CanonicalState::Ready),
            3 => Some(CanonicalState::Playing),
            4 => Some(CanonicalState::Paused),
            5 => Some(CanonicalState::Ended),
            _ => None,
        }
    }
}

impl std::fmt::Display for CanonicalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanonicalState::Idle => write!(f, "idle"),
            CanonicalState::Buffering => write!(f, "buffering"),
            CanonicalState::Ready => write!(f, "ready"),
            CanonicalState::Playing => write!(f, "playing"),
            CanonicalState::Paused => write!(f, "paused"),
            CanonicalState::Ended => write!(f, "ended"),
        }
    }
}

impl Serialize for CanonicalState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for CanonicalState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        CanonicalState::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid state code {}", code)))
    }
}

/// Container metadata for a track
///
/// Every field is optional; readers fill in what the container carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    /// Release year/date as stored in the container
    pub time_released: Option<String>,
    /// Embedded cover art, raw image bytes
    pub artwork: Option<Vec<u8>>,
    /// Duration in seconds, when the container declares one
    pub duration: Option<f64>,
}
