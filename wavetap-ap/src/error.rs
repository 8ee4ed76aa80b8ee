//! Error types for wavetap-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Every variant maps to a stable machine-readable code that the command
//! surface reports alongside the human-readable message.

use thiserror::Error;

/// Main error type for wavetap-ap module
#[derive(Error, Debug)]
pub enum Error {
    /// Command needed a session id and none was given
    #[error("ID not found: please provide a valid ID")]
    MissingId,

    /// `setSource`/`getMetadata` called without a path
    #[error("Path not found: please provide a valid source path")]
    MissingPath,

    /// Required command argument absent
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// Command argument present but unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No session registered under this id
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// Engine announced an unusable audio format
    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    /// Playback engine rejected or failed a command
    #[error("Engine error: {0}")]
    Engine(String),

    /// Engine handle already released by shutdown
    #[error("Engine released for session {0}")]
    EngineReleased(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from the common library
    #[error(transparent)]
    Common(#[from] wavetap_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingId => "NO_ID_PROVIDED",
            Error::MissingPath => "NO_PATH_PROVIDED",
            Error::MissingArgument(_) => "MISSING_ARGUMENT",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::UnknownSession(_) => "UNKNOWN_SESSION",
            Error::InvalidFormat(_) => "INVALID_FORMAT",
            Error::Engine(_) => "ENGINE_ERROR",
            Error::EngineReleased(_) => "ENGINE_RELEASED",
            Error::AudioOutput(_) => "AUDIO_OUTPUT",
            Error::Decode(_) => "DECODE_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Common(_) => "COMMON_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors caused by caller misuse at the command boundary
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::MissingId
                | Error::MissingPath
                | Error::MissingArgument(_)
                | Error::InvalidArgument(_)
        )
    }
}

/// Convenience Result type using wavetap-ap Error
pub type Result<T> = std::result::Result<T, Error>;
