//! Error types for the marionette controller

use thiserror::Error;

/// Result type alias for marionette operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the marionette controller
///
/// The first four variants map to capabilities that degrade independently:
/// none of them is ever fatal to the process.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio hardware missing, busy, or rejecting the requested format
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Speech recognition model missing or failed to load
    #[error("speech decoder unavailable: {0}")]
    DecoderUnavailable(String),

    /// Servo hardware missing or PWM channel not exported
    #[error("servo actuator unavailable: {0}")]
    ActuatorUnavailable(String),

    /// Dialog backend could not be reached after retries
    #[error("backend unreachable: {0}")]
    BackendUnreachable(String),

    /// Recording produced zero frames
    #[error("recording captured no audio")]
    RecordingEmpty,

    /// Transcription produced no text
    #[error("transcription produced no text")]
    TranscriptionEmpty,

    /// Runtime fault on an open audio stream
    #[error("audio error: {0}")]
    Audio(String),

    /// WAV encode/decode error
    #[error("wav error: {0}")]
    Wav(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Self::Wav(e.to_string())
    }
}
