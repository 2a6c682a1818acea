//! Persisted audio artifacts
//!
//! Utterances and response audio are written as timestamped WAV files under
//! the configured audio directory. The filename prefix encodes purpose:
//! `input_` for recordings, `output_` for response audio in development mode,
//! `tts_` otherwise. Nothing else is persisted.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::audio::wav;
use crate::{Error, Result};

/// Purpose of a saved response-audio artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAudioKind {
    /// Development mode: kept alongside recordings for inspection
    Output,
    /// Normal TTS playback artifact
    Tts,
}

impl ResponseAudioKind {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Tts => "tts",
        }
    }
}

/// Writes timestamped WAV artifacts under one directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at the given directory, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Root directory of the store
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a recorded utterance as `input_<ms>.wav`
    ///
    /// # Errors
    ///
    /// Returns error if encoding or writing fails
    pub fn save_utterance(
        &self,
        samples: &[i16],
        channels: u16,
        sample_rate: u32,
    ) -> Result<PathBuf> {
        let path = self.dir.join(format!("input_{}.wav", timestamp_ms()));
        wav::write_wav(&path, samples, channels, sample_rate)?;
        tracing::debug!(path = %path.display(), samples = samples.len(), "utterance saved");
        Ok(path)
    }

    /// Decode base64 response audio and persist it as
    /// `<output|tts>_<ms>.wav`
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not valid base64 or writing fails
    pub fn save_response_audio(&self, audio_b64: &str, kind: ResponseAudioKind) -> Result<PathBuf> {
        let bytes = BASE64
            .decode(audio_b64)
            .map_err(|e| Error::Audio(format!("invalid base64 audio: {e}")))?;

        let path = self
            .dir
            .join(format!("{}_{}.wav", kind.prefix(), timestamp_ms()));
        std::fs::write(&path, bytes)?;
        tracing::debug!(path = %path.display(), "response audio saved");
        Ok(path)
    }
}

/// Millisecond timestamp used for artifact uniqueness
fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
