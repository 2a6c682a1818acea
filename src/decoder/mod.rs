//! Streaming speech recognition seam
//!
//! The recognizer is a black box behind two traits: [`SpeechEngine`] owns the
//! loaded model, [`StreamingDecoder`] is one decoding stream over it. Frames
//! are mono 16-bit PCM at the engine's configured rate. The vosk-backed
//! implementation lives behind the `vosk` cargo feature; without it the
//! engine fails to load and the controller runs manual-trigger-only.

use std::path::Path;
use std::sync::Arc;

use crate::{Error, Result};

#[cfg(feature = "vosk")]
mod vosk;

#[cfg(feature = "vosk")]
pub use vosk::VoskEngine;

/// Output of feeding one frame to a decoding stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// In-progress hypothesis; may be empty
    Partial(String),

    /// A finalized utterance segment
    Final(String),
}

impl DecodeEvent {
    /// The decoded text regardless of finality
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Partial(text) | Self::Final(text) => text,
        }
    }
}

/// One decoding stream over a loaded model
pub trait StreamingDecoder: Send {
    /// Feed one frame of mono 16-bit PCM
    ///
    /// # Errors
    ///
    /// Returns `Error::DecoderUnavailable` if the recognizer faults
    fn accept_pcm(&mut self, samples: &[i16]) -> Result<DecodeEvent>;

    /// Flush the stream and return any final text
    ///
    /// # Errors
    ///
    /// Returns `Error::DecoderUnavailable` if the recognizer faults
    fn finalize(&mut self) -> Result<Option<String>>;
}

/// A loaded speech recognition model that can mint decoding streams
pub trait SpeechEngine: Send + Sync {
    /// Engine name for logs and the status surface
    fn name(&self) -> &'static str;

    /// Create a fresh decoding stream
    ///
    /// # Errors
    ///
    /// Returns `Error::DecoderUnavailable` if a recognizer cannot be created
    fn create_stream(&self) -> Result<Box<dyn StreamingDecoder>>;
}

/// Load the speech engine for the given model path and sample rate
///
/// # Errors
///
/// Returns `Error::DecoderUnavailable` if the model is missing or the binary
/// was built without a recognition backend
#[cfg(feature = "vosk")]
pub fn load_engine(model_path: &Path, sample_rate: u32) -> Result<Arc<dyn SpeechEngine>> {
    Ok(Arc::new(VoskEngine::load(model_path, sample_rate)?))
}

/// Load the speech engine for the given model path and sample rate
///
/// # Errors
///
/// Always returns `Error::DecoderUnavailable`: this binary was built without
/// a recognition backend
#[cfg(not(feature = "vosk"))]
pub fn load_engine(model_path: &Path, _sample_rate: u32) -> Result<Arc<dyn SpeechEngine>> {
    let _ = model_path;
    Err(Error::DecoderUnavailable(
        "built without the 'vosk' feature".to_string(),
    ))
}

/// Transcribe a persisted WAV utterance by replaying it through a fresh
/// decoding stream, frame by frame
///
/// # Errors
///
/// Returns error if the file cannot be read or the decoder faults
pub fn transcribe_wav(engine: &dyn SpeechEngine, path: &Path, frame_size: usize) -> Result<String> {
    let content = crate::audio::wav::read_wav(path)?;
    let mut stream = engine.create_stream()?;

    let mut segments: Vec<String> = Vec::new();
    let chunk = frame_size.max(1) * content.channels.max(1) as usize;

    for frame in content.samples.chunks(chunk) {
        if let DecodeEvent::Final(text) = stream.accept_pcm(frame)? {
            if !text.is_empty() {
                segments.push(text);
            }
        }
    }

    if let Some(text) = stream.finalize()? {
        if !text.is_empty() {
            segments.push(text);
        }
    }

    let transcript = segments.join(" ").trim().to_string();
    tracing::debug!(path = %path.display(), transcript = %transcript, "transcription complete");
    Ok(transcript)
}
