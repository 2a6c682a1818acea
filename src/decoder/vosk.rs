//! Vosk-backed speech engine (behind the `vosk` cargo feature)

use std::path::Path;
use std::sync::Arc;

use vosk::{DecodingState, Model, Recognizer};

use super::{DecodeEvent, SpeechEngine, StreamingDecoder};
use crate::{Error, Result};

/// Speech engine backed by a loaded Vosk model
pub struct VoskEngine {
    model: Arc<Model>,
    sample_rate: u32,
}

impl VoskEngine {
    /// Load a Vosk model from the given directory
    ///
    /// # Errors
    ///
    /// Returns `Error::DecoderUnavailable` if the directory is missing or the
    /// model fails to load
    pub fn load(model_path: &Path, sample_rate: u32) -> Result<Self> {
        if !model_path.exists() {
            return Err(Error::DecoderUnavailable(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        let path = model_path.to_string_lossy();
        let model = Model::new(path.as_ref()).ok_or_else(|| {
            Error::DecoderUnavailable(format!("failed to load model: {}", model_path.display()))
        })?;

        tracing::info!(path = %model_path.display(), sample_rate, "vosk model loaded");
        Ok(Self {
            model: Arc::new(model),
            sample_rate,
        })
    }
}

impl SpeechEngine for VoskEngine {
    fn name(&self) -> &'static str {
        "vosk"
    }

    fn create_stream(&self) -> Result<Box<dyn StreamingDecoder>> {
        #[allow(clippy::cast_precision_loss)]
        let recognizer = Recognizer::new(&self.model, self.sample_rate as f32).ok_or_else(|| {
            Error::DecoderUnavailable("failed to create recognizer".to_string())
        })?;

        Ok(Box::new(VoskStream { recognizer }))
    }
}

struct VoskStream {
    recognizer: Recognizer,
}

impl StreamingDecoder for VoskStream {
    fn accept_pcm(&mut self, samples: &[i16]) -> Result<DecodeEvent> {
        let state = self
            .recognizer
            .accept_waveform(samples)
            .map_err(|e| Error::DecoderUnavailable(format!("accept_waveform: {e}")))?;

        match state {
            DecodingState::Finalized => {
                let text = self
                    .recognizer
                    .result()
                    .single()
                    .map(|r| r.text.to_string())
                    .unwrap_or_default();
                Ok(DecodeEvent::Final(text))
            }
            DecodingState::Running => {
                let partial = self.recognizer.partial_result().partial.to_string();
                Ok(DecodeEvent::Partial(partial))
            }
            DecodingState::Failed => Err(Error::DecoderUnavailable(
                "recognizer entered failed state".to_string(),
            )),
        }
    }

    fn finalize(&mut self) -> Result<Option<String>> {
        let text = self
            .recognizer
            .final_result()
            .single()
            .map(|r| r.text.to_string());
        Ok(text.filter(|t| !t.is_empty()))
    }
}
