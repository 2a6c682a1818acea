//! Top-level voice session orchestration
//!
//! Sequences one wake-triggered interaction: record the command, transcribe
//! it, call the dialog backend, then deliver the response as concurrent
//! playback and mouth animation. At most one session runs at a time; a
//! trigger during an active session is dropped, not queued. The listener
//! resumes after a short fixed delay in every outcome so lingering audio in
//! the capture buffer cannot immediately re-trigger it.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::artifacts::{ArtifactStore, ResponseAudioKind};
use crate::audio::{AudioDeviceArbiter, AudioFrame, StreamSpec, wav};
use crate::backend::{BackendClient, DialogResponse};
use crate::config::Config;
use crate::decoder::{self, SpeechEngine};
use crate::listener::WakeWordListener;
use crate::recorder::CommandRecorder;
use crate::servo::{PhonemeEvent, ServoAnimator};
use crate::{Error, Result};

/// Logical stream id used for response playback
pub const PLAYBACK_STREAM_ID: &str = "response";

/// Samples per playback write
const PLAYBACK_CHUNK: usize = 1024;

/// Session-level knobs lifted from the configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Frame size used when replaying an utterance through the decoder
    pub frame_size: usize,

    /// Hard cap on command recording length
    pub max_recording: Duration,

    /// Delay before the listener resumes after a session
    pub resume_delay: Duration,

    /// Development mode switches response artifacts to the `output_` prefix
    pub development_mode: bool,
}

impl SessionSettings {
    /// Extract the session knobs from the loaded configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            frame_size: config.audio.frame_size,
            max_recording: config.vad.max_recording_duration,
            resume_delay: config.resume_delay,
            development_mode: config.server.development_mode,
        }
    }
}

/// Orchestrates wake-triggered voice sessions
pub struct SessionOrchestrator {
    arbiter: Arc<AudioDeviceArbiter>,
    recorder: CommandRecorder,
    engine: Option<Arc<dyn SpeechEngine>>,
    backend: BackendClient,
    servo: Arc<ServoAnimator>,
    artifacts: ArtifactStore,
    settings: SessionSettings,
    listener: Mutex<Option<Arc<WakeWordListener>>>,
    is_processing: AtomicBool,
}

impl SessionOrchestrator {
    /// Create an orchestrator over the assembled components. The engine is
    /// optional: without it sessions abort after recording (degraded,
    /// manual-trigger-only operation).
    #[must_use]
    pub fn new(
        arbiter: Arc<AudioDeviceArbiter>,
        recorder: CommandRecorder,
        engine: Option<Arc<dyn SpeechEngine>>,
        backend: BackendClient,
        servo: Arc<ServoAnimator>,
        artifacts: ArtifactStore,
        settings: SessionSettings,
    ) -> Self {
        Self {
            arbiter,
            recorder,
            engine,
            backend,
            servo,
            artifacts,
            settings,
            listener: Mutex::new(None),
            is_processing: AtomicBool::new(false),
        }
    }

    /// Attach the listener to resume after sessions. Set once at the
    /// composition root; kept separate from the constructor because the
    /// listener's wake callback points back at this orchestrator.
    pub fn attach_listener(&self, listener: Arc<WakeWordListener>) {
        if let Ok(mut slot) = self.listener.lock() {
            *slot = Some(listener);
        }
    }

    /// Whether a session is currently running
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }

    /// Handle a wake trigger on a fresh worker thread and return
    /// immediately. The listener callback and the `/wake` route both land
    /// here.
    pub fn trigger(self: &Arc<Self>) {
        let this = Arc::clone(self);
        std::thread::spawn(move || this.run_session());
    }

    /// Run one complete session on the calling thread
    pub fn run_session(&self) {
        if self
            .is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("session already in progress, ignoring trigger");
            return;
        }

        tracing::info!("voice session started");

        // The listener pauses itself before its wake callback; manual /wake
        // triggers arrive without that, so pause defensively before the
        // recorder takes the capture stream
        let listener = self.listener.lock().ok().and_then(|slot| slot.clone());
        if let Some(listener) = &listener {
            listener.pause();
        }

        match self.run_sequence() {
            Ok(()) => tracing::info!("voice session completed"),
            // Expected aborts: nothing was understood, so nothing to express
            Err(
                e @ (Error::RecordingEmpty
                | Error::TranscriptionEmpty
                | Error::DecoderUnavailable(_)),
            ) => {
                tracing::warn!(reason = %e, "voice session aborted");
            }
            Err(e) => {
                tracing::error!(error = %e, "voice session failed");
                // Best-effort failure signal; express cannot fail
                self.servo.express("sad");
            }
        }

        self.is_processing.store(false, Ordering::SeqCst);

        std::thread::sleep(self.settings.resume_delay);
        if let Some(listener) = listener {
            listener.resume();
        }
    }

    fn run_sequence(&self) -> Result<()> {
        let utterance = self
            .recorder
            .record(self.settings.max_recording)?
            .ok_or(Error::RecordingEmpty)?;

        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| Error::DecoderUnavailable("no speech engine loaded".to_string()))?;

        let transcript =
            decoder::transcribe_wav(engine.as_ref(), &utterance.path, self.settings.frame_size)?;
        if transcript.trim().is_empty() {
            return Err(Error::TranscriptionEmpty);
        }
        tracing::info!(transcript = %transcript, "command transcribed");

        let response = self.backend.request_response(&transcript);
        self.deliver(&response)
    }

    /// Deliver a dialog response: playback with concurrent mouth animation
    /// when real audio is present, animation alone otherwise
    pub fn deliver(&self, response: &DialogResponse) -> Result<()> {
        match &response.audio {
            Some(audio) if !response.is_fallback => {
                let kind = if self.settings.development_mode {
                    ResponseAudioKind::Output
                } else {
                    ResponseAudioKind::Tts
                };
                let path = self.artifacts.save_response_audio(audio, kind)?;
                self.play_with_animation(&path, &response.phonemes)
            }
            _ if !response.phonemes.is_empty() => {
                tracing::debug!("phoneme-only response");
                self.servo.animate(Some(&response.phonemes));
                Ok(())
            }
            _ => {
                tracing::debug!("fallback animation, no audio or phonemes");
                self.servo.animate(None);
                Ok(())
            }
        }
    }

    /// Persist externally supplied response audio and deliver it with
    /// concurrent mouth animation (the `/respond` route)
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be decoded, persisted, or played
    pub fn play_response(&self, audio_b64: &str, phonemes: &[PhonemeEvent]) -> Result<()> {
        let kind = if self.settings.development_mode {
            ResponseAudioKind::Output
        } else {
            ResponseAudioKind::Tts
        };
        let path = self.artifacts.save_response_audio(audio_b64, kind)?;
        self.play_with_animation(&path, phonemes)
    }

    /// Play a persisted response artifact while animating the mouth, as two
    /// concurrently started units joined before returning
    pub fn play_with_animation(&self, path: &Path, phonemes: &[PhonemeEvent]) -> Result<()> {
        let timeline = (!phonemes.is_empty()).then_some(phonemes);

        let (playback, animation) = std::thread::scope(|s| {
            let playback = s.spawn(|| play_wav(&self.arbiter, path));
            let animation = s.spawn(|| self.servo.animate(timeline));
            (playback.join(), animation.join())
        });

        if animation.is_err() {
            tracing::error!("animation thread panicked");
        }
        playback.map_err(|_| Error::Audio("playback thread panicked".to_string()))?
    }
}

/// Play a WAV file through the arbiter's playback stream, blocking until the
/// queue drains. Degrades to a no-op when the device is unavailable.
///
/// # Errors
///
/// Returns error if the file cannot be decoded or an open stream faults
pub fn play_wav(arbiter: &AudioDeviceArbiter, path: &Path) -> Result<()> {
    let content = wav::read_wav(path)?;
    if content.samples.is_empty() {
        return Ok(());
    }

    let spec = StreamSpec {
        channels: content.channels,
        sample_rate: content.sample_rate,
        frame_size: PLAYBACK_CHUNK,
    };

    match arbiter.open_playback(PLAYBACK_STREAM_ID, &spec) {
        Ok(()) => {}
        Err(Error::DeviceUnavailable(reason)) => {
            tracing::warn!(reason, "playback unavailable, skipping");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    tracing::info!(path = %path.display(), samples = content.samples.len(), "playback started");

    let result = write_and_drain(arbiter, &content.samples, &spec);
    arbiter.close(PLAYBACK_STREAM_ID);

    if result.is_ok() {
        tracing::debug!("playback complete");
    }
    result
}

fn write_and_drain(arbiter: &AudioDeviceArbiter, samples: &[i16], spec: &StreamSpec) -> Result<()> {
    for chunk in samples.chunks(spec.samples_per_frame()) {
        arbiter.write(
            PLAYBACK_STREAM_ID,
            &AudioFrame {
                samples: chunk.to_vec(),
            },
        )?;
    }

    // Wait for the queue to drain, bounded by the audio length plus margin
    let expected = Duration::from_secs_f64(
        samples.len() as f64 / (f64::from(spec.sample_rate) * f64::from(spec.channels)),
    );
    let deadline = Instant::now() + expected + Duration::from_secs(2);

    while arbiter.pending_playback(PLAYBACK_STREAM_ID) > 0 {
        if Instant::now() > deadline {
            tracing::warn!("playback drain timed out");
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    // Let the final buffer reach the hardware
    std::thread::sleep(Duration::from_millis(100));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockBackend;
    use crate::config::{BackendConfig, ServoConfig, VadConfig};
    use crate::servo::MockActuator;

    fn test_orchestrator(max_recording_ms: u64) -> (Arc<SessionOrchestrator>, Arc<ServoAnimator>) {
        let arbiter = Arc::new(AudioDeviceArbiter::new(Arc::new(MockBackend::new())));
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.keep()).unwrap();

        let spec = StreamSpec {
            channels: 1,
            sample_rate: 16_000,
            frame_size: 160,
        };
        let vad = VadConfig {
            silence_duration: Duration::from_millis(50),
            energy_threshold: 0.01,
            max_recording_duration: Duration::from_millis(max_recording_ms),
        };
        let recorder = CommandRecorder::new(Arc::clone(&arbiter), artifacts.clone(), spec, vad);

        let servo = Arc::new(ServoAnimator::new(
            Box::new(MockActuator),
            ServoConfig {
                pwm_chip: 0,
                pwm_channel: 0,
                min_pulse: 500.0,
                max_pulse: 2500.0,
                closed_position: 90,
            },
        ));

        let backend = BackendClient::new(&BackendConfig {
            base_url: "http://localhost:1".to_string(),
            timeout: Duration::from_millis(100),
        });

        let orchestrator = Arc::new(SessionOrchestrator::new(
            arbiter,
            recorder,
            None, // no decoder: sessions abort after recording
            backend,
            Arc::clone(&servo),
            artifacts,
            SessionSettings {
                frame_size: 160,
                max_recording: Duration::from_millis(max_recording_ms),
                resume_delay: Duration::from_millis(10),
                development_mode: true,
            },
        ));

        (orchestrator, servo)
    }

    #[test]
    fn session_without_decoder_aborts_gracefully() {
        let (orchestrator, _servo) = test_orchestrator(100);
        orchestrator.run_session();
        assert!(!orchestrator.is_processing());
    }

    #[test]
    fn concurrent_trigger_is_dropped() {
        let (orchestrator, _servo) = test_orchestrator(300);

        let worker = {
            let orchestrator = Arc::clone(&orchestrator);
            std::thread::spawn(move || orchestrator.run_session())
        };

        // Wait for the first session to take the guard
        let deadline = Instant::now() + Duration::from_secs(2);
        while !orchestrator.is_processing() {
            assert!(Instant::now() < deadline, "first session never started");
            std::thread::sleep(Duration::from_millis(5));
        }

        // Second trigger must return immediately as a no-op
        let start = Instant::now();
        orchestrator.run_session();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(orchestrator.is_processing());

        worker.join().unwrap();
        assert!(!orchestrator.is_processing());
    }

    #[test]
    fn deliver_without_audio_or_phonemes_runs_canned_animation() {
        let (orchestrator, servo) = test_orchestrator(100);
        let response = DialogResponse {
            audio: None,
            phonemes: Vec::new(),
            text: "ok".to_string(),
            is_fallback: false,
        };

        orchestrator.deliver(&response).unwrap();
        assert_eq!(servo.position(), 90);
    }

    #[test]
    fn deliver_phonemes_only_animates() {
        let (orchestrator, servo) = test_orchestrator(100);
        let response = DialogResponse {
            audio: None,
            phonemes: vec![PhonemeEvent {
                phoneme: "AA".to_string(),
                duration: 0.0,
            }],
            text: "ok".to_string(),
            is_fallback: false,
        };

        orchestrator.deliver(&response).unwrap();
        assert_eq!(servo.position(), 90);
    }

    #[test]
    fn fallback_audio_is_not_played() {
        let (orchestrator, servo) = test_orchestrator(100);
        // A fallback response never carries audio in practice; even if it
        // did, the fallback branch must not persist or play it
        let response = DialogResponse {
            audio: Some("QUJD".to_string()),
            phonemes: Vec::new(),
            text: "offline".to_string(),
            is_fallback: true,
        };

        orchestrator.deliver(&response).unwrap();
        assert_eq!(servo.position(), 90);
    }
}
