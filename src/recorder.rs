//! Voice-activity-endpointed command recording
//!
//! On trigger the recorder opens its own capture stream through the arbiter,
//! accumulates frames until sustained silence follows speech or the maximum
//! duration elapses, and persists the take as a WAV artifact. Silence padding
//! is deliberately retained, not trimmed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::artifacts::ArtifactStore;
use crate::audio::{AudioDeviceArbiter, StreamSpec, VoiceActivityGate, frame_energy};
use crate::config::VadConfig;
use crate::{Error, Result};

/// Logical stream id the recorder holds on the arbiter
pub const STREAM_ID: &str = "recorder";

/// How long the loop sleeps when no frame is buffered yet
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A recorded, persisted voice command. Immutable after persistence.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Persisted WAV artifact
    pub path: PathBuf,

    /// Interleaved samples, silence padding included
    pub samples: Vec<i16>,

    /// Channel count
    pub channels: u16,

    /// Sample rate
    pub sample_rate: u32,

    /// Wall-clock length of the recording session
    pub duration_seconds: f64,
}

/// Records one voice command at a time through the arbiter
pub struct CommandRecorder {
    arbiter: Arc<AudioDeviceArbiter>,
    artifacts: ArtifactStore,
    spec: StreamSpec,
    vad: VadConfig,
}

impl CommandRecorder {
    /// Create a recorder capturing in the given format
    #[must_use]
    pub fn new(
        arbiter: Arc<AudioDeviceArbiter>,
        artifacts: ArtifactStore,
        spec: StreamSpec,
        vad: VadConfig,
    ) -> Self {
        Self {
            arbiter,
            artifacts,
            spec,
            vad,
        }
    }

    /// Record until end-of-utterance or `max_duration`. Returns `None` when
    /// recording cannot start (device unavailable) or zero frames were
    /// captured.
    ///
    /// # Errors
    ///
    /// Returns error if an open stream faults mid-recording or the artifact
    /// cannot be persisted
    pub fn record(&self, max_duration: Duration) -> Result<Option<Utterance>> {
        match self.arbiter.open_capture(STREAM_ID, &self.spec) {
            Ok(()) => {}
            Err(Error::DeviceUnavailable(reason)) => {
                tracing::warn!(reason, "recording unavailable");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        tracing::info!(max_duration = max_duration.as_secs_f64(), "recording started");

        let outcome = self.capture_loop(max_duration);
        // Release the device on every exit path
        self.arbiter.close(STREAM_ID);

        let (samples, duration_seconds) = outcome?;
        if samples.is_empty() {
            tracing::warn!("no audio captured");
            return Ok(None);
        }

        let path = self
            .artifacts
            .save_utterance(&samples, self.spec.channels, self.spec.sample_rate)?;
        tracing::info!(
            path = %path.display(),
            duration = duration_seconds,
            "recording saved"
        );

        Ok(Some(Utterance {
            path,
            samples,
            channels: self.spec.channels,
            sample_rate: self.spec.sample_rate,
            duration_seconds,
        }))
    }

    fn capture_loop(&self, max_duration: Duration) -> Result<(Vec<i16>, f64)> {
        let mut gate = VoiceActivityGate::new(
            self.vad.energy_threshold,
            self.vad.silence_duration,
        );
        let mut samples: Vec<i16> = Vec::new();
        let start = Instant::now();

        while start.elapsed() < max_duration {
            match self.arbiter.read(STREAM_ID)? {
                Some(frame) => {
                    let energy = frame_energy(&frame.samples);
                    // Speech and silence are both retained
                    samples.extend_from_slice(&frame.samples);

                    if gate.observe(energy, Instant::now()) {
                        tracing::debug!(
                            held = self.vad.silence_duration.as_secs_f64(),
                            "silence endpoint reached"
                        );
                        break;
                    }
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        }

        Ok((samples, start.elapsed().as_secs_f64()))
    }
}
