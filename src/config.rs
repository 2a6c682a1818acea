//! Configuration loaded from environment variables
//!
//! Layering is env > default, matching how the controller is deployed
//! (systemd unit with an `EnvironmentFile`). Variable names are part of the
//! device's operational surface and are kept stable.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Complete controller configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server binding
    pub server: ServerConfig,

    /// Dialog backend endpoint
    pub backend: BackendConfig,

    /// Audio capture/playback formats and artifact directory
    pub audio: AudioConfig,

    /// Voice activity detection tuning
    pub vad: VadConfig,

    /// Wake phrase set and acceptance tuning
    pub wake: WakeWordConfig,

    /// Speech recognition model location
    pub decoder: DecoderConfig,

    /// Mouth servo hardware parameters
    pub servo: ServoConfig,

    /// Delay before the listener resumes after a session, so lingering
    /// capture-buffer audio cannot immediately re-trigger
    pub resume_delay: Duration,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Development mode: response audio is saved with the `output_` prefix
    /// instead of `tts_` so it can be inspected alongside recordings
    pub development_mode: bool,
}

/// Dialog backend configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the dialog backend
    pub base_url: String,

    /// Per-request timeout
    pub timeout: Duration,
}

/// Audio configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Directory for persisted utterances and response audio
    pub audio_path: PathBuf,

    /// Sample rate the recognizer expects (decimation target)
    pub sample_rate: u32,

    /// Channel count for persisted recordings
    pub channels: u16,

    /// Native sample rate of the capture hardware
    pub native_sample_rate: u32,

    /// Native channel count of the capture hardware
    pub native_channels: u16,

    /// Samples per frame, per channel
    pub frame_size: usize,

    /// Capture/playback device name; `None` selects the host default
    pub device: Option<String>,
}

/// Voice activity detection configuration
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Sustained silence that ends an utterance
    pub silence_duration: Duration,

    /// Normalized RMS energy above which a frame counts as speech
    pub energy_threshold: f32,

    /// Hard cap on recording length
    pub max_recording_duration: Duration,
}

/// Wake word configuration. Immutable after load.
#[derive(Debug, Clone)]
pub struct WakeWordConfig {
    /// Accepted phrases, lowercased and trimmed at load
    pub phrases: Vec<String>,

    /// Minimum confidence in [0, 1] to accept a detection
    pub confidence_threshold: f32,

    /// Refractory period after an accepted detection
    pub cooldown: Duration,
}

/// Speech recognition configuration
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Path to the recognition model directory
    pub model_path: PathBuf,
}

/// Servo configuration
#[derive(Debug, Clone)]
pub struct ServoConfig {
    /// sysfs PWM chip index
    pub pwm_chip: u32,

    /// sysfs PWM channel index on the chip
    pub pwm_channel: u32,

    /// Pulse width at 0 degrees, microseconds
    pub min_pulse: f32,

    /// Pulse width at 180 degrees, microseconds
    pub max_pulse: f32,

    /// Rest position the mouth returns to, degrees
    pub closed_position: i32,
}

impl Config {
    /// Load configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns error if a value fails validation (e.g. the native sample
    /// rate is not an integer multiple of the recognizer rate)
    pub fn from_env() -> Result<Self> {
        let config = Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0".to_string()),
                port: env_or("PORT", 3000),
                development_mode: env_flag("DEVELOPMENT_MODE", true),
            },
            backend: BackendConfig {
                base_url: env_or("BACKEND_URL", "http://localhost:3001".to_string()),
                timeout: Duration::from_secs_f64(env_or("BACKEND_TIMEOUT", 30.0)),
            },
            audio: AudioConfig {
                audio_path: PathBuf::from(env_or("AUDIO_PATH", "./audio".to_string())),
                sample_rate: env_or("SAMPLE_RATE", 16_000),
                channels: env_or("CHANNELS", 1),
                native_sample_rate: env_or("NATIVE_SAMPLE_RATE", 48_000),
                native_channels: env_or("NATIVE_CHANNELS", 2),
                frame_size: env_or("FRAME_SIZE", 4000),
                device: std::env::var("AUDIO_DEVICE").ok(),
            },
            vad: VadConfig {
                silence_duration: Duration::from_secs_f64(env_or("VAD_SILENCE_DURATION", 2.0)),
                energy_threshold: env_or("VAD_ENERGY_THRESHOLD", 0.01),
                max_recording_duration: Duration::from_secs_f64(env_or(
                    "MAX_RECORDING_DURATION",
                    30.0,
                )),
            },
            wake: WakeWordConfig {
                phrases: split_phrases(&env_or(
                    "WAKE_WORDS",
                    "furby,hey furby,furby wake up".to_string(),
                )),
                confidence_threshold: env_or("WAKE_WORD_CONFIDENCE", 0.7),
                cooldown: Duration::from_secs_f64(env_or("WAKE_WORD_COOLDOWN", 5.0)),
            },
            decoder: DecoderConfig {
                model_path: PathBuf::from(env_or(
                    "MODEL_PATH",
                    "./models/vosk-model-small-en-us-0.15".to_string(),
                )),
            },
            servo: ServoConfig {
                pwm_chip: env_or("SERVO_PWM_CHIP", 0),
                pwm_channel: env_or("SERVO_PWM_CHANNEL", 0),
                min_pulse: env_or("SERVO_MIN_PULSE", 500.0),
                max_pulse: env_or("SERVO_MAX_PULSE", 2500.0),
                closed_position: env_or("SERVO_CLOSED_POSITION", 90),
            },
            resume_delay: Duration::from_secs_f64(env_or("RESUME_DELAY", 1.0)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first violated constraint
    pub fn validate(&self) -> Result<()> {
        if self.audio.frame_size == 0 {
            return Err(Error::Config("FRAME_SIZE must be positive".to_string()));
        }
        if self.audio.sample_rate == 0 || self.audio.native_sample_rate == 0 {
            return Err(Error::Config("sample rates must be positive".to_string()));
        }
        if self.audio.native_sample_rate % self.audio.sample_rate != 0 {
            return Err(Error::Config(format!(
                "NATIVE_SAMPLE_RATE {} is not an integer multiple of SAMPLE_RATE {}",
                self.audio.native_sample_rate, self.audio.sample_rate
            )));
        }
        if self.audio.native_channels == 0 {
            return Err(Error::Config("NATIVE_CHANNELS must be positive".to_string()));
        }
        if self.wake.phrases.is_empty() {
            return Err(Error::Config("WAKE_WORDS must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.wake.confidence_threshold) {
            return Err(Error::Config(
                "WAKE_WORD_CONFIDENCE must be within [0, 1]".to_string(),
            ));
        }
        if self.servo.max_pulse <= self.servo.min_pulse {
            return Err(Error::Config(
                "SERVO_MAX_PULSE must exceed SERVO_MIN_PULSE".to_string(),
            ));
        }
        Ok(())
    }

    /// Decimation ratio from the native capture rate down to the recognizer
    /// rate. Validated to be integral by [`Config::validate`].
    #[must_use]
    pub const fn decimation_ratio(&self) -> usize {
        (self.audio.native_sample_rate / self.audio.sample_rate) as usize
    }
}

/// Read an environment variable, parse it, fall back to the default on
/// absence or parse failure
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a boolean flag: "true"/"1" (any case) is true, "false"/"0" is false
fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key).map_or(default, |v| {
        matches!(v.trim().to_lowercase().as_str(), "true" | "1")
    })
}

/// Split a comma-separated phrase list, trimming and lowercasing each entry
fn split_phrases(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}
