//! Startup capability probe
//!
//! Each hardware-adjacent subsystem is probed once at startup and the result
//! threaded through the composition root, which picks the real or mock
//! implementation per capability. Absent capabilities degrade the controller,
//! they never stop it.

use cpal::traits::HostTrait;
use serde::Serialize;

use crate::config::Config;

/// Which optional subsystems are backed by real implementations
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Capabilities {
    /// An audio input device is present
    pub audio: bool,

    /// A speech recognition backend and model are available
    pub decoder: bool,

    /// The servo PWM channel is exported
    pub actuator: bool,
}

impl Capabilities {
    /// Probe the host for each capability
    #[must_use]
    pub fn probe(config: &Config) -> Self {
        let audio = cpal::default_host().default_input_device().is_some();
        let decoder = cfg!(feature = "vosk") && config.decoder.model_path.exists();

        let pwm_path = format!(
            "/sys/class/pwm/pwmchip{}/pwm{}",
            config.servo.pwm_chip, config.servo.pwm_channel
        );
        let actuator = std::path::Path::new(&pwm_path).exists();

        let caps = Self {
            audio,
            decoder,
            actuator,
        };
        tracing::info!(
            audio = caps.audio,
            decoder = caps.decoder,
            actuator = caps.actuator,
            "capabilities probed"
        );

        if !caps.audio {
            tracing::warn!("no audio input device, running with mock audio");
        }
        if !caps.decoder {
            tracing::warn!("speech decoder unavailable, manual /wake trigger only");
        }
        if !caps.actuator {
            tracing::warn!("servo PWM not exported, using simulated moves");
        }

        caps
    }
}
