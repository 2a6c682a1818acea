//! Mouth servo animation
//!
//! Drives the single mouth servo either from a phoneme timeline, a canned
//! talking sequence, or a named emotion sequence. Animation is a blocking,
//! time-stepped walk through positions; callers that need it concurrent with
//! playback run it on its own thread and join. Concurrent `animate`/`express`
//! calls are not guarded and would interleave; the composition keeps a single
//! driver at a time by convention.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ServoConfig;
use crate::{Error, Result};

/// Canned talking sequence used when no phoneme timeline is available
const DEFAULT_SEQUENCE: [i32; 7] = [45, 90, 60, 80, 50, 70, 90];

/// Step delay for the canned talking sequence
const DEFAULT_STEP: Duration = Duration::from_millis(200);

/// Step delay for emotion sequences
const EMOTION_STEP: Duration = Duration::from_millis(300);

/// Standard hobby-servo PWM period (50 Hz), nanoseconds
const PWM_PERIOD_NS: u64 = 20_000_000;

/// One step of a phoneme timeline: a speech sound and how long the mouth
/// holds its position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhonemeEvent {
    /// Phoneme symbol (ARPABET-style, e.g. "AA", "M")
    pub phoneme: String,

    /// Hold time in seconds
    #[serde(default)]
    pub duration: f32,
}

/// The physical position-setter behind the animator
pub trait Actuator: Send + Sync {
    /// Driver name for logs and the status surface
    fn name(&self) -> &'static str;

    /// Command a pulse width in microseconds
    ///
    /// # Errors
    ///
    /// Returns `Error::ActuatorUnavailable` if the hardware write fails
    fn set_pulse_width(&self, micros: f32) -> Result<()>;
}

/// Servo driven through the Linux sysfs PWM interface
pub struct SysfsPwmActuator {
    duty_path: PathBuf,
}

impl SysfsPwmActuator {
    /// Open an exported PWM channel and configure the 50 Hz servo period
    ///
    /// # Errors
    ///
    /// Returns `Error::ActuatorUnavailable` if the channel is not exported or
    /// cannot be configured
    pub fn open(chip: u32, channel: u32) -> Result<Self> {
        let base = PathBuf::from(format!("/sys/class/pwm/pwmchip{chip}/pwm{channel}"));
        if !base.exists() {
            return Err(Error::ActuatorUnavailable(format!(
                "pwm channel not exported: {}",
                base.display()
            )));
        }

        std::fs::write(base.join("period"), PWM_PERIOD_NS.to_string())
            .map_err(|e| Error::ActuatorUnavailable(format!("set period: {e}")))?;
        std::fs::write(base.join("enable"), "1")
            .map_err(|e| Error::ActuatorUnavailable(format!("enable: {e}")))?;

        tracing::info!(chip, channel, "servo actuator initialized");
        Ok(Self {
            duty_path: base.join("duty_cycle"),
        })
    }
}

impl Actuator for SysfsPwmActuator {
    fn name(&self) -> &'static str {
        "sysfs-pwm"
    }

    fn set_pulse_width(&self, micros: f32) -> Result<()> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let duty_ns = (micros.max(0.0) * 1000.0) as u64;
        std::fs::write(&self.duty_path, duty_ns.to_string())
            .map_err(|e| Error::ActuatorUnavailable(format!("set duty cycle: {e}")))?;
        Ok(())
    }
}

/// No-hardware actuator that logs simulated moves
pub struct MockActuator;

impl Actuator for MockActuator {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn set_pulse_width(&self, micros: f32) -> Result<()> {
        tracing::debug!(micros, "simulated servo pulse");
        Ok(())
    }
}

/// Animates the mouth servo and mirrors its last commanded position
pub struct ServoAnimator {
    actuator: Box<dyn Actuator>,
    config: ServoConfig,
    position: AtomicI32,
    fault_logged: AtomicBool,
}

impl ServoAnimator {
    /// Create an animator over the given actuator. The tracked position
    /// starts at the closed/rest position.
    #[must_use]
    pub fn new(actuator: Box<dyn Actuator>, config: ServoConfig) -> Self {
        let position = AtomicI32::new(config.closed_position);
        Self {
            actuator,
            config,
            position,
            fault_logged: AtomicBool::new(false),
        }
    }

    /// Name of the actuator driver in use
    #[must_use]
    pub fn actuator_name(&self) -> &'static str {
        self.actuator.name()
    }

    /// Last commanded position in degrees
    #[must_use]
    pub fn position(&self) -> i32 {
        self.position.load(Ordering::Relaxed)
    }

    /// Move to a position in degrees. Out-of-range values are clamped to
    /// [0, 180]. Never fails from the caller's perspective: hardware faults
    /// degrade to logged simulated moves.
    pub fn move_to(&self, position: i32) {
        let clamped = position.clamp(0, 180);

        #[allow(clippy::cast_precision_loss)]
        let fraction = clamped as f32 / 180.0;
        let pulse =
            self.config.min_pulse + fraction * (self.config.max_pulse - self.config.min_pulse);

        if let Err(e) = self.actuator.set_pulse_width(pulse) {
            if !self.fault_logged.swap(true, Ordering::Relaxed) {
                tracing::warn!(error = %e, "actuator fault, continuing with simulated moves");
            }
        }

        self.position.store(clamped, Ordering::Relaxed);
        tracing::trace!(position = clamped, pulse, "servo moved");
    }

    /// Animate the mouth: walk a phoneme timeline when one is given,
    /// otherwise run the canned talking sequence. Blocks for the whole
    /// animation and always ends at the closed position.
    pub fn animate(&self, phonemes: Option<&[PhonemeEvent]>) {
        match phonemes {
            Some(events) if !events.is_empty() => {
                tracing::debug!(events = events.len(), "phoneme animation");
                for event in events {
                    self.move_to(self.phoneme_position(&event.phoneme));
                    std::thread::sleep(Duration::from_secs_f32(event.duration.max(0.0)));
                }
            }
            _ => {
                tracing::debug!("default talking animation");
                for &position in &DEFAULT_SEQUENCE {
                    self.move_to(position);
                    std::thread::sleep(DEFAULT_STEP);
                }
            }
        }

        self.move_to(self.config.closed_position);
    }

    /// Step through a named emotion sequence, falling back to a neutral
    /// sequence for unknown names. Blocks and ends at the closed position.
    pub fn express(&self, emotion: &str) {
        let positions: &[i32] = match emotion {
            "happy" => &[30, 60, 40, 70, 45],
            "sad" => &[90, 75, 85, 70, 90],
            "excited" => &[20, 80, 30, 90, 25, 85],
            "sleepy" => &[85, 90, 88, 92, 90],
            _ => &[90, 60, 90],
        };

        tracing::debug!(emotion, "expressing emotion");
        for &position in positions {
            self.move_to(position);
            std::thread::sleep(EMOTION_STEP);
        }

        self.move_to(self.config.closed_position);
    }

    /// Mouth position for a phoneme symbol; unrecognized symbols fall back
    /// to the closed position
    fn phoneme_position(&self, phoneme: &str) -> i32 {
        match phoneme.to_uppercase().as_str() {
            "AA" => 70,
            "AE" => 65,
            "AH" | "ER" | "NG" | "CH" | "ZH" => 60,
            "AO" => 75,
            "AW" | "OY" | "K" => 80,
            "AY" => 70,
            "EH" | "HH" | "SH" | "N" => 55,
            "EY" | "L" | "T" | "Y" | "Z" | "D" => 50,
            "IY" => 40,
            "OW" | "W" => 85,
            "UH" | "G" | "V" => 70,
            "UW" | "B" | "M" | "P" => 90,
            "IH" | "DH" | "S" | "TH" => 45,
            "F" => 75,
            "JH" | "R" => 65,
            _ => self.config.closed_position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servo_config() -> ServoConfig {
        ServoConfig {
            pwm_chip: 0,
            pwm_channel: 0,
            min_pulse: 500.0,
            max_pulse: 2500.0,
            closed_position: 90,
        }
    }

    fn animator() -> ServoAnimator {
        ServoAnimator::new(Box::new(MockActuator), servo_config())
    }

    #[test]
    fn move_to_clamps_below_zero() {
        let servo = animator();
        servo.move_to(-10);
        assert_eq!(servo.position(), 0);
    }

    #[test]
    fn move_to_clamps_above_180() {
        let servo = animator();
        servo.move_to(300);
        assert_eq!(servo.position(), 180);
    }

    #[test]
    fn move_to_tracks_in_range_position() {
        let servo = animator();
        servo.move_to(45);
        assert_eq!(servo.position(), 45);
    }

    #[test]
    fn initial_position_is_closed() {
        assert_eq!(animator().position(), 90);
    }

    #[test]
    fn animate_none_ends_at_closed_position() {
        let servo = animator();
        servo.animate(None);
        assert_eq!(servo.position(), servo_config().closed_position);
    }

    #[test]
    fn animate_empty_timeline_runs_canned_sequence() {
        let servo = animator();
        servo.animate(Some(&[]));
        assert_eq!(servo.position(), servo_config().closed_position);
    }

    #[test]
    fn phoneme_timeline_ends_at_closed_position() {
        let servo = animator();
        let timeline = vec![
            PhonemeEvent {
                phoneme: "AA".to_string(),
                duration: 0.0,
            },
            PhonemeEvent {
                phoneme: "M".to_string(),
                duration: 0.0,
            },
        ];
        servo.animate(Some(&timeline));
        assert_eq!(servo.position(), servo_config().closed_position);
    }

    #[test]
    fn unknown_phoneme_falls_back_to_closed() {
        let servo = animator();
        assert_eq!(servo.phoneme_position("??"), 90);
        assert_eq!(servo.phoneme_position("AA"), 70);
        assert_eq!(servo.phoneme_position("m"), 90);
    }

    #[test]
    fn unknown_emotion_uses_neutral_sequence() {
        let servo = animator();
        servo.express("confused");
        assert_eq!(servo.position(), servo_config().closed_position);
    }

    struct FailingActuator;

    impl Actuator for FailingActuator {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn set_pulse_width(&self, _micros: f32) -> Result<()> {
            Err(Error::ActuatorUnavailable("gone".to_string()))
        }
    }

    #[test]
    fn actuator_fault_does_not_block_position_tracking() {
        let servo = ServoAnimator::new(Box::new(FailingActuator), servo_config());
        servo.move_to(120);
        assert_eq!(servo.position(), 120);
    }
}
