//! Frame and stream descriptor types shared across the audio pipeline

use std::time::Duration;

use serde::Serialize;

/// Direction of an audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    /// Microphone input
    Capture,
    /// Speaker output
    Playback,
}

/// Format parameters for an audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    /// Interleaved channel count
    pub channels: u16,

    /// Samples per second, per channel
    pub sample_rate: u32,

    /// Samples per frame, per channel
    pub frame_size: usize,
}

impl StreamSpec {
    /// Total interleaved samples in one frame
    #[must_use]
    pub const fn samples_per_frame(&self) -> usize {
        self.frame_size * self.channels as usize
    }

    /// Wall-clock duration of one frame
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_size as f64 / f64::from(self.sample_rate))
    }
}

/// One frame of interleaved 16-bit samples. Transient: produced by a read,
/// consumed immediately by the next pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Interleaved samples, `channels * frame_size` entries
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Size of the frame in bytes (16-bit samples)
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }
}

/// A physical audio device as reported by the host
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDescriptor {
    /// Enumeration index
    pub index: usize,

    /// Host-reported device name
    pub name: String,

    /// Maximum input channel count
    pub channels: u16,

    /// Default sample rate
    pub sample_rate: u32,
}
