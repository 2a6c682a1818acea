//! Shared test utilities

use marionette::StreamSpec;

/// Generate a sine wave as 16-bit samples
#[must_use]
pub fn sine_samples(frequency: f32, duration_secs: f32, amplitude: f32, sample_rate: u32) -> Vec<i16> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let value = amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin();
            (value.clamp(-1.0, 1.0) * 32767.0) as i16
        })
        .collect()
}

/// Generate silence as 16-bit samples
#[must_use]
pub fn silence_samples(duration_secs: f32, sample_rate: u32) -> Vec<i16> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    vec![0; num_samples]
}

/// Small mono stream spec used across pipeline tests (10ms frames)
#[must_use]
pub fn small_spec() -> StreamSpec {
    StreamSpec {
        channels: 1,
        sample_rate: 16_000,
        frame_size: 160,
    }
}
