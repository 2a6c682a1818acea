//! Conversion from the device's native capture format to the recognizer's
//! expected format: interleaved multi-channel at the native rate in, mono at
//! the target rate out.

/// Averages channels to mono and decimates by a fixed integer ratio.
///
/// Decimation keeps the first sample of each complete group of `ratio`
/// samples, so the output length is always `floor(mono_len / ratio)`. An
/// incomplete trailing group is discarded.
#[derive(Debug, Clone, Copy)]
pub struct SampleRateAdapter {
    channels: u16,
    ratio: usize,
}

impl SampleRateAdapter {
    /// Create an adapter for the given channel count and decimation ratio.
    /// A ratio of 1 performs channel averaging only.
    #[must_use]
    pub fn new(channels: u16, ratio: usize) -> Self {
        Self {
            channels: channels.max(1),
            ratio: ratio.max(1),
        }
    }

    /// Convert one interleaved frame to mono at the target rate
    #[must_use]
    pub fn adapt(&self, samples: &[i16]) -> Vec<i16> {
        let mono = self.to_mono(samples);
        if self.ratio == 1 {
            return mono;
        }
        mono.chunks_exact(self.ratio).map(|group| group[0]).collect()
    }

    /// Average interleaved channels down to mono. A trailing partial sample
    /// group (sample count not divisible by the channel count) is dropped
    /// before reshaping.
    fn to_mono(&self, samples: &[i16]) -> Vec<i16> {
        let channels = self.channels as usize;
        if channels == 1 {
            return samples.to_vec();
        }

        let usable = samples.len() - samples.len() % channels;
        samples[..usable]
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                #[allow(clippy::cast_possible_truncation)]
                {
                    (sum / channels as i32) as i16
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_averaging() {
        let adapter = SampleRateAdapter::new(2, 1);
        let mono = adapter.adapt(&[100, 200, -100, -200, 0, 50]);
        assert_eq!(mono, vec![150, -150, 25]);
    }

    #[test]
    fn odd_trailing_sample_dropped_before_reshaping() {
        let adapter = SampleRateAdapter::new(2, 1);
        // 5 samples cannot reshape to stereo pairs; the 5th is dropped
        let mono = adapter.adapt(&[10, 20, 30, 40, 99]);
        assert_eq!(mono, vec![15, 35]);
    }

    #[test]
    fn decimation_keeps_every_third_sample() {
        let adapter = SampleRateAdapter::new(1, 3);
        let out = adapter.adapt(&[0, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(out, vec![0, 3, 6]);
    }

    #[test]
    fn output_length_is_floor_of_mono_length_over_ratio() {
        let adapter = SampleRateAdapter::new(2, 3);
        // 20 interleaved stereo samples -> 10 mono -> floor(10/3) = 3
        let input: Vec<i16> = (0..20).collect();
        assert_eq!(adapter.adapt(&input).len(), 10 / 3);
    }

    #[test]
    fn incomplete_trailing_group_discarded() {
        let adapter = SampleRateAdapter::new(1, 3);
        // 7 mono samples -> floor(7/3) = 2, indices 0 and 3
        let out = adapter.adapt(&[0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(out, vec![0, 3]);
    }

    #[test]
    fn short_input_yields_empty_output() {
        let adapter = SampleRateAdapter::new(1, 3);
        assert!(adapter.adapt(&[1, 2]).is_empty());
    }

    #[test]
    fn ratio_one_passes_mono_through() {
        let adapter = SampleRateAdapter::new(1, 1);
        assert_eq!(adapter.adapt(&[5, 6, 7]), vec![5, 6, 7]);
    }
}
