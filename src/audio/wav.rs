//! WAV encode/decode helpers for persisted audio

use std::io::Cursor;
use std::path::Path;

use crate::Result;

/// Encode 16-bit samples as WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[i16], channels: u16, sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Write 16-bit samples to a WAV file
///
/// # Errors
///
/// Returns error if the file cannot be written
pub fn write_wav(path: &Path, samples: &[i16], channels: u16, sample_rate: u32) -> Result<()> {
    let bytes = samples_to_wav(samples, channels, sample_rate)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Decoded WAV content
#[derive(Debug, Clone)]
pub struct WavContent {
    /// Interleaved 16-bit samples
    pub samples: Vec<i16>,

    /// Channel count
    pub channels: u16,

    /// Sample rate
    pub sample_rate: u32,
}

/// Read WAV bytes into 16-bit samples. Float WAVs are converted.
///
/// # Errors
///
/// Returns error if the bytes are not a decodable WAV
pub fn read_wav_bytes(bytes: &[u8]) -> Result<WavContent> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| {
                s.map(|v| {
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        (v.clamp(-1.0, 1.0) * 32767.0) as i16
                    }
                })
            })
            .collect::<std::result::Result<_, _>>()?,
    };

    Ok(WavContent {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

/// Read a WAV file into 16-bit samples
///
/// # Errors
///
/// Returns error if the file cannot be read or decoded
pub fn read_wav(path: &Path) -> Result<WavContent> {
    let bytes = std::fs::read(path)?;
    read_wav_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_magic() {
        let wav = samples_to_wav(&[0, 100, -100], 1, 16_000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > 44);
    }

    #[test]
    fn roundtrip_preserves_samples() {
        let original: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN, 42];
        let wav = samples_to_wav(&original, 1, 16_000).unwrap();

        let content = read_wav_bytes(&wav).unwrap();
        assert_eq!(content.samples, original);
        assert_eq!(content.channels, 1);
        assert_eq!(content.sample_rate, 16_000);
    }

    #[test]
    fn stereo_roundtrip_preserves_layout() {
        let original: Vec<i16> = vec![1, 2, 3, 4, 5, 6];
        let wav = samples_to_wav(&original, 2, 48_000).unwrap();

        let content = read_wav_bytes(&wav).unwrap();
        assert_eq!(content.channels, 2);
        assert_eq!(content.samples, original);
    }

    #[test]
    fn rejects_non_wav_bytes() {
        assert!(read_wav_bytes(b"definitely not a wav").is_err());
    }
}
