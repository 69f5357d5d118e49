//! 16-bit PCM RIFF/WAVE read and write.
//!
//! Mono and stereo files are written with the canonical 44-byte header
//! (`RIFF` / `WAVE` / `fmt ` / `data`, format tag 1). Wider layouts would need
//! the extensible header, so they are downmixed to mono first. Reading accepts any
//! integer or float PCM file hound understands and converts to f32.

use std::fs;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::AudioBuffer;
use crate::error::Result;

/// Write `buffer` as a 16-bit PCM WAV file, creating parent directories.
///
/// Samples are clamped to [-1.0, 1.0] before quantisation. Buffers with more
/// than two channels are written as their mono downmix.
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mono;
    let buffer = if buffer.channels > 2 {
        mono = buffer.to_mono();
        &mono
    } else {
        buffer
    };

    let spec = WavSpec {
        channels: buffer.channels.max(1),
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &buffer.samples {
        writer.write_sample(to_pcm16(sample))?;
    }
    writer.finalize()?;
    Ok(())
}

/// Read a PCM WAV file into an interleaved f32 buffer.
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, hound::Error>>()?,
        SampleFormat::Int if spec.bits_per_sample <= 16 => reader
            .samples::<i16>()
            .map(|s| s.map(from_pcm16))
            .collect::<std::result::Result<Vec<f32>, hound::Error>>()?,
        SampleFormat::Int => {
            let max = ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<Vec<f32>, hound::Error>>()?
        }
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate, spec.channels))
}

fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn from_pcm16(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_file_has_44_byte_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip.wav");
        let buf = AudioBuffer::mono(vec![0.0, 0.5, -0.5, 1.0], 16_000);

        write_wav(&path, &buf).expect("write wav");

        let bytes = fs::read(&path).expect("read back");
        assert_eq!(bytes.len(), 44 + 4 * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u16::from_le_bytes([bytes[20], bytes[21]]), 1);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]), 8);
    }

    #[test]
    fn stereo_samples_survive_write_and_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("stereo.wav");
        let buf = AudioBuffer::new(vec![0.25, -0.25, 0.75, -0.75], 44_100, 2);

        write_wav(&path, &buf).expect("write wav");
        let back = read_wav(&path).expect("read wav");

        assert_eq!(back.channels, 2);
        assert_eq!(back.sample_rate, 44_100);
        assert_eq!(back.samples.len(), 4);
        for (a, b) in back.samples.iter().zip(&buf.samples) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn wide_layouts_are_written_as_plain_mono_pcm() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("quad.wav");
        // Two four-channel frames.
        let buf = AudioBuffer::new(vec![0.4, 0.0, 0.4, 0.0, -0.2, -0.2, -0.2, -0.2], 16_000, 4);

        write_wav(&path, &buf).expect("write wav");

        let bytes = fs::read(&path).expect("read back");
        assert_eq!(bytes.len(), 44 + 2 * 2);
        assert_eq!(u16::from_le_bytes([bytes[20], bytes[21]]), 1);
        assert_eq!(u16::from_le_bytes([bytes[22], bytes[23]]), 1);

        let back = read_wav(&path).expect("read wav");
        assert_eq!(back.channels, 1);
        assert!((back.samples[0] - 0.2).abs() < 1e-3);
        assert!((back.samples[1] + 0.2).abs() < 1e-3);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        assert_eq!(to_pcm16(2.0), i16::MAX);
        assert_eq!(to_pcm16(-2.0), -i16::MAX);
    }

    #[test]
    fn reading_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(read_wav(&dir.path().join("absent.wav")).is_err());
    }
}
