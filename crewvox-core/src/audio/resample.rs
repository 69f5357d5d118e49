//! Sample-rate conversion for the transcriber input file, using rubato.
//!
//! Captures arrive at whatever rate the host device runs at (commonly 44.1 or
//! 48 kHz). Whisper-style transcribers only accept 16 kHz mono, so the
//! capture file handed to them goes through [`resample_to`] first.
//! Fingerprints are always extracted from the original-rate audio.
//!
//! When both rates are equal no rubato session is created at all.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use super::AudioBuffer;
use crate::error::{CrewVoxError, Result};

/// Input frames per rubato call.
const CHUNK_FRAMES: usize = 1024;

/// Converts mono f32 audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input chunks between calls.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a converter from `source_rate` to `target_rate`.
    ///
    /// # Errors
    /// Returns `CrewVoxError::Resample` if rubato rejects the ratio.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }
        if source_rate == 0 || target_rate == 0 {
            return Err(CrewVoxError::Resample(format!(
                "cannot resample {source_rate} Hz -> {target_rate} Hz"
            )));
        }

        let ratio = target_rate as f64 / source_rate as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| CrewVoxError::Resample(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        debug!(source_rate, target_rate, chunk_size, "resampler created");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf,
        })
    }

    /// Process incoming samples, returning resampled output (may be empty).
    ///
    /// Samples are accumulated until a full `chunk_size` block is available;
    /// any remainder is kept for the next call or for [`finish`](Self::finish).
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(ref mut resampler) = self.resampler else {
            return Ok(samples.to_vec());
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();
        while self.input_buf.len() >= self.chunk_size {
            let input_slice = &self.input_buf[..self.chunk_size];
            let (_consumed, produced) = resampler
                .process_into_buffer(&[input_slice], &mut self.output_buf, None)
                .map_err(|e| CrewVoxError::Resample(e.to_string()))?;
            result.extend_from_slice(&self.output_buf[0][..produced]);
            self.input_buf.drain(..self.chunk_size);
        }

        Ok(result)
    }

    /// Flush the buffered remainder, zero-padded to a whole chunk.
    pub fn finish(&mut self) -> Result<Vec<f32>> {
        if self.resampler.is_none() || self.input_buf.is_empty() {
            self.input_buf.clear();
            return Ok(Vec::new());
        }
        let pad = self.chunk_size - self.input_buf.len();
        let tail = vec![0f32; pad];
        self.process(&tail)
    }

    /// Returns `true` when source rate == target rate.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Resample a whole clip to mono at `target_rate`.
///
/// Output length is trimmed to `frames * target_rate / source_rate` so the
/// zero padding of the last chunk never lengthens the clip.
pub fn resample_to(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    let mono = buffer.downmix();
    if buffer.sample_rate == target_rate {
        return Ok(AudioBuffer::mono(mono, target_rate));
    }

    let mut converter = RateConverter::new(buffer.sample_rate, target_rate, CHUNK_FRAMES)?;
    let mut out = converter.process(&mono)?;
    out.extend(converter.finish()?);

    let expected =
        (mono.len() as f64 * target_rate as f64 / buffer.sample_rate as f64).round() as usize;
    out.truncate(expected);

    Ok(AudioBuffer::mono(out, target_rate))
}
