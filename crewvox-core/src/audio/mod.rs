//! Audio buffers and PCM file handling.
//!
//! Capture itself happens outside this crate: a host hands the engine an
//! [`AudioBuffer`] holding whatever the microphone produced while the
//! push-to-talk key was held. Everything here is plain data plumbing on the
//! caller's thread.

pub mod resample;
pub mod wav;

use std::time::Duration;

/// Interleaved PCM samples in [-1.0, 1.0] with their format.
///
/// Owned by the caller of one recognition cycle and dropped when it ends.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples (`frames * channels` values).
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
    /// Channel count. `0` is treated as mono.
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Single-channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Channel count with `0` folded to `1`.
    pub fn channel_count(&self) -> usize {
        usize::from(self.channels.max(1))
    }

    /// Number of complete frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channel_count()
    }

    /// Returns the duration of this buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Returns true if the buffer contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Keep only the first `held` worth of audio.
    ///
    /// Capture devices usually record into a fixed-length clip; only the part
    /// covered by the key hold contains the utterance.
    pub fn truncate_to_duration(&mut self, held: Duration) {
        let frames = (held.as_secs_f64() * self.sample_rate as f64).round() as usize;
        let len = frames.saturating_mul(self.channel_count());
        if len < self.samples.len() {
            self.samples.truncate(len);
        }
    }

    /// Average interleaved channels into one mono sample per frame.
    ///
    /// Trailing samples that do not form a whole frame are dropped.
    pub fn downmix(&self) -> Vec<f32> {
        let ch = self.channel_count();
        if ch == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    }

    /// Mono copy of this buffer.
    pub fn to_mono(&self) -> AudioBuffer {
        AudioBuffer::mono(self.downmix(), self.sample_rate)
    }
}
