//! Leading/trailing silence removal by magnitude threshold.

use crate::audio::AudioBuffer;

/// Default magnitude below which a sample counts as silence.
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.01;

/// Drop leading and trailing frames whose every channel is below `threshold`.
///
/// Trimming is frame-aligned so interleaved channels stay paired. A clip with
/// no audible frame at all is returned unchanged.
pub fn trim_silence(buffer: &AudioBuffer, threshold: f32) -> AudioBuffer {
    let ch = buffer.channel_count();
    let audible = |frame: &[f32]| frame.iter().any(|s| s.abs() >= threshold);

    let frames: Vec<&[f32]> = buffer.samples.chunks_exact(ch).collect();
    let Some(first) = frames.iter().position(|f| audible(*f)) else {
        return buffer.clone();
    };
    let last = frames.iter().rposition(|f| audible(*f)).unwrap_or(first);

    AudioBuffer::new(
        buffer.samples[first * ch..(last + 1) * ch].to_vec(),
        buffer.sample_rate,
        buffer.channels,
    )
}
