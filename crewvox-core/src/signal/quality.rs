//! Heuristic signal confidence for a captured utterance.
//!
//! Three cues, each mapped into [0, 1] before fusion:
//!
//! | Cue | Measure | Window | Weight |
//! |-----|---------|--------|--------|
//! | loudness | RMS of the whole clip | 0.02 – 0.15 | 0.5 |
//! | variance | std-dev of 32 equal-chunk RMS energies | 0.005 – 0.05 | 0.3 |
//! | spectral balance | (mid + high) / low band projection | 0.3 – 2.0 | 0.2 |
//!
//! Speech is loud-ish, bursty and carries energy above 800 Hz; steady hum
//! and fan noise fail at least two of those.

use std::f32::consts::PI;

const CHUNKS: usize = 32;
const BAND_WINDOW: usize = 2048;
const BALANCE_EPS: f32 = 1e-6;

const LOUDNESS_RANGE: (f32, f32) = (0.02, 0.15);
const VARIANCE_RANGE: (f32, f32) = (0.005, 0.05);
const BALANCE_RANGE: (f32, f32) = (0.3, 2.0);

const LOUDNESS_WEIGHT: f32 = 0.5;
const VARIANCE_WEIGHT: f32 = 0.3;
const BALANCE_WEIGHT: f32 = 0.2;

const LOW_BAND: (f32, f32) = (200.0, 800.0);
const MID_BAND: (f32, f32) = (800.0, 2000.0);
const HIGH_BAND: (f32, f32) = (2000.0, 4000.0);

/// Per-cue breakdown of one confidence estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalReport {
    pub loudness: f32,
    pub variance: f32,
    pub spectral_balance: f32,
    /// Weighted fusion of the three cues, in [0, 1].
    pub confidence: f32,
}

/// Score a mono waveform. Empty input scores zero.
pub fn assess(samples: &[f32], sample_rate: u32) -> SignalReport {
    if samples.is_empty() || sample_rate == 0 {
        return SignalReport::default();
    }

    let loudness = inverse_lerp(LOUDNESS_RANGE, rms(samples));
    let variance = inverse_lerp(VARIANCE_RANGE, chunk_energy_spread(samples));

    let low = band_projection(samples, LOW_BAND, sample_rate);
    let mid = band_projection(samples, MID_BAND, sample_rate);
    let high = band_projection(samples, HIGH_BAND, sample_rate);
    let spectral_balance = inverse_lerp(BALANCE_RANGE, (mid + high) / (low + BALANCE_EPS));

    let confidence = (loudness * LOUDNESS_WEIGHT
        + variance * VARIANCE_WEIGHT
        + spectral_balance * BALANCE_WEIGHT)
        .clamp(0.0, 1.0);

    SignalReport {
        loudness,
        variance,
        spectral_balance,
        confidence,
    }
}

/// Fused confidence only.
pub fn signal_confidence(samples: &[f32], sample_rate: u32) -> f32 {
    assess(samples, sample_rate).confidence
}

pub(crate) fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Standard deviation of the RMS energy of 32 equal-size chunks.
///
/// Chunks past the end of a very short clip count as silent.
fn chunk_energy_spread(samples: &[f32]) -> f32 {
    let chunk_size = (samples.len() / CHUNKS).max(1);
    let mut energies = [0f32; CHUNKS];
    for (i, energy) in energies.iter_mut().enumerate() {
        let start = (i * chunk_size).min(samples.len());
        let end = (start + chunk_size).min(samples.len());
        let sum: f32 = samples[start..end].iter().map(|s| s * s).sum();
        *energy = (sum / chunk_size as f32).sqrt();
    }

    let mean = energies.iter().sum::<f32>() / CHUNKS as f32;
    let var = energies.iter().map(|e| (e - mean) * (e - mean)).sum::<f32>() / CHUNKS as f32;
    var.sqrt()
}

/// Magnitude of a projection onto a frequency sweep from `band.0` to `band.1`
/// over the first 2048 samples.
fn band_projection(samples: &[f32], band: (f32, f32), sample_rate: u32) -> f32 {
    let n = samples.len().min(BAND_WINDOW);
    let (f1, f2) = band;
    let (mut re, mut im) = (0f32, 0f32);
    for (i, x) in samples[..n].iter().enumerate() {
        let f = f1 + (f2 - f1) * i as f32 / n as f32;
        let w = 2.0 * PI * f / sample_rate as f32;
        re += x * w.cos();
        im += x * w.sin();
    }
    (re * re + im * im).sqrt()
}

fn inverse_lerp(range: (f32, f32), value: f32) -> f32 {
    let (lo, hi) = range;
    if hi == lo {
        return 0.0;
    }
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}
