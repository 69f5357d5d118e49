//! Spectral fingerprint extraction.
//!
//! ## Algorithm
//!
//! 1. Fit the waveform to a fixed 0.5 s window (truncate or zero-pad).
//! 2. Split it into two equal halves so the fingerprint keeps a coarse
//!    notion of "what came first" (e.g. "go two" vs "two go").
//! 3. Per half, slide 32 ms Hamming-windowed frames at 50 % hop and measure
//!    the energy at 16 fixed frequencies with a single-bin Goertzel filter.
//!    Sixteen bins are far cheaper this way than a full FFT.
//! 4. Average per band, `log10` with a 1e-6 floor, L2-normalise the half.
//! 5. Concatenate both halves into a 32-float [`FeatureVector`].
//!
//! Silent or empty input yields the all-zero vector, which has zero cosine
//! similarity to everything.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Number of Goertzel bands per half.
pub const BAND_COUNT: usize = 16;

/// Goertzel target frequencies in Hz, roughly log spaced over the speech band.
pub const BAND_FREQS: [f32; BAND_COUNT] = [
    150.0, 300.0, 450.0, 600.0, 900.0, 1200.0, 1500.0, 1800.0, 2100.0, 2400.0, 3000.0, 3600.0,
    4200.0, 4800.0, 6000.0, 7200.0,
];

/// Fingerprint length: one band vector per half.
pub const FEATURE_LEN: usize = BAND_COUNT * 2;

const WINDOW_SECS: f32 = 0.5;
const FRAME_SECS: f32 = 0.032;
const LOG_FLOOR: f32 = 1e-6;
const NORM_FLOOR: f32 = 1e-8;
const COSINE_EPS: f32 = 1e-8;

/// Fixed-length spectral fingerprint of one utterance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(pub [f32; FEATURE_LEN]);

impl FeatureVector {
    pub fn zero() -> Self {
        Self([0.0; FEATURE_LEN])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// Cosine similarity to `other`, in [-1, 1].
    pub fn cosine(&self, other: &FeatureVector) -> f32 {
        cosine(&self.0, &other.0)
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zero()
    }
}

/// Extract the fingerprint of a mono waveform.
pub fn extract(samples: &[f32], sample_rate: u32) -> FeatureVector {
    if samples.is_empty() || sample_rate == 0 {
        return FeatureVector::zero();
    }

    let target_len = (WINDOW_SECS * sample_rate as f32).round() as usize;
    let fitted = fit_length(samples, target_len);
    if fitted.iter().all(|s| s.abs() <= f32::EPSILON) {
        return FeatureVector::zero();
    }

    let frame_len = (FRAME_SECS * sample_rate as f32).round() as usize;
    if frame_len < 2 {
        return FeatureVector::zero();
    }
    let window = hamming(frame_len);

    let (first, second) = fitted.split_at(fitted.len() / 2);
    let mut out = [0f32; FEATURE_LEN];
    out[..BAND_COUNT].copy_from_slice(&half_features(first, sample_rate, &window));
    out[BAND_COUNT..].copy_from_slice(&half_features(second, sample_rate, &window));
    FeatureVector(out)
}

/// Standard cosine similarity with an epsilon in the denominator.
///
/// Returns 0 for empty or length-mismatched inputs.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut aa, mut bb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        aa += x * x;
        bb += y * y;
    }

    (dot / (aa.sqrt() * bb.sqrt() + COSINE_EPS)).clamp(-1.0, 1.0)
}

fn half_features(samples: &[f32], sample_rate: u32, window: &[f32]) -> [f32; BAND_COUNT] {
    let n = window.len();
    let hop = (n / 2).max(1);

    let mut acc = [0f32; BAND_COUNT];
    let mut frame_count = 0usize;
    let mut start = 0usize;
    while start + n <= samples.len() {
        let frame = &samples[start..start + n];
        for (band, freq) in acc.iter_mut().zip(BAND_FREQS) {
            *band += goertzel_power(frame, window, sample_rate, freq);
        }
        frame_count += 1;
        start += hop;
    }

    let frames = frame_count.max(1) as f32;
    for band in acc.iter_mut() {
        *band = (LOG_FLOOR + *band / frames).log10();
    }

    l2_normalize(&mut acc);
    acc
}

/// Squared magnitude of the DFT bin nearest `freq`.
fn goertzel_power(frame: &[f32], window: &[f32], sample_rate: u32, freq: f32) -> f32 {
    let n = frame.len() as f32;
    let k = (0.5 + n * freq / sample_rate as f32).floor();
    let w = 2.0 * PI * k / n;
    let cw = w.cos();
    let coeff = 2.0 * cw;

    let (mut s1, mut s2) = (0f32, 0f32);
    for (x, win) in frame.iter().zip(window) {
        let s0 = coeff * s1 - s2 + x * win;
        s2 = s1;
        s1 = s0;
    }

    let real = s1 - s2 * cw;
    let imag = s2 * w.sin();
    real * real + imag * imag
}

fn hamming(n: usize) -> Vec<f32> {
    let denom = (n - 1) as f32;
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f32 / denom).cos())
        .collect()
}

fn l2_normalize(v: &mut [f32]) {
    let sum_sq: f32 = v.iter().map(|x| x * x).sum();
    let norm = sum_sq.max(NORM_FLOOR).sqrt();
    for x in v.iter_mut() {
        *x /= norm;
    }
}

fn fit_length(samples: &[f32], target_len: usize) -> Vec<f32> {
    let mut out = samples[..samples.len().min(target_len)].to_vec();
    out.resize(target_len, 0.0);
    out
}
