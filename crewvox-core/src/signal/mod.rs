//! Deterministic signal processing on captured utterances.
//!
//! - [`features`]: waveform → 32-float spectral fingerprint + cosine similarity
//! - [`quality`]: waveform → heuristic confidence in [0, 1]
//! - [`trim`]: leading/trailing silence removal

pub mod features;
pub mod quality;
pub mod trim;

pub use features::{cosine, extract, FeatureVector, FEATURE_LEN};
pub use quality::{assess, signal_confidence, SignalReport};
pub use trim::{trim_silence, DEFAULT_SILENCE_THRESHOLD};
