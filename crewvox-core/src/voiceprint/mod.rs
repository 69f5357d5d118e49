//! Personal voice-print database: a label → fingerprint nearest-neighbour
//! classifier trained from the operator's own utterances.
//!
//! ## Persisted layout
//!
//! ```text
//! <root>/voiceprints.json              { "samples": [ {command, wavPath, feature[32]}, ... ] }
//! <root>/<label>/sample_<stamp>_<n>.wav
//! ```
//!
//! Samples are kept in insertion order, which doubles as recency order for
//! eviction and as "earliest wins" order for duplicate pruning.

pub mod store;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::signal::FeatureVector;

pub use store::VoicePrintStore;

/// Samples kept per label before the oldest is evicted.
pub const DEFAULT_CAPACITY: usize = 10;

/// Minimum gap between the best and the runner-up score for a confident match.
pub const AMBIGUITY_MARGIN: f32 = 0.05;

/// Cosine similarity above which two samples of one label are duplicates.
pub const DEFAULT_PRUNE_SIMILARITY: f32 = 0.98;

/// One stored training utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSample {
    /// Command label (a registered phrase).
    pub command: String,
    /// Backing waveform file.
    pub wav_path: PathBuf,
    /// Fingerprint extracted from the waveform.
    pub feature: FeatureVector,
}

/// Outcome of a fingerprint lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// `true` only when `score >= threshold` and the runner-up trails by more
    /// than [`AMBIGUITY_MARGIN`].
    pub matched: bool,
    /// Label of the most similar sample, if any sample scored above zero.
    pub label: Option<String>,
    /// Best cosine similarity.
    pub score: f32,
    /// Best similarity among samples of a competing label.
    pub runner_up: f32,
}

impl MatchResult {
    pub(crate) fn none() -> Self {
        Self {
            matched: false,
            label: None,
            score: 0.0,
            runner_up: 0.0,
        }
    }

    /// The matched label, only when the match is confident.
    pub fn confident_label(&self) -> Option<&str> {
        if self.matched {
            self.label.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct VoicePrintDocument {
    #[serde(default)]
    pub samples: Vec<VoiceSample>,
}
