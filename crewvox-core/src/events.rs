//! Event types published by the recognition engine.
//!
//! ## Channels
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `EngineStatusEvent` | `RecognitionEngine::subscribe_status` |
//! | `RecognitionEvent` | `RecognitionEngine::subscribe_recognitions` |
//!
//! Both derive serde so a UI host can forward them verbatim as JSON.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Recognition events
// ---------------------------------------------------------------------------

/// Emitted once per completed recognition cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionEvent {
    /// Session that produced this result.
    pub session: u64,
    /// Which tier resolved (or failed to resolve) the utterance.
    pub source: RecognitionSource,
    /// Text routed to the command matcher. Empty when the transcriber
    /// returned nothing.
    pub text: String,
    /// Registered phrase whose action fired, if any.
    pub phrase: Option<String>,
    /// Fingerprint score for quick matches, fused confidence for
    /// transcriptions, in [0.0, 1.0].
    pub confidence: f32,
}

/// Resolution tier of a recognition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionSource {
    /// Resolved by the voice-print store without transcription.
    Quick,
    /// Routed through the external transcriber.
    Transcribed,
    /// Training capture; nothing dispatched.
    Training,
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

/// Emitted when the engine changes state or reports a degraded condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. persistence error).
    pub detail: Option<String>,
}

/// Phase of the current recognition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Ready to begin a new recording.
    Idle,
    /// A session is open and the host is capturing.
    Recording,
    /// Capture handed over; matching or transcription in progress.
    Processing,
    /// A command action is being invoked.
    Dispatching,
    /// Capture is being stored as training data.
    TrainingCapture,
}
