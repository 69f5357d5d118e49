//! # crewvox-core
//!
//! Push-to-talk voice command recognition SDK.
//!
//! ## Architecture
//!
//! ```text
//! capture (AudioBuffer) → RecognitionEngine
//!                             │ trim + signal confidence
//!                             ├─► VoicePrintStore::match   (quick, local)
//!                             │        │ no confident match
//!                             │        ▼
//!                             │   TranscriptionWorker ─► Transcriber (whisper CLI)
//!                             │        │
//!                             ▼        ▼
//!                         CommandMatcher::dispatch → bound action
//!                             │
//!                  broadcast::Sender<RecognitionEvent / EngineStatusEvent>
//! ```
//!
//! The engine is the single writer of the voice-print store and the learned
//! phrase list; the transcriber is the only work done off the caller's thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod commands;
pub mod engine;
pub mod error;
pub mod events;
pub mod inference;
pub mod persist;
pub mod signal;
pub mod voiceprint;

// Convenience re-exports for downstream crates
pub use audio::AudioBuffer;
pub use commands::{Action, CommandMatcher, CommandTable, LearnedPhrase};
pub use engine::{CycleOutcome, DiagnosticsSnapshot, RecognitionEngine, RecognizerConfig, SessionId};
pub use error::{CrewVoxError, Result};
pub use events::{EngineStatus, EngineStatusEvent, RecognitionEvent, RecognitionSource};
pub use inference::{StubTranscriber, Transcriber, TranscriberHandle, WhisperCli, WhisperCliConfig};
pub use signal::FeatureVector;
pub use voiceprint::{MatchResult, VoicePrintStore, VoiceSample};
