//! Transcription collaborator abstraction.
//!
//! The `Transcriber` trait decouples the recognition engine from any specific
//! backend (scripted stub, whisper.cpp CLI, ...). The engine only ever talks
//! to it through a `TranscriberHandle` from its single background worker.
//!
//! `&mut self` on `transcribe` expresses that backends may be stateful (a
//! warm process, cached model). All access is serialised through the
//! handle's `parking_lot::Mutex`.

pub mod stub;
pub mod whisper_cli;

pub use stub::StubTranscriber;
pub use whisper_cli::{WhisperCli, WhisperCliConfig};

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Contract for speech-to-text backends.
pub trait Transcriber: Send + 'static {
    /// One-time check that the backend is usable (binary present, model
    /// present). Called once when the engine is built.
    ///
    /// # Errors
    /// Returns an error if backend files are missing.
    fn warm_up(&mut self) -> Result<()>;

    /// Transcribe a 16-bit PCM WAV file with the named model.
    ///
    /// Blocking and potentially slow. An empty or whitespace-only string means
    /// "no result" and is not an error.
    fn transcribe(&mut self, wav_path: &Path, model: &str) -> Result<String>;
}

/// Thread-safe reference-counted handle to any `Transcriber` implementor.
#[derive(Clone)]
pub struct TranscriberHandle(pub Arc<Mutex<dyn Transcriber>>);

impl TranscriberHandle {
    /// Wrap any `Transcriber` in a `TranscriberHandle`.
    pub fn new<T: Transcriber>(transcriber: T) -> Self {
        Self(Arc::new(Mutex::new(transcriber)))
    }
}

impl std::fmt::Debug for TranscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriberHandle").finish_non_exhaustive()
    }
}

/// Normalise raw transcriber output: drop commas and full stops, trim,
/// lower-case.
pub fn normalize_transcript(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ',' | '.'))
        .collect::<String>()
        .trim()
        .to_lowercase()
}
