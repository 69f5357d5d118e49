//! `StubTranscriber`: scripted backend that replays queued replies.
//!
//! Lets the full recognition cycle (worker thread, fallback dispatch,
//! auto-learning) be exercised without a whisper binary. Each call to
//! `transcribe` pops the next reply; an exhausted script yields the empty
//! "no result" string.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{CrewVoxError, Result};
use crate::inference::Transcriber;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum StubReply {
    Text(String),
    Fail(String),
}

/// Scripted transcriber.
///
/// Cloning shares the script and call log, so a test can keep one clone
/// while the engine owns the other.
#[derive(Debug, Clone, Default)]
pub struct StubTranscriber {
    replies: Arc<Mutex<VecDeque<StubReply>>>,
    calls: Arc<Mutex<Vec<(PathBuf, String)>>>,
}

impl StubTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stub that answers `text` once.
    pub fn replying(text: impl Into<String>) -> Self {
        let stub = Self::new();
        stub.push_text(text);
        stub
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.replies.lock().push_back(StubReply::Text(text.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies.lock().push_back(StubReply::Fail(message.into()));
    }

    /// `(wav_path, model)` for every call so far.
    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Transcriber for StubTranscriber {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubTranscriber::warm_up: no-op");
        Ok(())
    }

    fn transcribe(&mut self, wav_path: &Path, model: &str) -> Result<String> {
        self.calls
            .lock()
            .push((wav_path.to_path_buf(), model.to_string()));

        match self.replies.lock().pop_front() {
            Some(StubReply::Text(text)) => Ok(text),
            Some(StubReply::Fail(msg)) => Err(CrewVoxError::Transcription(msg)),
            None => Ok(String::new()),
        }
    }
}
