use std::path::PathBuf;

use thiserror::Error;

/// All errors produced by crewvox-core.
#[derive(Debug, Error)]
pub enum CrewVoxError {
    #[error("a recognition cycle is already in progress")]
    Busy,

    #[error("no recording is in progress")]
    NotRecording,

    #[error("session {got} is not the active session (active: {active:?})")]
    StaleSession { got: u64, active: Option<u64> },

    #[error("invalid command configuration: {0}")]
    InvalidConfig(String),

    #[error("WAV codec error: {0}")]
    Wav(#[from] hound::Error),

    #[error("failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("resampler error: {0}")]
    Resample(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("transcriber file not found: {path}")]
    TranscriberNotFound { path: PathBuf },

    #[error("transcription worker has shut down")]
    WorkerGone,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CrewVoxError>;
