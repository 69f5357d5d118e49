//! Single background worker for the transcription fallback.
//!
//! ```text
//! RecognitionEngine ──job──► [crewvox-transcriber thread] ──result──► RecognitionEngine::poll
//! ```
//!
//! The worker only calls the transcriber; it never touches the voice-print
//! store or the matcher. Results are applied by whoever drains the result
//! channel, which keeps every mutation on the engine owner's thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, info, info_span};

use super::diagnostics::EngineDiagnostics;
use crate::error::{CrewVoxError, Result};
use crate::inference::TranscriberHandle;

/// One utterance to transcribe.
#[derive(Debug, Clone)]
pub struct TranscriptionJob {
    pub session: u64,
    pub wav_path: PathBuf,
    pub model: String,
}

/// Raw transcriber output for one job.
#[derive(Debug)]
pub struct TranscriptionResult {
    pub session: u64,
    pub text: Result<String>,
    pub elapsed: Duration,
}

pub struct TranscriptionWorker {
    job_tx: Option<Sender<TranscriptionJob>>,
    result_rx: Receiver<TranscriptionResult>,
    handle: Option<JoinHandle<()>>,
}

impl TranscriptionWorker {
    /// Spawn the worker thread.
    pub fn spawn(
        transcriber: TranscriberHandle,
        diagnostics: Arc<EngineDiagnostics>,
    ) -> Result<Self> {
        let (job_tx, job_rx) = unbounded::<TranscriptionJob>();
        let (result_tx, result_rx) = unbounded::<TranscriptionResult>();

        let handle = thread::Builder::new()
            .name("crewvox-transcriber".into())
            .spawn(move || run(transcriber, diagnostics, job_rx, result_tx))?;

        Ok(Self {
            job_tx: Some(job_tx),
            result_rx,
            handle: Some(handle),
        })
    }

    pub fn submit(&self, job: TranscriptionJob) -> Result<()> {
        let tx = self.job_tx.as_ref().ok_or(CrewVoxError::WorkerGone)?;
        tx.send(job).map_err(|_| CrewVoxError::WorkerGone)
    }

    /// Non-blocking. `Err(WorkerGone)` once the worker has exited.
    pub fn try_result(&self) -> Result<Option<TranscriptionResult>> {
        match self.result_rx.try_recv() {
            Ok(result) => Ok(Some(result)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(CrewVoxError::WorkerGone),
        }
    }

    /// Block up to `timeout` for the next result.
    pub fn wait_result(&self, timeout: Duration) -> Result<Option<TranscriptionResult>> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(result) => Ok(Some(result)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(CrewVoxError::WorkerGone),
        }
    }
}

impl Drop for TranscriptionWorker {
    fn drop(&mut self) {
        // Closing the job channel ends the loop once any in-flight job returns.
        self.job_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("transcription worker panicked");
            }
        }
    }
}

fn run(
    transcriber: TranscriberHandle,
    diagnostics: Arc<EngineDiagnostics>,
    jobs: Receiver<TranscriptionJob>,
    results: Sender<TranscriptionResult>,
) {
    info!("transcription worker started");

    for job in jobs.iter() {
        let _span = info_span!("transcribe", session = job.session).entered();
        EngineDiagnostics::bump(&diagnostics.transcriptions);

        let started = Instant::now();
        let text = transcriber.0.lock().transcribe(&job.wav_path, &job.model);
        let elapsed = started.elapsed();

        match &text {
            Ok(out) => debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                chars = out.len(),
                "transcription finished"
            ),
            Err(e) => {
                EngineDiagnostics::bump(&diagnostics.transcription_errors);
                error!(elapsed_ms = elapsed.as_millis() as u64, error = %e, "transcription failed");
            }
        }

        if results
            .send(TranscriptionResult {
                session: job.session,
                text,
                elapsed,
            })
            .is_err()
        {
            break;
        }
    }

    info!("transcription worker stopped");
}
