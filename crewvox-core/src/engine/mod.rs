//! `RecognitionEngine`: sequences one push-to-talk utterance from capture to
//! command dispatch.
//!
//! ## Cycle
//!
//! ```text
//! begin_recording()  → SessionId, status = Recording
//! finish_recording() → truncate to hold ─► signal confidence ─► trim silence
//!                        ├─ training mode: store under every phrase of the group
//!                        ├─ quick match (voice prints) ─► dispatch [─► reinforce]
//!                        └─ no confident match ─► transcription job ─► Pending
//! poll() / wait_for_result()
//!                      → normalise text ─► fuse confidence ─► dispatch
//!                        [─► learn phrase + store voice print]
//! ```
//!
//! Only one cycle is active at a time. A session stays open until its
//! dispatch completes, including the transcription fallback; `begin_recording`
//! returns `Busy` until then.
//!
//! ## Threading
//!
//! The engine owns the voice-print store and the matcher and mutates them only
//! through `&mut self`. The transcriber runs on a dedicated worker thread and
//! its output is applied by `poll()` / `wait_for_result()` on the owner's
//! thread. In-flight transcriptions cannot be cancelled.

pub mod diagnostics;
pub mod worker;

pub use diagnostics::{DiagnosticsSnapshot, EngineDiagnostics};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn};

use crate::{
    audio::{resample::resample_to, wav::write_wav, AudioBuffer},
    commands::{CommandMatcher, CommandTable, DispatchOutcome, DispatchSource, LearnedPhrase},
    error::{CrewVoxError, Result},
    events::{EngineStatus, EngineStatusEvent, RecognitionEvent, RecognitionSource},
    inference::{normalize_transcript, TranscriberHandle},
    signal::{self, DEFAULT_SILENCE_THRESHOLD},
    voiceprint::{
        VoicePrintStore, AMBIGUITY_MARGIN, DEFAULT_CAPACITY, DEFAULT_PRUNE_SIMILARITY,
    },
};

use worker::{TranscriptionJob, TranscriptionResult, TranscriptionWorker};

/// Broadcast channel capacity for status and recognition events.
const BROADCAST_CAP: usize = 64;

/// Sub-folder of the data directory holding voice prints.
pub const VOICEPRINT_DIR: &str = "VoicePrints";

/// Configuration for `RecognitionEngine`.
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// Root for every persisted file. Default: `./crewvox-data`.
    pub data_dir: PathBuf,
    /// File name of the processed capture handed to the transcriber.
    /// Default: `voice.wav`.
    pub capture_file_name: String,
    /// Minimum fingerprint similarity for a quick match. Default: 0.85.
    pub quick_match_threshold: f32,
    /// Quick-match score above which the capture is stored as a new sample.
    /// Default: 0.95.
    pub reinforce_threshold: f32,
    /// Fused confidence above which a transcription is learned. Default: 0.85.
    pub auto_learn_threshold: f32,
    /// Required gap between best and runner-up fingerprint score. Default: 0.05.
    pub ambiguity_margin: f32,
    /// Voice-print samples kept per label. Default: 10.
    pub voiceprint_capacity: usize,
    /// Similarity above which same-label samples are duplicates. Default: 0.98.
    pub prune_similarity: f32,
    /// Prune duplicate voice prints when the engine is built. Default: true.
    pub prune_on_start: bool,
    /// Magnitude below which edge samples are trimmed. Default: 0.01.
    pub silence_threshold: f32,
    /// Sample rate of the file written for the transcriber. Default: 16000.
    pub transcriber_sample_rate: u32,
    /// Model name passed to the transcriber. Default: `ggml-base.en`.
    pub model_name: String,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("crewvox-data"),
            capture_file_name: "voice.wav".into(),
            quick_match_threshold: 0.85,
            reinforce_threshold: 0.95,
            auto_learn_threshold: 0.85,
            ambiguity_margin: AMBIGUITY_MARGIN,
            voiceprint_capacity: DEFAULT_CAPACITY,
            prune_similarity: DEFAULT_PRUNE_SIMILARITY,
            prune_on_start: true,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            transcriber_sample_rate: 16_000,
            model_name: "ggml-base.en".into(),
        }
    }
}

impl RecognizerConfig {
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn voiceprint_dir(&self) -> PathBuf {
        self.data_dir.join(VOICEPRINT_DIR)
    }

    pub fn capture_path(&self) -> PathBuf {
        self.data_dir.join(&self.capture_file_name)
    }

    /// # Errors
    /// `InvalidConfig` when a threshold lies outside [0, 1], the capacity is
    /// zero, or the transcriber rate is zero.
    pub fn validate(&self) -> Result<()> {
        let unit = [
            ("quick_match_threshold", self.quick_match_threshold),
            ("reinforce_threshold", self.reinforce_threshold),
            ("auto_learn_threshold", self.auto_learn_threshold),
            ("ambiguity_margin", self.ambiguity_margin),
            ("prune_similarity", self.prune_similarity),
            ("silence_threshold", self.silence_threshold),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(CrewVoxError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.voiceprint_capacity == 0 {
            return Err(CrewVoxError::InvalidConfig(
                "voiceprint_capacity must be at least 1".into(),
            ));
        }
        if self.transcriber_sample_rate == 0 {
            return Err(CrewVoxError::InvalidConfig(
                "transcriber_sample_rate must be non-zero".into(),
            ));
        }
        if self.capture_file_name.trim().is_empty() {
            return Err(CrewVoxError::InvalidConfig(
                "capture_file_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Token for one recording/recognition cycle. Monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a cycle (or a completed fallback) produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Empty capture; nothing was attempted.
    Ignored,
    /// Training capture stored under `samples` phrases of `group`.
    Trained { group: String, samples: usize },
    /// Resolved by the voice-print store.
    QuickMatch {
        label: String,
        score: f32,
        dispatched: Option<String>,
        reinforced: bool,
    },
    /// Handed to the transcriber; the result arrives via `poll()`.
    Pending(SessionId),
    /// Resolved (or not) through the transcriber.
    Transcribed {
        text: String,
        confidence: f32,
        dispatched: Option<String>,
        learned: Option<LearnedPhrase>,
    },
}

impl CycleOutcome {
    /// Registered phrase whose action fired, if any.
    pub fn dispatched(&self) -> Option<&str> {
        match self {
            Self::QuickMatch { dispatched, .. } | Self::Transcribed { dispatched, .. } => {
                dispatched.as_deref()
            }
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Recording(SessionId),
    AwaitingTranscript(SessionId),
}

/// State kept for a cycle waiting on the transcriber.
struct PendingCycle {
    session: SessionId,
    capture: AudioBuffer,
    signal_confidence: f32,
}

pub struct RecognitionEngine {
    config: RecognizerConfig,
    table: Arc<CommandTable>,
    store: VoicePrintStore,
    matcher: CommandMatcher,
    worker: TranscriptionWorker,
    phase: Phase,
    pending: Option<PendingCycle>,
    next_session: u64,
    status: EngineStatus,
    training_mode: bool,
    training_index: usize,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    recognition_tx: broadcast::Sender<RecognitionEvent>,
    diagnostics: Arc<EngineDiagnostics>,
}

impl RecognitionEngine {
    /// Load persisted state, optionally prune duplicates, and start the
    /// transcription worker.
    ///
    /// A transcriber that fails to warm up is logged, not fatal: quick
    /// matches keep working and fallbacks degrade to "not recognised".
    ///
    /// # Errors
    /// `InvalidConfig` for out-of-range settings or an empty command table;
    /// `Io` if the worker thread cannot be spawned.
    pub fn new(
        config: RecognizerConfig,
        table: Arc<CommandTable>,
        transcriber: TranscriberHandle,
    ) -> Result<Self> {
        config.validate()?;
        if table.is_empty() {
            return Err(CrewVoxError::InvalidConfig(
                "command table has no groups".into(),
            ));
        }

        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (recognition_tx, _) = broadcast::channel(BROADCAST_CAP);
        let diagnostics = Arc::new(EngineDiagnostics::default());

        let store = VoicePrintStore::open(config.voiceprint_dir())
            .with_capacity(config.voiceprint_capacity)
            .with_margin(config.ambiguity_margin);
        let matcher = CommandMatcher::open_in(Arc::clone(&table), &config.data_dir);

        if let Err(e) = transcriber.0.lock().warm_up() {
            warn!(error = %e, "transcriber unavailable, fallback recognition will fail");
        }
        let worker = TranscriptionWorker::spawn(transcriber, Arc::clone(&diagnostics))?;

        let mut engine = Self {
            config,
            table,
            store,
            matcher,
            worker,
            phase: Phase::Idle,
            pending: None,
            next_session: 1,
            status: EngineStatus::Idle,
            training_mode: false,
            training_index: 0,
            status_tx,
            recognition_tx,
            diagnostics,
        };

        if engine.config.prune_on_start {
            if let Err(e) = engine.prune() {
                engine.note_persist_error(&e);
            }
        }

        info!(
            data_dir = %engine.config.data_dir.display(),
            samples = engine.store.len(),
            learned = engine.matcher.learned().len(),
            groups = engine.table.len(),
            "recognition engine ready"
        );
        Ok(engine)
    }

    // ── Session lifecycle ────────────────────────────────────────────────────

    /// Open a new cycle.
    ///
    /// # Errors
    /// `Busy` while a previous cycle is recording or awaiting its transcript.
    pub fn begin_recording(&mut self) -> Result<SessionId> {
        if self.phase != Phase::Idle {
            debug!(phase = ?self.phase, "recording rejected, engine busy");
            return Err(CrewVoxError::Busy);
        }
        let session = SessionId(self.next_session);
        self.next_session += 1;
        self.phase = Phase::Recording(session);
        self.set_status(EngineStatus::Recording, None);
        debug!(%session, "recording started");
        Ok(session)
    }

    /// Abandon an open recording without processing it.
    pub fn abort_recording(&mut self, session: SessionId) -> Result<()> {
        self.check_recording(session)?;
        self.phase = Phase::Idle;
        self.set_status(EngineStatus::Idle, Some("recording aborted".into()));
        Ok(())
    }

    /// Process the capture of `session`.
    ///
    /// `held` is how long the push-to-talk key was held; the capture is
    /// truncated to it. Returns `Pending` when the transcriber fallback was
    /// started, in which case the session stays busy until `poll()` or
    /// `wait_for_result()` applies the transcript.
    ///
    /// # Errors
    /// `NotRecording` / `StaleSession` when `session` is not the open
    /// recording. Recognition failures are never errors; they end in an
    /// outcome without a dispatched phrase.
    pub fn finish_recording(
        &mut self,
        session: SessionId,
        mut capture: AudioBuffer,
        held: Option<Duration>,
    ) -> Result<CycleOutcome> {
        self.check_recording(session)?;

        let span = info_span!("recognition", session = session.0);
        let _guard = span.enter();
        EngineDiagnostics::bump(&self.diagnostics.cycles);
        self.set_status(EngineStatus::Processing, None);

        if let Some(held) = held {
            capture.truncate_to_duration(held);
        }
        if capture.is_empty() || capture.sample_rate == 0 {
            warn!("empty capture, nothing to recognise");
            return Ok(self.complete(CycleOutcome::Ignored));
        }

        let signal_confidence =
            signal::signal_confidence(&capture.downmix(), capture.sample_rate);
        let trimmed = signal::trim_silence(&capture, self.config.silence_threshold);
        debug!(
            frames = capture.frames(),
            trimmed_frames = trimmed.frames(),
            signal_confidence,
            "capture prepared"
        );
        let capture_written = self.write_capture(&trimmed);

        if self.training_mode {
            let outcome = self.train(session, &trimmed);
            return Ok(self.complete(outcome));
        }

        if let Some(outcome) = self.quick_match(session, &trimmed) {
            return Ok(self.complete(outcome));
        }
        EngineDiagnostics::bump(&self.diagnostics.quick_rejects);

        if !capture_written {
            // Nothing for the transcriber to read; degrade like an empty transcript.
            let outcome = self.apply_transcript(session, &trimmed, signal_confidence, String::new());
            return Ok(self.complete(outcome));
        }

        let job = TranscriptionJob {
            session: session.0,
            wav_path: self.config.capture_path(),
            model: self.config.model_name.clone(),
        };
        if let Err(e) = self.worker.submit(job) {
            error!(error = %e, "could not hand capture to transcriber");
            let outcome = self.apply_transcript(session, &trimmed, signal_confidence, String::new());
            return Ok(self.complete(outcome));
        }

        info!("no confident quick match, transcribing");
        self.pending = Some(PendingCycle {
            session,
            capture: trimmed,
            signal_confidence,
        });
        self.phase = Phase::AwaitingTranscript(session);
        Ok(CycleOutcome::Pending(session))
    }

    /// `begin_recording` + `finish_recording` in one call.
    pub fn recognize(
        &mut self,
        capture: AudioBuffer,
        held: Option<Duration>,
    ) -> Result<CycleOutcome> {
        let session = self.begin_recording()?;
        self.finish_recording(session, capture, held)
    }

    /// Apply a finished transcription, if one is ready. Never blocks.
    pub fn poll(&mut self) -> Result<Option<CycleOutcome>> {
        if self.pending.is_none() {
            return Ok(None);
        }
        match self.worker.try_result() {
            Ok(Some(result)) => Ok(self.apply_result(result)),
            Ok(None) => Ok(None),
            Err(e) => Err(self.worker_lost(e)),
        }
    }

    /// Block up to `timeout` for the pending transcription and apply it.
    ///
    /// Returns `Ok(None)` on timeout or when nothing is pending. The
    /// transcription itself keeps running after a timeout.
    pub fn wait_for_result(&mut self, timeout: Duration) -> Result<Option<CycleOutcome>> {
        if self.pending.is_none() {
            return Ok(None);
        }
        match self.worker.wait_result(timeout) {
            Ok(Some(result)) => Ok(self.apply_result(result)),
            Ok(None) => Ok(None),
            Err(e) => Err(self.worker_lost(e)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Session currently recording or awaiting its transcript.
    pub fn active_session(&self) -> Option<SessionId> {
        match self.phase {
            Phase::Idle => None,
            Phase::Recording(s) | Phase::AwaitingTranscript(s) => Some(s),
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    // ── Training ─────────────────────────────────────────────────────────────

    pub fn training_mode(&self) -> bool {
        self.training_mode
    }

    pub fn set_training_mode(&mut self, enabled: bool) {
        self.training_mode = enabled;
        info!(enabled, group = ?self.training_group(), "training mode changed");
    }

    /// Flip training mode, returning the new state.
    pub fn toggle_training_mode(&mut self) -> bool {
        self.set_training_mode(!self.training_mode);
        self.training_mode
    }

    /// `(name, phrases)` of every trainable group, keyed by first phrase.
    pub fn training_groups(&self) -> Vec<(String, Vec<String>)> {
        self.table.training_groups()
    }

    /// Name of the group training captures are stored under.
    pub fn training_group(&self) -> Option<&str> {
        self.table
            .groups()
            .get(self.training_index)
            .map(|g| g.name())
    }

    /// Advance to the next group, wrapping around.
    pub fn select_next_training_group(&mut self) -> Option<&str> {
        let count = self.table.len();
        if count == 0 {
            warn!("no training groups available");
            return None;
        }
        self.training_index = (self.training_index + 1) % count;
        let name = self.training_group();
        info!(group = ?name, "training group selected");
        name
    }

    /// Select a group by name (its first phrase).
    pub fn select_training_group(&mut self, name: &str) -> Result<()> {
        let name = name.trim().to_lowercase();
        let index = self
            .table
            .groups()
            .iter()
            .position(|g| g.name() == name)
            .ok_or_else(|| {
                CrewVoxError::InvalidConfig(format!("unknown training group {name:?}"))
            })?;
        self.training_index = index;
        info!(group = %name, "training group selected");
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    pub fn store(&self) -> &VoicePrintStore {
        &self.store
    }

    pub fn matcher(&self) -> &CommandMatcher {
        &self.matcher
    }

    /// Remove near-duplicate voice prints. Returns how many were removed.
    pub fn prune(&mut self) -> Result<usize> {
        self.store.prune_duplicates(self.config.prune_similarity)
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_recognitions(&self) -> broadcast::Receiver<RecognitionEvent> {
        self.recognition_tx.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal steps ───────────────────────────────────────────────────────

    fn check_recording(&self, session: SessionId) -> Result<()> {
        match self.phase {
            Phase::Recording(active) if active == session => Ok(()),
            Phase::Recording(active) | Phase::AwaitingTranscript(active) => {
                Err(CrewVoxError::StaleSession {
                    got: session.0,
                    active: Some(active.0),
                })
            }
            Phase::Idle if session.0 >= self.next_session => Err(CrewVoxError::StaleSession {
                got: session.0,
                active: None,
            }),
            Phase::Idle => Err(CrewVoxError::NotRecording),
        }
    }

    /// Write the transcriber's copy of the capture. Returns `false` on failure.
    fn write_capture(&self, trimmed: &AudioBuffer) -> bool {
        let path = self.config.capture_path();
        let written = resample_to(trimmed, self.config.transcriber_sample_rate)
            .and_then(|mono| write_wav(&path, &mono));
        match written {
            Ok(()) => true,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to write capture");
                false
            }
        }
    }

    fn train(&mut self, session: SessionId, trimmed: &AudioBuffer) -> CycleOutcome {
        self.set_status(EngineStatus::TrainingCapture, None);
        let Some(group) = self.table.groups().get(self.training_index).cloned() else {
            warn!("no training group selected");
            return CycleOutcome::Trained {
                group: String::new(),
                samples: 0,
            };
        };

        let mut stored = 0;
        for phrase in group.phrases() {
            match self.store.add_sample(phrase, trimmed) {
                Ok(_) => {
                    stored += 1;
                    EngineDiagnostics::bump(&self.diagnostics.training_samples);
                    debug!(phrase = %phrase, "training sample stored");
                }
                Err(e) => self.note_persist_error(&e),
            }
        }
        info!(group = %group.name(), samples = stored, "training capture stored");

        self.publish(RecognitionEvent {
            session: session.0,
            source: RecognitionSource::Training,
            text: group.name().to_string(),
            phrase: None,
            confidence: 1.0,
        });
        CycleOutcome::Trained {
            group: group.name().to_string(),
            samples: stored,
        }
    }

    fn quick_match(&mut self, session: SessionId, trimmed: &AudioBuffer) -> Option<CycleOutcome> {
        if self.store.is_empty() {
            debug!("voice-print store empty, skipping quick match");
            return None;
        }
        let query = signal::extract(&trimmed.downmix(), trimmed.sample_rate);
        let table = &self.table;
        let result = self.store.match_fingerprint_with(
            &query,
            self.config.quick_match_threshold,
            |a, b| table.same_group(a, b),
        );
        let label = result.confident_label()?.to_string();
        let score = result.score;
        EngineDiagnostics::bump(&self.diagnostics.quick_matches);
        info!(label = %label, score, runner_up = result.runner_up, "quick match");

        let dispatched = self.dispatch(&label);

        let mut reinforced = false;
        if score > self.config.reinforce_threshold {
            match self.store.add_sample(&label, trimmed) {
                Ok(_) => {
                    reinforced = true;
                    EngineDiagnostics::bump(&self.diagnostics.reinforcements);
                    debug!(label = %label, score, "voice print reinforced");
                }
                Err(e) => self.note_persist_error(&e),
            }
        }

        self.publish(RecognitionEvent {
            session: session.0,
            source: RecognitionSource::Quick,
            text: label.clone(),
            phrase: dispatched.as_ref().map(|d| d.phrase.clone()),
            confidence: score.clamp(0.0, 1.0),
        });
        Some(CycleOutcome::QuickMatch {
            label,
            score,
            dispatched: dispatched.map(|d| d.phrase),
            reinforced,
        })
    }

    fn apply_result(&mut self, result: TranscriptionResult) -> Option<CycleOutcome> {
        let Some(pending) = self.pending.take() else {
            warn!(session = result.session, "transcript without a pending cycle, dropped");
            return None;
        };
        if pending.session.0 != result.session {
            warn!(
                got = result.session,
                expected = pending.session.0,
                "transcript for another session, dropped"
            );
            self.pending = Some(pending);
            return None;
        }

        let span = info_span!("recognition", session = result.session);
        let _guard = span.enter();
        debug!(elapsed_ms = result.elapsed.as_millis() as u64, "transcript received");

        // Failures and empty output become the "no result" sentinel.
        let raw = result.text.unwrap_or_default();
        let outcome = self.apply_transcript(
            pending.session,
            &pending.capture,
            pending.signal_confidence,
            raw,
        );
        Some(self.complete(outcome))
    }

    fn apply_transcript(
        &mut self,
        session: SessionId,
        capture: &AudioBuffer,
        signal_confidence: f32,
        raw: String,
    ) -> CycleOutcome {
        let text = normalize_transcript(&raw);
        let text_confidence = self.matcher.text_confidence(&text);
        let confidence = ((signal_confidence + text_confidence) / 2.0).clamp(0.0, 1.0);
        info!(text = %text, signal_confidence, text_confidence, confidence, "transcribed");

        let dispatched = self.dispatch(&text);

        let mut learned = None;
        if confidence > self.config.auto_learn_threshold && !text.is_empty() {
            learned = self.auto_learn(&text, confidence, dispatched.as_ref(), capture);
        }

        self.publish(RecognitionEvent {
            session: session.0,
            source: RecognitionSource::Transcribed,
            text: text.clone(),
            phrase: dispatched.as_ref().map(|d| d.phrase.clone()),
            confidence,
        });
        CycleOutcome::Transcribed {
            text,
            confidence,
            dispatched: dispatched.map(|d| d.phrase),
            learned,
        }
    }

    /// Remember a confident transcription: as a learned alias when it is new
    /// wording, and as a voice print under the phrase it resolved to.
    fn auto_learn(
        &mut self,
        text: &str,
        confidence: f32,
        dispatched: Option<&DispatchOutcome>,
        capture: &AudioBuffer,
    ) -> Option<LearnedPhrase> {
        let already_known = self.table.group_for(text).is_some()
            || matches!(dispatched, Some(d) if matches!(d.source, DispatchSource::Learned { .. }));

        let mut learned = None;
        if !already_known {
            match self.matcher.learn_new_phrase(text, confidence) {
                Ok(Some(entry)) => {
                    EngineDiagnostics::bump(&self.diagnostics.auto_learned);
                    learned = Some(entry);
                }
                Ok(None) => {}
                Err(e) => self.note_persist_error(&e),
            }
        }

        let label = dispatched
            .filter(|d| d.fired)
            .map(|d| d.phrase.clone())
            .or_else(|| learned.as_ref().map(|l| l.matched_command.clone()));
        if let Some(label) = label {
            match self.store.add_sample(&label, capture) {
                Ok(_) => info!(label = %label, confidence, "auto-learned voice print"),
                Err(e) => self.note_persist_error(&e),
            }
        }
        learned
    }

    fn dispatch(&mut self, text: &str) -> Option<DispatchOutcome> {
        self.set_status(EngineStatus::Dispatching, None);
        let outcome = self.matcher.dispatch(text);
        match &outcome {
            Some(d) => {
                if d.fired {
                    EngineDiagnostics::bump(&self.diagnostics.dispatched);
                } else {
                    EngineDiagnostics::bump(&self.diagnostics.unrecognized);
                }
                if let Some(e) = &d.persist_error {
                    self.note_persist_error(e);
                }
                info!(phrase = %d.phrase, fired = d.fired, "command dispatched");
            }
            None => {
                EngineDiagnostics::bump(&self.diagnostics.unrecognized);
                info!(text = %text, "command not recognised");
            }
        }
        outcome.filter(|d| d.fired)
    }

    /// End the active cycle.
    fn complete(&mut self, outcome: CycleOutcome) -> CycleOutcome {
        self.phase = Phase::Idle;
        self.pending = None;
        self.set_status(EngineStatus::Idle, None);
        outcome
    }

    fn worker_lost(&mut self, e: CrewVoxError) -> CrewVoxError {
        error!(error = %e, "transcription worker gone, abandoning cycle");
        self.complete(CycleOutcome::Ignored);
        e
    }

    fn note_persist_error(&self, e: &CrewVoxError) {
        EngineDiagnostics::bump(&self.diagnostics.persistence_errors);
        error!(error = %e, "failed to persist recognition state");
        let _ = self.status_tx.send(EngineStatusEvent {
            status: self.status,
            detail: Some(format!("persistence failed: {e}")),
        });
    }

    fn publish(&self, event: RecognitionEvent) {
        let _ = self.recognition_tx.send(event);
    }

    fn set_status(&mut self, status: EngineStatus, detail: Option<String>) {
        if self.status == status && detail.is_none() {
            return;
        }
        self.status = status;
        let _ = self.status_tx.send(EngineStatusEvent { status, detail });
    }
}

impl fmt::Debug for RecognitionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecognitionEngine")
            .field("phase", &self.phase)
            .field("status", &self.status)
            .field("training_mode", &self.training_mode)
            .field("store", &self.store)
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

impl Drop for RecognitionEngine {
    fn drop(&mut self) {
        info!(diagnostics = ?self.diagnostics.snapshot(), "recognition engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::StubTranscriber;
    use std::f32::consts::PI;

    fn table() -> Arc<CommandTable> {
        Arc::new(
            CommandTable::builder()
                .group(["go", "go1", "go one"], || {})
                .group(["stop", "halt"], || {})
                .build()
                .expect("table"),
        )
    }

    fn engine(dir: &std::path::Path, stub: StubTranscriber) -> RecognitionEngine {
        RecognitionEngine::new(
            RecognizerConfig::default().with_data_dir(dir),
            table(),
            TranscriberHandle::new(stub),
        )
        .expect("engine")
    }

    fn tone(freq: f32) -> AudioBuffer {
        let sr = 16_000;
        AudioBuffer::mono(
            (0..8_000)
                .map(|i| 0.4 * (2.0 * PI * freq * i as f32 / sr as f32).sin())
                .collect(),
            sr,
        )
    }

    #[test]
    fn config_validation_rejects_out_of_range_values() {
        assert!(RecognizerConfig::default().validate().is_ok());
        let bad = RecognizerConfig {
            quick_match_threshold: 1.5,
            ..RecognizerConfig::default()
        };
        assert!(matches!(bad.validate(), Err(CrewVoxError::InvalidConfig(_))));
        let zero = RecognizerConfig {
            voiceprint_capacity: 0,
            ..RecognizerConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn empty_table_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = RecognitionEngine::new(
            RecognizerConfig::default().with_data_dir(dir.path()),
            Arc::new(CommandTable::default()),
            TranscriberHandle::new(StubTranscriber::new()),
        )
        .unwrap_err();
        assert!(matches!(err, CrewVoxError::InvalidConfig(_)));
    }

    #[test]
    fn session_ids_increase_and_busy_is_enforced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine(dir.path(), StubTranscriber::new());

        let first = engine.begin_recording().expect("first");
        assert!(matches!(engine.begin_recording(), Err(CrewVoxError::Busy)));
        assert_eq!(engine.active_session(), Some(first));
        engine.abort_recording(first).expect("abort");

        let second = engine.begin_recording().expect("second");
        assert!(second > first);
        assert!(matches!(
            engine.finish_recording(first, tone(500.0), None),
            Err(CrewVoxError::StaleSession { .. })
        ));
    }

    #[test]
    fn finishing_without_recording_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine(dir.path(), StubTranscriber::new());
        let session = engine.begin_recording().expect("begin");
        engine.abort_recording(session).expect("abort");
        assert!(matches!(
            engine.finish_recording(session, tone(500.0), None),
            Err(CrewVoxError::NotRecording)
        ));
        assert!(matches!(
            engine.finish_recording(SessionId(99), tone(500.0), None),
            Err(CrewVoxError::StaleSession { active: None, .. })
        ));
    }

    #[test]
    fn empty_capture_is_ignored_without_transcribing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stub = StubTranscriber::replying("go");
        let mut engine = engine(dir.path(), stub.clone());

        let outcome = engine
            .recognize(AudioBuffer::mono(vec![], 16_000), None)
            .expect("recognize");
        assert_eq!(outcome, CycleOutcome::Ignored);
        assert!(!engine.is_busy());
        assert_eq!(stub.call_count(), 0);
    }

    #[test]
    fn hold_duration_of_zero_ignores_capture() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine(dir.path(), StubTranscriber::new());
        let outcome = engine
            .recognize(tone(500.0), Some(Duration::ZERO))
            .expect("recognize");
        assert_eq!(outcome, CycleOutcome::Ignored);
    }

    #[test]
    fn training_cycles_through_groups() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine(dir.path(), StubTranscriber::new());

        assert_eq!(engine.training_group(), Some("go"));
        assert_eq!(engine.select_next_training_group(), Some("stop"));
        assert_eq!(engine.select_next_training_group(), Some("go"));
        engine.select_training_group("STOP").expect("select");
        assert_eq!(engine.training_group(), Some("stop"));
        assert!(engine.select_training_group("fire").is_err());
        assert!(engine.toggle_training_mode());
        assert!(!engine.toggle_training_mode());
    }

    #[test]
    fn capture_file_is_written_at_transcriber_rate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine(dir.path(), StubTranscriber::new());
        let capture = AudioBuffer::new(
            tone(500.0).samples.iter().flat_map(|s| [*s, *s]).collect(),
            16_000,
            2,
        );

        engine.recognize(capture, None).expect("recognize");
        let written = crate::audio::wav::read_wav(&engine.config().capture_path()).expect("read");
        assert_eq!(written.sample_rate, 16_000);
        assert_eq!(written.channels, 1);
        engine
            .wait_for_result(Duration::from_secs(5))
            .expect("worker alive");
    }
}
