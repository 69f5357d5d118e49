//! Relaxed atomic counters describing engine activity.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct EngineDiagnostics {
    pub cycles: AtomicUsize,
    pub quick_matches: AtomicUsize,
    pub quick_rejects: AtomicUsize,
    pub transcriptions: AtomicUsize,
    pub transcription_errors: AtomicUsize,
    pub dispatched: AtomicUsize,
    pub unrecognized: AtomicUsize,
    pub reinforcements: AtomicUsize,
    pub auto_learned: AtomicUsize,
    pub training_samples: AtomicUsize,
    pub persistence_errors: AtomicUsize,
}

impl EngineDiagnostics {
    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            quick_matches: self.quick_matches.load(Ordering::Relaxed),
            quick_rejects: self.quick_rejects.load(Ordering::Relaxed),
            transcriptions: self.transcriptions.load(Ordering::Relaxed),
            transcription_errors: self.transcription_errors.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
            reinforcements: self.reinforcements.load(Ordering::Relaxed),
            auto_learned: self.auto_learned.load(Ordering::Relaxed),
            training_samples: self.training_samples.load(Ordering::Relaxed),
            persistence_errors: self.persistence_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub cycles: usize,
    pub quick_matches: usize,
    pub quick_rejects: usize,
    pub transcriptions: usize,
    pub transcription_errors: usize,
    pub dispatched: usize,
    pub unrecognized: usize,
    pub reinforcements: usize,
    pub auto_learned: usize,
    pub training_samples: usize,
    pub persistence_errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reads_every_counter() {
        let diag = EngineDiagnostics::default();
        EngineDiagnostics::bump(&diag.cycles);
        EngineDiagnostics::bump(&diag.cycles);
        EngineDiagnostics::bump(&diag.persistence_errors);

        let snap = diag.snapshot();
        assert_eq!(snap.cycles, 2);
        assert_eq!(snap.persistence_errors, 1);
        assert_eq!(snap.dispatched, 0);
        assert_eq!(
            DiagnosticsSnapshot {
                cycles: 0,
                persistence_errors: 0,
                ..snap
            },
            DiagnosticsSnapshot::default()
        );
    }
}
