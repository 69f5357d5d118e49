//! `VoicePrintStore`: persisted nearest-neighbour classifier.
//!
//! Mutations (`add_sample`, `insert`, `prune_duplicates`) rewrite the whole
//! JSON document before returning. The store has a single owner; callers must
//! not mutate it in tight loops.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{
    MatchResult, VoicePrintDocument, VoiceSample, AMBIGUITY_MARGIN, DEFAULT_CAPACITY,
};
use crate::audio::{wav, AudioBuffer};
use crate::error::Result;
use crate::persist;
use crate::signal::{self, FeatureVector};

const DB_FILE_NAME: &str = "voiceprints.json";

pub struct VoicePrintStore {
    root: PathBuf,
    db_path: PathBuf,
    capacity: usize,
    margin: f32,
    samples: Vec<VoiceSample>,
    file_seq: u64,
}

impl VoicePrintStore {
    /// Open (or create) the store rooted at `root` and load its document.
    ///
    /// A missing or corrupt document yields an empty store.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        if let Err(e) = fs::create_dir_all(&root) {
            warn!(root = %root.display(), error = %e, "could not create voice-print folder");
        }
        let db_path = root.join(DB_FILE_NAME);
        let mut store = Self {
            root,
            db_path,
            capacity: DEFAULT_CAPACITY,
            margin: AMBIGUITY_MARGIN,
            samples: Vec::new(),
            file_seq: 0,
        };
        store.load();
        store
    }

    /// Override the per-label capacity (minimum 1).
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Override the ambiguity margin.
    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin.max(0.0);
        self
    }

    /// Replace the in-memory samples with the persisted document.
    pub fn load(&mut self) {
        let doc: VoicePrintDocument = persist::load_or_default(&self.db_path);
        self.samples = doc.samples;
        self.file_seq = self.samples.len() as u64;
        info!(
            path = %self.db_path.display(),
            samples = self.samples.len(),
            "voice-print store loaded"
        );
    }

    /// Rewrite the persisted document.
    pub fn save(&self) -> Result<()> {
        persist::save_atomic(
            &self.db_path,
            &VoicePrintDocumentRef {
                samples: &self.samples,
            },
        )
    }

    /// Fingerprint `buffer`, keep its waveform under the label's folder and
    /// append it as the newest sample for `label`.
    ///
    /// Multi-channel audio is downmixed before extraction. When the label
    /// exceeds capacity, its oldest samples and their files are removed.
    pub fn add_sample(&mut self, label: &str, buffer: &AudioBuffer) -> Result<VoiceSample> {
        let mono = buffer.downmix();
        let feature = signal::extract(&mono, buffer.sample_rate);

        let wav_path = self.next_wav_path(label);
        wav::write_wav(&wav_path, buffer)?;

        let sample = VoiceSample {
            command: label.to_string(),
            wav_path,
            feature,
        };
        self.insert(sample.clone())?;
        Ok(sample)
    }

    /// Append a pre-built sample, enforce capacity and persist.
    pub fn insert(&mut self, sample: VoiceSample) -> Result<()> {
        let label = sample.command.clone();
        self.samples.push(sample);

        let evicted = self.evict_over_capacity(&label);
        debug!(
            label = %label,
            count = self.count_for(&label),
            evicted,
            "voice sample added"
        );
        self.save()
    }

    /// Classify `buffer` against every stored sample.
    pub fn match_buffer(&self, buffer: &AudioBuffer, threshold: f32) -> MatchResult {
        if buffer.is_empty() || self.samples.is_empty() {
            return MatchResult::none();
        }
        let query = signal::extract(&buffer.downmix(), buffer.sample_rate);
        self.match_fingerprint(&query, threshold)
    }

    /// Classify a fingerprint; any two distinct labels compete.
    pub fn match_fingerprint(&self, query: &FeatureVector, threshold: f32) -> MatchResult {
        self.match_fingerprint_with(query, threshold, |a, b| a == b)
    }

    /// Classify a fingerprint, treating labels for which `same_command`
    /// returns true as one command.
    ///
    /// The runner-up score is the best similarity among samples whose label
    /// competes with the winner. Ties keep the earliest sample as winner.
    pub fn match_fingerprint_with<F>(
        &self,
        query: &FeatureVector,
        threshold: f32,
        same_command: F,
    ) -> MatchResult
    where
        F: Fn(&str, &str) -> bool,
    {
        let mut best: Option<(&str, f32)> = None;
        for sample in &self.samples {
            let sim = query.cosine(&sample.feature);
            if sim > best.map_or(0.0, |(_, s)| s) {
                best = Some((&sample.command, sim));
            }
        }

        let Some((label, score)) = best else {
            return MatchResult::none();
        };

        let runner_up = self
            .samples
            .iter()
            .filter(|s| !same_command(label, &s.command))
            .map(|s| query.cosine(&s.feature))
            .fold(0.0f32, f32::max);

        let matched = score >= threshold && (score - runner_up) > self.margin;
        debug!(label, score, runner_up, threshold, matched, "voice-print lookup");

        MatchResult {
            matched,
            label: Some(label.to_string()),
            score,
            runner_up,
        }
    }

    /// Remove later samples that nearly duplicate an earlier sample of the
    /// same label. Returns how many were removed.
    pub fn prune_duplicates(&mut self, similarity: f32) -> Result<usize> {
        let n = self.samples.len();
        let mut remove = vec![false; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (&self.samples[i], &self.samples[j]);
                if a.command == b.command && a.feature.cosine(&b.feature) > similarity {
                    remove[j] = true;
                }
            }
        }

        let removed = remove.iter().filter(|r| **r).count();
        if removed == 0 {
            return Ok(0);
        }

        let mut flags = remove.into_iter();
        self.samples.retain(|s| {
            let drop = flags.next().unwrap_or(false);
            if drop {
                persist::remove_file_if_exists(&s.wav_path);
            }
            !drop
        });

        info!(removed, similarity, "pruned near-duplicate voice samples");
        self.save()?;
        Ok(removed)
    }

    pub fn samples(&self) -> &[VoiceSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn count_for(&self, label: &str) -> usize {
        self.samples.iter().filter(|s| s.command == label).count()
    }

    /// Sample count per label.
    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.samples {
            *counts.entry(s.command.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_over_capacity(&mut self, label: &str) -> usize {
        let mut evicted = 0;
        while self.count_for(label) > self.capacity {
            let Some(oldest) = self.samples.iter().position(|s| s.command == label) else {
                break;
            };
            let gone = self.samples.remove(oldest);
            persist::remove_file_if_exists(&gone.wav_path);
            evicted += 1;
        }
        evicted
    }

    fn next_wav_path(&mut self, label: &str) -> PathBuf {
        let folder = self.root.join(sanitize_label(label));
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
        loop {
            self.file_seq += 1;
            let path = folder.join(format!("sample_{stamp}_{}.wav", self.file_seq));
            if !path.exists() {
                return path;
            }
        }
    }
}

impl std::fmt::Debug for VoicePrintStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePrintStore")
            .field("root", &self.root)
            .field("samples", &self.samples.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Borrowing mirror of `VoicePrintDocument` so saving never clones samples.
#[derive(serde::Serialize)]
struct VoicePrintDocumentRef<'a> {
    samples: &'a [VoiceSample],
}

/// Folder name for a label: lower-cased, trimmed, path-hostile chars → `_`.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "_".into()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::FEATURE_LEN;
    use std::f32::consts::PI;

    fn tone(freq: f32) -> AudioBuffer {
        let sr = 16_000;
        let samples = (0..8_000)
            .map(|i| 0.4 * (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect();
        AudioBuffer::mono(samples, sr)
    }

    fn fingerprint(seed: usize) -> FeatureVector {
        let mut v = [0f32; FEATURE_LEN];
        v[seed % FEATURE_LEN] = 1.0;
        FeatureVector(v)
    }

    fn sample(dir: &Path, label: &str, feature: FeatureVector) -> VoiceSample {
        VoiceSample {
            command: label.into(),
            wav_path: dir.join(format!("{label}.wav")),
            feature,
        }
    }

    #[test]
    fn empty_store_never_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = VoicePrintStore::open(dir.path());
        for threshold in [0.0, 0.5, 1.0] {
            assert!(!store.match_buffer(&tone(600.0), threshold).matched);
            assert!(!store.match_fingerprint(&fingerprint(0), threshold).matched);
        }
    }

    #[test]
    fn exact_sample_matches_itself() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path());
        store.add_sample("go", &tone(600.0)).expect("add");

        let result = store.match_buffer(&tone(600.0), 0.85);
        assert!(result.matched, "{result:?}");
        assert_eq!(result.confident_label(), Some("go"));
        assert!(result.score > 0.99);
    }

    #[test]
    fn unique_best_below_threshold_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path());
        let mut partial = [0f32; FEATURE_LEN];
        partial[0] = 1.0;
        partial[1] = 1.0;
        store
            .insert(sample(dir.path(), "stop", FeatureVector(partial)))
            .expect("insert");

        // cosine([1,0,..], [1,1,0..]) ≈ 0.707
        let result = store.match_fingerprint(&fingerprint(0), 0.85);
        assert_eq!(result.label.as_deref(), Some("stop"));
        assert!(!result.matched);
        assert!(result.runner_up == 0.0);
    }

    #[test]
    fn identical_fingerprints_under_two_labels_are_ambiguous() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path());
        store.insert(sample(dir.path(), "left", fingerprint(3))).expect("insert");
        store.insert(sample(dir.path(), "right", fingerprint(3))).expect("insert");

        let result = store.match_fingerprint(&fingerprint(3), 0.85);
        assert!(!result.matched);
        assert!((result.score - 1.0).abs() < 1e-5);
        assert!((result.runner_up - 1.0).abs() < 1e-5);
        assert_eq!(result.label.as_deref(), Some("left"));
    }

    /// Unit vector in the (e0, e1) plane whose cosine with `e0` is `cos`.
    fn at_cosine(cos: f32) -> FeatureVector {
        let mut v = [0f32; FEATURE_LEN];
        v[0] = cos;
        v[1] = (1.0 - cos * cos).sqrt();
        FeatureVector(v)
    }

    #[test]
    fn competing_label_within_margin_is_ambiguous() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path());
        store.insert(sample(dir.path(), "stop", fingerprint(0))).expect("insert");
        store.insert(sample(dir.path(), "straight", at_cosine(0.97))).expect("insert");

        let result = store.match_fingerprint(&fingerprint(0), 0.85);
        assert_eq!(result.label.as_deref(), Some("stop"));
        assert!((result.score - result.runner_up - 0.03).abs() < 1e-3, "{result:?}");
        assert!(!result.matched);
    }

    #[test]
    fn competing_label_beyond_margin_still_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path());
        store.insert(sample(dir.path(), "stop", fingerprint(0))).expect("insert");
        store.insert(sample(dir.path(), "straight", at_cosine(0.93))).expect("insert");

        let result = store.match_fingerprint(&fingerprint(0), 0.85);
        assert!((result.score - result.runner_up - 0.07).abs() < 1e-3, "{result:?}");
        assert!(result.matched, "{result:?}");
        assert_eq!(result.confident_label(), Some("stop"));
    }

    #[test]
    fn equivalent_labels_do_not_compete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path());
        store.insert(sample(dir.path(), "go", fingerprint(5))).expect("insert");
        store.insert(sample(dir.path(), "go one", fingerprint(5))).expect("insert");

        let plain = store.match_fingerprint(&fingerprint(5), 0.85);
        assert!(!plain.matched);

        let grouped =
            store.match_fingerprint_with(&fingerprint(5), 0.85, |a, b| {
                a.starts_with("go") && b.starts_with("go")
            });
        assert!(grouped.matched, "{grouped:?}");
        assert_eq!(grouped.confident_label(), Some("go"));
    }

    #[test]
    fn capacity_evicts_oldest_and_deletes_its_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path());

        let mut added = Vec::new();
        for _ in 0..11 {
            added.push(store.add_sample("stop", &tone(900.0)).expect("add"));
        }

        assert_eq!(store.count_for("stop"), DEFAULT_CAPACITY);
        assert!(!added[0].wav_path.exists(), "oldest waveform should be deleted");
        let kept: Vec<_> = store.samples().iter().map(|s| s.wav_path.clone()).collect();
        let expected: Vec<_> = added[1..].iter().map(|s| s.wav_path.clone()).collect();
        assert_eq!(kept, expected);
        assert!(kept.iter().all(|p| p.exists()));
    }

    #[test]
    fn capacity_is_per_label() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path()).with_capacity(2);
        for i in 0..3 {
            store.insert(sample(dir.path(), "a", fingerprint(i))).expect("insert");
        }
        store.insert(sample(dir.path(), "b", fingerprint(9))).expect("insert");
        assert_eq!(store.count_for("a"), 2);
        assert_eq!(store.count_for("b"), 1);
        assert_eq!(store.samples()[0].feature, fingerprint(1));
    }

    #[test]
    fn samples_persist_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut store = VoicePrintStore::open(dir.path());
            store.add_sample("Go Two", &tone(1200.0)).expect("add");
        }
        let store = VoicePrintStore::open(dir.path());
        assert_eq!(store.len(), 1);
        let s = &store.samples()[0];
        assert_eq!(s.command, "Go Two");
        assert!(s.wav_path.starts_with(dir.path().join("go two")));
        assert!(s.wav_path.exists());
    }

    #[test]
    fn corrupt_document_opens_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(DB_FILE_NAME), "[1, 2").expect("write");
        assert!(VoicePrintStore::open(dir.path()).is_empty());
    }

    #[test]
    fn persisted_document_uses_camel_case_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path());
        store.insert(sample(dir.path(), "halt", fingerprint(1))).expect("insert");

        let raw = fs::read_to_string(store.db_path()).expect("read");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("parse");
        let first = &json["samples"][0];
        assert_eq!(first["command"], "halt");
        assert!(first["wavPath"].is_string());
        assert_eq!(first["feature"].as_array().map(Vec::len), Some(FEATURE_LEN));
    }

    #[test]
    fn stereo_capture_matches_its_mono_downmix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path());
        let mono = tone(450.0);
        let stereo = AudioBuffer::new(
            mono.samples.iter().flat_map(|s| [*s, *s]).collect(),
            mono.sample_rate,
            2,
        );
        store.add_sample("back", &stereo).expect("add");
        assert!(store.match_buffer(&mono, 0.85).matched);
    }

    #[test]
    fn multichannel_sample_is_stored_with_canonical_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path());
        let mono = tone(700.0);
        let surround = AudioBuffer::new(
            mono.samples.iter().flat_map(|s| [*s, *s, *s]).collect(),
            mono.sample_rate,
            3,
        );

        let stored = store.add_sample("halt", &surround).expect("add");

        let bytes = fs::read(&stored.wav_path).expect("read back");
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(bytes.len(), 44 + mono.samples.len() * 2);
        assert!(store.match_buffer(&mono, 0.85).matched);
    }

    #[test]
    fn prune_keeps_earliest_of_each_duplicate_cluster() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path());
        let paths: Vec<PathBuf> = (0..4).map(|i| dir.path().join(format!("s{i}.wav"))).collect();
        for p in &paths {
            fs::write(p, b"x").expect("write");
        }
        let push = |store: &mut VoicePrintStore, label: &str, f: FeatureVector, p: &Path| {
            store
                .insert(VoiceSample {
                    command: label.into(),
                    wav_path: p.to_path_buf(),
                    feature: f,
                })
                .expect("insert");
        };
        push(&mut store, "go", fingerprint(0), &paths[0]);
        push(&mut store, "go", fingerprint(0), &paths[1]);
        push(&mut store, "stop", fingerprint(0), &paths[2]);
        push(&mut store, "go", fingerprint(7), &paths[3]);

        let removed = store.prune_duplicates(0.98).expect("prune");

        assert_eq!(removed, 1);
        let kept: Vec<_> = store.samples().iter().map(|s| s.wav_path.clone()).collect();
        assert_eq!(kept, vec![paths[0].clone(), paths[2].clone(), paths[3].clone()]);
        assert!(!paths[1].exists());
        assert!(paths[0].exists());
    }

    #[test]
    fn prune_without_duplicates_is_a_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = VoicePrintStore::open(dir.path());
        store.insert(sample(dir.path(), "a", fingerprint(0))).expect("insert");
        store.insert(sample(dir.path(), "a", fingerprint(1))).expect("insert");
        assert_eq!(store.prune_duplicates(0.98).expect("prune"), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn sanitize_label_replaces_path_characters() {
        assert_eq!(sanitize_label("  Go/Two?  "), "go_two_");
        assert_eq!(sanitize_label(".."), "_");
        assert_eq!(sanitize_label(""), "_");
    }
}
