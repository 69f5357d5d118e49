//! `CommandMatcher`: fuzzy text → action routing with online phrase learning.
//!
//! ## Ordering
//!
//! `dispatch` is first-match-wins: learned phrases in insertion order, then
//! static phrases in registration order, by substring containment. A short
//! phrase registered early can therefore shadow a longer one registered later.
//! `learn_new_phrase` and `text_confidence` instead search every registered
//! phrase for the best normalised edit-distance similarity.
//!
//! Learned phrases persist to a JSON document (`{"data": [...]}`) rewritten on
//! every change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::similarity::similarity;
use super::CommandTable;
use crate::error::{CrewVoxError, Result};
use crate::persist;

/// File name of the learned-phrase document inside the data directory.
pub const LEARNED_FILE_NAME: &str = "learned_commands.json";

/// A transcription previously associated with a registered phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedPhrase {
    pub heard_phrase: String,
    pub matched_command: String,
    pub confidence: f32,
    pub usage_count: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LearnedDocument {
    #[serde(default)]
    data: Vec<LearnedPhrase>,
}

#[derive(Serialize)]
struct LearnedDocumentRef<'a> {
    data: &'a [LearnedPhrase],
}

/// Which table resolved a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchSource {
    /// A learned phrase; carries the heard phrase that matched.
    Learned { heard: String },
    /// A registered phrase.
    Static,
}

/// Result of a successful phrase match.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Registered phrase the text resolved to.
    pub phrase: String,
    pub source: DispatchSource,
    /// `false` when a learned phrase points at a phrase no longer registered.
    pub fired: bool,
    /// Set when the learned usage count could not be persisted. The action has
    /// fired regardless.
    pub persist_error: Option<CrewVoxError>,
}

pub struct CommandMatcher {
    table: Arc<CommandTable>,
    learned: Vec<LearnedPhrase>,
    path: PathBuf,
}

impl CommandMatcher {
    /// Bind `table` and load learned phrases from `path`.
    ///
    /// A missing or corrupt document starts with no learned phrases.
    pub fn open(table: Arc<CommandTable>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc: LearnedDocument = persist::load_or_default(&path);
        info!(
            path = %path.display(),
            learned = doc.data.len(),
            groups = table.len(),
            "command matcher ready"
        );
        Self {
            table,
            learned: doc.data,
            path,
        }
    }

    /// Open with the learned document inside `data_dir`.
    pub fn open_in(table: Arc<CommandTable>, data_dir: &Path) -> Self {
        Self::open(table, data_dir.join(LEARNED_FILE_NAME))
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    pub fn learned(&self) -> &[LearnedPhrase] {
        &self.learned
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Invoke the action of the first phrase contained in `text`.
    ///
    /// No match is a silent no-op (`None`). At most one action fires.
    pub fn dispatch(&mut self, text: &str) -> Option<DispatchOutcome> {
        let text = text.to_lowercase();

        let hit = self.learned.iter().position(|lp| {
            let heard = lp.heard_phrase.to_lowercase();
            !heard.is_empty() && text.contains(&heard)
        });
        if let Some(index) = hit {
            return Some(self.dispatch_learned(index));
        }

        for group in self.table.groups() {
            if let Some(phrase) = group.phrases().iter().find(|p| text.contains(p.as_str())) {
                debug!(text = %text, phrase = %phrase, "matched registered phrase");
                group.fire();
                return Some(DispatchOutcome {
                    phrase: phrase.clone(),
                    source: DispatchSource::Static,
                    fired: true,
                    persist_error: None,
                });
            }
        }

        debug!(text = %text, "no phrase matched");
        None
    }

    fn dispatch_learned(&mut self, index: usize) -> DispatchOutcome {
        let entry = &mut self.learned[index];
        entry.usage_count = entry.usage_count.saturating_add(1);
        let heard = entry.heard_phrase.clone();
        let phrase = entry.matched_command.clone();

        let fired = match self.table.group_for(&phrase) {
            Some(group) => {
                group.fire();
                true
            }
            None => false,
        };
        debug!(heard = %heard, phrase = %phrase, fired, "matched learned phrase");

        let persist_error = self.save().err();
        if let Some(e) = &persist_error {
            error!(error = %e, "failed to persist learned phrase usage");
        }

        DispatchOutcome {
            phrase,
            source: DispatchSource::Learned { heard },
            fired,
            persist_error,
        }
    }

    /// Record `heard` as a learned alias of its closest registered phrase.
    ///
    /// Returns `Ok(None)` when `heard` is empty or no registered phrase is
    /// similar at all.
    pub fn learn_new_phrase(&mut self, heard: &str, confidence: f32) -> Result<Option<LearnedPhrase>> {
        let heard = heard.trim().to_lowercase();
        if heard.is_empty() {
            return Ok(None);
        }
        let Some((closest, score)) = self.closest_phrase(&heard) else {
            debug!(heard = %heard, "nothing similar enough to learn from");
            return Ok(None);
        };

        let entry = LearnedPhrase {
            heard_phrase: heard,
            matched_command: closest,
            confidence: confidence.clamp(0.0, 1.0),
            usage_count: 1,
        };
        info!(
            heard = %entry.heard_phrase,
            command = %entry.matched_command,
            similarity = score,
            "learned new phrase"
        );
        self.learned.push(entry.clone());
        self.save()?;
        Ok(Some(entry))
    }

    /// Best edit-distance similarity of `text` to any registered phrase.
    pub fn text_confidence(&self, text: &str) -> f32 {
        self.closest_phrase(&text.to_lowercase())
            .map_or(0.0, |(_, score)| score)
            .clamp(0.0, 1.0)
    }

    /// Registered phrase most similar to `text` (already lower-cased), if any
    /// scores above zero. Ties keep the earliest registered phrase.
    pub fn closest_phrase(&self, text: &str) -> Option<(String, f32)> {
        let mut best: Option<(&str, f32)> = None;
        for phrase in self.table.phrases() {
            let score = similarity(text, phrase);
            if score > best.map_or(0.0, |(_, s)| s) {
                best = Some((phrase, score));
            }
        }
        best.map(|(p, s)| (p.to_string(), s))
    }

    /// Rewrite the learned-phrase document.
    pub fn save(&self) -> Result<()> {
        persist::save_atomic(&self.path, &LearnedDocumentRef { data: &self.learned })
    }
}

impl std::fmt::Debug for CommandMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandMatcher")
            .field("groups", &self.table.len())
            .field("learned", &self.learned.len())
            .field("path", &self.path)
            .finish()
    }
}
