//! Command vocabulary and text → action dispatch.
//!
//! A [`CommandTable`] is the immutable set of phrase groups supplied by the
//! host at start-up; each group binds one or more spoken phrases to a single
//! action. [`CommandMatcher`] routes recognised text through the table,
//! consulting phrases it has learned from earlier transcriptions first.

pub mod matcher;
pub mod similarity;

pub use matcher::{CommandMatcher, DispatchOutcome, DispatchSource, LearnedPhrase};
pub use similarity::{levenshtein, similarity};

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{CrewVoxError, Result};

/// Zero-argument command action. Must tolerate being invoked repeatedly.
pub type Action = Arc<dyn Fn() + Send + Sync>;

/// Phrases bound to one action. The first phrase names the group.
#[derive(Clone)]
pub struct CommandGroup {
    phrases: Vec<String>,
    action: Action,
}

impl CommandGroup {
    /// Display / training name: the first registered phrase.
    pub fn name(&self) -> &str {
        &self.phrases[0]
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn contains(&self, phrase: &str) -> bool {
        self.phrases.iter().any(|p| p == phrase)
    }

    /// Invoke the bound action.
    pub fn fire(&self) {
        (self.action)();
    }
}

impl std::fmt::Debug for CommandGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandGroup")
            .field("phrases", &self.phrases)
            .finish_non_exhaustive()
    }
}

/// Immutable, ordered command vocabulary.
///
/// Registration order is significant: dispatch scans groups and their phrases
/// in the order they were added and the first contained phrase wins.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    groups: Vec<CommandGroup>,
}

impl CommandTable {
    pub fn builder() -> CommandTableBuilder {
        CommandTableBuilder::default()
    }

    pub fn groups(&self) -> &[CommandGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every registered phrase, in registration order.
    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .flat_map(|g| g.phrases.iter().map(String::as_str))
    }

    /// Group owning exactly `phrase`.
    pub fn group_for(&self, phrase: &str) -> Option<&CommandGroup> {
        self.groups.iter().find(|g| g.contains(phrase))
    }

    /// Group named `name` (its first phrase).
    pub fn group_named(&self, name: &str) -> Option<&CommandGroup> {
        self.groups.iter().find(|g| g.name() == name)
    }

    /// `true` when both phrases are equal or bound to the same group.
    pub fn same_group(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        match (self.group_index(a), self.group_index(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// `(group name, phrases)` for every group, in registration order.
    pub fn training_groups(&self) -> Vec<(String, Vec<String>)> {
        self.groups
            .iter()
            .map(|g| (g.name().to_string(), g.phrases.clone()))
            .collect()
    }

    fn group_index(&self, phrase: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(phrase))
    }
}

/// Collects phrase groups and validates them into a [`CommandTable`].
#[derive(Default)]
pub struct CommandTableBuilder {
    pending: Vec<(Vec<String>, Action)>,
}

impl CommandTableBuilder {
    /// Register a group. Phrases are trimmed and lower-cased on `build`.
    pub fn group<I, S, F>(mut self, phrases: I, action: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn() + Send + Sync + 'static,
    {
        self.pending.push((
            phrases.into_iter().map(Into::into).collect(),
            Arc::new(action),
        ));
        self
    }

    /// Register a group with an already shared action.
    pub fn group_with_action<I, S>(mut self, phrases: I, action: Action) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending
            .push((phrases.into_iter().map(Into::into).collect(), action));
        self
    }

    /// # Errors
    /// `InvalidConfig` for a group without phrases, an empty phrase, or a
    /// phrase registered twice.
    pub fn build(self) -> Result<CommandTable> {
        let mut seen = HashSet::new();
        let mut groups = Vec::with_capacity(self.pending.len());

        for (index, (raw, action)) in self.pending.into_iter().enumerate() {
            let mut phrases = Vec::with_capacity(raw.len());
            for phrase in raw {
                let phrase = phrase.trim().to_lowercase();
                if phrase.is_empty() {
                    return Err(CrewVoxError::InvalidConfig(format!(
                        "group {index} contains an empty phrase"
                    )));
                }
                if !seen.insert(phrase.clone()) {
                    return Err(CrewVoxError::InvalidConfig(format!(
                        "phrase {phrase:?} is registered more than once"
                    )));
                }
                phrases.push(phrase);
            }
            if phrases.is_empty() {
                return Err(CrewVoxError::InvalidConfig(format!(
                    "group {index} has no phrases"
                )));
            }
            groups.push(CommandGroup { phrases, action });
        }

        Ok(CommandTable { groups })
    }
}
