//! Persistent host settings (JSON file in the app data directory).
//!
//! The command vocabulary lives here, not in the core: each group is a list
//! of spoken phrases plus the name of the action it triggers.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crewvox_core::commands::Action;
use crewvox_core::{CommandTable, RecognizerConfig};
use serde::{Deserialize, Serialize};

const DEFAULT_MODEL_NAME: &str = "ggml-base.en";

/// One phrase group and the action it is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandGroupSettings {
    pub phrases: Vec<String>,
    pub action: String,
}

impl CommandGroupSettings {
    fn new(phrases: &[&str], action: &str) -> Self {
        Self {
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
            action: action.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Voice prints, learned phrases and the capture file. `None` uses the
    /// directory holding the settings file.
    pub data_dir: Option<PathBuf>,
    /// whisper.cpp CLI executable. `None` disables transcription.
    pub whisper_binary: Option<PathBuf>,
    /// Folder with `<model>.bin` files. `None` uses `<binary dir>/models`.
    pub model_dir: Option<PathBuf>,
    pub model_name: String,
    pub quick_match_threshold: f32,
    pub reinforce_threshold: f32,
    pub auto_learn_threshold: f32,
    pub prune_on_start: bool,
    pub command_groups: Vec<CommandGroupSettings>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            whisper_binary: None,
            model_dir: None,
            model_name: DEFAULT_MODEL_NAME.into(),
            quick_match_threshold: 0.85,
            reinforce_threshold: 0.95,
            auto_learn_threshold: 0.85,
            prune_on_start: true,
            command_groups: default_command_groups(),
        }
    }
}

/// Driving vocabulary. Order matters: dispatch is first-match-wins, so the
/// numbered gears come before the bare "go".
pub fn default_command_groups() -> Vec<CommandGroupSettings> {
    vec![
        CommandGroupSettings::new(&["go 2", "go two", "go to"], "forward_gear_2"),
        CommandGroupSettings::new(&["go 3", "go three", "go free"], "forward_gear_3"),
        CommandGroupSettings::new(&["go 4", "go for"], "forward_gear_4"),
        CommandGroupSettings::new(&["go", "go1", "go one"], "forward_gear_1"),
        CommandGroupSettings::new(&["back 2", "back two", "back to"], "reverse_gear_2"),
        CommandGroupSettings::new(&["back 1", "back one", "back"], "reverse_gear_1"),
        CommandGroupSettings::new(&["reverse 2", "reverse two", "reverse to"], "reverse_gear_2"),
        CommandGroupSettings::new(&["reverse 1", "reverse one", "reverse"], "reverse_gear_1"),
        CommandGroupSettings::new(&["stop", "halt"], "stop"),
        CommandGroupSettings::new(&["left left"], "turn_left_hard"),
        CommandGroupSettings::new(&["left"], "turn_left"),
        CommandGroupSettings::new(&["right right"], "turn_right_hard"),
        CommandGroupSettings::new(&["right"], "turn_right"),
        CommandGroupSettings::new(&["straight"], "straight"),
    ]
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.quick_match_threshold = self.quick_match_threshold.clamp(0.0, 1.0);
        self.reinforce_threshold = self.reinforce_threshold.clamp(0.0, 1.0);
        self.auto_learn_threshold = self.auto_learn_threshold.clamp(0.0, 1.0);
        self.model_name = normalize_model_name(&self.model_name);
        self.data_dir = non_empty_path(self.data_dir.take());
        self.whisper_binary = non_empty_path(self.whisper_binary.take());
        self.model_dir = non_empty_path(self.model_dir.take());
        self.command_groups = normalize_command_groups(&self.command_groups);
    }

    /// Model folder: explicit setting, else `models` next to the binary.
    pub fn resolved_model_dir(&self) -> Option<PathBuf> {
        self.model_dir.clone().or_else(|| {
            self.whisper_binary
                .as_ref()
                .and_then(|b| b.parent())
                .map(|dir| dir.join("models"))
        })
    }

    pub fn recognizer_config(&self, data_dir: &Path) -> RecognizerConfig {
        RecognizerConfig {
            quick_match_threshold: self.quick_match_threshold,
            reinforce_threshold: self.reinforce_threshold,
            auto_learn_threshold: self.auto_learn_threshold,
            prune_on_start: self.prune_on_start,
            model_name: self.model_name.clone(),
            ..RecognizerConfig::default().with_data_dir(data_dir)
        }
    }

    /// Build the command table, asking `bind` for each group's action.
    pub fn command_table<F>(&self, mut bind: F) -> crewvox_core::Result<CommandTable>
    where
        F: FnMut(&CommandGroupSettings) -> Action,
    {
        let mut builder = CommandTable::builder();
        for group in &self.command_groups {
            builder = builder.group_with_action(group.phrases.iter().cloned(), bind(group));
        }
        builder.build()
    }
}

pub fn normalize_model_name(raw: &str) -> String {
    let name = raw.trim().trim_end_matches(".bin");
    if name.is_empty() {
        DEFAULT_MODEL_NAME.into()
    } else {
        name.into()
    }
}

fn non_empty_path(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
}

/// Lower-case and trim phrases, drop empty or repeated ones, drop groups left
/// without phrases. An empty action name falls back to the first phrase.
fn normalize_command_groups(raw: &[CommandGroupSettings]) -> Vec<CommandGroupSettings> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for group in raw {
        let phrases: Vec<String> = group
            .phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .filter(|p| seen.insert(p.clone()))
            .collect();
        let Some(first) = phrases.first() else {
            continue;
        };
        let action = match group.action.trim() {
            "" => first.clone(),
            a => a.to_string(),
        };
        out.push(CommandGroupSettings { phrases, action });
    }
    out
}

/// Platform data directory for CrewVox.
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("CrewVox")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("crewvox")
    }
}

pub fn default_settings_path() -> PathBuf {
    default_data_dir().join("settings.json")
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
