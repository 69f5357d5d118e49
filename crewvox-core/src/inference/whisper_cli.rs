//! `WhisperCli`: runs a whisper.cpp command-line binary per utterance.
//!
//! ```text
//! <binary> -m <model_dir>/<model>.bin -f <wav> --language en -nt
//! ```
//!
//! The binary runs with its own directory as working directory so sibling
//! shared libraries resolve, so every path handed to it is made absolute
//! against the caller's working directory first. Anything on stderr is logged
//! at `warn`; stdout is returned as-is (the caller normalises it). Empty stdout
//! is the "no result" sentinel, not an error.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{CrewVoxError, Result};
use crate::inference::Transcriber;

/// Location of the whisper binary and its models.
#[derive(Debug, Clone)]
pub struct WhisperCliConfig {
    /// Path to the `whisper-cli` executable.
    pub binary: PathBuf,
    /// Directory holding `<model>.bin` files.
    pub model_dir: PathBuf,
    /// Spoken language passed via `--language`.
    pub language: String,
}

impl WhisperCliConfig {
    pub fn new(binary: impl Into<PathBuf>, model_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            model_dir: model_dir.into(),
            language: "en".into(),
        }
    }

    /// `<model_dir>/<model>.bin`
    pub fn model_path(&self, model: &str) -> PathBuf {
        self.model_dir.join(format!("{model}.bin"))
    }
}

#[derive(Debug)]
pub struct WhisperCli {
    config: WhisperCliConfig,
    /// Model checked during warm-up, if any.
    warm_model: Option<String>,
}

impl WhisperCli {
    pub fn new(config: WhisperCliConfig) -> Self {
        Self {
            config,
            warm_model: None,
        }
    }

    /// Also verify `model` exists during warm-up.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.warm_model = Some(model.into());
        self
    }

    pub fn config(&self) -> &WhisperCliConfig {
        &self.config
    }

    fn args(&self, wav_path: &Path, model: &str) -> Result<Vec<std::ffi::OsString>> {
        Ok(vec![
            "-m".into(),
            std::path::absolute(self.config.model_path(model))?.into_os_string(),
            "-f".into(),
            std::path::absolute(wav_path)?.into_os_string(),
            "--language".into(),
            self.config.language.clone().into(),
            "-nt".into(),
        ])
    }
}

impl Transcriber for WhisperCli {
    fn warm_up(&mut self) -> Result<()> {
        if !self.config.binary.is_file() {
            return Err(CrewVoxError::TranscriberNotFound {
                path: self.config.binary.clone(),
            });
        }
        if let Some(model) = &self.warm_model {
            let path = self.config.model_path(model);
            if !path.is_file() {
                return Err(CrewVoxError::TranscriberNotFound { path });
            }
        }
        info!(binary = %self.config.binary.display(), "whisper CLI ready");
        Ok(())
    }

    fn transcribe(&mut self, wav_path: &Path, model: &str) -> Result<String> {
        let binary = std::path::absolute(&self.config.binary)?;
        let mut cmd = Command::new(&binary);
        cmd.args(self.args(wav_path, model)?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = binary.parent() {
            cmd.current_dir(dir);
        }

        debug!(wav = %wav_path.display(), model, "spawning whisper CLI");
        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CrewVoxError::TranscriberNotFound {
                    path: self.config.binary.clone(),
                }
            } else {
                CrewVoxError::Transcription(format!("failed to spawn whisper CLI: {e}"))
            }
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!(stderr = %stderr.trim(), "whisper CLI wrote to stderr");
        }
        if !output.status.success() {
            return Err(CrewVoxError::Transcription(format!(
                "whisper CLI exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            warn!("whisper CLI produced no output");
        }
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_argument_list() {
        let cli = WhisperCli::new(WhisperCliConfig::new("/opt/whisper/whisper-cli", "/models"));
        let args: Vec<String> = cli
            .args(Path::new("/tmp/voice.wav"), "ggml-base.en")
            .expect("args")
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-m",
                "/models/ggml-base.en.bin",
                "-f",
                "/tmp/voice.wav",
                "--language",
                "en",
                "-nt"
            ]
        );
    }

    #[test]
    fn warm_up_fails_for_missing_binary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cli = WhisperCli::new(WhisperCliConfig::new(dir.path().join("nope"), dir.path()));
        assert!(matches!(
            cli.warm_up(),
            Err(CrewVoxError::TranscriberNotFound { .. })
        ));
    }

    #[test]
    fn warm_up_checks_model_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bin = dir.path().join("whisper-cli");
        std::fs::write(&bin, b"").expect("write");
        let mut cli =
            WhisperCli::new(WhisperCliConfig::new(&bin, dir.path())).with_model("tiny");
        let err = cli.warm_up().unwrap_err();
        assert!(
            matches!(err, CrewVoxError::TranscriberNotFound { ref path } if path.ends_with("tiny.bin")),
            "{err}"
        );
    }

    #[test]
    fn transcribe_with_missing_binary_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cli = WhisperCli::new(WhisperCliConfig::new(dir.path().join("absent"), dir.path()));
        let err = cli
            .transcribe(&dir.path().join("voice.wav"), "base")
            .unwrap_err();
        assert!(matches!(err, CrewVoxError::TranscriberNotFound { .. }), "{err}");
    }

    /// Writes an executable stand-in for whisper-cli that answers `answer`
    /// only when both the `-m` and `-f` files can be opened.
    #[cfg(unix)]
    fn fake_whisper(path: &Path, answer: &str) {
        use std::os::unix::fs::PermissionsExt;

        let script = format!(
            "#!/bin/sh\n\
             while [ $# -gt 0 ]; do\n\
               case \"$1\" in\n\
                 -m) model=\"$2\"; shift ;;\n\
                 -f) wav=\"$2\"; shift ;;\n\
               esac\n\
               shift\n\
             done\n\
             if [ -f \"$model\" ] && [ -f \"$wav\" ]; then echo \"{answer}\"; exit 0; fi\n\
             echo \"cannot open model=$model wav=$wav\" >&2\n\
             exit 1\n"
        );
        std::fs::create_dir_all(path.parent().expect("parent")).expect("bin dir");
        std::fs::write(path, script).expect("write script");
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    #[cfg(unix)]
    #[test]
    fn relative_paths_resolve_against_caller_directory() {
        // A directory under the current one, addressed relatively.
        let dir = tempfile::tempdir_in(".").expect("tempdir");
        let base = dir
            .path()
            .strip_prefix(std::env::current_dir().expect("cwd"))
            .unwrap_or(dir.path())
            .to_path_buf();
        assert!(base.is_relative(), "{}", base.display());

        let binary = base.join("bin").join("whisper-cli");
        fake_whisper(&binary, " Go.");
        std::fs::create_dir_all(base.join("bin").join("models")).expect("models");
        std::fs::write(base.join("bin").join("models").join("tiny.bin"), b"model").expect("model");
        std::fs::create_dir_all(base.join("data")).expect("data");
        let wav = base.join("data").join("voice.wav");
        std::fs::write(&wav, b"RIFF").expect("wav");

        let mut cli = WhisperCli::new(WhisperCliConfig::new(&binary, base.join("bin").join("models")))
            .with_model("tiny");
        cli.warm_up().expect("warm up");
        let text = cli.transcribe(&wav, "tiny").expect("transcribe");
        assert_eq!(text.trim(), "Go.");
    }

    #[cfg(unix)]
    #[test]
    fn failing_binary_is_a_transcription_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let binary = dir.path().join("whisper-cli");
        fake_whisper(&binary, "unused");

        let mut cli = WhisperCli::new(WhisperCliConfig::new(&binary, dir.path()));
        let err = cli
            .transcribe(&dir.path().join("missing.wav"), "tiny")
            .unwrap_err();
        assert!(matches!(err, CrewVoxError::Transcription(_)), "{err}");
    }
}
