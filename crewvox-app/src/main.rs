//! `crewvox`: command-line host for the CrewVox recognition engine.
//!
//! Stands in for the game/vehicle side: it owns the settings file, binds every
//! command group to an action (here: a log line naming the action), and feeds
//! WAV captures into the engine in place of a live push-to-talk microphone.

mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crewvox_core::audio::wav::read_wav;
use crewvox_core::commands::Action;
use crewvox_core::{
    CycleOutcome, RecognitionEngine, StubTranscriber, TranscriberHandle, WhisperCli,
    WhisperCliConfig,
};
use tracing::{info, warn};

use settings::{default_settings_path, load_settings, save_settings, AppSettings};

#[derive(Parser, Debug)]
#[command(name = "crewvox")]
#[command(author, version, about = "Push-to-talk voice commands with a personal voice-print store", long_about = None)]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, env = "CREWVOX_SETTINGS")]
    settings: Option<PathBuf>,

    /// Directory for voice prints, learned phrases and the capture file
    #[arg(long, env = "CREWVOX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Transcription model name (file stem of `<model>.bin`)
    #[arg(long)]
    model: Option<String>,

    /// whisper.cpp CLI executable
    #[arg(long, env = "CREWVOX_WHISPER_BIN")]
    whisper_bin: Option<PathBuf>,

    /// Folder holding the transcription models
    #[arg(long)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the current settings (defaults if none) to the settings file
    InitSettings {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    #[command(flatten)]
    Engine(EngineCommand),
}

/// Subcommands that run against a recognition engine.
#[derive(Subcommand, Debug)]
enum EngineCommand {
    /// Recognise each WAV file as one push-to-talk utterance
    Recognize {
        #[arg(required = true)]
        wavs: Vec<PathBuf>,
        /// Push-to-talk hold duration; the capture is cut to this length
        #[arg(long)]
        hold_ms: Option<u64>,
        /// Give up waiting for a transcription after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Store WAV files as training samples for a command group
    Train {
        /// Group name (its first phrase, see `groups`)
        group: String,
        #[arg(required = true)]
        wavs: Vec<PathBuf>,
    },
    /// Remove near-duplicate voice prints
    Prune,
    /// List command groups
    Groups,
    /// List learned phrases
    Learned,
    /// Count stored voice prints per phrase
    Samples,
}

fn main() -> Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crewvox=info,crewvox_core=info")),
        )
        .init();

    let cli = Cli::parse();

    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut app_settings = load_settings(&settings_path);
    apply_overrides(&mut app_settings, &cli);
    info!(
        settings_path = ?settings_path,
        model = %app_settings.model_name,
        whisper = ?app_settings.whisper_binary,
        groups = app_settings.command_groups.len(),
        "settings loaded"
    );

    match cli.command {
        Command::InitSettings { force } => init_settings(&settings_path, &app_settings, force),
        Command::Engine(command) => run(command, &settings_path, &app_settings),
    }
}

fn init_settings(path: &Path, settings: &AppSettings, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    save_settings(path, settings).with_context(|| format!("writing {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

fn run(command: EngineCommand, settings_path: &Path, app_settings: &AppSettings) -> Result<()> {
    let data_dir = app_settings
        .data_dir
        .clone()
        .or_else(|| settings_path.parent().map(PathBuf::from))
        .unwrap_or_else(settings::default_data_dir);

    // ── Engine setup ──────────────────────────────────────────────────────
    let table = app_settings
        .command_table(bind_action)
        .context("invalid command groups in settings")?;
    let config = app_settings.recognizer_config(&data_dir);
    let mut engine = RecognitionEngine::new(config, Arc::new(table), transcriber(app_settings))
        .context("starting recognition engine")?;

    match command {
        EngineCommand::Recognize {
            wavs,
            hold_ms,
            timeout_secs,
        } => {
            let hold = hold_ms.map(Duration::from_millis);
            let timeout = Duration::from_secs(timeout_secs);
            for wav in wavs {
                let outcome = recognize_file(&mut engine, &wav, hold, timeout)?;
                println!("{}: {}", wav.display(), describe(&outcome));
            }
        }
        EngineCommand::Train { group, wavs } => {
            engine
                .select_training_group(&group)
                .with_context(|| format!("unknown group {group:?}; see `crewvox groups`"))?;
            engine.set_training_mode(true);
            for wav in wavs {
                let capture =
                    read_wav(&wav).with_context(|| format!("reading {}", wav.display()))?;
                let outcome = engine.recognize(capture, None)?;
                println!("{}: {}", wav.display(), describe(&outcome));
            }
        }
        EngineCommand::Prune => {
            let removed = engine.prune().context("pruning voice prints")?;
            println!("removed {removed} near-duplicate sample(s)");
        }
        EngineCommand::Groups => {
            for (name, phrases) in engine.training_groups() {
                println!("{name}: {}", phrases.join(", "));
            }
        }
        EngineCommand::Learned => {
            let learned = engine.matcher().learned();
            if learned.is_empty() {
                println!("no learned phrases");
            }
            for lp in learned {
                println!(
                    "{:?} -> {:?} (confidence {:.2}, used {}x)",
                    lp.heard_phrase, lp.matched_command, lp.confidence, lp.usage_count
                );
            }
        }
        EngineCommand::Samples => {
            let counts = engine.store().label_counts();
            if counts.is_empty() {
                println!("no voice prints stored in {}", engine.store().root().display());
            }
            for (label, count) in counts {
                println!("{label}: {count}");
            }
        }
    }

    info!(diagnostics = ?engine.diagnostics_snapshot(), "done");
    Ok(())
}

fn apply_overrides(settings: &mut AppSettings, cli: &Cli) {
    if let Some(dir) = &cli.data_dir {
        settings.data_dir = Some(dir.clone());
    }
    if let Some(model) = &cli.model {
        settings.model_name = settings::normalize_model_name(model);
    }
    if let Some(bin) = &cli.whisper_bin {
        settings.whisper_binary = Some(bin.clone());
    }
    if let Some(dir) = &cli.model_dir {
        settings.model_dir = Some(dir.clone());
    }
}

/// Every group logs its action name; a vehicle host would drive its
/// controls here instead.
fn bind_action(group: &settings::CommandGroupSettings) -> Action {
    let action = group.action.clone();
    let phrase = group.phrases.first().cloned().unwrap_or_default();
    Arc::new(move || {
        info!(action = %action, group = %phrase, "executing command");
        println!("-> {action}");
    })
}

fn transcriber(settings: &AppSettings) -> TranscriberHandle {
    let (Some(binary), Some(model_dir)) = (
        settings.whisper_binary.clone(),
        settings.resolved_model_dir(),
    ) else {
        warn!("no whisper binary configured, transcription fallback disabled");
        return TranscriberHandle::new(StubTranscriber::new());
    };
    info!(binary = %binary.display(), model_dir = %model_dir.display(), "using whisper CLI");
    TranscriberHandle::new(
        WhisperCli::new(WhisperCliConfig::new(binary, model_dir))
            .with_model(settings.model_name.clone()),
    )
}

fn recognize_file(
    engine: &mut RecognitionEngine,
    wav: &Path,
    hold: Option<Duration>,
    timeout: Duration,
) -> Result<CycleOutcome> {
    let capture = read_wav(wav).with_context(|| format!("reading {}", wav.display()))?;
    let outcome = engine.recognize(capture, hold)?;
    if !outcome.is_pending() {
        return Ok(outcome);
    }
    match engine.wait_for_result(timeout)? {
        Some(outcome) => Ok(outcome),
        None => bail!("transcription did not finish within {timeout:?}"),
    }
}

fn describe(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Ignored => "empty capture".into(),
        CycleOutcome::Trained { group, samples } => {
            format!("stored {samples} training sample(s) for {group:?}")
        }
        CycleOutcome::QuickMatch {
            label,
            score,
            dispatched,
            reinforced,
        } => format!(
            "quick match {label:?} ({score:.2}){}{}",
            dispatched
                .as_deref()
                .map(|p| format!(" -> {p:?}"))
                .unwrap_or_default(),
            if *reinforced { ", reinforced" } else { "" }
        ),
        CycleOutcome::Pending(session) => format!("session {session} still transcribing"),
        CycleOutcome::Transcribed {
            text,
            confidence,
            dispatched,
            learned,
        } => {
            let mut out = format!("heard {text:?} ({:.0}%)", confidence * 100.0);
            match dispatched {
                Some(p) => out.push_str(&format!(" -> {p:?}")),
                None => out.push_str(", not recognised"),
            }
            if let Some(lp) = learned {
                out.push_str(&format!(", learned as {:?}", lp.matched_command));
            }
            out
        }
    }
}
