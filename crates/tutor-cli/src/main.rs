//! Code Tutor CLI
//!
//! Interactive code reviews and reverse-teaching sessions in the terminal.

mod console;
mod log_bridge;
mod review;
mod teach;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tutor_core::config::{default_config_dir, API_KEY_ENV_VARS, CONFIG_FILE_NAME};
use tutor_core::source::SUPPORTED_LANGUAGES;
use tutor_core::{
    AnthropicClient, Config, EventBroadcaster, EventSink, ExperienceLevel, FocusArea,
    LearnerProfile, ModelClient, QuestionStyle, SessionOptions, TeachingEngine, AVAILABLE_MODELS,
};
use tutor_log::{export, TranscriptRenderer, LOG_DIR_NAME};

use crate::console::Console;
use crate::review::ReviewContext;

/// Code Tutor - learn by explaining
///
/// Reviews your code by first asking why you wrote it the way you did, or
/// has you teach a struggling student by giving hints on their buggy code.
#[derive(Parser, Debug)]
#[command(name = "code-tutor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration directory (default: the platform config dir)
    #[arg(long, value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive first-time configuration
    Setup,

    /// Review a source file, or every source file in a directory
    Review {
        /// File or directory to review
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Only review files directly inside the directory
        #[arg(long)]
        no_recursive: bool,
    },

    /// Practise teaching by helping a simulated student
    TeachMe {
        /// Topic to practise (asked for if omitted)
        #[arg(long)]
        topic: Option<String>,

        /// Language for the exercises (asked for if omitted)
        #[arg(long)]
        language: Option<String>,
    },

    /// Show the current configuration
    Config,

    /// Show supported languages, models and preferences
    Info,

    /// Export session logs
    ExportLogs {
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// Delete the session logs after exporting
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    /// All sessions in one JSON document
    Json,
    /// Readable Markdown transcripts
    Markdown,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (warn)
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);
    tracing::debug!(config_dir = %config_dir.display(), "Using config directory");

    match run(cli.command, &config_dir).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(command: Command, config_dir: &Path) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut console = Console::new(stdin.lock());

    match command {
        Command::Setup => setup(&mut console, config_dir),
        Command::Review { path, no_recursive } => {
            let session = Session::open(config_dir)?;
            let ctx = ReviewContext {
                client: Arc::clone(&session.client),
                sink: session.sink(),
                options: session.options.clone(),
            };
            let result = review::run(&mut console, &ctx, &path, !no_recursive).await;
            drop(ctx);
            session.finish().await;
            result
        }
        Command::TeachMe { topic, language } => {
            let session = Session::open(config_dir)?;
            let mut engine =
                TeachingEngine::new(Arc::clone(&session.client), session.sink(), &session.options);
            let result = teach::run(&mut console, &mut engine, topic, language).await;
            drop(engine);
            session.finish().await;
            result
        }
        Command::Config => show_config(config_dir),
        Command::Info => {
            show_info();
            Ok(())
        }
        Command::ExportLogs {
            output,
            format,
            clear,
        } => export_logs(config_dir, output.as_deref(), format, clear),
    }
}

// ============================================================================
// Session wiring
// ============================================================================

/// Everything a review or teaching command needs to talk to the model.
struct Session {
    client: Arc<dyn ModelClient>,
    broadcaster: Arc<EventBroadcaster>,
    options: SessionOptions,
    logger: Option<JoinHandle<()>>,
}

impl Session {
    fn open(config_dir: &Path) -> anyhow::Result<Self> {
        let config = Config::load_from_dir(config_dir)?;
        let api_key = config.resolve_api_key()?;
        let client = AnthropicClient::new(api_key, config.max_tokens)?;

        let broadcaster = Arc::new(EventBroadcaster::default());
        let logger = log_bridge::spawn(
            &broadcaster,
            config_dir.join(LOG_DIR_NAME),
            config.logging.clone(),
        );

        tracing::info!(model = %config.model, logging = config.logging.enabled, "Session ready");
        Ok(Self {
            client: Arc::new(client),
            broadcaster,
            options: SessionOptions::from_config(&config),
            logger,
        })
    }

    fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.broadcaster) as Arc<dyn EventSink>
    }

    /// Closes the event channel and waits for pending log writes.
    async fn finish(self) {
        drop(self.broadcaster);
        if let Some(logger) = self.logger {
            if let Err(e) = logger.await {
                tracing::warn!(error = %e, "Session logger stopped abnormally");
            }
        }
    }
}

// ============================================================================
// setup
// ============================================================================

fn setup<R: BufRead>(console: &mut Console<R>, config_dir: &Path) -> anyhow::Result<()> {
    let mut config = Config::load_from_dir(config_dir).unwrap_or_else(|e| {
        eprintln!("Existing configuration could not be read, starting fresh:\n{e}\n");
        Config::default()
    });

    println!("Code Tutor setup\n");

    if config.api_key_locked {
        println!("API key: managed by the system configuration");
    } else {
        let current = config.masked_api_key().unwrap_or_default();
        let key = console.ask("Anthropic API key (Enter keeps the current one)", &current)?;
        if key != current {
            config.set_api_key(key)?;
        }
    }

    println!();
    let model = console
        .choose("Model:", &AVAILABLE_MODELS, config.model.as_str())?
        .to_string();
    config.model = model;

    println!();
    config.experience_level =
        console.choose("Experience level:", &ExperienceLevel::ALL, config.experience_level)?;

    println!();
    config.preferences.question_style = console.choose(
        "Question style:",
        &QuestionStyle::ALL,
        config.preferences.question_style,
    )?;

    println!();
    let names: Vec<_> = FocusArea::ALL.iter().map(FocusArea::as_str).collect();
    println!("Focus areas: {}", names.join(", "));
    let current: Vec<_> = config
        .preferences
        .focus_areas
        .iter()
        .map(FocusArea::as_str)
        .collect();
    let answer = console.ask("Focus areas, comma separated", &current.join(","))?;
    match parse_focus_areas(&answer) {
        Ok(areas) if !areas.is_empty() => config.preferences.focus_areas = areas,
        Ok(_) => println!("No focus areas given; keeping the current ones."),
        Err(e) => println!("{e}\nKeeping the current focus areas."),
    }

    println!();
    config.logging.enabled = console.confirm("Keep session logs?", config.logging.enabled)?;

    config.validate()?;
    let path = config_dir.join(CONFIG_FILE_NAME);
    config.save(&path)?;
    println!("\nConfiguration saved to {}", path.display());
    Ok(())
}

fn parse_focus_areas(input: &str) -> tutor_core::Result<Vec<FocusArea>> {
    let areas = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<FocusArea>)
        .collect::<tutor_core::Result<Vec<FocusArea>>>()?;
    // Dedup the same way the profile does
    Ok(LearnerProfile::new(ExperienceLevel::default(), QuestionStyle::default(), areas)
        .focus_areas()
        .to_vec())
}

// ============================================================================
// config / info
// ============================================================================

fn show_config(config_dir: &Path) -> anyhow::Result<()> {
    let config = Config::load_from_dir(config_dir)?;
    let env_key = API_KEY_ENV_VARS
        .iter()
        .find(|name| std::env::var(name).is_ok_and(|v| !v.trim().is_empty()));

    println!("Config file: {}", config_dir.join(CONFIG_FILE_NAME).display());
    match (env_key, config.masked_api_key()) {
        (Some(name), _) => println!("API key: from ${name}"),
        (None, Some(masked)) => println!("API key: {masked}"),
        (None, None) => println!("API key: not set (run 'code-tutor setup')"),
    }
    if config.api_key_locked {
        println!("  (locked by system configuration)");
    }
    println!("Model: {}", config.model);
    println!("Experience level: {}", config.experience_level);
    println!("Question style: {}", config.preferences.question_style);
    let focus: Vec<_> = config
        .preferences
        .focus_areas
        .iter()
        .map(FocusArea::as_str)
        .collect();
    println!("Focus areas: {}", focus.join(", "));
    println!("Max teaching rounds: {}", config.max_rounds);
    println!("Request timeout: {}s", config.request_timeout_secs);
    println!(
        "Session logs: {} ({})",
        if config.logging.enabled { "on" } else { "off" },
        config_dir.join(LOG_DIR_NAME).display()
    );
    Ok(())
}

fn show_info() {
    println!("Code Tutor {}\n", env!("CARGO_PKG_VERSION"));

    println!("Supported languages:");
    for (ext, language) in SUPPORTED_LANGUAGES {
        println!("  .{ext:<6} {language}");
    }

    println!("\nModels:");
    for model in AVAILABLE_MODELS {
        println!("  {model}");
    }

    let levels: Vec<_> = ExperienceLevel::ALL.iter().map(ExperienceLevel::as_str).collect();
    let styles: Vec<_> = QuestionStyle::ALL.iter().map(QuestionStyle::as_str).collect();
    let areas: Vec<_> = FocusArea::ALL.iter().map(FocusArea::as_str).collect();
    println!("\nExperience levels: {}", levels.join(", "));
    println!("Question styles: {}", styles.join(", "));
    println!("Focus areas: {}", areas.join(", "));
}

// ============================================================================
// export-logs
// ============================================================================

fn export_logs(
    config_dir: &Path,
    output: Option<&Path>,
    format: ExportFormat,
    clear: bool,
) -> anyhow::Result<()> {
    let logs_dir = config_dir.join(LOG_DIR_NAME);
    let document = export::export_all(&logs_dir)?;

    if document.session_count == 0 {
        println!("No session logs in {}", logs_dir.display());
    } else {
        let rendered = match format {
            ExportFormat::Json => document.to_json_pretty()?,
            ExportFormat::Markdown => document
                .sessions
                .iter()
                .map(|session| TranscriptRenderer::new(&session.entries).render())
                .collect::<Vec<_>>()
                .join("\n\n"),
        };

        match output {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, rendered)?;
                println!(
                    "Exported {} session(s), {} entries, to {}",
                    document.session_count,
                    document.entry_count(),
                    path.display()
                );
            }
            None => println!("{rendered}"),
        }
    }

    if clear {
        let removed = export::clear_logs(&logs_dir)?;
        println!("Removed {removed} session log(s)");
    }
    Ok(())
}
