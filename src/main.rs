//! PitchDB CLI - inspect, create and migrate a profile's football database

mod commands;

use clap::{Parser, Subcommand};
use console::Term;
use pitchdb::UserDialog;
use pitchdb::config::{self, PitchConfig};
use pitchdb::ui;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "pitchdb")]
#[command(version)]
#[command(about = "Embedded match, player and league store for a football-management companion")]
#[command(long_about = r#"
PitchDB keeps one SQLite database per user profile and upgrades old
databases in place before anything else touches them.

Example usage:
  pitchdb config-init
  pitchdb init
  pitchdb status --json
  pitchdb migrate --scripts ./migrations
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database folder, overriding the config file
    #[arg(long, global = true)]
    db_folder: Option<PathBuf>,

    /// Profile name, overriding the config file
    #[arg(short, long, global = true)]
    profile: Option<String>,

    /// Never advance the stored schema version
    #[arg(long, global = true)]
    development: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the profile's database
    Init,

    /// Show profile, schema version and migration state
    Status,

    /// Row counts of every table
    Tables,

    /// Run the migration stages, optionally with scripts from a directory
    Migrate {
        /// Directory holding V<n>__<desc>.sql scripts
        #[arg(short, long)]
        scripts: Option<PathBuf>,
    },

    /// Show the prepared statement cache after startup
    Cache {
        /// Open with the statement cache disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Write a starter pitchdb.toml
    ConfigInit {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(&self) -> bool {
        matches!(self, OutputMode::Human)
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    status: &'a str,
    command: &'a str,
    data: T,
}

pub fn emit_success<T: Serialize>(output_mode: OutputMode, command: &str, data: T) -> anyhow::Result<()> {
    if output_mode == OutputMode::Json {
        let envelope = Envelope {
            status: "ok",
            command,
            data,
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

/// Prompts on the terminal; declines when stdin is not interactive
pub struct ConsoleDialog {
    interactive: bool,
}

impl ConsoleDialog {
    pub fn new(output_mode: OutputMode) -> Self {
        Self {
            interactive: output_mode.is_human() && Term::stderr().is_term(),
        }
    }
}

impl UserDialog for ConsoleDialog {
    fn fatal(&self, title: &str, message: &str) {
        ui::error(title);
        eprintln!("   {message}");
    }

    fn confirm(&self, question: &str) -> bool {
        if !self.interactive {
            tracing::warn!(question, "not interactive, declining");
            return false;
        }
        let term = Term::stderr();
        if term.write_str(&format!("{question} [y/N] ")).is_err() {
            return false;
        }
        match term.read_line() {
            Ok(answer) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

/// Config file merged with command-line overrides
pub struct Settings {
    pub config_path: PathBuf,
    pub config: PitchConfig,
    pub base: PathBuf,
}

fn settings(cli: &Cli) -> anyhow::Result<Settings> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = config::load_config(Some(&config_path))?.unwrap_or_default();
    if let Some(folder) = &cli.db_folder {
        config.database_folder = Some(folder.display().to_string());
    }
    if let Some(profile) = &cli.profile {
        config.profile = Some(profile.clone());
    }
    if cli.development {
        config.development = Some(true);
    }
    Ok(Settings {
        config_path,
        config,
        base: std::env::current_dir()?,
    })
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli) {
        ui::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };
    let settings = settings(&cli)?;

    match cli.command {
        Commands::Init => commands::run_init(&settings, output_mode),
        Commands::Status => commands::run_status(&settings, output_mode),
        Commands::Tables => commands::run_tables(&settings, output_mode),
        Commands::Migrate { scripts } => commands::run_migrate(&settings, scripts, output_mode),
        Commands::Cache { disabled } => commands::run_cache(&settings, disabled, output_mode),
        Commands::ConfigInit { force } => commands::run_config_init(&settings, force, output_mode),
    }
}
