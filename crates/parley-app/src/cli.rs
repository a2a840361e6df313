//! CLI argument definitions for the Parley application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use parley_core::config::ParleyConfig;

/// Parley - a customer service assistant that understands and answers queries.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite database and audio files.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Enable the generative response stage.
    #[arg(long = "generative")]
    pub generative: bool,

    /// Seed for template selection, for reproducible replies.
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Interactive conversation on stdin (default).
    Chat {
        /// Write the session's metrics dashboard as JSON on exit.
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Answer a single utterance and print the turn as JSON.
    Ask {
        /// The utterance. Multiple words are joined with spaces.
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Manage the FAQ knowledge base.
    Faq {
        #[command(subcommand)]
        action: FaqCommand,
    },
    /// Print aggregate query statistics as JSON.
    Stats {
        /// Trailing window in days.
        #[arg(long, default_value_t = 7)]
        days: u32,
        /// Also write the full metrics dashboard to this file.
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Manage customer profiles.
    User {
        #[command(subcommand)]
        action: UserCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum FaqCommand {
    /// List entries, most used first.
    List,
    /// Add an entry.
    Add {
        #[arg(long)]
        question: String,
        #[arg(long)]
        answer: String,
        #[arg(long, default_value = "general")]
        category: String,
        /// Comma-separated matching keywords.
        #[arg(long, value_delimiter = ',', required = true)]
        keywords: Vec<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum UserCommand {
    /// Print a profile as JSON.
    Show { user_id: String },
    /// Create a profile or update the given fields.
    Set {
        user_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Preferences as a JSON object.
        #[arg(long)]
        preferences: Option<String>,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PARLEY_CONFIG env var > platform default (~/.parley/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PARLEY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory path.
    ///
    /// Returns `None` if not overridden (use config default).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log level.
    ///
    /// Returns `None` if not overridden.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }

    /// The subcommand to run; `chat` when none was given.
    pub fn resolve_command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Chat { export: None })
    }

    /// Write flag overrides into a loaded configuration.
    pub fn apply_overrides(&self, config: &mut ParleyConfig) {
        if let Some(dir) = self.resolve_data_dir() {
            config.general.data_dir = dir;
        }
        if let Some(level) = self.resolve_log_level() {
            config.general.log_level = level;
        }
        if self.generative {
            config.pipeline.generative_enabled = true;
        }
        if self.seed.is_some() {
            config.pipeline.rng_seed = self.seed;
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    PathBuf::from("config.toml")
}
