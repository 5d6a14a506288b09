//! Command-line interface parsing and handling
//!
//! Each subcommand drives the panel core headlessly: it opens panels backed by
//! the on-disk store, runs them until idle and prints what they commit.

pub mod brainstorm;
pub mod export;
pub mod health;
pub mod model_list;
pub mod say;
pub mod session;
pub mod settings;

#[cfg(test)]
mod tests;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::brainstorm::run_brainstorm;
use crate::cli::export::run_export;
use crate::cli::health::check_health;
use crate::cli::model_list::list_models;
use crate::cli::say::run_say;
use crate::cli::settings::run_set;
use crate::core::config::Config;
use crate::core::error::ConfigError;
use crate::core::relay::IterationLimit;
use crate::core::session::GenerationPreset;
use crate::utils::logging::{init_tracing, TranscriptLog};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ")"
);

#[derive(Parser)]
#[command(name = "allm")]
#[command(version = VERSION)]
#[command(about = "Side-by-side chat panels against a local OpenAI-compatible server")]
#[command(
    long_about = "allm talks to a locally hosted OpenAI-compatible server (LM Studio and \
friends) through one or more chat panels. Replies stream in as they arrive, every panel \
keeps its own conversation history, and in brainstorm mode each finished reply is handed \
to the other panels as their next prompt.\n\n\
Configuration:\n\
  The config file lives in the platform config directory (config.toml).\n\
  --server and --port override the configured address for a single run.\n\n\
Environment Variables:\n\
  RUST_LOG          Diagnostic filter, takes precedence over --log-level"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Server host or IP, overriding the config file
    #[arg(short = 's', long, global = true, value_name = "ADDRESS")]
    pub server: Option<String>,

    /// Server port, overriding the config file
    #[arg(short = 'P', long, global = true)]
    pub port: Option<u16>,

    /// Append every committed message to the specified file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Diagnostic log level written to stderr
    #[arg(long, global = true, default_value = "warn", value_name = "LEVEL")]
    pub log_level: String,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the models the server has loaded
    Models,
    /// Send one prompt on panel-1 and stream the reply
    Say {
        /// Model id to use instead of the panel's saved or preferred model
        #[arg(short = 'm', long, value_name = "MODEL")]
        model: Option<String>,
        /// Start a new conversation instead of continuing the active one
        #[arg(long)]
        fresh: bool,
        /// Sampling preset: creative, balanced or precise
        #[arg(long, value_name = "PRESET")]
        preset: Option<GenerationPreset>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        prompt: Vec<String>,
    },
    /// Ask panel-1 and relay every reply to the other panels
    Brainstorm {
        /// Relay hop limit: a positive number or "infinite"
        #[arg(short = 'i', long, value_name = "N|infinite")]
        iterations: Option<IterationLimit>,
        /// Number of panels taking part (at least two)
        #[arg(long, value_name = "N")]
        panels: Option<usize>,
        /// Sampling preset used by every panel: creative, balanced or precise
        #[arg(long, value_name = "PRESET")]
        preset: Option<GenerationPreset>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        prompt: Vec<String>,
    },
    /// Write a panel's conversation history as plain text
    Export {
        /// Panel number to export
        #[arg(long, default_value_t = 1)]
        panel: usize,
        /// Export every conversation, not just the active one
        #[arg(long)]
        all: bool,
        /// Output file; stdout when omitted
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Check whether the server answers on /health
    Health,
    /// Show the configuration, or save a new value for one key
    Set {
        /// Configuration key, for example server-address or iteration-limit
        key: Option<String>,
        /// New value; the current configuration is printed when omitted
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    if let Commands::Set { key, value } = args.command {
        return run_set(args.config.as_deref(), key, value);
    }

    let config = load_config(args.config.as_deref())?;
    let mut config = apply_overrides(config, args.server.as_deref(), args.port);

    match args.command {
        Commands::Set { .. } => Ok(()),
        Commands::Models => list_models(&config).await,
        Commands::Health => check_health(&config).await,
        Commands::Export { panel, all, output } => run_export(&config, panel, all, output),
        Commands::Say {
            model,
            fresh,
            preset,
            prompt,
        } => {
            config.generation.preset = preset.or(config.generation.preset);
            let transcript = TranscriptLog::new(args.log)?;
            run_say(&config, transcript, model, fresh, prompt).await
        }
        Commands::Brainstorm {
            iterations,
            panels,
            preset,
            prompt,
        } => {
            config.generation.preset = preset.or(config.generation.preset);
            let transcript = TranscriptLog::new(args.log)?;
            run_brainstorm(&config, transcript, iterations, panels, prompt).await
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

/// Command-line server flags win over the config file.
pub fn apply_overrides(mut config: Config, server: Option<&str>, port: Option<u16>) -> Config {
    if let Some(server) = server {
        config.server.address = server.trim().to_string();
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config
}
