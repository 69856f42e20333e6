//! Causeway CLI — the main entry point.
//!
//! Commands:
//! - `init`    — Write a default config file
//! - `config`  — Show, validate, or locate the configuration
//! - `run`     — Run a scripted session against the dry-run runtime
//! - `replay`  — Rebuild a stored session's state from its log
//! - `events`  — Dump a stored session's events as JSON lines
//! - `check`   — Evaluate the safety gate for a shell command

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "causeway",
    about = "Causeway — event-sourced orchestration core for autonomous agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to ~/.causeway/config.toml)
    #[arg(short, long, global = true, env = "CAUSEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run a scripted session
    Run {
        /// Script file (TOML: task, steps, finish)
        #[arg(short, long)]
        script: PathBuf,

        /// Session id (resumes the stored log if it exists)
        #[arg(long)]
        session: Option<String>,

        /// Approve every action that asks for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Rebuild a stored session's state and print it
    Replay {
        /// Session id
        session: String,
    },

    /// Print a stored session's events as JSON lines
    Events {
        /// Session id
        session: String,

        /// First event id to print
        #[arg(long, default_value_t = 0)]
        from: u64,
    },

    /// Evaluate the safety gate for a shell command
    Check {
        /// The command to evaluate
        command: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Validate the configuration and report warnings
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so command output stays pipeable
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init => commands::init::run(config_path).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
        },
        Commands::Run {
            script,
            session,
            yes,
        } => {
            let config = commands::load_config(config_path)?;
            commands::run::run(config, &script, session, yes).await?
        }
        Commands::Replay { session } => {
            let config = commands::load_config(config_path)?;
            commands::replay::run(config, &session).await?
        }
        Commands::Events { session, from } => {
            let config = commands::load_config(config_path)?;
            commands::events::run(config, &session, from).await?
        }
        Commands::Check { command } => {
            let config = commands::load_config(config_path)?;
            commands::check::run(config, &command).await?
        }
    }

    Ok(())
}
