//! JustShop CLI
//!
//! Command-line interface for JustShop - a shared shopping list.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use justshop_core::Config;

mod app;
mod commands;
mod output;
mod prompt;

use app::App;
use output::{Output, OutputFormat};

/// Default filter when logging to a file
const FILE_LOG_FILTER: &str = "justshop_core=info,justshop_cli=info";

/// Default filter when logging to stderr
const STDERR_LOG_FILTER: &str = "justshop_core=warn,justshop_cli=warn";

#[derive(Parser)]
#[command(name = "justshop")]
#[command(about = "JustShop - Shared shopping list that works offline")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the shopping list
    #[command(alias = "ls")]
    List {
        /// Skip fetching from the server first
        #[arg(long)]
        offline: bool,
    },
    /// Add an item
    Add {
        /// What to buy
        content: String,
    },
    /// Tick an item off
    Check {
        /// Item ID (full UUID or prefix)
        id: String,
    },
    /// Put a ticked item back on the list
    Uncheck {
        /// Item ID (full UUID or prefix)
        id: String,
    },
    /// Change an item's text
    Edit {
        /// Item ID (full UUID or prefix)
        id: String,
        /// New text
        content: String,
    },
    /// Remove all checked items
    DeleteChecked,
    /// Remove every item
    Clear {
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Fetch the server's list and update the local copy
    Sync,
    /// Follow the list live until Ctrl-C
    Watch,
    /// Show status (server, storage, item counts)
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (server_url, username, password, sync_interval_secs, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands don't need the database
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path, &output);
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);

    let app = App::open(config)?;

    match cli.command {
        Commands::List { offline } => {
            if !offline {
                commands::sync::sync_quiet(&app, &output).await;
            }
            commands::item::list(&app, &output)
        }
        Commands::Add { content } => commands::item::add(&app, content, &output).await,
        Commands::Check { id } => commands::item::set_checked(&app, id, true, &output).await,
        Commands::Uncheck { id } => commands::item::set_checked(&app, id, false, &output).await,
        Commands::Edit { id, content } => commands::item::edit(&app, id, content, &output).await,
        Commands::DeleteChecked => commands::item::delete_checked(&app, &output).await,
        Commands::Clear { yes } => commands::item::clear(&app, yes, &output).await,
        Commands::Sync => commands::sync::sync(&app, &output).await,
        Commands::Watch => commands::watch::watch(&app, &output).await,
        Commands::Status => commands::status::show(&app, &output),
        Commands::Config { .. } => Ok(()), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize tracing
///
/// Filter comes from JUSTSHOP_LOG, then RUST_LOG. Output goes to the
/// configured log file, or stderr when none is set.
fn init_logging(config: &Config) {
    let filter_from_env = std::env::var("JUSTSHOP_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok();

    match &config.log_file {
        Some(log_path) => {
            let log_file = match File::options().create(true).append(true).open(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
                    return;
                }
            };

            let env_filter = EnvFilter::new(filter_from_env.as_deref().unwrap_or(FILE_LOG_FILTER));

            // Ignore error if already initialized
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();

            info!("Logging initialized to {:?}", log_path);
        }
        None => {
            let env_filter =
                EnvFilter::new(filter_from_env.as_deref().unwrap_or(STDERR_LOG_FILTER));

            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
