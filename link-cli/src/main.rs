//! # notelink
//!
//! Operational CLI for Notelink sync engines.
//!
//! ## Commands
//!
//! - `queue list`: Show the durable artifact queue
//! - `queue add`: Enqueue an artifact by hand
//! - `queue mark-delivered`: Retire a queue record
//! - `config show`: Print the effective engine configuration
//! - `demo`: Run the offline-queue pipeline end to end in a sandbox
//!
//! ## Example
//!
//! ```bash
//! # Inspect a queue file
//! notelink --config notelink.toml queue list
//!
//! # Enqueue a recording for the next drain
//! notelink queue add recordings/rec-42.m4a --origin wrist
//!
//! # Watch the full pipeline run against a loopback transport
//! notelink demo
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use link_engine::EngineConfig;

mod commands;

/// Operational CLI for Notelink sync engines.
#[derive(Parser, Debug)]
#[command(name = "notelink")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Engine configuration file (defaults apply when missing)
    #[arg(long, global = true, default_value = "notelink.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect or mutate the durable artifact queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Show the effective engine configuration
    Config,

    /// Run the offline-queue pipeline end to end against a loopback
    /// transport
    Demo,
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// List all queue records, pending and delivered
    List,

    /// Enqueue an artifact by hand
    Add {
        /// Path of the artifact content
        locator: String,

        /// Provenance tag stamped into the record
        #[arg(long, default_value = "cli")]
        origin: String,

        /// Capture timestamp (Unix seconds; defaults to now)
        #[arg(long)]
        created_at: Option<u64>,
    },

    /// Mark a record delivered so it is never sent
    MarkDelivered {
        /// Locator of the record to retire
        locator: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Queue { action } => match action {
            QueueAction::List => commands::queue_list(&config)?,
            QueueAction::Add {
                locator,
                origin,
                created_at,
            } => commands::queue_add(&config, &locator, created_at, &origin)?,
            QueueAction::MarkDelivered { locator } => {
                commands::queue_mark_delivered(&config, &locator)?
            }
        },
        Commands::Config => commands::config_show(&cli.config, &config),
        Commands::Demo => commands::demo().await?,
    }

    Ok(())
}

/// Load the configuration file, falling back to defaults when it does
/// not exist. A present-but-broken file is an error, not a silent
/// default.
fn load_config(path: &PathBuf) -> Result<EngineConfig> {
    if path.exists() {
        EngineConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(EngineConfig::default())
    }
}
