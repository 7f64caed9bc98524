//! `prospector` -- CLI binary for the content pipeline.
//!
//! Subcommands:
//!
//! - `prospector run` -- one orchestrator run over the unprocessed queue
//! - `prospector dashboard` -- serve the read-only metrics dashboard
//! - `prospector backup` -- create, list, and restore store snapshots
//! - `prospector status` -- configuration and spend summary
//!
//! Exit codes for `run`: 0 clean, 2 invalid configuration, 3 lock
//! contention, 4 kill switch at startup, 5 cost exhausted mid-run,
//! 1 any other unrecovered failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

/// prospector content pipeline CLI.
#[derive(Parser)]
#[command(name = "prospector", about = "forum-to-storefront content pipeline", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (default: ./prospector.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once over the unprocessed queue.
    Run,

    /// Serve the read-only dashboard.
    Dashboard {
        /// Listen port (overrides the configured dashboard_port).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage database snapshots.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Show configuration, spend, and backup status.
    Status,
}

/// Subcommands for `prospector backup`.
#[derive(Subcommand)]
enum BackupAction {
    /// Take a snapshot now and apply retention.
    Create,

    /// List snapshots, newest first.
    List,

    /// Restore a snapshot over the live database.
    Restore {
        /// Path of the snapshot file to restore.
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from("./prospector.json"));

    let code = match cli.command {
        Commands::Run => commands::run::run(&config_path).await,
        Commands::Dashboard { port } => commands::dashboard::run(&config_path, port).await,
        Commands::Backup { action } => match action {
            BackupAction::Create => commands::backup::create(&config_path),
            BackupAction::List => commands::backup::list(&config_path),
            BackupAction::Restore { snapshot } => {
                commands::backup::restore(&config_path, &snapshot)
            }
        },
        Commands::Status => commands::status::run(&config_path),
    };

    ExitCode::from(code)
}
