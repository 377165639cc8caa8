//! Scheduled database backups to S3-compatible object storage
//!
//! Provides CLI interface for the backup scheduler and restore operations

// dbvault/src/main.rs
mod backup;
mod config;
mod errors;
mod restore;
mod retention;
mod scheduler;
mod storage;
mod utils;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::info;

use backup::{BackupCapability, BackupEngine};
use config::{AppConfig, LogLevel};
use restore::RestoreAction;
use scheduler::SchedulerSettings;
use storage::ObjectStore;

#[derive(Parser, Debug)]
#[command(name = "dbvault", version, about = "Scheduled database backups to S3-compatible storage")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the backup scheduler (default)
    Backup {
        /// Skip the startup backup regardless of RUN_ON_START
        #[arg(long, conflicts_with = "once")]
        no_initial: bool,
        /// Run a single backup job and exit with its outcome
        #[arg(long)]
        once: bool,
    },
    /// Restore a backup into the configured database
    Restore {
        /// Key of the backup to restore; the latest one when omitted
        #[arg(long, value_name = "KEY")]
        backup: Option<String>,
        /// Print available backups, newest first
        #[arg(long, conflicts_with = "backup")]
        list: bool,
    },
}

impl Command {
    fn restore_action(backup: Option<String>, list: bool) -> RestoreAction {
        match (list, backup) {
            (true, _) => RestoreAction::List,
            (false, Some(key)) => RestoreAction::Specific(key),
            (false, None) => RestoreAction::Latest,
        }
    }
}

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_app(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            utils::logging::init(LogLevel::Error.as_filter());
            return Err(e).context("Failed to load configuration");
        }
    };
    utils::logging::init(config.log_level.as_filter());

    info!("Starting dbvault");
    info!("Database type: {}", config.database.kind());
    info!("Storage type: {}", config.storage.kind());

    let engine = BackupEngine::from_config(&config.database);
    let store = ObjectStore::from_config(&config.storage)
        .await
        .context("Failed to initialise storage backend")?;

    match cli.command.unwrap_or(Command::Backup { no_initial: false, once: false }) {
        Command::Restore { backup, list } => {
            let action = Command::restore_action(backup, list);
            let restored = restore::run_restore_flow(&action, &engine, &store)
                .await
                .context("Restore process failed")?;
            if !restored {
                bail!("Restore of database '{}' did not complete", engine.database_name());
            }
        }
        Command::Backup { once: true, .. } => {
            let outcome = scheduler::run_backup_job(&engine, &store, config.retention_days).await;
            if let scheduler::JobOutcome::Failed { reason } = outcome {
                bail!("Backup job failed: {}", reason);
            }
        }
        Command::Backup { no_initial, once: false } => {
            let mut settings = SchedulerSettings::from_config(&config);
            if no_initial {
                settings.run_immediately = false;
            }

            let shutdown = CancellationToken::new();
            utils::signals::spawn_shutdown_listener(shutdown.clone());
            scheduler::run_scheduler(&settings, &engine, &store, shutdown)
                .await
                .context("Scheduler stopped unexpectedly")?;
        }
    }

    Ok(())
}
