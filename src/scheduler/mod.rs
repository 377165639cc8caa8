//! Cron-driven backup loop.

pub mod cron;

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::backup::BackupCapability;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::retention;
use crate::storage::StorageCapability;
use cron::CronSchedule;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub schedule: CronSchedule,
    pub retention_days: u32,
    /// Take one backup before waiting for the first tick.
    pub run_immediately: bool,
}

impl SchedulerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            schedule: config.schedule.clone(),
            retention_days: config.retention_days,
            run_immediately: config.run_on_start,
        }
    }
}

/// Result of one backup job. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded { key: String, expired_deleted: usize },
    Failed { reason: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}

pub fn next_run_time(schedule: &CronSchedule, base: DateTime<Utc>) -> Result<DateTime<Utc>> {
    schedule.next_after(base).ok_or_else(|| {
        AppError::Config(format!("Schedule '{}' has no upcoming occurrence", schedule))
    })
}

/// How long to sleep until `next_run`; zero when it is already due.
pub fn wait_duration(next_run: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (next_run - now).to_std().unwrap_or(Duration::ZERO)
}

/// Dump, upload, then prune. Any failure, pruning included, ends up in the outcome, never in a panic or `Err`.
pub async fn run_backup_job(
    backup: &dyn BackupCapability,
    storage: &dyn StorageCapability,
    retention_days: u32,
) -> JobOutcome {
    info!("Starting backup job");

    let key = match take_and_upload(backup, storage).await {
        Ok(key) => key,
        Err(e) => {
            match &e {
                AppError::Backup(msg) => error!("Backup failed: {}", msg),
                AppError::Storage(msg) => error!("Storage operation failed: {}", msg),
                other => error!("Unexpected error during backup: {}", other),
            }
            return JobOutcome::Failed { reason: e.to_string() };
        }
    };

    // A pruning failure fails the job; the uploaded backup stays in storage.
    let expired_deleted = match retention::cleanup(storage, retention_days, backup.database_name()).await {
        Ok(count) => {
            if count > 0 {
                info!("Cleaned up {} old backups", count);
            }
            count
        }
        Err(e) => {
            error!("Backup {} stored, but {}", key, e);
            return JobOutcome::Failed { reason: e.to_string() };
        }
    };

    info!("Backup job completed successfully");
    JobOutcome::Succeeded { key, expired_deleted }
}

async fn take_and_upload(backup: &dyn BackupCapability, storage: &dyn StorageCapability) -> Result<String> {
    // Removed on drop, on every exit path.
    let temp_dir = tempfile::Builder::new()
        .prefix("dbvault-backup-")
        .tempdir()
        .map_err(|e| AppError::Backup(format!("Failed to create temporary directory: {}", e)))?;

    let snapshot = backup.backup(temp_dir.path()).await?;
    info!(
        "Backup of '{}' created at {}: {} ({} bytes)",
        snapshot.database,
        snapshot.created_at.to_rfc3339(),
        snapshot.file_name,
        snapshot.size_bytes
    );

    storage.upload(&snapshot.path, &snapshot.file_name).await?;
    info!("Backup uploaded: {}", snapshot.file_name);

    Ok(snapshot.file_name)
}

/// Runs until `shutdown` is cancelled. Missed ticks are skipped, never replayed.
pub async fn run_scheduler(
    settings: &SchedulerSettings,
    backup: &dyn BackupCapability,
    storage: &dyn StorageCapability,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Starting scheduler with schedule: {}", settings.schedule.expression());
    info!("Retention policy: {} days", settings.retention_days);

    if settings.run_immediately && !shutdown.is_cancelled() {
        info!("Running initial backup");
        run_backup_job(backup, storage, settings.retention_days).await;
    }

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let now = Utc::now();
        let next_run = next_run_time(&settings.schedule, now)?;
        info!("Next backup scheduled for: {}", next_run.to_rfc3339());

        let wait = wait_duration(next_run, now);
        if !wait.is_zero() {
            debug!("Sleeping for {} seconds", wait.as_secs());
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        run_backup_job(backup, storage, settings.retention_days).await;
    }

    info!("Scheduler stopped");
    Ok(())
}
