// dbvault/src/backup/mongo_dump.rs
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{BackupCapability, BackupSnapshot, snapshot_file_name};
use crate::config::MongoConfig;
use crate::errors::{AppError, Result};
use crate::utils::{command_diagnostic, find_executable};

const EXTENSION: &str = "archive.gz";

/// MongoDB snapshots as gzip archives from `mongodump`, restored with `mongorestore`.
#[derive(Debug, Clone)]
pub struct MongoDumpBackup {
    config: MongoConfig,
}

impl MongoDumpBackup {
    pub fn new(config: MongoConfig) -> Self {
        Self { config }
    }

    fn dump_command(&self, mongodump: &Path, archive: &Path) -> Command {
        let mut cmd = Command::new(mongodump);
        cmd.arg("--uri")
            .arg(&self.config.uri)
            .arg("--db")
            .arg(&self.config.database)
            .arg(format!("--archive={}", archive.display()))
            .arg("--gzip");
        cmd
    }

    fn restore_command(&self, mongorestore: &Path, archive: &Path) -> Command {
        let mut cmd = Command::new(mongorestore);
        cmd.arg("--uri")
            .arg(&self.config.uri)
            .arg(format!("--archive={}", archive.display()))
            .arg("--gzip")
            .arg("--drop")
            .arg(format!("--nsInclude={}.*", self.config.database));
        cmd
    }
}

#[async_trait]
impl BackupCapability for MongoDumpBackup {
    async fn backup(&self, output_dir: &Path) -> Result<BackupSnapshot> {
        let created_at = Utc::now();
        let archive_path = output_dir.join(snapshot_file_name(&self.config.database, EXTENSION, created_at));

        info!("Starting MongoDB backup for database '{}'", self.config.database);
        let mongodump = find_executable("mongodump").map_err(AppError::Backup)?;

        debug!("Executing mongodump into {}", archive_path.display());
        let output = self
            .dump_command(&mongodump, &archive_path)
            .output()
            .await
            .map_err(|e| AppError::Backup(format!("Failed to execute mongodump: {}", e)))?;

        if !output.status.success() {
            let diagnostic = command_diagnostic(&output);
            error!("mongodump failed: {}", diagnostic);
            let _ = tokio::fs::remove_file(&archive_path).await;
            return Err(AppError::Backup(format!("MongoDB backup failed: {}", diagnostic)));
        }

        let snapshot = BackupSnapshot::from_file(archive_path, &self.config.database, created_at).await?;
        info!("Backup completed: {} ({} bytes)", snapshot.file_name, snapshot.size_bytes);
        Ok(snapshot)
    }

    async fn restore(&self, snapshot_path: &Path) -> Result<()> {
        info!("Starting MongoDB restore for database '{}'", self.config.database);
        info!("Restoring from: {}", snapshot_path.display());

        let mongorestore = find_executable("mongorestore").map_err(AppError::Restore)?;
        let output = self
            .restore_command(&mongorestore, snapshot_path)
            .output()
            .await
            .map_err(|e| AppError::Restore(format!("Failed to execute mongorestore: {}", e)))?;

        if !output.status.success() {
            let diagnostic = command_diagnostic(&output);
            error!("mongorestore failed: {}", diagnostic);
            return Err(AppError::Restore(format!("MongoDB restore failed: {}", diagnostic)));
        }

        info!("Restore completed successfully for database '{}'", self.config.database);
        Ok(())
    }

    fn database_name(&self) -> &str {
        &self.config.database
    }

    fn file_extension(&self) -> &'static str {
        EXTENSION
    }
}
