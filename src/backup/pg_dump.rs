// dbvault/src/backup/pg_dump.rs
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::compression::{gunzip_file, gzip_file};
use super::{BackupCapability, BackupSnapshot, snapshot_file_name};
use crate::config::PostgresConfig;
use crate::errors::{AppError, Result};
use crate::restore::verification;
use crate::utils::{command_diagnostic, find_executable};

const EXTENSION: &str = "sql.gz";

/// PostgreSQL snapshots via `pg_dump`, restored with `psql`.
#[derive(Debug, Clone)]
pub struct PgDumpBackup {
    config: PostgresConfig,
}

impl PgDumpBackup {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    /// Connection flags shared by `pg_dump` and `psql`. The password travels in `PGPASSWORD`.
    fn connection_command(&self, program: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.env("PGPASSWORD", &self.config.password)
            .arg("-h")
            .arg(&self.config.host)
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg("-U")
            .arg(&self.config.user)
            .arg("-d")
            .arg(&self.config.database)
            .arg("--no-password");
        cmd
    }

    fn dump_command(&self, pg_dump: &Path, plain_sql: &Path) -> Command {
        let mut cmd = self.connection_command(pg_dump);
        // --clean makes the dump drop and recreate objects, so a restore overwrites.
        cmd.arg("--clean").arg("--if-exists").arg("-f").arg(plain_sql);
        cmd
    }

    fn restore_command(&self, psql: &Path, plain_sql: &Path) -> Command {
        let mut cmd = self.connection_command(psql);
        cmd.arg("-X")
            .arg("-q")
            .arg("-v")
            .arg("ON_ERROR_STOP=1")
            .arg("-f")
            .arg(plain_sql);
        cmd
    }
}

/// `orders_20240115_120000.sql.gz` -> `orders_20240115_120000.sql` next to it.
///
/// Names without a `.gz` suffix get `.plain.sql` appended, so the result never equals the input.
fn plain_sql_path(compressed: &Path) -> PathBuf {
    let name = compressed
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_suffix(".gz") {
        Some(stem) if !stem.is_empty() => compressed.with_file_name(stem),
        _ => compressed.with_file_name(format!("{}.plain.sql", name)),
    }
}

#[async_trait]
impl BackupCapability for PgDumpBackup {
    async fn backup(&self, output_dir: &Path) -> Result<BackupSnapshot> {
        let created_at = Utc::now();
        let archive_path = output_dir.join(snapshot_file_name(&self.config.database, EXTENSION, created_at));
        let plain_path = plain_sql_path(&archive_path);

        info!("Starting PostgreSQL backup for database '{}'", self.config.database);
        let pg_dump = find_executable("pg_dump").map_err(AppError::Backup)?;

        debug!("Executing {} into {}", pg_dump.display(), plain_path.display());
        let output = self
            .dump_command(&pg_dump, &plain_path)
            .output()
            .await
            .map_err(|e| AppError::Backup(format!("Failed to execute pg_dump: {}", e)))?;

        if !output.status.success() {
            let diagnostic = command_diagnostic(&output);
            error!("pg_dump failed: {}", diagnostic);
            let _ = tokio::fs::remove_file(&plain_path).await;
            return Err(AppError::Backup(format!("PostgreSQL backup failed: {}", diagnostic)));
        }

        debug!("Compressing backup to {}", archive_path.display());
        let (source, destination) = (plain_path.clone(), archive_path.clone());
        let compressed = tokio::task::spawn_blocking(move || gzip_file(&source, &destination))
            .await
            .map_err(|e| AppError::Backup(format!("Compression task failed: {}", e)))?;
        let _ = tokio::fs::remove_file(&plain_path).await;
        let dumped_bytes = compressed
            .map_err(|e| AppError::Backup(format!("Failed to write backup file: {}", e)))?;

        let snapshot = BackupSnapshot::from_file(archive_path, &self.config.database, created_at).await?;
        info!(
            "Backup completed: {} ({} bytes, {} bytes uncompressed)",
            snapshot.file_name, snapshot.size_bytes, dumped_bytes
        );
        Ok(snapshot)
    }

    async fn restore(&self, snapshot_path: &Path) -> Result<()> {
        info!("Starting PostgreSQL restore for database '{}'", self.config.database);
        info!("Restoring from: {}", snapshot_path.display());

        let psql = find_executable("psql").map_err(AppError::Restore)?;
        let plain_path = plain_sql_path(snapshot_path);

        let (source, destination) = (snapshot_path.to_path_buf(), plain_path.clone());
        tokio::task::spawn_blocking(move || gunzip_file(&source, &destination))
            .await
            .map_err(|e| AppError::Restore(format!("Decompression task failed: {}", e)))?
            .map_err(|e| AppError::Restore(format!("Failed to read backup file: {}", e)))?;

        let result = self.restore_command(&psql, &plain_path).output().await;
        let _ = tokio::fs::remove_file(&plain_path).await;
        let output = result.map_err(|e| AppError::Restore(format!("Failed to execute psql: {}", e)))?;

        if !output.status.success() {
            let diagnostic = command_diagnostic(&output);
            error!("psql restore failed: {}", diagnostic);
            return Err(AppError::Restore(format!("PostgreSQL restore failed: {}", diagnostic)));
        }

        match verification::count_public_tables(&self.config).await {
            Ok(count) => info!("Restored database '{}' has {} tables in public schema", self.config.database, count),
            Err(e) => warn!("Skipping post-restore verification: {:#}", e),
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
