pub(crate) mod compression;
pub(crate) mod mongo_dump;
pub(crate) mod pg_dump;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};

pub use mongo_dump::MongoDumpBackup;
pub use pg_dump::PgDumpBackup;

/// Timestamp layout embedded in snapshot names and therefore in remote keys.
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A compressed dump file sitting in a job's temporary directory.
#[derive(Debug, Clone)]
pub struct BackupSnapshot {
    pub path: PathBuf,
    pub file_name: String,
    pub database: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl BackupSnapshot {
    /// Describes a snapshot that has already been written to `path`.
    pub async fn from_file(path: PathBuf, database: &str, created_at: DateTime<Utc>) -> Result<Self> {
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            AppError::Backup(format!("Backup file {} is not readable: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::Backup(format!("Backup path has no file name: {}", path.display())))?;

        Ok(BackupSnapshot {
            path,
            file_name,
            database: database.to_string(),
            created_at,
            size_bytes: metadata.len(),
        })
    }
}

/// `{database}_{YYYYMMDD_HHMMSS}.{extension}`, with the timestamp in UTC.
pub fn snapshot_file_name(database: &str, extension: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.{}", database, at.format(SNAPSHOT_TIMESTAMP_FORMAT), extension)
}

/// Dumps one database to a compressed file and loads such a file back.
#[async_trait]
pub trait BackupCapability: Send + Sync {
    /// Writes a snapshot of the whole database into `output_dir`.
    async fn backup(&self, output_dir: &Path) -> Result<BackupSnapshot>;

    /// Replaces the database contents with the snapshot at `snapshot_path`. Destructive.
    async fn restore(&self, snapshot_path: &Path) -> Result<()>;

    fn database_name(&self) -> &str;

    fn file_extension(&self) -> &'static str;
}

/// The supported database engines.
#[derive(Debug, Clone)]
pub enum BackupEngine {
    Postgres(PgDumpBackup),
    MongoDb(MongoDumpBackup),
}

impl BackupEngine {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        match config {
            DatabaseConfig::Postgres(pg) => BackupEngine::Postgres(PgDumpBackup::new(pg.clone())),
            DatabaseConfig::MongoDb(mongo) => BackupEngine::MongoDb(MongoDumpBackup::new(mongo.clone())),
        }
    }

    fn inner(&self) -> &dyn BackupCapability {
        match self {
            BackupEngine::Postgres(engine) => engine,
            BackupEngine::MongoDb(engine) => engine,
        }
    }
}

#[async_trait]
impl BackupCapability for BackupEngine {
    async fn backup(&self, output_dir: &Path) -> Result<BackupSnapshot> {
        self.inner().backup(output_dir).await
    }

    async fn restore(&self, snapshot_path: &Path) -> Result<()> {
        self.inner().restore(snapshot_path).await
    }

    fn database_name(&self) -> &str {
        self.inner().database_name()
    }

    fn file_extension(&self) -> &'static str {
        self.inner().file_extension()
    }
}
