// dbvault/src/restore/logic.rs
use std::path::Path;
use tracing::{error, info};

use crate::backup::BackupCapability;
use crate::errors::{AppError, Result};
use crate::storage::StorageCapability;

/// Keys under `prefix`, newest first; equal timestamps fall back to key order.
pub async fn list_available(storage: &dyn StorageCapability, prefix: &str) -> Result<Vec<String>> {
    let mut objects = storage.list(prefix).await?;
    objects.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.key.cmp(&b.key))
    });
    Ok(objects.into_iter().map(|object| object.key).collect())
}

/// Downloads `key` into a private temporary directory and restores from it.
///
/// Failures are logged and reported as `false` so the caller can try another backup.
pub async fn restore_specific(storage: &dyn StorageCapability, backup: &dyn BackupCapability, key: &str) -> bool {
    info!("Starting restore of backup: {}", key);

    match download_and_restore(storage, backup, key).await {
        Ok(()) => {
            info!("Restore completed successfully");
            true
        }
        Err(AppError::Storage(msg)) => {
            error!("Failed to download backup: {}", msg);
            false
        }
        Err(AppError::Restore(msg)) => {
            error!("Failed to restore backup: {}", msg);
            false
        }
        Err(e) => {
            error!("Unexpected error during restore: {}", e);
            false
        }
    }
}

async fn download_and_restore(storage: &dyn StorageCapability, backup: &dyn BackupCapability, key: &str) -> Result<()> {
    // Removed on drop, whichever way this function exits.
    let temp_dir = tempfile::Builder::new()
        .prefix("dbvault-restore-")
        .tempdir()
        .map_err(|e| AppError::Restore(format!("Failed to create temporary directory: {}", e)))?;
    let local_file = temp_dir.path().join(local_file_name(key));

    info!("Downloading backup from storage...");
    storage.download(key, &local_file).await?;
    let size = tokio::fs::metadata(&local_file).await.map(|m| m.len()).unwrap_or(0);
    info!("Downloaded: {} ({} bytes)", key, size);

    info!("Restoring to database...");
    backup.restore(&local_file).await
}

/// Last path segment of a key, so keys with `/` stay inside the temporary directory.
fn local_file_name(key: &str) -> String {
    match Path::new(key).file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => "snapshot".to_string(),
    }
}

/// Restores the newest backup for the capability's database. `false` when none exist.
pub async fn restore_latest(storage: &dyn StorageCapability, backup: &dyn BackupCapability) -> bool {
    let database = backup.database_name();
    info!("Finding latest backup for database: {}", database);

    let backups = match list_available(storage, database).await {
        Ok(backups) => backups,
        Err(e) => {
            error!("Failed to list backups: {}", e);
            return false;
        }
    };

    let Some(latest) = backups.first() else {
        error!("No backups found for database: {}", database);
        return false;
    };

    info!("Found {} backups, restoring latest: {}", backups.len(), latest);
    restore_specific(storage, backup, latest).await
}
