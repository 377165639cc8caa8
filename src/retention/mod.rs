//! Expiry of backups that have outlived the retention window.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use crate::errors::{AppError, Result};
use crate::storage::{StorageCapability, StorageObject};

/// Objects last modified strictly before `now - retention_days`, in input order.
///
/// An object exactly at the cutoff is kept. A window reaching before the earliest
/// representable time expires nothing.
pub fn get_expired(objects: &[StorageObject], retention_days: u32, now: DateTime<Utc>) -> Vec<StorageObject> {
    let window = Duration::try_days(i64::from(retention_days));
    let Some(cutoff) = window.and_then(|window| now.checked_sub_signed(window)) else {
        debug!("Retention window of {} days reaches past the earliest timestamp", retention_days);
        return Vec::new();
    };
    objects
        .iter()
        .filter(|object| object.last_modified < cutoff)
        .cloned()
        .collect()
}

/// Deletes every expired object under `prefix` in one batched call and returns how many went.
pub async fn cleanup(storage: &dyn StorageCapability, retention_days: u32, prefix: &str) -> Result<usize> {
    cleanup_at(storage, retention_days, prefix, Utc::now()).await
}

pub async fn cleanup_at(
    storage: &dyn StorageCapability,
    retention_days: u32,
    prefix: &str,
    now: DateTime<Utc>,
) -> Result<usize> {
    info!("Starting retention cleanup (retention_days={})", retention_days);

    let objects = storage.list(prefix).await.map_err(|e| {
        error!("Retention cleanup failed while listing: {}", e);
        AppError::retention(e)
    })?;
    debug!("Found {} total objects", objects.len());

    let expired = get_expired(&objects, retention_days, now);
    if expired.is_empty() {
        info!("No expired backups to delete");
        return Ok(0);
    }

    info!("Found {} expired backups to delete", expired.len());
    let keys: Vec<String> = expired.into_iter().map(|object| object.key).collect();
    storage.delete_many(&keys).await.map_err(|e| {
        error!("Retention cleanup failed while deleting: {}", e);
        AppError::retention(e)
    })?;

    info!("Retention cleanup completed: deleted {} backups", keys.len());
    Ok(keys.len())
}
