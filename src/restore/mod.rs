mod logic;
pub(crate) mod verification;

use tracing::info;

use crate::backup::BackupCapability;
use crate::errors::Result;
use crate::storage::StorageCapability;

pub use logic::{list_available, restore_latest, restore_specific};

/// What `dbvault restore` was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreAction {
    /// Print available keys, newest first, one per line on stdout.
    List,
    Specific(String),
    Latest,
}

/// Public entry point for the restore process. `Ok(false)` means the restore itself failed.
pub async fn run_restore_flow(
    action: &RestoreAction,
    backup: &dyn BackupCapability,
    storage: &dyn StorageCapability,
) -> Result<bool> {
    match action {
        RestoreAction::List => {
            info!("Listing available backups...");
            let keys = list_available(storage, backup.database_name()).await?;
            if keys.is_empty() {
                info!("No backups found for database: {}", backup.database_name());
                return Ok(true);
            }
            info!("Found {} backups", keys.len());
            for key in &keys {
                println!("{}", key);
            }
            Ok(true)
        }
        RestoreAction::Specific(key) => {
            info!("Restoring specific backup: {}", key);
            Ok(restore_specific(storage, backup, key).await)
        }
        RestoreAction::Latest => {
            info!("Restoring latest backup...");
            Ok(restore_latest(storage, backup).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::testing::{MemoryStorage, ScriptedBackup, StorageOp};
    use chrono::Utc;

    #[tokio::test]
    async fn test_list_is_success_even_when_empty() -> anyhow::Result<()> {
        let storage = MemoryStorage::new();
        let backup = ScriptedBackup::new("orders", b"");
        assert!(run_restore_flow(&RestoreAction::List, &backup, &storage).await?);
        assert!(backup.restored_from().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_propagates_storage_failure() {
        let storage = MemoryStorage::new();
        storage.fail(StorageOp::List);
        let backup = ScriptedBackup::new("orders", b"");
        let result = run_restore_flow(&RestoreAction::List, &backup, &storage).await;
        assert!(matches!(result, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn test_specific_and_latest_report_outcome() -> anyhow::Result<()> {
        let storage = MemoryStorage::new();
        storage.insert("orders_20240114_020000.sql.gz", b"snapshot", Utc::now());
        let backup = ScriptedBackup::new("orders", b"live");

        let missing = RestoreAction::Specific("orders_19990101_000000.sql.gz".into());
        assert!(!run_restore_flow(&missing, &backup, &storage).await?);
        assert!(run_restore_flow(&RestoreAction::Latest, &backup, &storage).await?);
        assert_eq!(backup.content(), b"snapshot");
        Ok(())
    }
}
