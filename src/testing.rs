//! In-memory stand-ins for the backup and storage capabilities.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::backup::{BackupCapability, BackupSnapshot, snapshot_file_name};
use crate::errors::{AppError, Result};
use crate::storage::{StorageCapability, StorageObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    Upload,
    Download,
    List,
    Delete,
    DeleteMany,
}

#[derive(Default)]
struct StorageState {
    objects: BTreeMap<String, (Vec<u8>, DateTime<Utc>)>,
    failing: HashSet<StorageOp>,
    calls: Vec<StorageOp>,
    delete_many_calls: Vec<Vec<String>>,
}

#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<StorageState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, contents: &[u8], last_modified: DateTime<Utc>) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), (contents.to_vec(), last_modified));
    }

    pub fn fail(&self, op: StorageOp) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn contents(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(key).map(|(bytes, _)| bytes.clone())
    }

    pub fn calls(&self) -> Vec<StorageOp> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn delete_many_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().delete_many_calls.clone()
    }

    fn record(&self, op: StorageOp) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(op);
        if state.failing.contains(&op) {
            return Err(AppError::Storage(format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageCapability for MemoryStorage {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()> {
        self.record(StorageOp::Upload)?;
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        self.insert(remote_key, &bytes, Utc::now());
        Ok(())
    }

    async fn download(&self, remote_key: &str, local_path: &Path) -> Result<()> {
        self.record(StorageOp::Download)?;
        let bytes = self
            .contents(remote_key)
            .ok_or_else(|| AppError::Storage(format!("no such key: {}", remote_key)))?;
        tokio::fs::write(local_path, bytes)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StorageObject>> {
        self.record(StorageOp::List)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (bytes, modified))| StorageObject::new(key.clone(), bytes.len() as u64, *modified))
            .collect())
    }

    async fn delete(&self, remote_key: &str) -> Result<()> {
        self.record(StorageOp::Delete)?;
        self.state.lock().unwrap().objects.remove(remote_key);
        Ok(())
    }

    async fn delete_many(&self, remote_keys: &[String]) -> Result<()> {
        self.record(StorageOp::DeleteMany)?;
        let mut state = self.state.lock().unwrap();
        state.delete_many_calls.push(remote_keys.to_vec());
        for key in remote_keys {
            state.objects.remove(key);
        }
        Ok(())
    }
}

/// A "database" whose whole content is a byte string.
pub struct ScriptedBackup {
    database: String,
    content: Mutex<Vec<u8>>,
    fail_backup: bool,
    fail_restore: bool,
    restored_from: Mutex<Vec<PathBuf>>,
    backup_dirs: Mutex<Vec<PathBuf>>,
}

impl ScriptedBackup {
    pub fn new(database: &str, content: &[u8]) -> Self {
        Self {
            database: database.to_string(),
            content: Mutex::new(content.to_vec()),
            fail_backup: false,
            fail_restore: false,
            restored_from: Mutex::new(Vec::new()),
            backup_dirs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_backup(mut self) -> Self {
        self.fail_backup = true;
        self
    }

    pub fn failing_restore(mut self) -> Self {
        self.fail_restore = true;
        self
    }

    pub fn content(&self) -> Vec<u8> {
        self.content.lock().unwrap().clone()
    }

    pub fn set_content(&self, content: &[u8]) {
        *self.content.lock().unwrap() = content.to_vec();
    }

    pub fn restored_from(&self) -> Vec<PathBuf> {
        self.restored_from.lock().unwrap().clone()
    }

    pub fn backups_taken(&self) -> usize {
        self.backup_dirs.lock().unwrap().len()
    }

    /// Every `output_dir` handed to `backup`, in call order.
    pub fn backup_dirs(&self) -> Vec<PathBuf> {
        self.backup_dirs.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackupCapability for ScriptedBackup {
    async fn backup(&self, output_dir: &Path) -> Result<BackupSnapshot> {
        self.backup_dirs.lock().unwrap().push(output_dir.to_path_buf());
        if self.fail_backup {
            return Err(AppError::Backup("dump tool exited with status 1: connection refused".into()));
        }
        let created_at = Utc::now();
        let path = output_dir.join(snapshot_file_name(&self.database, self.file_extension(), created_at));
        tokio::fs::write(&path, self.content())
            .await
            .map_err(|e| AppError::Backup(e.to_string()))?;
        BackupSnapshot::from_file(path, &self.database, created_at).await
    }

    async fn restore(&self, snapshot_path: &Path) -> Result<()> {
        self.restored_from.lock().unwrap().push(snapshot_path.to_path_buf());
        if self.fail_restore {
            return Err(AppError::Restore("restore tool exited with status 1".into()));
        }
        let bytes = tokio::fs::read(snapshot_path)
            .await
            .map_err(|e| AppError::Restore(e.to_string()))?;
        self.set_content(&bytes);
        Ok(())
    }

    fn database_name(&self) -> &str {
        &self.database
    }

    fn file_extension(&self) -> &'static str {
        "sql.gz"
    }
}
