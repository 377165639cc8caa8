pub(crate) mod s3;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;

use crate::errors::Result;

pub use s3::ObjectStore;

/// Metadata of one object in the backup repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObject {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl StorageObject {
    pub fn new(key: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
        }
    }

    /// For backends that report timestamps without an offset; those are UTC.
    pub fn from_naive(key: impl Into<String>, size: u64, last_modified: NaiveDateTime) -> Self {
        Self::new(key, size, last_modified.and_utc())
    }
}

/// A remote repository of backup files.
#[async_trait]
pub trait StorageCapability: Send + Sync {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()>;

    async fn download(&self, remote_key: &str, local_path: &Path) -> Result<()>;

    /// Every object whose key starts with `prefix`, in no particular order.
    async fn list(&self, prefix: &str) -> Result<Vec<StorageObject>>;

    /// Deleting a missing key succeeds.
    async fn delete(&self, remote_key: &str) -> Result<()>;

    /// Either every key is deleted or an error is returned.
    async fn delete_many(&self, remote_keys: &[String]) -> Result<()>;
}
