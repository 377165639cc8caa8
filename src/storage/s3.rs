// dbvault/src/storage/s3.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, NaiveDateTime, Utc};
use s3::config::{Credentials, Region};
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use s3::types::{Delete, Object, ObjectIdentifier};
use std::future::Future;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use super::{StorageCapability, StorageObject};
use crate::config::{BackblazeConfig, S3Config, StorageConfig};
use crate::errors::{AppError, Result};

/// Largest number of keys a single `DeleteObjects` request accepts.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Which S3-API service an [`ObjectStore`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProfile {
    S3,
    /// Cloudflare R2: the S3 API behind a mandatory account endpoint.
    R2,
    /// Backblaze B2 through its S3-compatible API.
    Backblaze,
}

impl StorageProfile {
    fn scheme(&self) -> &'static str {
        match self {
            StorageProfile::S3 => "s3",
            StorageProfile::R2 => "r2",
            StorageProfile::Backblaze => "b2",
        }
    }
}

/// Object storage over the S3 API, shared by every supported backend.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    client: s3::Client,
    bucket: String,
    profile: StorageProfile,
}

impl ObjectStore {
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        match config {
            StorageConfig::S3(settings) => Self::new(StorageProfile::S3, settings).await,
            StorageConfig::R2(settings) => Self::new(StorageProfile::R2, settings).await,
            StorageConfig::Backblaze(b2) => Self::new(StorageProfile::Backblaze, &backblaze_settings(b2)).await,
        }
    }

    /// Fails immediately for an R2 profile without an endpoint.
    pub async fn new(profile: StorageProfile, settings: &S3Config) -> Result<Self> {
        let endpoint = resolve_endpoint(profile, settings)?;

        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(Credentials::new(
                &settings.access_key,
                &settings.secret_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        if let Some(endpoint) = &endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let mut builder = s3::config::Builder::from(&sdk_config);
        if endpoint.is_some() {
            // Custom endpoints (R2, B2, MinIO) do not all resolve virtual-hosted buckets.
            builder = builder.force_path_style(true);
        }

        debug!(
            "Initialized {} client for bucket '{}' (endpoint: {})",
            profile.scheme(),
            settings.bucket,
            endpoint.as_deref().unwrap_or("default")
        );

        Ok(ObjectStore {
            client: s3::Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
            profile,
        })
    }

    fn location(&self, key: &str) -> String {
        format!("{}://{}/{}", self.profile.scheme(), self.bucket, key)
    }

    /// One `DeleteObjects` request. Per-key errors in the response count as failure.
    async fn delete_batch(&self, keys: &[String]) -> Result<()> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Invalid object key in delete batch: {}", e)))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| AppError::Storage(format!("Invalid delete request: {}", e)))?;

        let response = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete objects: {}", DisplayErrorContext(&e))))?;

        let failures = response.errors();
        if !failures.is_empty() {
            let details: Vec<String> = failures
                .iter()
                .take(5)
                .map(|f| {
                    format!(
                        "{} ({})",
                        f.key().unwrap_or("?"),
                        f.message().or(f.code()).unwrap_or("unknown error")
                    )
                })
                .collect();
            return Err(AppError::Storage(format!(
                "{} of {} objects could not be deleted: {}",
                failures.len(),
                keys.len(),
                details.join(", ")
            )));
        }
        Ok(())
    }
}

fn resolve_endpoint(profile: StorageProfile, settings: &S3Config) -> Result<Option<String>> {
    let endpoint = settings.endpoint.clone().filter(|e| !e.trim().is_empty());
    if profile == StorageProfile::R2 && endpoint.is_none() {
        return Err(AppError::Config("R2 requires S3_ENDPOINT to be configured".into()));
    }
    Ok(endpoint)
}

fn backblaze_settings(b2: &BackblazeConfig) -> S3Config {
    S3Config {
        access_key: b2.key_id.clone(),
        secret_key: b2.application_key.clone(),
        bucket: b2.bucket.clone(),
        region: b2.region.clone(),
        endpoint: Some(format!("https://s3.{}.backblazeb2.com", b2.region)),
    }
}

/// Issues `delete_chunk` for consecutive slices of at most `chunk_size` keys, one at a time.
///
/// Stops at the first failing slice. Returns how many slices were sent.
pub(crate) async fn delete_in_chunks<'k, F, Fut>(
    keys: &'k [String],
    chunk_size: usize,
    mut delete_chunk: F,
) -> Result<usize>
where
    F: FnMut(&'k [String]) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let chunk_size = chunk_size.max(1);
    let total = keys.len().div_ceil(chunk_size);

    for (index, chunk) in keys.chunks(chunk_size).enumerate() {
        if let Err(e) = delete_chunk(chunk).await {
            error!("Delete batch {}/{} ({} keys) failed: {}", index + 1, total, chunk.len(), e);
            return Err(match e {
                AppError::Storage(msg) => AppError::Storage(format!(
                    "batch {}/{} failed after {} objects were deleted: {}",
                    index + 1,
                    total,
                    index * chunk_size,
                    msg
                )),
                other => other,
            });
        }
    }
    Ok(total)
}

/// S3 reports `LastModified` in UTC.
fn to_chrono(timestamp: &s3::primitives::DateTime) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp(timestamp.secs(), timestamp.subsec_nanos()).map(|t| t.naive_utc())
}

/// `None` for entries without a key. A missing timestamp is an error: retention cannot judge the object.
fn to_storage_object(object: &Object) -> Result<Option<StorageObject>> {
    let Some(key) = object.key() else {
        return Ok(None);
    };
    let last_modified = object
        .last_modified()
        .and_then(to_chrono)
        .ok_or_else(|| AppError::Storage(format!("Object {} has no usable last-modified time", key)))?;
    let size = object.size().unwrap_or_default().max(0) as u64;
    Ok(Some(StorageObject::from_naive(key, size, last_modified)))
}

#[async_trait]
impl StorageCapability for ObjectStore {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()> {
        info!("Uploading {} to {}", local_path.display(), self.location(remote_key));

        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            AppError::Storage(format!("Failed to read {} for upload: {}", local_path.display(), e))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(remote_key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("Upload failed: {}", DisplayErrorContext(&e));
                AppError::Storage(format!(
                    "Failed to upload {} to {}: {}",
                    local_path.display(),
                    self.location(remote_key),
                    DisplayErrorContext(&e)
                ))
            })?;

        info!("Upload completed: {}", remote_key);
        Ok(())
    }

    async fn download(&self, remote_key: &str, local_path: &Path) -> Result<()> {
        info!("Downloading {} to {}", self.location(remote_key), local_path.display());

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::Storage(format!("Failed to create directory {}: {}", parent.display(), e))
            })?;
        }

        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(remote_key)
            .send()
            .await
            .map_err(|e| {
                AppError::Storage(format!(
                    "Failed to get object {}: {}",
                    self.location(remote_key),
                    DisplayErrorContext(&e)
                ))
            })?;

        let mut output_file = File::create(local_path).await.map_err(|e| {
            AppError::Storage(format!("Failed to create destination file {}: {}", local_path.display(), e))
        })?;

        let mut body = object.body;
        let mut total_bytes = 0usize;
        while let Some(chunk) = body.try_next().await.map_err(|e| {
            AppError::Storage(format!("Download of {} interrupted: {}", self.location(remote_key), e))
        })? {
            output_file.write_all(&chunk).await.map_err(|e| {
                AppError::Storage(format!("Failed to write {}: {}", local_path.display(), e))
            })?;
            total_bytes += chunk.len();
        }
        output_file
            .flush()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write {}: {}", local_path.display(), e)))?;

        debug!("Downloaded {} bytes", total_bytes);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StorageObject>> {
        debug!("Listing objects with prefix '{}'", prefix);

        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix((!prefix.is_empty()).then(|| prefix.to_string()))
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    AppError::Storage(format!(
                        "Failed to list objects in {}: {}",
                        self.location(prefix),
                        DisplayErrorContext(&e)
                    ))
                })?;

            for object in page.contents() {
                if let Some(listed) = to_storage_object(object)? {
                    objects.push(listed);
                }
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        debug!("Found {} objects", objects.len());
        Ok(objects)
    }

    async fn delete(&self, remote_key: &str) -> Result<()> {
        info!("Deleting {}", self.location(remote_key));

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(remote_key)
            .send()
            .await
            .map_err(|e| {
                AppError::Storage(format!(
                    "Failed to delete {}: {}",
                    self.location(remote_key),
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!("Deleted: {}", remote_key);
        Ok(())
    }

    async fn delete_many(&self, remote_keys: &[String]) -> Result<()> {
        if remote_keys.is_empty() {
            return Ok(());
        }

        info!("Deleting {} objects from {}", remote_keys.len(), self.location(""));
        let batches = delete_in_chunks(remote_keys, MAX_DELETE_BATCH, |chunk| self.delete_batch(chunk)).await?;
        info!("Deleted {} objects in {} batches", remote_keys.len(), batches);
        Ok(())
    }
}
