// mongobackup/src/storage/mod.rs
pub(crate) mod gcs;
#[cfg(test)]
pub(crate) mod memory;
pub(crate) mod s3;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::StorageConfig;
use gcs::GcsBackupStore;
use s3::S3BackupStore;

/// Upper bound for a single transfer; archives of large databases take a while.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// An object as reported by the storage listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub name: String,
    pub created: DateTime<Utc>,
    pub size_bytes: u64,
}

/// The bucket holding the backup archives.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Short service name used in log lines ("GCS", "S3").
    fn name(&self) -> &'static str;

    fn bucket(&self) -> &str;

    /// Uploads the whole file as `object_name`, replacing any existing object.
    async fn upload_file(&self, local_path: &Path, object_name: &str) -> Result<()>;

    /// Lists every object in the bucket. Paging is handled by the client.
    async fn list_objects(&self) -> Result<Vec<RemoteObject>>;

    async fn delete_object(&self, object_name: &str) -> Result<()>;
}

/// Authenticates against the configured backend.
pub async fn connect(storage_config: &StorageConfig) -> Result<Box<dyn BackupStore>> {
    info!("Connecting to bucket {}", storage_config.bucket_name());
    let store: Box<dyn BackupStore> = match storage_config {
        StorageConfig::Gcs(gcs_config) => Box::new(GcsBackupStore::connect(gcs_config)?),
        StorageConfig::S3(spaces_config) => Box::new(S3BackupStore::connect(spaces_config).await),
    };
    Ok(store)
}

/// Logs the name of every object in the bucket and returns them.
pub async fn list_bucket(store: &dyn BackupStore) -> Result<Vec<String>> {
    let objects = store.list_objects().await?;
    let mut names = Vec::with_capacity(objects.len());
    for object in objects {
        info!("{}", object.name);
        debug!("{} created {} ({} bytes)", object.name, object.created, object.size_bytes);
        names.push(object.name);
    }
    Ok(names)
}
