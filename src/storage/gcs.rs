// mongobackup/src/storage/gcs.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::TryStreamExt;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ClientOptions, ObjectMeta, ObjectStore, PutPayload, WriteMultipart};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use super::{BackupStore, RemoteObject, UPLOAD_TIMEOUT};
use crate::config::GcsConfig;
use crate::errors::{AppError, Result as AppResult};

/// Files up to this size go up in a single request.
const SINGLE_REQUEST_LIMIT: u64 = 8 * 1024 * 1024;
const UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;
const MAX_PARTS_IN_FLIGHT: usize = 1;

/// The fields of a service-account JSON key the client needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: Option<String>,
    pub project_id: Option<String>,
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

/// Decodes the base64 service-account key.
///
/// Returns the parsed key together with the decoded JSON text, which is what
/// the storage client consumes.
pub fn decode_service_account_key(encoded: &str) -> AppResult<(ServiceAccountKey, String)> {
    let decoded = STANDARD.decode(encoded.trim())?;
    let json = String::from_utf8(decoded)?;
    let key: ServiceAccountKey = serde_json::from_str(&json)?;
    if let Some(key_type) = key.key_type.as_deref() {
        if key_type != "service_account" {
            return Err(AppError::Credentials(format!(
                "expected a service_account key, got '{}'",
                key_type
            )));
        }
    }
    if key.private_key.trim().is_empty() || key.token_uri.trim().is_empty() {
        return Err(AppError::Credentials(format!(
            "key for {} has an empty private_key or token_uri",
            key.client_email
        )));
    }
    Ok((key, json))
}

pub struct GcsBackupStore {
    store: Arc<dyn ObjectStore>,
    bucket_name: String,
}

impl GcsBackupStore {
    pub fn connect(gcs_config: &GcsConfig) -> Result<Self> {
        let (key, key_json) = decode_service_account_key(&gcs_config.service_account_key_base64)
            .context("Failed to decode GCP_SERVICE_ACCOUNT_KEY_BASE64")?;

        let project_id = gcs_config.project_id.clone().or(key.project_id);

        let store = GoogleCloudStorageBuilder::new()
            .with_bucket_name(&gcs_config.bucket_name)
            .with_service_account_key(key_json)
            .with_client_options(ClientOptions::new().with_timeout(UPLOAD_TIMEOUT))
            .build()
            .with_context(|| {
                format!(
                    "Failed to create GCS client for bucket {}",
                    gcs_config.bucket_name
                )
            })?;

        info!(
            "GCS client for bucket {} as {} (project: {})",
            gcs_config.bucket_name,
            key.client_email,
            project_id.as_deref().unwrap_or("unset")
        );

        Ok(GcsBackupStore::with_store(Arc::new(store), &gcs_config.bucket_name))
    }

    fn with_store(store: Arc<dyn ObjectStore>, bucket_name: &str) -> Self {
        GcsBackupStore {
            store,
            bucket_name: bucket_name.to_string(),
        }
    }

    async fn upload_in_parts(
        &self,
        file: &mut tokio::fs::File,
        location: &ObjectPath,
    ) -> Result<()> {
        let upload = self
            .store
            .put_multipart(location)
            .await
            .with_context(|| format!("Failed to start multipart upload of {}", location))?;
        let mut writer = WriteMultipart::new(upload);

        match copy_into(file, &mut writer).await {
            Ok(()) => {
                writer
                    .finish()
                    .await
                    .with_context(|| format!("Failed to complete upload of {}", location))?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    warn!("Failed to abort upload of {}: {}", location, abort_err);
                }
                Err(e)
            }
        }
    }
}

async fn copy_into(file: &mut tokio::fs::File, writer: &mut WriteMultipart) -> Result<()> {
    let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            return Ok(());
        }
        writer.wait_for_capacity(MAX_PARTS_IN_FLIGHT).await?;
        writer.write(&buffer[..read]);
    }
}

fn to_remote_object(meta: ObjectMeta) -> RemoteObject {
    RemoteObject {
        name: meta.location.to_string(),
        created: meta.last_modified,
        size_bytes: meta.size as u64,
    }
}

#[async_trait]
impl BackupStore for GcsBackupStore {
    fn name(&self) -> &'static str {
        "GCS"
    }

    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    async fn upload_file(&self, local_path: &Path, object_name: &str) -> Result<()> {
        let location = ObjectPath::from(object_name);
        let mut file = tokio::fs::File::open(local_path)
            .await
            .with_context(|| format!("Failed to open {}", local_path.display()))?;
        let size = file.metadata().await?.len();

        if size <= SINGLE_REQUEST_LIMIT {
            let mut content = Vec::with_capacity(size as usize);
            file.read_to_end(&mut content)
                .await
                .with_context(|| format!("Failed to read {}", local_path.display()))?;
            self.store
                .put(&location, PutPayload::from(content))
                .await
                .with_context(|| {
                    format!(
                        "Failed to upload {} to gs://{}/{}",
                        local_path.display(),
                        self.bucket_name,
                        object_name
                    )
                })?;
            return Ok(());
        }

        self.upload_in_parts(&mut file, &location)
            .await
            .with_context(|| {
                format!(
                    "Failed to upload {} to gs://{}/{}",
                    local_path.display(),
                    self.bucket_name,
                    object_name
                )
            })
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>> {
        let objects: Vec<ObjectMeta> = self
            .store
            .list(None)
            .try_collect()
            .await
            .with_context(|| format!("Failed to list objects in gs://{}", self.bucket_name))?;
        Ok(objects.into_iter().map(to_remote_object).collect())
    }

    async fn delete_object(&self, object_name: &str) -> Result<()> {
        self.store
            .delete(&ObjectPath::from(object_name))
            .await
            .with_context(|| format!("Failed to delete gs://{}/{}", self.bucket_name, object_name))
    }
}
