// mongobackup/src/storage/s3.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::{Credentials, Region};
use s3::primitives::ByteStream;
use std::path::Path;

use super::{BackupStore, RemoteObject, UPLOAD_TIMEOUT};
use crate::config::SpacesConfig;

/// S3-compatible object storage (AWS S3, DigitalOcean Spaces, MinIO).
pub struct S3BackupStore {
    client: s3::Client,
    bucket_name: String,
}

impl S3BackupStore {
    pub async fn connect(spaces_config: &SpacesConfig) -> Self {
        let timeouts = TimeoutConfig::builder()
            .operation_timeout(UPLOAD_TIMEOUT)
            .build();
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&spaces_config.endpoint_url)
            .region(Region::new(spaces_config.region.clone()))
            .credentials_provider(static_credentials(spaces_config))
            .timeout_config(timeouts)
            .load()
            .await;

        S3BackupStore {
            client: s3::Client::new(&sdk_config),
            bucket_name: spaces_config.bucket_name.clone(),
        }
    }

    fn object_url(&self, object_name: &str) -> String {
        object_url(&self.bucket_name, object_name)
    }
}

/// Keys come from the environment and never expire.
fn static_credentials(spaces_config: &SpacesConfig) -> Credentials {
    Credentials::new(
        &spaces_config.access_key_id,
        &spaces_config.secret_access_key,
        None,
        None,
        "mongobackup-env",
    )
}

fn object_url(bucket_name: &str, object_name: &str) -> String {
    format!("s3://{}/{}", bucket_name, object_name)
}

fn to_utc(timestamp: &s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

#[async_trait]
impl BackupStore for S3BackupStore {
    fn name(&self) -> &'static str {
        "S3"
    }

    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    async fn upload_file(&self, local_path: &Path, object_name: &str) -> Result<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .with_context(|| format!("Failed to open {}", local_path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(object_name)
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to upload {} to {}",
                    local_path.display(),
                    self.object_url(object_name)
                )
            })?;
        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket_name)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page
                .with_context(|| format!("Failed to list objects in s3://{}", self.bucket_name))?;
            for object in page.contents() {
                let Some(name) = object.key() else {
                    continue;
                };
                let created = object
                    .last_modified()
                    .and_then(to_utc)
                    .with_context(|| format!("Object {} has no usable last-modified time", name))?;
                objects.push(RemoteObject {
                    name: name.to_string(),
                    created,
                    size_bytes: u64::try_from(object.size().unwrap_or_default()).unwrap_or_default(),
                });
            }
        }
        Ok(objects)
    }

    async fn delete_object(&self, object_name: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(object_name)
            .send()
            .await
            .with_context(|| format!("Failed to delete {}", self.object_url(object_name)))?;
        Ok(())
    }
}
