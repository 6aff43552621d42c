// mongobackup/src/storage/memory.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{BackupStore, RemoteObject};

struct StoredObject {
    content: Vec<u8>,
    created: DateTime<Utc>,
}

/// In-process bucket for exercising the backup and prune flows.
pub struct MemoryBackupStore {
    bucket_name: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    uploads: AtomicUsize,
    fail_uploads: bool,
}

impl MemoryBackupStore {
    pub fn new(bucket_name: &str) -> Self {
        MemoryBackupStore {
            bucket_name: bucket_name.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            uploads: AtomicUsize::new(0),
            fail_uploads: false,
        }
    }

    /// A store whose uploads always fail, as on a network error.
    pub fn failing_uploads(bucket_name: &str) -> Self {
        MemoryBackupStore {
            fail_uploads: true,
            ..Self::new(bucket_name)
        }
    }

    pub fn insert(&self, name: &str, created: DateTime<Utc>, content: Vec<u8>) {
        self.lock()
            .insert(name.to_string(), StoredObject { content, created });
    }

    pub fn content(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().get(name).map(|object| object.content.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn upload_attempts(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    async fn upload_file(&self, local_path: &Path, object_name: &str) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads {
            anyhow::bail!("connection reset while uploading {}", object_name);
        }
        let content = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        self.insert(object_name, Utc::now(), content);
        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>> {
        Ok(self
            .lock()
            .iter()
            .map(|(name, object)| RemoteObject {
                name: name.clone(),
                created: object.created,
                size_bytes: object.content.len() as u64,
            })
            .collect())
    }

    async fn delete_object(&self, object_name: &str) -> Result<()> {
        self.lock()
            .remove(object_name)
            .map(|_| ())
            .with_context(|| format!("No such object: {}", object_name))
    }
}
