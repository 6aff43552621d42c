// mongobackup/src/retention/mod.rs
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::info;

use crate::storage::{BackupStore, RemoteObject};

pub const DEFAULT_MAX_AGE_DAYS: u32 = 7;
pub const DEFAULT_MINIMUM_BACKUPS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age_days: u32,
    /// Pruning is skipped entirely when the bucket holds this many objects or fewer.
    pub minimum_backups: usize,
    /// Also stop deleting once the bucket would drop below `minimum_backups`.
    pub keep_floor: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy {
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            minimum_backups: DEFAULT_MINIMUM_BACKUPS,
            keep_floor: false,
        }
    }
}

impl RetentionPolicy {
    /// Objects created before this instant are expired. Ages reaching past the
    /// representable range clamp to the earliest instant, so nothing expires.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_days(i64::from(self.max_age_days))
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Objects to delete, or `None` when the bucket is at or under the minimum.
    pub fn select_expired<'a>(
        &self,
        objects: &'a [RemoteObject],
        now: DateTime<Utc>,
    ) -> Option<Vec<&'a RemoteObject>> {
        if objects.len() <= self.minimum_backups {
            return None;
        }

        let cutoff = self.cutoff(now);
        let mut expired: Vec<&RemoteObject> = objects
            .iter()
            .filter(|object| object.created < cutoff)
            .collect();

        if self.keep_floor {
            expired.sort_by_key(|object| object.created);
            expired.truncate(objects.len() - self.minimum_backups);
        }
        Some(expired)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneReport {
    Skipped { count: usize, minimum: usize },
    Pruned { deleted: Vec<String>, retained: usize },
}

impl fmt::Display for PruneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PruneReport::Skipped { count, minimum } => {
                write!(f, "Do not prune if not enough backups {}/{}", count, minimum)
            }
            PruneReport::Pruned { deleted, retained } => {
                write!(f, "Pruned {} backups, {} retained", deleted.len(), retained)
            }
        }
    }
}

/// Applies the retention policy to the bucket.
///
/// Deletions happen one at a time; the first failure aborts the prune.
pub async fn prune_bucket(
    store: &dyn BackupStore,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<PruneReport> {
    info!(
        "Prune bucket days:{} minimum_backups:{}",
        policy.max_age_days, policy.minimum_backups
    );
    let objects = store.list_objects().await?;

    let Some(expired) = policy.select_expired(&objects, now) else {
        let report = PruneReport::Skipped {
            count: objects.len(),
            minimum: policy.minimum_backups,
        };
        info!("{}", report);
        return Ok(report);
    };

    let mut deleted = Vec::with_capacity(expired.len());
    for object in expired {
        store.delete_object(&object.name).await?;
        info!("Deleted {}", object.name);
        deleted.push(object.name.clone());
    }

    let report = PruneReport::Pruned {
        retained: objects.len() - deleted.len(),
        deleted,
    };
    info!("{}", report);
    Ok(report)
}
