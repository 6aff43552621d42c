mod logic;
pub(crate) mod db_dump;

use anyhow::Result;
use chrono::Local;

use crate::config::AppConfig;
use crate::storage::BackupStore;

pub use logic::BackupOutcome;

/// Public entry point for the backup process: mongodump, then upload.
///
/// The archive is named after the current local time.
pub async fn run_backup_flow(app_config: &AppConfig, store: &dyn BackupStore) -> Result<BackupOutcome> {
    logic::perform_backup(app_config, store, Local::now().naive_local()).await
}
