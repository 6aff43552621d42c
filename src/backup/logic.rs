// mongobackup/src/backup/logic.rs
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{error, info};

use super::db_dump;
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::storage::BackupStore;

const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const ARCHIVE_EXTENSION: &str = "gz";

/// Object name for an archive taken at `timestamp`: `<prefix>-<YYYYMMDDHHMMSS>.gz`.
pub fn archive_object_name(prefix: &str, timestamp: NaiveDateTime) -> String {
    format!(
        "{}-{}.{}",
        prefix,
        timestamp.format(ARCHIVE_TIMESTAMP_FORMAT),
        ARCHIVE_EXTENSION
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedBackup {
    pub object_name: String,
    pub size_bytes: u64,
}

#[derive(Debug)]
pub enum BackupOutcome {
    Uploaded(UploadedBackup),
    /// mongodump failed; nothing was uploaded.
    DumpFailed(AppError),
}

fn create_temp_archive(temp_dir: Option<&Path>) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("mongobackup-").suffix(".gz");
    let archive = match temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    };
    archive.context("Failed to create temporary archive file")
}

/// Where an upload lands, as it appears in the upload log lines.
fn upload_destination(store: &dyn BackupStore, object_name: &str) -> String {
    format!("{} bucket {} as {}", store.name(), store.bucket(), object_name)
}

async fn upload_archive(store: &dyn BackupStore, archive_path: &Path, object_name: &str) -> Result<()> {
    let destination = upload_destination(store, object_name);
    info!("Upload {} to {}", archive_path.display(), destination);
    store.upload_file(archive_path, object_name).await?;
    info!(
        "✅ A file {} has been uploaded to {}.",
        archive_path.display(),
        destination
    );
    Ok(())
}

/// Dumps the database into a temporary archive and uploads it.
///
/// A dump failure is logged and returned as [`BackupOutcome::DumpFailed`];
/// upload errors propagate. The temporary archive is removed on every path.
pub async fn perform_backup(
    app_config: &AppConfig,
    store: &dyn BackupStore,
    timestamp: NaiveDateTime,
) -> Result<BackupOutcome> {
    let archive = create_temp_archive(app_config.temp_dir.as_deref())?;
    let object_name = archive_object_name(&app_config.backup_file_prefix, timestamp);

    let size_bytes = match db_dump::dump_database(&app_config.dump, archive.path()).await {
        Ok(size) => size,
        Err(e) => {
            error!("...error: {}", e);
            return Ok(BackupOutcome::DumpFailed(e));
        }
    };

    upload_archive(store, archive.path(), &object_name).await?;

    Ok(BackupOutcome::Uploaded(UploadedBackup {
        object_name,
        size_bytes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn scenario_timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn test_archive_object_name() {
        assert_eq!(
            archive_object_name("backup", scenario_timestamp()),
            "backup-20240115093000.gz"
        );
    }

    #[test]
    fn test_archive_object_name_has_fourteen_digit_timestamp() {
        let timestamp = NaiveDate::from_ymd_opt(2031, 12, 3)
            .and_then(|d| d.and_hms_opt(4, 5, 6))
            .expect("valid timestamp");
        let name = archive_object_name("app-prod", timestamp);

        let digits = name
            .strip_prefix("app-prod-")
            .and_then(|rest| rest.strip_suffix(".gz"))
            .expect("prefix and extension");
        assert_eq!(digits.len(), 14);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(digits, "20311203040506");
    }

    #[test]
    fn test_upload_destination_names_bucket_and_object() {
        let store = crate::storage::memory::MemoryBackupStore::new("nightly-backups");
        let destination = upload_destination(&store, "backup-20240115093000.gz");

        assert!(destination.starts_with(store.name()));
        assert!(destination.contains("bucket nightly-backups"));
        assert!(destination.ends_with("as backup-20240115093000.gz"));
    }

    #[cfg(unix)]
    mod flow {
        use super::*;
        use crate::config::{DumpConfig, GcsConfig, StorageConfig};
        use crate::storage::memory::MemoryBackupStore;
        use crate::utils::test_support::FakeDumpTool;
        use tempfile::TempDir;

        fn app_config(tool: &FakeDumpTool, temp_dir: &TempDir, extra_args: &[&str]) -> AppConfig {
            AppConfig {
                dump: DumpConfig {
                    host: "db1".to_string(),
                    extra_args: extra_args.iter().map(|arg| arg.to_string()).collect(),
                    executable: Some(tool.executable.clone()),
                },
                backup_file_prefix: "backup".to_string(),
                temp_dir: Some(temp_dir.path().to_path_buf()),
                storage: StorageConfig::Gcs(GcsConfig {
                    bucket_name: "nightly-backups".to_string(),
                    project_id: None,
                    service_account_key_base64: String::new(),
                }),
            }
        }

        fn temp_dir_is_empty(temp_dir: &TempDir) -> anyhow::Result<bool> {
            Ok(std::fs::read_dir(temp_dir.path())?.next().is_none())
        }

        #[tokio::test]
        async fn test_dump_and_upload() -> anyhow::Result<()> {
            let tool = FakeDumpTool::writing_archive("gzip-archive-content")?;
            let temp_dir = tempfile::tempdir()?;
            let config = app_config(&tool, &temp_dir, &["--db=app"]);
            let store = MemoryBackupStore::new("nightly-backups");

            let outcome = perform_backup(&config, &store, scenario_timestamp()).await?;

            match outcome {
                BackupOutcome::Uploaded(uploaded) => {
                    assert_eq!(uploaded.object_name, "backup-20240115093000.gz");
                    assert_eq!(uploaded.size_bytes, "gzip-archive-content".len() as u64);
                }
                other => panic!("expected upload, got {:?}", other),
            }
            assert_eq!(store.names(), vec!["backup-20240115093000.gz"]);
            assert_eq!(
                store.content("backup-20240115093000.gz"),
                Some(b"gzip-archive-content".to_vec())
            );

            let args = tool.recorded_args()?;
            assert_eq!(args[0], "--host=db1");
            assert!(args[1].starts_with(&format!("--archive={}", temp_dir.path().display())));
            assert_eq!(args[2], "--gzip");
            assert_eq!(args[3], "--db=app");

            assert!(temp_dir_is_empty(&temp_dir)?);
            Ok(())
        }

        #[tokio::test]
        async fn test_dump_failure_skips_upload() -> anyhow::Result<()> {
            let tool = FakeDumpTool::failing(1)?;
            let temp_dir = tempfile::tempdir()?;
            let config = app_config(&tool, &temp_dir, &[]);
            let store = MemoryBackupStore::new("nightly-backups");

            let outcome = perform_backup(&config, &store, scenario_timestamp()).await?;

            assert!(matches!(
                outcome,
                BackupOutcome::DumpFailed(AppError::Command { .. })
            ));
            assert_eq!(store.upload_attempts(), 0);
            assert!(store.names().is_empty());
            assert!(temp_dir_is_empty(&temp_dir)?);
            Ok(())
        }

        #[tokio::test]
        async fn test_upload_failure_propagates_and_cleans_up() -> anyhow::Result<()> {
            let tool = FakeDumpTool::writing_archive("gzip-archive-content")?;
            let temp_dir = tempfile::tempdir()?;
            let config = app_config(&tool, &temp_dir, &[]);
            let store = MemoryBackupStore::failing_uploads("nightly-backups");

            let result = perform_backup(&config, &store, scenario_timestamp()).await;

            assert!(result.is_err());
            assert_eq!(store.upload_attempts(), 1);
            assert!(temp_dir_is_empty(&temp_dir)?);
            Ok(())
        }
    }
}
