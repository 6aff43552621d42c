//! MongoDB Backup Tool
//!
//! Dumps a MongoDB instance with mongodump, uploads the archive to object
//! storage and prunes old archives. Meant to be run from a scheduler.

// mongobackup/src/main.rs
mod backup;
mod config;
mod errors;
mod retention;
mod storage;
mod utils;

use anyhow::{Context, Result};
use backup::BackupOutcome;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use config::AppConfig;
use retention::{DEFAULT_MAX_AGE_DAYS, DEFAULT_MINIMUM_BACKUPS, RetentionPolicy};
use std::process::ExitCode;
use storage::BackupStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit status when mongodump failed and nothing was uploaded.
const DUMP_FAILED_EXIT_CODE: u8 = 2;

#[derive(Parser)]
#[command(name = "mongobackup")]
#[command(about = "Back up MongoDB to object storage and prune old backups", long_about = None)]
struct Cli {
    #[command(flatten)]
    retention: RetentionArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct RetentionArgs {
    /// Delete backups older than this many days
    #[arg(long, env = "PRUNE_DAYS", default_value_t = DEFAULT_MAX_AGE_DAYS, global = true)]
    days: u32,

    /// Never prune when the bucket holds this many backups or fewer
    #[arg(long, env = "PRUNE_MINIMUM_BACKUPS", default_value_t = DEFAULT_MINIMUM_BACKUPS, global = true)]
    minimum_backups: usize,

    /// Stop deleting once the bucket would drop below --minimum-backups
    #[arg(long, env = "PRUNE_KEEP_FLOOR", global = true)]
    keep_floor: bool,
}

impl RetentionArgs {
    fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age_days: self.days,
            minimum_backups: self.minimum_backups,
            keep_floor: self.keep_floor,
        }
    }
}

#[derive(Subcommand, Clone, Copy, Default, Debug, PartialEq, Eq)]
enum Commands {
    /// Dump, upload, then prune (the default)
    #[default]
    Run,
    /// Dump and upload only
    Backup,
    /// Apply the retention policy only
    Prune,
    /// List every object in the bucket
    List,
}

#[derive(Debug)]
enum RunStatus {
    Completed,
    DumpFailed(errors::AppError),
}

impl RunStatus {
    fn exit_status(&self) -> u8 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::DumpFailed(_) => DUMP_FAILED_EXIT_CODE,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run_app(&cli).await {
        Ok(status) => {
            match &status {
                RunStatus::Completed => info!("✅ Operation completed successfully."),
                RunStatus::DumpFailed(e) => error!("❌ Backup was not taken: {}", e),
            }
            ExitCode::from(status.exit_status())
        }
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: &Cli) -> Result<RunStatus> {
    let app_config = AppConfig::from_env().context("Failed to load configuration from environment")?;
    let store = storage::connect(&app_config.storage)
        .await
        .context("Failed to connect to object storage")?;
    let policy = cli.retention.policy();

    execute(cli.command.unwrap_or_default(), &app_config, store.as_ref(), &policy).await
}

async fn execute(
    command: Commands,
    app_config: &AppConfig,
    store: &dyn BackupStore,
    policy: &RetentionPolicy,
) -> Result<RunStatus> {
    let status = match command {
        Commands::Run | Commands::Backup => {
            let outcome = backup::run_backup_flow(app_config, store)
                .await
                .context("Backup process failed")?;
            let status = match outcome {
                BackupOutcome::Uploaded(uploaded) => {
                    info!(
                        "Backup {} ({} bytes) stored in {}",
                        uploaded.object_name,
                        uploaded.size_bytes,
                        store.bucket()
                    );
                    RunStatus::Completed
                }
                BackupOutcome::DumpFailed(e) => RunStatus::DumpFailed(e),
            };
            // a failed dump does not stop the prune
            if command == Commands::Run {
                retention::prune_bucket(store, policy, Utc::now())
                    .await
                    .context("Prune process failed")?;
            }
            status
        }
        Commands::Prune => {
            retention::prune_bucket(store, policy, Utc::now())
                .await
                .context("Prune process failed")?;
            RunStatus::Completed
        }
        Commands::List => {
            storage::list_bucket(store)
                .await
                .context("Failed to list bucket")?;
            RunStatus::Completed
        }
    };
    Ok(status)
}
