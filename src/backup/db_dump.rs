// mongobackup/src/backup/db_dump.rs
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use which::which;

use crate::config::DumpConfig;
use crate::errors::{AppError, Result};
use crate::utils::bytes_to_megabytes;

const MONGODUMP: &str = "mongodump";

fn find_mongodump_executable() -> Result<PathBuf> {
    which(MONGODUMP).map_err(|source| AppError::ToolNotFound {
        program: MONGODUMP.to_string(),
        source,
    })
}

/// Arguments for one mongodump run. Extra options follow the fixed ones verbatim.
pub fn dump_args(dump_config: &DumpConfig, archive_path: &Path) -> Vec<OsString> {
    let mut archive = OsString::from("--archive=");
    archive.push(archive_path);

    let mut args = vec![
        OsString::from(format!("--host={}", dump_config.host)),
        archive,
        OsString::from("--gzip"),
    ];
    args.extend(dump_config.extra_args.iter().map(OsString::from));
    args
}

fn render_command(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Dumps the configured MongoDB host into a gzip archive at `archive_path`.
///
/// The tool is spawned directly with an argument list. Returns the archive
/// size in bytes; a non-zero exit is reported as [`AppError::Command`].
pub async fn dump_database(dump_config: &DumpConfig, archive_path: &Path) -> Result<u64> {
    let program = match &dump_config.executable {
        Some(path) => path.clone(),
        None => find_mongodump_executable()?,
    };
    let args = dump_args(dump_config, archive_path);
    let command_line = render_command(&program, &args);

    info!("Execute: {}", command_line);
    let output = Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| AppError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    // mongodump reports its progress on stderr
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(AppError::Command {
            command: command_line,
            status: output.status,
            stderr: stderr.trim().to_string(),
        });
    }
    for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
        debug!("mongodump: {}", line);
    }

    let size = tokio::fs::metadata(archive_path).await?.len();
    info!("...done, file size: {:.2} MB", bytes_to_megabytes(size));
    Ok(size)
}
