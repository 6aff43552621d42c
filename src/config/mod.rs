// mongobackup/src/config/mod.rs
use std::fmt;
use std::path::PathBuf;

use crate::errors::{AppError, Result};

pub const DEFAULT_MONGODB_HOST: &str = "localhost";
pub const DEFAULT_BACKUP_FILE_PREFIX: &str = "backup";

// Environment variable names
const MONGODB_HOST: &str = "MONGODB_HOST";
const BACKUP_FILE_PREFIX: &str = "BACKUP_FILE_PREFIX";
const MONGODUMP_OPTS: &str = "MONGODUMP_OPTS";
const MONGODUMP_PATH: &str = "MONGODUMP_PATH";
const BACKUP_TEMP_DIR: &str = "BACKUP_TEMP_DIR";
const STORAGE_BACKEND: &str = "STORAGE_BACKEND";
const GCS_BUCKET_NAME: &str = "GCS_BUCKET_NAME";
const GCP_PROJECT_ID: &str = "GCP_PROJECT_ID";
const GCP_SERVICE_ACCOUNT_KEY_BASE64: &str = "GCP_SERVICE_ACCOUNT_KEY_BASE64";
const S3_BUCKET_NAME: &str = "S3_BUCKET_NAME";
const S3_ENDPOINT_URL: &str = "S3_ENDPOINT_URL";
const S3_REGION: &str = "S3_REGION";
const S3_ACCESS_KEY_ID: &str = "S3_ACCESS_KEY_ID";
const S3_SECRET_ACCESS_KEY: &str = "S3_SECRET_ACCESS_KEY";

/// How mongodump is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpConfig {
    pub host: String,
    /// Extra mongodump arguments, already split into words.
    pub extra_args: Vec<String>,
    /// Explicit executable; resolved from PATH when unset.
    pub executable: Option<PathBuf>,
}

#[derive(Clone)]
pub struct GcsConfig {
    pub bucket_name: String,
    pub project_id: Option<String>,
    pub service_account_key_base64: String,
}

impl fmt::Debug for GcsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsConfig")
            .field("bucket_name", &self.bucket_name)
            .field("project_id", &self.project_id)
            .field("service_account_key_base64", &"<redacted>")
            .finish()
    }
}

/// S3-compatible storage (AWS, DigitalOcean Spaces, MinIO...).
#[derive(Clone)]
pub struct SpacesConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
}

impl fmt::Debug for SpacesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpacesConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Gcs(GcsConfig),
    S3(SpacesConfig),
}

impl StorageConfig {
    pub fn bucket_name(&self) -> &str {
        match self {
            StorageConfig::Gcs(cfg) => &cfg.bucket_name,
            StorageConfig::S3(cfg) => &cfg.bucket_name,
        }
    }
}

/// Everything a run needs, read once at startup and passed down by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub dump: DumpConfig,
    pub backup_file_prefix: String,
    pub temp_dir: Option<PathBuf>,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Values are trimmed and empty strings are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(AppError::MissingSetting(key));

        let extra_args = match get(MONGODUMP_OPTS) {
            Some(opts) => parse_extra_args(&opts)?,
            None => Vec::new(),
        };

        let dump = DumpConfig {
            host: get(MONGODB_HOST).unwrap_or_else(|| DEFAULT_MONGODB_HOST.to_string()),
            extra_args,
            executable: get(MONGODUMP_PATH).map(PathBuf::from),
        };

        let backend = get(STORAGE_BACKEND).map(|b| b.to_ascii_lowercase());
        let storage = match backend.as_deref() {
            None | Some("gcs") => StorageConfig::Gcs(GcsConfig {
                bucket_name: require(GCS_BUCKET_NAME)?,
                project_id: get(GCP_PROJECT_ID),
                service_account_key_base64: require(GCP_SERVICE_ACCOUNT_KEY_BASE64)?,
            }),
            Some("s3") => StorageConfig::S3(SpacesConfig {
                endpoint_url: require(S3_ENDPOINT_URL)?,
                region: require(S3_REGION)?,
                access_key_id: require(S3_ACCESS_KEY_ID)?,
                secret_access_key: require(S3_SECRET_ACCESS_KEY)?,
                bucket_name: require(S3_BUCKET_NAME)?,
            }),
            Some(other) => {
                return Err(AppError::Config(format!(
                    "{} must be 'gcs' or 's3', got '{}'",
                    STORAGE_BACKEND, other
                )));
            }
        };

        Ok(AppConfig {
            dump,
            backup_file_prefix: get(BACKUP_FILE_PREFIX)
                .unwrap_or_else(|| DEFAULT_BACKUP_FILE_PREFIX.to_string()),
            temp_dir: get(BACKUP_TEMP_DIR).map(PathBuf::from),
            storage,
        })
    }
}

/// Splits the free-form option string into arguments using shell word rules.
/// Nothing is expanded or executed.
fn parse_extra_args(opts: &str) -> Result<Vec<String>> {
    shlex::split(opts).ok_or_else(|| {
        AppError::Config(format!(
            "{} is not a valid argument string: {}",
            MONGODUMP_OPTS, opts
        ))
    })
}
