use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::migration::worker::MigrationSettings;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the HTTP server binds to
    /// Default: 127.0.0.1:8080
    pub bind_addr: String,

    /// Maximum payload size for all requests (in bytes)
    /// Default: 64KB
    pub max_payload_size: usize,

    /// Directory for the rolling log files
    pub log_dir: PathBuf,

    /// Jobs executing at once across the whole engine
    pub max_concurrent_jobs: usize,

    /// Execution attempts before a job is marked failed
    pub max_retries: u32,

    pub dispatch_interval: Duration,
    pub gc_interval: Duration,

    /// How long finished jobs stay queryable
    pub job_retention: Duration,

    /// Zero requeues failed jobs immediately, anything else is the base of
    /// an exponential backoff
    pub retry_backoff: Duration,

    /// Root directory of the derived-artifact bucket
    pub store_root: PathBuf,
    pub list_page_size: usize,

    /// Tenant registry document (`apps.json`)
    pub apps_file: PathBuf,

    pub migration: MigrationSettings,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Every variable is optional:
    /// - BIND_ADDR, MAX_PAYLOAD_SIZE, LOG_DIR
    /// - MAX_CONCURRENT_JOBS (default 2), MAX_RETRIES (default 3)
    /// - DISPATCH_INTERVAL_MS (default 1000), GC_INTERVAL_SECS (default 60),
    ///   JOB_RETENTION_SECS (default 86400), RETRY_BACKOFF_MS (default 0)
    /// - BATCH_SIZE (100), CONCURRENT_BATCHES (5), WAVE_DELAY_MS (1000),
    ///   SCAN_CONCURRENCY (64), SCAN_PROGRESS_EVERY (5000), CREDENTIAL_TAG (api-key)
    /// - STORE_ROOT (data/transformed), LIST_PAGE_SIZE (1000),
    ///   APPS_FILE (runtime-data/apps.json)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let migration = MigrationSettings {
            credential_tag: env::var("CREDENTIAL_TAG").unwrap_or_else(|_| "api-key".to_string()),
            batch_size: positive("BATCH_SIZE", 100)?,
            concurrent_batches: positive("CONCURRENT_BATCHES", 5)?,
            wave_delay: Duration::from_millis(parse("WAVE_DELAY_MS", 1000)?),
            scan_concurrency: positive("SCAN_CONCURRENCY", 64)?,
            scan_progress_every: positive("SCAN_PROGRESS_EVERY", 5000)?,
        };

        Ok(Config {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            max_payload_size: parse("MAX_PAYLOAD_SIZE", 64 * 1024)?,
            log_dir: path("LOG_DIR", "logs"),
            max_concurrent_jobs: positive("MAX_CONCURRENT_JOBS", 2)?,
            max_retries: positive("MAX_RETRIES", 3)?,
            dispatch_interval: Duration::from_millis(positive("DISPATCH_INTERVAL_MS", 1000)?),
            gc_interval: Duration::from_secs(positive("GC_INTERVAL_SECS", 60)?),
            job_retention: Duration::from_secs(parse("JOB_RETENTION_SECS", 24 * 60 * 60)?),
            retry_backoff: Duration::from_millis(parse("RETRY_BACKOFF_MS", 0)?),
            store_root: path("STORE_ROOT", "data/transformed"),
            list_page_size: positive("LIST_PAGE_SIZE", 1000)?,
            apps_file: path("APPS_FILE", "runtime-data/apps.json"),
            migration,
        })
    }
}

fn parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn positive<T: FromStr + PartialEq + Default>(
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    let value = parse(key, default)?;
    if value == T::default() {
        return Err(ConfigError::Zero(key));
    }
    Ok(value)
}

fn path(key: &str, default: &str) -> PathBuf {
    env::var(key).unwrap_or_else(|_| default.to_string()).into()
}
