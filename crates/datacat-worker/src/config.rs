//! Process settings read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use datacat_core::defaults;
use datacat_db::PoolConfig;
use datacat_jobs::{DispatcherConfig, SweeperConfig};

/// Everything the worker process needs to wire itself up.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub redis_url: String,
    pub pool: PoolConfig,
    pub dispatcher: DispatcherConfig,
    pub sweeper: SweeperConfig,
    /// Non-null values sampled for type inference.
    pub sample_size: usize,
    pub download_dir: Option<PathBuf>,
    pub download_timeout: Duration,
    pub default_schema: String,
}

impl Settings {
    /// Read settings from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DATABASE_URL` | local `taxi_catalog` | Catalog database |
    /// | `REDIS_URL` | `redis://localhost:6379` | Job store |
    /// | `DATASET_SAMPLE_SIZE` | `100` | Type inference sample |
    /// | `DOWNLOAD_DIR` | system temp dir | Downloaded dataset files |
    /// | `DOWNLOAD_TIMEOUT_SECS` | `300` | Dataset download timeout |
    /// | `DEFAULT_SCHEMA_NAME` | `nyc_taxi` | Schema when a payload names none |
    ///
    /// Pool, dispatcher and sweeper settings come from their own `from_env`.
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DATABASE_URL.to_string());
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| defaults::REDIS_URL.to_string());

        let sample_size = std::env::var("DATASET_SAMPLE_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::INFERENCE_SAMPLE_SIZE);

        let download_dir = std::env::var("DOWNLOAD_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let download_timeout_secs = std::env::var("DOWNLOAD_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::DOWNLOAD_TIMEOUT_SECS);

        let default_schema = std::env::var("DEFAULT_SCHEMA_NAME")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| defaults::DEFAULT_SCHEMA_NAME.to_string());

        Self {
            database_url,
            redis_url,
            pool: PoolConfig::from_env(),
            dispatcher: DispatcherConfig::from_env(),
            sweeper: SweeperConfig::from_env(),
            sample_size,
            download_dir,
            download_timeout: Duration::from_secs(download_timeout_secs),
            default_schema,
        }
    }
}

/// Strip the password from a connection URL before logging it.
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let credentials = &url[scheme_end + 3..at];
            match credentials.split_once(':') {
                Some((user, _)) => format!("{}{}:***{}", &url[..scheme_end + 3], user, &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}
