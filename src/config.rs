//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Server configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the command surface.
    pub port: u16,
    /// Root of corpora, analysis output and the project registry.
    pub data_dir: PathBuf,
    /// Repository whose cleanliness gates plan/dispatch/collect.
    pub repo_path: PathBuf,
    /// Directory holding plan descriptors.
    pub plans_dir: PathBuf,
    /// Number of local workers.
    pub worker_count: usize,
    /// Scheduling loop tick.
    pub tick_interval: Duration,
    /// Remote git service base URL. When unset the local git CLI is used.
    pub git_service_url: Option<String>,
    /// Timeout for each versioning call.
    pub git_timeout: Duration,
    /// How long `git/status` answers may be served from cache.
    pub git_status_cache_ttl: Duration,
    /// Optional directory for rolling log files.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            data_dir: PathBuf::from("./data"),
            repo_path: PathBuf::from("."),
            plans_dir: PathBuf::from("./plans"),
            worker_count: 1,
            tick_interval: Duration::from_millis(250),
            git_service_url: None,
            git_timeout: Duration::from_secs(5),
            git_status_cache_ttl: Duration::from_millis(1000),
            log_dir: None,
        }
    }
}

impl ServerConfig {
    /// Build configuration from `WORK_*` / `GIT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parse_env("WORK_API_PORT")?.unwrap_or(defaults.port);
        let data_dir = std::env::var("WORK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let repo_path = std::env::var("WORK_REPO_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.repo_path);
        let plans_dir = std::env::var("WORK_PLANS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.plans_dir);

        let worker_count: usize = parse_env("WORK_WORKER_COUNT")?.unwrap_or(defaults.worker_count);
        if worker_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "WORK_WORKER_COUNT".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let tick_interval = parse_env("WORK_TICK_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick_interval);

        let git_service_url = std::env::var("GIT_SERVICE_URL")
            .ok()
            .map(|s| s.trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());

        let git_timeout = parse_env("GIT_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.git_timeout);

        let git_status_cache_ttl = parse_env("GIT_STATUS_CACHE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.git_status_cache_ttl);

        let log_dir = std::env::var("WORK_LOG_DIR").ok().map(PathBuf::from);

        Ok(Self {
            port,
            data_dir,
            repo_path,
            plans_dir,
            worker_count,
            tick_interval,
            git_service_url,
            git_timeout,
            git_status_cache_ttl,
            log_dir,
        })
    }
}

/// Parse an optional environment variable, rejecting malformed values.
fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}
