//! View configuration
//!
//! Values come from defaults, a TOML file, or `HISTOVIEW_*` environment
//! variables. The CLI layers its own flags on top.

use crate::cache::DEFAULT_LOCK_TIMEOUT;
use crate::error::{ViewError, ViewResult};
use crate::storage::{BackendType, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Tuning and storage settings for a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Input files per fill job
    #[serde(default = "default_chunksize")]
    pub chunksize: usize,

    /// Worker count of a local cluster session
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// How long a commit waits for another writer of the same entry
    #[serde(default = "default_lock_timeout", with = "humantime_serde")]
    pub lock_timeout: Duration,

    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            chunksize: default_chunksize(),
            max_parallel: default_max_parallel(),
            lock_timeout: default_lock_timeout(),
            store: StoreConfig::default(),
        }
    }
}

impl ViewConfig {
    /// Defaults overridden by any `HISTOVIEW_*` variables that are set
    pub fn from_env() -> ViewResult<Self> {
        let mut config = Self::default();

        if let Some(chunksize) = env_parse::<usize>("HISTOVIEW_CHUNKSIZE")? {
            config.chunksize = chunksize;
        }
        if let Some(max_parallel) = env_parse::<usize>("HISTOVIEW_MAX_PARALLEL")? {
            config.max_parallel = max_parallel;
        }
        if let Ok(timeout) = std::env::var("HISTOVIEW_LOCK_TIMEOUT") {
            config.lock_timeout = parse_duration(&timeout).map_err(|e| {
                ViewError::config(format!("HISTOVIEW_LOCK_TIMEOUT={timeout:?}: {e}"))
            })?;
        }
        if let Some(backend) = env_parse::<BackendType>("HISTOVIEW_STORE_TYPE")? {
            config.store.backend = backend;
        }
        if let Ok(dir) = std::env::var("HISTOVIEW_STORE_DIR") {
            config.store.base_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file; missing keys take their defaults
    pub async fn load(path: &Path) -> ViewResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ViewError::config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
            .map_err(|e| ViewError::config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> ViewResult<Self> {
        let config: Self = toml::from_str(content).map_err(ViewError::config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ViewResult<()> {
        if self.chunksize == 0 {
            return Err(ViewError::InvalidChunkSize);
        }
        if self.max_parallel == 0 {
            return Err(ViewError::config("max_parallel must be at least 1"));
        }
        if self.lock_timeout.is_zero() {
            return Err(ViewError::config("lock_timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn env_parse<T>(name: &str) -> ViewResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ViewError::config(format!("{name}={value:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse a humantime string such as "1m 30s"
fn parse_duration(value: &str) -> serde_json::Result<Duration> {
    #[derive(Deserialize)]
    struct Humantime(#[serde(with = "humantime_serde")] Duration);

    serde_json::from_value::<Humantime>(serde_json::Value::String(value.to_string()))
        .map(|parsed| parsed.0)
}

fn default_chunksize() -> usize {
    1
}

fn default_max_parallel() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn default_lock_timeout() -> Duration {
    DEFAULT_LOCK_TIMEOUT
}
