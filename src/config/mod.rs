use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout for feed downloads
    pub timeout_secs: u64,
    /// Timeout for the live check performed when a user adds a source
    pub validation_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Seed for the default source list on first run; the first entry starts enabled
    #[serde(default)]
    pub defaults: Vec<String>,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
            },
            fetch: FetchConfig {
                timeout_secs: 15,
                validation_timeout_secs: 30,
                user_agent: format!("iptv-catalog/{}", env!("CARGO_PKG_VERSION")),
            },
            cache: CacheConfig { ttl_secs: 600 },
            sources: SourcesConfig {
                defaults: Vec::new(),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(&config_file)
    }

    /// Reject values the refresh loop and fetcher cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.cache.ttl_secs == 0 {
            return Err(AppError::configuration("cache.ttl_secs must be greater than zero"));
        }
        if self.fetch.timeout_secs == 0 || self.fetch.validation_timeout_secs == 0 {
            return Err(AppError::configuration("fetch timeouts must be greater than zero"));
        }
        Ok(())
    }

    /// Load the config file at `path`, writing the defaults there if it does not exist
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
            Ok(default_config)
        }
    }
}
