use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Application name used for config/data directory paths
const APP_NAME: &str = "offline-reader";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Article list endpoint; details are fetched from `{base_url}/{id}`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_cache_ttl_minutes")]
    pub cache_ttl_minutes: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join("articles.db")
        .to_string_lossy()
        .to_string()
}

fn default_base_url() -> String {
    "https://dev.to/api/articles".to_string()
}

fn default_page_size() -> u32 {
    20
}

fn default_cache_ttl_minutes() -> u32 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_probe_url() -> String {
    "https://www.google.com/favicon.ico".to_string()
}

fn default_probe_interval_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            base_url: default_base_url(),
            page_size: default_page_size(),
            cache_ttl_minutes: default_cache_ttl_minutes(),
            request_timeout_secs: default_request_timeout_secs(),
            probe_url: default_probe_url(),
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl Config {
    /// Load from the config file (written with defaults on first run), then
    /// apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let config = if config_path.exists() {
            Self::from_toml(&std::fs::read_to_string(&config_path)?)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// `OFFLINE_READER_BASE_URL` and `OFFLINE_READER_CACHE_TTL_MINUTES` take
    /// precedence over the file.
    pub fn with_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = var("OFFLINE_READER_BASE_URL") {
            self.base_url = url;
        }
        if let Some(ttl) = var("OFFLINE_READER_CACHE_TTL_MINUTES") {
            self.cache_ttl_minutes = ttl.trim().parse().map_err(|_| {
                AppError::Config(format!("OFFLINE_READER_CACHE_TTL_MINUTES is not a number: {:?}", ttl))
            })?;
        }
        Ok(self)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
            .join("config.toml")
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.cache_ttl_minutes))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }
}
