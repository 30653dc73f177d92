use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Total bytes the storage area may hold across all records.
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: usize,

    /// Bytes a single record (key plus JSON value) may occupy.
    #[serde(default = "default_quota_bytes_per_item")]
    pub quota_bytes_per_item: usize,

    /// Clients give up on a request after this long. Unset means wait forever.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("post-organizer")
        .join("storage.db")
        .to_string_lossy()
        .to_string()
}

fn default_quota_bytes() -> usize {
    102_400
}

fn default_quota_bytes_per_item() -> usize {
    8_192
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            quota_bytes: default_quota_bytes(),
            quota_bytes_per_item: default_quota_bytes_per_item(),
            request_timeout_ms: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.validate()?;
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("post-organizer")
            .join("config.toml")
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(AppError::Config("channel_capacity must be at least 1".to_string()));
        }
        if self.quota_bytes_per_item > self.quota_bytes {
            return Err(AppError::Config(
                "quota_bytes_per_item cannot exceed quota_bytes".to_string(),
            ));
        }
        Ok(())
    }
}
