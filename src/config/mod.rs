//! # Runtime Configuration
//!
//! Process-level settings for the `nodecore` binary: where the device settings
//! file lives, how big the tables are and how logging is set up. This is
//! separate from the device settings themselves (see [`crate::settings`]),
//! which are edited at runtime and persisted in the key/value format.
//!
//! ## Configuration File Format
//!
//! ```toml
//! [storage]
//! data_dir = "./data"
//! file_name = "config.ini"
//! table_capacity = 100
//! overflow_policy = "warn"   # truncate | warn | reject
//!
//! [sessions]
//! capacity = 5
//! cleanup_interval_secs = 60
//!
//! [logging]
//! level = "info"
//! file = "nodecore.log"
//! ```
//!
//! Every section and field is optional; missing values take the defaults shown.
//! The session timeout is not configured here: it comes from the device
//! settings (`[timeouts] session_max_age`).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::auth::DEFAULT_SESSION_CAPACITY;
use crate::kvstore::{OverflowPolicy, DEFAULT_TABLE_CAPACITY};
use crate::settings::manager::DEFAULT_FILE_NAME;
use crate::settings::SETTINGS_ENTRY_COUNT;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted settings file.
    pub data_dir: String,
    pub file_name: String,
    /// Maximum number of entries in the key/value table.
    pub table_capacity: usize,
    /// Behavior when a settings file holds more entries than `table_capacity`.
    pub overflow_policy: OverflowPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            table_capacity: DEFAULT_TABLE_CAPACITY,
            overflow_policy: OverflowPolicy::Warn,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Number of concurrent login sessions.
    pub capacity: usize,
    /// Period of the expired-session sweeper in seconds (0 disables it).
    pub cleanup_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SESSION_CAPACITY,
            cleanup_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Parsed `level`, falling back to `Info` for unknown names.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config = Self::from_toml(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        if self.storage.file_name.trim().is_empty() || self.storage.file_name.contains('/') {
            return Err(anyhow!("storage.file_name must be a plain file name"));
        }
        if self.storage.table_capacity < SETTINGS_ENTRY_COUNT {
            return Err(anyhow!(
                "storage.table_capacity must be at least {} (one entry per setting)",
                SETTINGS_ENTRY_COUNT
            ));
        }
        if self.sessions.capacity == 0 {
            return Err(anyhow!("sessions.capacity must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.data_dir, "./data");
        assert_eq!(config.storage.file_name, "config.ini");
        assert_eq!(config.storage.table_capacity, 100);
        assert_eq!(config.storage.overflow_policy, OverflowPolicy::Warn);
        assert_eq!(config.sessions.capacity, 5);
        assert_eq!(config.sessions.cleanup_interval_secs, 60);
        assert_eq!(config.logging.level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_toml(
            "[storage]\ndata_dir = \"/var/lib/node\"\noverflow_policy = \"reject\"\n",
        )
        .unwrap();
        assert_eq!(config.storage.data_dir, "/var/lib/node");
        assert_eq!(config.storage.overflow_policy, OverflowPolicy::Reject);
        assert_eq!(config.storage.table_capacity, 100);
        assert_eq!(config.sessions.capacity, 5);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_toml("[sessions]\ncapacity = 0\n").is_err());
        assert!(Config::from_toml("[storage]\nfile_name = \"a/b.ini\"\n").is_err());
        assert!(Config::from_toml("[storage]\noverflow_policy = \"explode\"\n").is_err());
    }

    #[test]
    fn test_table_capacity_must_fit_all_settings() {
        let err = Config::from_toml("[storage]\ntable_capacity = 10\n").unwrap_err();
        assert!(err.to_string().contains("table_capacity"));
        assert!(Config::from_toml("[storage]\ntable_capacity = 31\n").is_err());

        let config = Config::from_toml("[storage]\ntable_capacity = 32\n").unwrap();
        assert_eq!(config.storage.table_capacity, SETTINGS_ENTRY_COUNT);
    }

    #[test]
    fn test_unknown_log_level_falls_back() {
        let logging = LoggingConfig {
            level: "chatty".into(),
            file: None,
        };
        assert_eq!(logging.level_filter(), log::LevelFilter::Info);
        let logging = LoggingConfig {
            level: "debug".into(),
            file: None,
        };
        assert_eq!(logging.level_filter(), log::LevelFilter::Debug);
    }

    #[tokio::test]
    async fn test_create_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodecore.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.storage.data_dir, "./data");
        assert_eq!(loaded.sessions.capacity, 5);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = tokio_test::block_on(Config::load(path.to_str().unwrap())).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
