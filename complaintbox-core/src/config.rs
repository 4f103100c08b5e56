//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/complaintbox/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/complaintbox/` (~/.config/complaintbox/)
//! - Data: `$XDG_DATA_HOME/complaintbox/` (~/.local/share/complaintbox/)
//! - State/Logs: `$XDG_STATE_HOME/complaintbox/` (~/.local/state/complaintbox/)
//!
//! ```toml
//! [storage]
//! base_dir = "/home/me/.local/share/complaintbox/complaints"
//! docs_dir = "/home/me/notes/complaints"
//! naming = "id"
//!
//! [cache]
//! enabled = true
//! max_size = 1000
//! eviction_policy = "lru"
//!
//! [logging]
//! level = "info"
//! ```

use crate::cache::CacheConfig;
use crate::error::{Error, Result};
use crate::store::StoreConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "complaintbox";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Where complaint records and mirrors live
    #[serde(default)]
    pub storage: StoreConfig,

    /// In-memory cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings that parse but cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.cache.enabled && self.cache.max_size == 0 {
            return Err(Error::Config(
                "cache.max_size must be at least 1 when the cache is enabled".to_string(),
            ));
        }
        if self.storage.base_dir.as_os_str().is_empty() {
            return Err(Error::Config("storage.base_dir must not be empty".to_string()));
        }
        if self.logging.max_files == 0 {
            return Err(Error::Config("logging.max_files must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/complaintbox/config.toml` (~/.config/complaintbox/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join(APP_DIR).join("config.toml")
    }

    /// Returns the data directory path (default parent of the complaint store)
    ///
    /// `$XDG_DATA_HOME/complaintbox/` (~/.local/share/complaintbox/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join(APP_DIR)
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/complaintbox/` (~/.local/state/complaintbox/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join(APP_DIR)
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
