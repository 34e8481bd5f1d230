//! Configuration module for modflow
//!
//! Kernel settings are stored as TOML. The default file lives in the
//! platform-appropriate data directory under `dev.modflow.kernel`:
//! - **Linux**: `~/.local/share/dev.modflow.kernel/kernel.toml`
//! - **macOS**: `~/Library/Application Support/dev.modflow.kernel/kernel.toml`
//! - **Windows**: `%APPDATA%\dev.modflow.kernel\kernel.toml`
//!
//! Set `MODFLOW_CONFIG` to use another file.
//!
//! # Example
//!
//! ```ignore
//! use modflow::config::KernelConfig;
//!
//! let mut config = KernelConfig::load_or_default();
//! config.container_name = "viewer".to_string();
//! config.save(KernelConfig::default_path().unwrap())?;
//! ```

use crate::error::{KernelError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.modflow.kernel";

/// Config filename
pub const CONFIG_FILE: &str = "kernel.toml";

/// Environment variable overriding the config path
pub const CONFIG_ENV: &str = "MODFLOW_CONFIG";

/// Default name of the root container
pub const DEFAULT_CONTAINER_NAME: &str = "root";

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "info,modflow=debug";

/// Default capacity of container event channels
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Default time a module loop waits on its state before re-checking
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 100;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

// ==================== Kernel Config ====================

/// Kernel settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Name of the root module container, used as the log source
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// `tracing` filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Also write logs to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Capacity of each container event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// How long a module loop waits for data before checking for shutdown
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Skip payload type checks when applying combiners
    #[serde(default)]
    pub force_connections: bool,
}

fn default_container_name() -> String {
    DEFAULT_CONTAINER_NAME.to_string()
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_wait_timeout_ms() -> u64 {
    DEFAULT_WAIT_TIMEOUT_MS
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            container_name: default_container_name(),
            log_filter: default_log_filter(),
            log_file: None,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            force_connections: false,
        }
    }
}

impl KernelConfig {
    /// `MODFLOW_CONFIG` if set, otherwise the file in the app data directory.
    pub fn default_path() -> Option<PathBuf> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
            _ => app_data_dir().map(|p| p.join(CONFIG_FILE)),
        }
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(KernelError::from)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        toml::from_str(&content).map_err(|e| {
            KernelError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load kernel config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(KernelError::from)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| KernelError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(KernelError::from)
            .with_context(|| format!("Failed to write config file {:?}", path))
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_config_default() {
        let config = KernelConfig::default();
        assert_eq!(config.container_name, "root");
        assert_eq!(config.event_channel_capacity, 1024);
        assert_eq!(config.wait_timeout(), Duration::from_millis(100));
        assert!(!config.force_connections);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: KernelConfig = toml::from_str("container_name = \"viewer\"").unwrap();
        assert_eq!(config.container_name, "viewer");
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = KernelConfig {
            container_name: "viewer".to_string(),
            log_file: Some(PathBuf::from("/var/log/modflow.log")),
            force_connections: true,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let parsed = KernelConfig::load(&path).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "container_name = [").unwrap();
        assert!(matches!(
            KernelConfig::load(&path),
            Err(KernelError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_keeps_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = KernelConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
        assert!(matches!(
            err,
            KernelError::WithContext { ref source, .. } if matches!(**source, KernelError::Io(_))
        ));
    }

    #[test]
    #[serial]
    fn test_env_overrides_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        KernelConfig {
            container_name: "from-env".to_string(),
            ..Default::default()
        }
        .save(&path)
        .unwrap();

        std::env::set_var(CONFIG_ENV, &path);
        let loaded = KernelConfig::load_or_default();
        std::env::remove_var(CONFIG_ENV);

        assert_eq!(loaded.container_name, "from-env");
        assert_eq!(
            KernelConfig::default_path(),
            app_data_dir().map(|p| p.join(CONFIG_FILE))
        );
    }
}
