//! Configuration management for the media range cache

use crate::error::{CacheError, Result};
use crate::events::DEFAULT_EVENT_BUFFER;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How `add_cache_file` brings an external file into the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Copy the file, leaving the source untouched
    #[default]
    Copy,
    /// Move the file, falling back to copy + delete across filesystems
    Move,
}

/// Configuration for the cache manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory holding bytes files and sidecars
    /// (default: `<temp dir>/media-range-cache`)
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Byte budget for cached media (default: 512MB)
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: u64,

    /// Minimum spacing between progress notifications per resource,
    /// in milliseconds (default: 100)
    #[serde(default = "default_notify_interval_ms")]
    pub notify_interval_ms: u64,

    /// Import behaviour for `add_cache_file` (default: copy)
    #[serde(default)]
    pub import_mode: ImportMode,

    /// Evict old units before a write would exceed the budget (default: true)
    #[serde(default = "default_true")]
    pub evict_on_write: bool,

    /// Events buffered per subscriber before it starts lagging (default: 256)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("media-range-cache")
}

fn default_max_cache_size() -> u64 {
    512 * 1024 * 1024 // 512MB
}

fn default_notify_interval_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            cache_dir: default_cache_dir(),
            max_cache_size: default_max_cache_size(),
            notify_interval_ms: default_notify_interval_ms(),
            import_mode: ImportMode::default(),
            evict_on_write: default_true(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl CacheConfig {
    /// Default configuration rooted at `cache_dir`
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        CacheConfig {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(CacheConfig)` if loading and validation succeed
    /// * `Err(CacheError::ConfigError)` if the file cannot be read or is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            CacheError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: CacheConfig = serde_yaml::from_str(content).map_err(|e| {
            CacheError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - cache_dir must not be empty
    /// - max_cache_size must be > 0; zero is never read as "unlimited"
    /// - event_buffer must be > 0
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(CacheError::ConfigError(
                "cache_dir must not be empty".to_string(),
            ));
        }

        validate_max_cache_size(self.max_cache_size)?;

        if self.event_buffer == 0 {
            return Err(CacheError::ConfigError(
                "event_buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms)
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_max_cache_size(mut self, bytes: u64) -> Self {
        self.max_cache_size = bytes;
        self
    }

    pub fn with_notify_interval(mut self, interval: Duration) -> Self {
        self.notify_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_import_mode(mut self, mode: ImportMode) -> Self {
        self.import_mode = mode;
        self
    }

    pub fn with_evict_on_write(mut self, enabled: bool) -> Self {
        self.evict_on_write = enabled;
        self
    }
}

pub(crate) fn validate_max_cache_size(bytes: u64) -> Result<()> {
    if bytes == 0 {
        return Err(CacheError::ConfigError(
            "max_cache_size must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.max_cache_size, 512 * 1024 * 1024);
        assert_eq!(config.notify_interval(), Duration::from_millis(100));
        assert_eq!(config.import_mode, ImportMode::Copy);
        assert!(config.evict_on_write);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_with_defaults() {
        let config = CacheConfig::from_yaml(
            "cache_dir: /var/cache/media\nmax_cache_size: 1048576\nimport_mode: move\n",
        )
        .unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/media"));
        assert_eq!(config.max_cache_size, 1024 * 1024);
        assert_eq!(config.import_mode, ImportMode::Move);
        assert_eq!(config.notify_interval_ms, 100);
        assert_eq!(config.event_buffer, DEFAULT_EVENT_BUFFER);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let err = CacheConfig::from_yaml("max_cache_size: 0\n").unwrap_err();
        assert!(matches!(err, CacheError::ConfigError(_)));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = CacheConfig::from_yaml("max_cache_size: [1, 2").unwrap_err();
        assert!(matches!(err, CacheError::ConfigError(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cache.yaml");
        fs::write(&path, "notify_interval_ms: 2000\nevict_on_write: false\n").unwrap();

        let config = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config.notify_interval(), Duration::from_secs(2));
        assert!(!config.evict_on_write);

        assert!(CacheConfig::from_file(dir.path().join("missing.yaml")).is_err());
    }
}
