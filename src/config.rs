//! Configuration management for the dataset service
//!
//! This module provides configuration file support with TOML format,
//! environment variable overrides, and sensible defaults.
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0:8080"
//! log_level = "info"
//! max_request_bytes = 10485760
//!
//! [query]
//! max_grid_points = 10000000
//!
//! [data]
//! seed_file = "streams.json"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ApplicationConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Dataset query limits
    #[serde(default)]
    pub query: QueryConfig,

    /// Stream data loaded at startup
    #[serde(default)]
    pub data: DataConfig,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Socket address to bind
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Log level (error, warn, info, debug, trace) used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Largest accepted request body
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

/// Limits applied by the dataset engine
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Largest grid a grid-driven query may generate
    #[serde(default = "default_max_grid_points")]
    pub max_grid_points: u64,
}

/// Startup data
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DataConfig {
    /// JSON file of `{stream_path: [{"t": .., "d": ..}, ...]}` to preload
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_request_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_max_grid_points() -> u64 {
    10_000_000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_grid_points: default_max_grid_points(),
        }
    }
}

impl QueryConfig {
    /// Override the grid size limit
    pub fn with_max_grid_points(mut self, max_grid_points: u64) -> Self {
        self.max_grid_points = max_grid_points;
        self
    }
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl ApplicationConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load a file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TSDATASET_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = var("TSDATASET_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(level) = var("TSDATASET_LOG_LEVEL") {
            self.server.log_level = level;
        }
        if let Some(seed) = var("TSDATASET_SEED_FILE") {
            self.data.seed_file = (!seed.is_empty()).then(|| PathBuf::from(seed));
        }
        if let Some(limit) = var("TSDATASET_MAX_GRID_POINTS") {
            self.query.max_grid_points = limit.parse().map_err(|_| {
                Error::Configuration(format!(
                    "TSDATASET_MAX_GRID_POINTS must be a positive integer, got '{}'",
                    limit
                ))
            })?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(Error::Configuration(format!(
                "listen_addr '{}' is not a socket address",
                self.server.listen_addr
            )));
        }

        if !LOG_LEVELS.contains(&self.server.log_level.to_ascii_lowercase().as_str()) {
            return Err(Error::Configuration(format!(
                "log_level must be one of {:?}, got '{}'",
                LOG_LEVELS, self.server.log_level
            )));
        }

        if self.server.max_request_bytes == 0 {
            return Err(Error::Configuration(
                "max_request_bytes must be > 0".to_string(),
            ));
        }

        if self.query.max_grid_points == 0 {
            return Err(Error::Configuration(
                "max_grid_points must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ApplicationConfig::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.server.max_request_bytes, 10 * 1024 * 1024);
        assert_eq!(config.query.max_grid_points, 10_000_000);
        assert!(config.data.seed_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[query]\nmax_grid_points = 500\n\n[data]\nseed_file = \"seed.json\"").unwrap();

        let config = ApplicationConfig::from_file(file.path()).unwrap();
        assert_eq!(config.query.max_grid_points, 500);
        assert_eq!(config.data.seed_file, Some(PathBuf::from("seed.json")));
        assert_eq!(config.server, ServerSettings::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsdataset.toml");

        let mut config = ApplicationConfig::default();
        config.server.log_level = "debug".to_string();
        config.save_to_file(&path).unwrap();

        assert_eq!(ApplicationConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[query\nmax_grid_points = ").unwrap();
        let err = ApplicationConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_missing_file() {
        assert!(ApplicationConfig::from_file("/nonexistent/tsdataset.toml").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ApplicationConfig::default();
        config
            .apply_overrides(vars(&[
                ("TSDATASET_LISTEN_ADDR", "127.0.0.1:9999"),
                ("TSDATASET_LOG_LEVEL", "trace"),
                ("TSDATASET_SEED_FILE", "/tmp/streams.json"),
                ("TSDATASET_MAX_GRID_POINTS", "42"),
            ]))
            .unwrap();

        assert_eq!(config.server.listen_addr, "127.0.0.1:9999");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.data.seed_file, Some(PathBuf::from("/tmp/streams.json")));
        assert_eq!(config.query.max_grid_points, 42);
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = ApplicationConfig::default();
        let result = config.apply_overrides(vars(&[("TSDATASET_MAX_GRID_POINTS", "lots")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ApplicationConfig::default();
        config.server.listen_addr = "not an address".to_string();
        assert!(config.validate().is_err());

        let mut config = ApplicationConfig::default();
        config.server.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = ApplicationConfig::default();
        config.query.max_grid_points = 0;
        assert!(config.validate().is_err());
    }
}
