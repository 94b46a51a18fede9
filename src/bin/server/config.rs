//! Server Configuration
//!
//! This module handles locating and loading the configuration file.

use std::fmt;
use std::path::{Path, PathBuf};
use tsdataset::config::ApplicationConfig;

/// Default configuration file looked up in the working directory
const DEFAULT_CONFIG_FILE: &str = "tsdataset.toml";

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// `--config` flag
    Flag(PathBuf),
    /// `TSDATASET_CONFIG` environment variable
    Env(PathBuf),
    /// `./tsdataset.toml`
    WorkingDir(PathBuf),
    /// Built-in defaults plus environment overrides
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Flag(path) => write!(f, "{} (--config)", path.display()),
            ConfigSource::Env(path) => write!(f, "{} (TSDATASET_CONFIG)", path.display()),
            ConfigSource::WorkingDir(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => f.write_str("defaults"),
        }
    }
}

/// Load configuration
///
/// Priority:
/// 1. `--config` flag
/// 2. `TSDATASET_CONFIG` environment variable
/// 3. `./tsdataset.toml`
/// 4. Default configuration
///
/// An explicitly named file that fails to load is an error; it never falls
/// back to defaults silently.
pub fn load_config(flag: Option<&Path>) -> tsdataset::Result<(ApplicationConfig, ConfigSource)> {
    if let Some(path) = flag {
        let config = ApplicationConfig::load(path)?;
        return Ok((config, ConfigSource::Flag(path.to_path_buf())));
    }

    if let Ok(path) = std::env::var("TSDATASET_CONFIG") {
        let path = PathBuf::from(path);
        let config = ApplicationConfig::load(&path)?;
        return Ok((config, ConfigSource::Env(path)));
    }

    let local = Path::new(DEFAULT_CONFIG_FILE);
    if local.exists() {
        let config = ApplicationConfig::load(local)?;
        return Ok((config, ConfigSource::WorkingDir(local.to_path_buf())));
    }

    Ok((ApplicationConfig::from_env()?, ConfigSource::Defaults))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flag_takes_priority() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nlisten_addr = \"127.0.0.1:7000\"").unwrap();

        let (config, source) = load_config(Some(file.path())).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:7000");
        assert_eq!(source, ConfigSource::Flag(file.path().to_path_buf()));
    }

    #[test]
    fn test_missing_flag_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/tsdataset.toml"))).is_err());
    }
}
