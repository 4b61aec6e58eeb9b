//! CLI configuration handling.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Lock secret pages in RAM so they are never swapped.
    #[serde(default = "default_lock_memory")]
    pub lock_memory: bool,

    /// Logging level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_lock_memory() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            lock_memory: default_lock_memory(),
            log_level: default_log_level(),
            config_path: PathBuf::new(),
        }
    }
}

/// Load configuration from `path`, or the default location when `None`.
///
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path(),
    };

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        CliConfig::default()
    };

    config.config_path = config_path;
    Ok(config)
}

fn default_config_path() -> PathBuf {
    ProjectDirs::from("com", "authident", "authident")
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("authident.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let config = load_config(Some(&path)).unwrap();
        assert!(config.lock_memory);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.config_path, path);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "lock_memory = false\nlog_level = \"debug\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(!config.lock_memory);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_partial_file_keeps_remaining_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "log_level = \"warn\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(config.lock_memory);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "lock_memory = \"maybe\"\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
