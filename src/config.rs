use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{CardsError, Result, DEFAULT_STORAGE_KEY};

/// Quiet period the persistence scheduler waits for after the last change.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Directory where the data blob is stored
    pub data_dir: PathBuf,

    /// Key the aggregate is stored under
    pub storage_key: String,

    /// Debounce window for persistence, in milliseconds
    pub debounce_ms: u64,

    /// Whether exports are pretty-printed
    pub pretty_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            pretty_export: true,
        }
    }
}

/// Platform data directory, or `./commcards-data` when none can be determined
fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", "commcards")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("commcards-data"))
}

impl Config {
    /// Reads the configuration file at `path`, falling back to defaults when
    /// no path is given or the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No configuration file given, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            info!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: Config =
            serde_json::from_str(&contents).map_err(|e| CardsError::ConfigError {
                message: format!("{}: {}", path.display(), e),
            })?;
        config.validate()?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.storage_key.trim().is_empty() {
            return Err(CardsError::ConfigError {
                message: "storage_key must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"data_dir": "/tmp/cards", "debounce_ms": 50}"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/cards"));
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert!(config.pretty_export);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"storage_key": ""}"#).unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(CardsError::ConfigError { .. })
        ));

        fs::write(&path, "debounce_ms = 3").unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(CardsError::ConfigError { .. })
        ));
    }
}
