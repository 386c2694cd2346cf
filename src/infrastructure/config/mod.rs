//! Layered configuration.
//!
//! Precedence, lowest to highest: compiled-in defaults, an optional TOML
//! file, `JOURNAL_`-prefixed environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use validator::Validate;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration validation failed: {0}")]
    Validation(String),

    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("configuration format error: {0}")]
    Format(String),
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    pub storage: StorageConfig,

    pub database: DatabaseConfig,

    pub monitoring: MonitoringConfig,
}

/// Blob store and version repository roots.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StorageConfig {
    #[validate(length(min = 1, max = 500))]
    pub content_dir: String,

    #[validate(length(min = 1, max = 500))]
    pub version_root: String,
}

/// SQLite metadata database.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[validate(length(min = 1, max = 500))]
    pub path: String,

    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,

    #[validate(range(min = 1, max = 3600))]
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MonitoringConfig {
    #[validate(length(min = 1, max = 100))]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            database: DatabaseConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            content_dir: "./data/blobs".to_string(),
            version_root: "./data/repos".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data/metadata.db".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: 30,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration, layering an optional TOML file and then
    /// environment variables over the defaults.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&AppConfig::default())
            .map_err(|e| ConfigError::Format(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            builder = builder.add_source(config::File::from(path));
        }

        let loaded: AppConfig = builder
            .add_source(config::Environment::with_prefix("JOURNAL").separator("__"))
            .build()
            .map_err(|e| ConfigError::Format(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Format(e.to_string()))?;

        loaded
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitoring.log_level, "info");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.storage.content_dir, "./data/blobs");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/journal.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[database]\npath = \"/var/lib/journal/metadata.db\"\nmax_connections = 5\nacquire_timeout_seconds = 10\n"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.database.path, "/var/lib/journal/metadata.db");
        assert_eq!(config.database.max_connections, 5);
        // Sections absent from the file keep their defaults.
        assert_eq!(config.storage.version_root, "./data/repos");
    }
}
