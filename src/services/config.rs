//! Configuration for the turbine orchestrator.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::services::snapshot::DEFAULT_SNAPSHOT_INTERVAL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurbineConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Default for TurbineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl TurbineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load from the given path if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Event database file, relative to the work directory.
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "turbine.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter when RUST_LOG is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Hard ceiling on the global turn counter.
    pub max_turns: u64,
    /// Request a checkpoint every this many turns.
    pub checkpoint_interval: u64,
    /// Snapshot cadence in events; structural events always snapshot.
    pub snapshot_interval: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: 20_000,
            checkpoint_interval: 10,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TurbineConfig::default();
        assert_eq!(config.orchestrator.max_turns, 20_000);
        assert_eq!(config.orchestrator.checkpoint_interval, 10);
        assert_eq!(config.orchestrator.snapshot_interval, 100);
        assert_eq!(config.database.path, "turbine.db");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TurbineConfig = toml::from_str(
            r#"
            [orchestrator]
            max_turns = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.orchestrator.max_turns, 50);
        assert_eq!(config.orchestrator.checkpoint_interval, 10);
        assert_eq!(config.database.path, "turbine.db");
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let result = TurbineConfig::load(Path::new("/does/not/exist.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_or_default_missing_file_is_default() {
        let config = TurbineConfig::load_or_default(Path::new("/does/not/exist.toml")).unwrap();
        assert_eq!(config, TurbineConfig::default());
    }
}
