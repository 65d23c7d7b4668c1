//! Configuration file loading for game review.
//!
//! Settings come from `review.toml` in the working directory. Every section
//! and field is optional; missing values take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregator::ExpectedWinrateParams;
use crate::classify::ClassifierConfig;
use crate::evaluator::PollConfig;

/// Errors that can occur when loading or parsing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Tactical engine settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the UCI engine. Defaults to "stockfish" (assumes it's in PATH).
    pub path: String,
    /// Depth used when analyzing game positions.
    pub depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: "stockfish".to_string(),
            depth: 18,
        }
    }
}

/// Complete review configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ReviewConfig {
    pub engine: EngineConfig,
    pub classifier: ClassifierConfig,
    pub aggregator: ExpectedWinrateParams,
    pub polling: PollConfig,
}

impl ReviewConfig {
    /// Loads the configuration from [`Self::config_path()`], or the defaults
    /// when that file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// or [`ConfigError::ParseError`] if the file contains invalid TOML.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads the configuration from a specific file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Returns `review.toml` in the current working directory.
    pub fn config_path() -> PathBuf {
        PathBuf::from("review.toml")
    }
}
