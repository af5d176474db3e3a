//! Runtime configuration
//!
//! Every tunable lives in [`WordfieldConfig`]. Files are optional: missing
//! sections and fields take their defaults, and the format is chosen from the
//! file extension.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connectivity::ConnectivityParams;
use crate::controller::{PhaseDurations, PoolParams};
use crate::expansion::ExpansionParams;
use crate::layout::LayoutParams;
use crate::space::SpaceParams;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML for this schema
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The file is not valid JSON for this schema
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The extension is neither YAML nor JSON
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
}

/// Complete configuration for an assembly controller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordfieldConfig {
    pub pool: PoolParams,
    pub layout: LayoutParams,
    pub expansion: ExpansionParams,
    pub connectivity: ConnectivityParams,
    pub timing: PhaseDurations,
    pub space: SpaceParams,
    /// Fixed RNG seed for reproducible runs; entropy when absent
    pub seed: Option<u64>,
}

impl WordfieldConfig {
    /// Load from a `.yaml`, `.yml` or `.json` file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;

        let text = std::fs::read_to_string(path)?;
        match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&text),
            "json" => Self::from_json_str(&text),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Load from `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}
