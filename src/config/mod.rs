//! Configuration system for lighthouse
//!
//! A `BenchConfig` describes one benchmarking invocation: the sweep axes,
//! run options, persistence locations and sampling parameters. It can be
//! loaded from YAML or JSON; CLI flags override individual values.

mod generation;
mod storage;
mod sweep;

pub use generation::GenerationConfig;
pub use storage::StorageConfig;
pub use sweep::{FailurePolicy, MemoryPolicy, RunOptions, SweepAxes};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable naming the model directory
pub const MODEL_DIR_ENV: &str = "LIGHTHOUSE_MODEL_DIR";

/// Lighthouse configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Sweep axes
    #[serde(default)]
    pub sweep: SweepAxes,

    /// Trial and persistence behaviour
    #[serde(default)]
    pub run: RunOptions,

    /// Dataset and intake locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sampling parameters for every trial
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl BenchConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, picking the format from the file extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(path),
            _ => Self::from_yaml(path),
        }
    }
}

/// Directory searched for model files given by name
///
/// `LIGHTHOUSE_MODEL_DIR` wins; otherwise `~/models`, then `./models`.
pub fn model_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
        return PathBuf::from(dir);
    }
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join("models"))
        .unwrap_or_else(|_| PathBuf::from("./models"))
}
