//! Persistence locations

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where results are staged and stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Flat CSV dataset
    #[serde(default = "default_store")]
    pub store: PathBuf,

    /// Directory of per-point JSON staging files
    #[serde(default = "default_intake")]
    pub intake: PathBuf,
}

fn default_store() -> PathBuf {
    PathBuf::from("output").join("bulb.csv")
}

fn default_intake() -> PathBuf {
    PathBuf::from("input")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            intake: default_intake(),
        }
    }
}
