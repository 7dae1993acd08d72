//! Error types for the benchmarking harness

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the sweep, the trial runner and the result store
#[derive(Debug, Error)]
pub enum BenchError {
    /// No compatible compute device; raised before any sweep work begins
    #[error("environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    /// A sweep axis value violates a configuration invariant
    #[error("invalid configuration: {field} = {value} ({reason})")]
    InvalidConfig {
        /// Axis or option name
        field: &'static str,
        /// Offending value, formatted
        value: String,
        /// Violated constraint
        reason: &'static str,
    },

    /// The model file could not be inspected by the engine
    #[error("model unavailable at {}: {source}", path.display())]
    ModelUnavailable {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The inference engine failed while running a configuration point
    #[error("trial failed for {point}: {source}")]
    TrialFailed {
        /// Short description of the configuration point
        point: String,
        /// Underlying engine error
        #[source]
        source: anyhow::Error,
    },

    /// The dataset or an intake file is unreadable or malformed
    #[error("corrupt data in {}: {reason}", path.display())]
    Corrupt {
        /// File that failed to parse
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl BenchError {
    pub(crate) fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Self::InvalidConfig {
            field,
            value: value.to_string(),
            reason,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, BenchError>;
