//! Sweep axes and run options

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Value lists for every sweep axis
///
/// The Cartesian product of these lists is the configuration space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepAxes {
    /// Threads used for generation
    #[serde(default = "default_threads")]
    pub n_threads: Vec<usize>,

    /// Threads used during batch and prompt processing
    #[serde(default = "default_threads")]
    pub n_threads_batch: Vec<usize>,

    /// Prompt processing maximum batch size
    #[serde(default = "default_batch")]
    pub n_batch: Vec<usize>,

    /// Fraction of layers to store in VRAM
    #[serde(default = "default_ngl")]
    pub ngl: Vec<f64>,

    /// Prompt lengths in tokens
    #[serde(default = "default_prompt_length")]
    pub prompt_length: Vec<usize>,

    /// Number of generated tokens
    #[serde(default = "default_new_tokens")]
    pub new_tokens: Vec<usize>,

    /// Context window (not swept)
    #[serde(default = "default_ctx")]
    pub ctx: usize,
}

fn default_threads() -> Vec<usize> {
    vec![10]
}

fn default_batch() -> Vec<usize> {
    vec![512]
}

fn default_ngl() -> Vec<f64> {
    vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]
}

fn default_prompt_length() -> Vec<usize> {
    vec![500]
}

fn default_new_tokens() -> Vec<usize> {
    vec![100]
}

fn default_ctx() -> usize {
    1100
}

impl Default for SweepAxes {
    fn default() -> Self {
        Self {
            n_threads: default_threads(),
            n_threads_batch: default_threads(),
            n_batch: default_batch(),
            ngl: default_ngl(),
            prompt_length: default_prompt_length(),
            new_tokens: default_new_tokens(),
            ctx: default_ctx(),
        }
    }
}

/// What to do when a configuration point fails mid-trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Record a failure row and continue with the next point
    #[default]
    Record,
    /// Abort the whole sweep on the first error
    Abort,
}

/// How peak memory is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryPolicy {
    /// Peak device usage as reported by the driver
    #[default]
    DeviceTotal,
    /// Engine-allocated peak plus memory outside the engine allocator
    /// (driver peak minus engine-reserved peak)
    AllocatedPlusExternal,
}

/// Per-invocation run options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Number of timed trials per configuration point
    #[serde(default = "default_k_folds")]
    pub k_folds: usize,

    /// Untimed runs before the timed region
    #[serde(default)]
    pub warmup_runs: usize,

    /// Re-run points that are already in the store
    #[serde(default)]
    pub force: bool,

    /// Skip all persistence
    #[serde(default)]
    pub debug: bool,

    /// Free-text annotation stored with every record
    #[serde(default)]
    pub memo: String,

    #[serde(default)]
    pub on_failure: FailurePolicy,

    #[serde(default)]
    pub memory: MemoryPolicy,
}

fn default_k_folds() -> usize {
    1
}

impl RunOptions {
    /// Reject options no sweep can run with
    pub fn validate(&self) -> Result<()> {
        if self.k_folds == 0 {
            return Err(BenchError::invalid("k_folds", self.k_folds, "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            k_folds: default_k_folds(),
            warmup_runs: 0,
            force: false,
            debug: false,
            memo: String::new(),
            on_failure: FailurePolicy::default(),
            memory: MemoryPolicy::default(),
        }
    }
}
