//! Inference engine collaborator interface
//!
//! The harness never calls an ML library directly. It only talks to:
//! - `InferenceEngine`: inspects model files and loads them for a configuration
//! - `LoadedModel`: runs a generation, resets its context and reports timings
//! - `MemoryProbe`: clears device caches and tracks peak memory
//!
//! A GGUF backend built on boostr lives behind the `boostr` feature.

#[cfg(feature = "boostr")]
mod gguf;
mod memory;

#[cfg(feature = "boostr")]
pub use gguf::GgufEngine;
pub use memory::{GpuMemoryProbe, HostMemoryProbe, MemoryProbe, MemorySnapshot, NoMemoryProbe};

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;

/// Static facts about a model file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Architecture name (e.g. "llama")
    pub architecture: String,
    /// Number of transformer blocks
    pub block_count: usize,
    /// Vocabulary size; synthetic prompts draw ids from `[1, vocab_size)`
    pub vocab_size: usize,
    /// Trained context length, if recorded
    pub context_length: Option<usize>,
    /// Dominant weight quantization, if known
    pub quantization: Option<String>,
}

/// Parameters an engine needs to load a model for one configuration point
#[derive(Debug, Clone, PartialEq)]
pub struct LoadConfig {
    pub model_path: PathBuf,
    pub n_threads: usize,
    pub n_threads_batch: usize,
    pub n_batch: usize,
    /// Absolute number of layers to place on the accelerator
    pub n_gpu_layers: usize,
    pub n_ctx: usize,
}

/// Phase timings reported by the engine for the most recent run
///
/// Millisecond counters and token counts, mirroring what llama.cpp-style
/// engines expose.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineTimings {
    pub load_ms: f64,
    pub sample_ms: f64,
    pub prompt_eval_ms: f64,
    pub eval_ms: f64,
    pub start_ms: f64,
    pub end_ms: f64,
    pub n_sample: usize,
    pub n_prompt_eval: usize,
    pub n_eval: usize,
}

/// Output of a single generation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    /// Engine-assigned completion id, if any
    pub id: Option<String>,
    /// Generated token ids
    pub tokens: Vec<u32>,
}

/// A model loaded with a fixed thread/batch/offload configuration
pub trait LoadedModel {
    /// Model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Generate from pre-tokenized input
    fn run(&mut self, prompt: &[u32], params: &GenerationConfig) -> Result<RunOutput>;

    /// Drop all cached context so the next run starts from scratch
    fn reset(&mut self);

    /// Timings of the most recent run
    fn timings(&self) -> EngineTimings;
}

/// Factory for loaded models
pub trait InferenceEngine {
    type Model: LoadedModel;

    /// Backend name stored with every record
    fn name(&self) -> &str;

    /// Compute kernel family, when the backend distinguishes several
    fn kernel(&self) -> Option<&str> {
        None
    }

    /// Read model metadata without a full load
    fn inspect(&self, path: &Path) -> Result<ModelMetadata>;

    /// Load a model for one configuration point
    fn load(&self, config: &LoadConfig) -> Result<Self::Model>;
}
