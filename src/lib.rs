//! Lighthouse - sweep-and-measure benchmarks for LLM inference
//!
//! Lighthouse runs a model under every combination of a set of engine
//! parameters and keeps the timings in one deduplicated CSV dataset.
//!
//! # Architecture
//!
//! - **bench**: sweep enumeration, trial runner, aggregation, result records
//! - **store**: the CSV dataset, the intake directory and the "already tested" index
//! - **engine**: the inference engine interface, memory probes and the boostr GGUF backend
//! - **machine**: hardware identity recorded with every result
//!
//! # Example
//!
//! ```bash
//! # Sweep thread counts and offload fractions, two trials per point
//! lighthouse bench --model llama-2-7b.Q5_K_M.gguf --n-threads 8 16 --ngl 0 0.5 1 --k-folds 2
//!
//! # Merge staged records after a crash
//! lighthouse merge
//!
//! # Show stored runs
//! lighthouse list --verbose
//! ```

pub mod bench;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod machine;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types
pub use bench::{run_benchmark, ConfigPoint, ResultRecord, RunContext, Sweep, SweepReport};
pub use config::{BenchConfig, GenerationConfig};
pub use error::{BenchError, Result};
pub use store::{Dataset, DedupIndex, DedupKey, Intake};
