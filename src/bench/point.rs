//! Configuration points and sweep-space enumeration

use std::fmt;

use crate::config::SweepAxes;
use crate::error::{BenchError, Result};

/// One point in the sweep space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigPoint {
    pub n_threads: usize,
    pub n_threads_batch: usize,
    pub n_batch: usize,
    /// Fraction of layers on the accelerator, in `[0, 1]`
    pub gpu_offload: f64,
    pub prompt_length: usize,
    pub new_tokens: usize,
    pub ctx: usize,
}

impl ConfigPoint {
    /// Check the point's invariants
    pub fn validate(&self) -> Result<()> {
        if !self.gpu_offload.is_finite() || !(0.0..=1.0).contains(&self.gpu_offload) {
            return Err(BenchError::invalid("ngl", self.gpu_offload, "must lie in [0, 1]"));
        }
        if self.new_tokens == 0 {
            return Err(BenchError::invalid("new_tokens", 0, "must be positive"));
        }
        if self.n_threads == 0 {
            return Err(BenchError::invalid("n_threads", 0, "must be positive"));
        }
        if self.n_threads_batch == 0 {
            return Err(BenchError::invalid("n_threads_batch", 0, "must be positive"));
        }
        if self.n_batch == 0 {
            return Err(BenchError::invalid("n_batch", 0, "must be positive"));
        }
        if self.prompt_length + self.new_tokens > self.ctx {
            return Err(BenchError::invalid(
                "ctx",
                self.ctx,
                "prompt_length + new_tokens exceeds the context window",
            ));
        }
        Ok(())
    }

    /// Absolute layer count for this point's offload fraction
    pub fn offload_layers(&self, block_count: usize) -> usize {
        offload_layers(block_count, self.gpu_offload)
    }
}

impl fmt::Display for ConfigPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "threads={} batch_threads={} batch={} ngl={} prompt={} new_tokens={}",
            self.n_threads,
            self.n_threads_batch,
            self.n_batch,
            self.gpu_offload,
            self.prompt_length,
            self.new_tokens
        )
    }
}

/// Convert an offload fraction into a layer count
///
/// The output layer counts as one extra block, so a model with 39 blocks
/// offloads `round(40 * fraction)` layers.
pub fn offload_layers(block_count: usize, fraction: f64) -> usize {
    ((block_count + 1) as f64 * fraction).round() as usize
}

/// Enumerate the Cartesian product of all axes
///
/// Iteration order follows the input lists: threads, batch threads, batch,
/// offload, prompt length, new tokens (the last axis varies fastest). A value
/// repeated within one axis is enumerated once. Every point is validated; the
/// first invalid one aborts enumeration.
pub fn expand(axes: &SweepAxes) -> Result<Vec<ConfigPoint>> {
    non_empty("n_threads", axes.n_threads.len())?;
    non_empty("n_threads_batch", axes.n_threads_batch.len())?;
    non_empty("n_batch", axes.n_batch.len())?;
    non_empty("ngl", axes.ngl.len())?;
    non_empty("prompt_length", axes.prompt_length.len())?;
    non_empty("new_tokens", axes.new_tokens.len())?;

    let mut points = Vec::new();
    for n_threads in distinct(&axes.n_threads) {
        for n_threads_batch in distinct(&axes.n_threads_batch) {
            for n_batch in distinct(&axes.n_batch) {
                for gpu_offload in distinct(&axes.ngl) {
                    for prompt_length in distinct(&axes.prompt_length) {
                        for new_tokens in distinct(&axes.new_tokens) {
                            let point = ConfigPoint {
                                n_threads,
                                n_threads_batch,
                                n_batch,
                                gpu_offload,
                                prompt_length,
                                new_tokens,
                                ctx: axes.ctx,
                            };
                            point.validate()?;
                            points.push(point);
                        }
                    }
                }
            }
        }
    }

    Ok(points)
}

/// Axis values in first-seen order, without repeats
fn distinct<T: PartialEq + Copy>(values: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(values.len());
    for &value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn non_empty(field: &'static str, len: usize) -> Result<()> {
    if len == 0 {
        return Err(BenchError::invalid(field, "[]", "axis has no values"));
    }
    Ok(())
}
