//! Trial execution for a single configuration point

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bench::point::ConfigPoint;
use crate::config::GenerationConfig;
use crate::engine::{EngineTimings, LoadedModel, MemoryProbe, MemorySnapshot};

/// Raw readings from one timed trial
///
/// Times are in seconds. Throughput is `None` when the phase took no time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricSample {
    pub load_s: f64,
    pub sample_s: f64,
    pub prompt_eval_s: f64,
    pub eval_s: f64,
    pub total_s: f64,
    pub sample_tps: Option<f64>,
    pub prompt_eval_tps: Option<f64>,
    pub eval_tps: Option<f64>,
}

impl MetricSample {
    /// Convert engine millisecond counters into seconds and tokens/second
    pub fn from_timings(t: &EngineTimings) -> Self {
        Self {
            load_s: seconds(t.load_ms),
            sample_s: seconds(t.sample_ms),
            prompt_eval_s: seconds(t.prompt_eval_ms),
            eval_s: seconds(t.eval_ms),
            total_s: seconds(t.end_ms - t.start_ms),
            sample_tps: tokens_per_second(t.n_sample, t.sample_ms),
            prompt_eval_tps: tokens_per_second(t.n_prompt_eval, t.prompt_eval_ms),
            eval_tps: tokens_per_second(t.n_eval, t.eval_ms),
        }
    }
}

fn seconds(ms: f64) -> f64 {
    (ms / 1000.0).max(0.0)
}

fn tokens_per_second(tokens: usize, ms: f64) -> Option<f64> {
    if ms > 0.0 && ms.is_finite() {
        Some(tokens as f64 * 1000.0 / ms)
    } else {
        None
    }
}

/// Deterministic prompt of `len` token ids drawn from `[1, vocab_size)`
pub fn synthetic_prompt(len: usize, vocab_size: usize, seed: u64) -> Result<Vec<u32>> {
    if vocab_size <= 1 {
        bail!("vocabulary too small for a synthetic prompt: {}", vocab_size);
    }
    let upper = u32::try_from(vocab_size).unwrap_or(u32::MAX);
    let mut rng = StdRng::seed_from_u64(seed);
    Ok((0..len).map(|_| rng.gen_range(1..upper)).collect())
}

/// Everything measured for one configuration point
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    /// One sample per timed trial, in order
    pub samples: Vec<MetricSample>,
    /// Peak memory over the timed region
    pub memory: Option<MemorySnapshot>,
    /// Completion id of the last timed trial
    pub completion_id: Option<String>,
}

/// Runs warmup and timed trials against a loaded model
#[derive(Debug, Clone)]
pub struct TrialRunner {
    pub generation: GenerationConfig,
    pub k_folds: usize,
    pub warmup_runs: usize,
}

impl TrialRunner {
    pub fn new(generation: GenerationConfig, k_folds: usize, warmup_runs: usize) -> Self {
        Self {
            generation,
            k_folds,
            warmup_runs,
        }
    }

    /// Run all trials for `point`
    ///
    /// The model is reset after every run. Memory caches are cleared and the
    /// peak counter reset before warmup and again before the timed region.
    pub fn run<M, P>(&self, model: &mut M, point: &ConfigPoint, memory: &mut P) -> Result<TrialOutcome>
    where
        M: LoadedModel + ?Sized,
        P: MemoryProbe + ?Sized,
    {
        let prompt = synthetic_prompt(
            point.prompt_length,
            model.metadata().vocab_size,
            self.generation.seed,
        )?;
        let params = self.generation.with_max_tokens(point.new_tokens);

        memory.clear();
        memory.reset_peak();

        for i in 0..self.warmup_runs {
            tracing::debug!("Warmup {}/{}", i + 1, self.warmup_runs);
            model.run(&prompt, &params)?;
            model.reset();
        }

        memory.clear();
        memory.reset_peak();

        let mut samples = Vec::with_capacity(self.k_folds);
        let mut completion_id = None;
        for fold in 0..self.k_folds {
            let output = model.run(&prompt, &params)?;
            let timings = model.timings();
            model.reset();
            memory.sample();

            if output.tokens.len() < point.new_tokens {
                tracing::warn!(
                    "Trial {} produced {} tokens, expected {}",
                    fold + 1,
                    output.tokens.len(),
                    point.new_tokens
                );
            }

            let sample = MetricSample::from_timings(&timings);
            tracing::debug!(
                "Trial {}/{}: total {:.2}s, eval {:?} tk/s",
                fold + 1,
                self.k_folds,
                sample.total_s,
                sample.eval_tps
            );
            samples.push(sample);
            if output.id.is_some() {
                completion_id = output.id;
            }
        }

        Ok(TrialOutcome {
            samples,
            memory: memory.peak(),
            completion_id,
        })
    }
}
