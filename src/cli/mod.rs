//! CLI commands

mod bench;
mod info;
mod list;
mod merge;

pub use bench::bench;
pub use info::info;
pub use list::list;
pub use merge::merge;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{BenchConfig, FailurePolicy};

/// Lighthouse - sweep-and-measure benchmarks for LLM inference
#[derive(Parser)]
#[command(name = "lighthouse")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sweep a configuration space and record timings
    Bench(BenchArgs),

    /// Merge staged intake files into the dataset
    Merge {
        /// Directory of staged JSON records
        #[arg(long)]
        intake: Option<PathBuf>,

        /// Dataset file
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Summarize the stored dataset per run
    List {
        /// Dataset file
        #[arg(long)]
        store: Option<PathBuf>,

        /// Show every record
        #[arg(long, short)]
        verbose: bool,
    },

    /// Show model metadata and the offload layer table
    Info {
        /// Model name or path
        model: String,
    },
}

/// Flags for `lighthouse bench`
///
/// List flags take one or more values; every given flag overrides the
/// matching value from `--config`.
#[derive(Args, Debug, Default)]
pub struct BenchArgs {
    /// Model name (resolved in LIGHTHOUSE_MODEL_DIR) or path
    #[arg(long, short)]
    pub model: String,

    /// Number of threads to use for generation
    #[arg(long, num_args = 1..)]
    pub n_threads: Vec<usize>,

    /// Number of threads to use during batch and prompt processing
    #[arg(long, num_args = 1..)]
    pub n_threads_batch: Vec<usize>,

    /// Prompt processing maximum batch size
    #[arg(long, num_args = 1..)]
    pub n_batch: Vec<usize>,

    /// Fraction of layers to store in VRAM
    #[arg(long, num_args = 1..)]
    pub ngl: Vec<f64>,

    /// Prompt lengths in tokens
    #[arg(long, num_args = 1..)]
    pub prompt_length: Vec<usize>,

    /// Number of tokens to generate
    #[arg(long, num_args = 1..)]
    pub new_tokens: Vec<usize>,

    /// Context window
    #[arg(long)]
    pub ctx: Option<usize>,

    /// Timed trials per configuration
    #[arg(long)]
    pub k_folds: Option<usize>,

    /// Untimed warmup runs per configuration
    #[arg(long)]
    pub warmup: Option<usize>,

    /// Re-run configurations already in the dataset
    #[arg(long)]
    pub force: bool,

    /// Do not write intake files or the dataset
    #[arg(long)]
    pub debug: bool,

    /// Description of the experiment
    #[arg(long)]
    pub memo: Option<String>,

    /// Measure prompt processing only (one new token)
    #[arg(long)]
    pub prefill: bool,

    /// Benchmark on the host without requiring a GPU
    #[arg(long)]
    pub cpu: bool,

    /// Stop the sweep at the first failing configuration
    #[arg(long)]
    pub abort_on_error: bool,

    /// YAML or JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Dataset file
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Intake directory
    #[arg(long)]
    pub intake: Option<PathBuf>,
}

impl BenchArgs {
    /// Layer command-line values over `config`
    pub fn apply(&self, config: &mut BenchConfig) {
        let sweep = &mut config.sweep;
        override_list(&mut sweep.n_threads, &self.n_threads);
        override_list(&mut sweep.n_threads_batch, &self.n_threads_batch);
        override_list(&mut sweep.n_batch, &self.n_batch);
        override_list(&mut sweep.ngl, &self.ngl);
        override_list(&mut sweep.prompt_length, &self.prompt_length);
        override_list(&mut sweep.new_tokens, &self.new_tokens);
        if let Some(ctx) = self.ctx {
            sweep.ctx = ctx;
        }
        if self.prefill {
            sweep.new_tokens = vec![1];
        }

        let run = &mut config.run;
        if let Some(k) = self.k_folds {
            run.k_folds = k;
        }
        if let Some(warmup) = self.warmup {
            run.warmup_runs = warmup;
        }
        run.force |= self.force;
        run.debug |= self.debug;
        if let Some(memo) = &self.memo {
            run.memo = memo.clone();
        }
        if self.abort_on_error {
            run.on_failure = FailurePolicy::Abort;
        }

        if let Some(store) = &self.store {
            config.storage.store = store.clone();
        }
        if let Some(intake) = &self.intake {
            config.storage.intake = intake.clone();
        }
    }
}

fn override_list<T: Clone>(target: &mut Vec<T>, values: &[T]) {
    if !values.is_empty() {
        *target = values.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bench_flags() {
        let cli = Cli::try_parse_from([
            "lighthouse",
            "bench",
            "--model",
            "llama-2-7b.Q5_K_M.gguf",
            "--n-threads",
            "8",
            "16",
            "--ngl",
            "0",
            "0.5",
            "1",
            "--k-folds",
            "3",
            "--force",
        ])
        .unwrap();
        let Commands::Bench(args) = cli.command else {
            panic!("expected bench");
        };
        assert_eq!(args.n_threads, vec![8, 16]);
        assert_eq!(args.ngl, vec![0.0, 0.5, 1.0]);
        assert_eq!(args.k_folds, Some(3));
        assert!(args.force);
    }

    #[test]
    fn test_apply_overrides_only_given_values() {
        let mut config = BenchConfig::default();
        config.run.memo = "from file".to_string();
        let args = BenchArgs {
            model: "m".to_string(),
            n_batch: vec![256, 512],
            prefill: true,
            abort_on_error: true,
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(config.sweep.n_batch, vec![256, 512]);
        assert_eq!(config.sweep.n_threads, vec![10]);
        assert_eq!(config.sweep.new_tokens, vec![1]);
        assert_eq!(config.run.memo, "from file");
        assert_eq!(config.run.on_failure, FailurePolicy::Abort);
    }
}
