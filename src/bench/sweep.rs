//! Sweep engine: enumerate, skip, measure, stage

use std::path::{Path, PathBuf};

use crate::bench::aggregate::Summary;
use crate::bench::context::RunContext;
use crate::bench::point::{expand, ConfigPoint};
use crate::bench::record::ResultRecord;
use crate::bench::trial::TrialRunner;
use crate::config::{BenchConfig, FailurePolicy};
use crate::engine::{InferenceEngine, LoadConfig, MemoryProbe, ModelMetadata};
use crate::error::{BenchError, Result};
use crate::store::{self, Dataset, DedupIndex, DedupKey, Intake};

/// What happened during one sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Records emitted, in enumeration order (failures included)
    pub records: Vec<ResultRecord>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Set when an interrupt stopped enumeration early
    pub cancelled: bool,
    /// Intake files written
    pub staged: Vec<PathBuf>,
}

impl SweepReport {
    /// Log the end-of-sweep summary
    pub fn log_summary(&self, run_name: &str) {
        tracing::info!(
            "Run {}: {} succeeded, {} failed, {} skipped{}",
            run_name,
            self.succeeded,
            self.failed,
            self.skipped,
            if self.cancelled { " (interrupted)" } else { "" }
        );
        for record in &self.records {
            match &record.error {
                Some(reason) => tracing::warn!(
                    "  {} threads={} batch={} ngl={}: {}",
                    record.id,
                    record.n_threads,
                    record.n_batch,
                    record.gpu_offload,
                    reason
                ),
                None => tracing::info!(
                    "  {} threads={} batch={} ngl={}: {:?}s total, {:?} tk/s",
                    record.id,
                    record.n_threads,
                    record.n_batch,
                    record.gpu_offload,
                    record.total_s,
                    record.eval_tps
                ),
            }
        }
    }
}

/// Drives every configuration point of one invocation
pub struct Sweep<'a, E: InferenceEngine, P: MemoryProbe + ?Sized> {
    engine: &'a E,
    ctx: &'a RunContext,
    model_path: &'a Path,
    metadata: ModelMetadata,
    index: DedupIndex,
    intake: Option<Intake>,
    memory: &'a mut P,
    runner: TrialRunner,
}

impl<'a, E: InferenceEngine, P: MemoryProbe + ?Sized> Sweep<'a, E, P> {
    /// Inspect the model once and prepare the trial runner
    pub fn new(
        engine: &'a E,
        ctx: &'a RunContext,
        model_path: &'a Path,
        index: DedupIndex,
        memory: &'a mut P,
    ) -> Result<Self> {
        let metadata = engine
            .inspect(model_path)
            .map_err(|source| BenchError::ModelUnavailable {
                path: model_path.to_path_buf(),
                source,
            })?;
        tracing::info!(
            "Model {}: {} blocks, vocab {}",
            metadata.architecture,
            metadata.block_count,
            metadata.vocab_size
        );

        let runner = TrialRunner::new(
            ctx.generation.clone(),
            ctx.options.k_folds,
            ctx.options.warmup_runs,
        );
        Ok(Self {
            engine,
            ctx,
            model_path,
            metadata,
            index,
            intake: None,
            memory,
            runner,
        })
    }

    /// Stage every emitted record into `intake`
    pub fn with_intake(mut self, intake: Intake) -> Self {
        self.intake = Some(intake);
        self
    }

    /// Run all points in order
    ///
    /// Stops early on cancellation, or on the first trial error under
    /// [`FailurePolicy::Abort`].
    pub fn run(&mut self, points: &[ConfigPoint]) -> Result<SweepReport> {
        self.ctx.options.validate()?;
        self.ctx.generation.validate()?;
        let mut report = SweepReport::default();

        for (i, point) in points.iter().enumerate() {
            if self.ctx.is_cancelled() {
                tracing::warn!("Interrupted, skipping the remaining {} points", points.len() - i);
                report.cancelled = true;
                break;
            }

            let key = DedupKey::new(
                &self.ctx.machine,
                point.n_threads,
                point.n_threads_batch,
                point.n_batch,
                point.gpu_offload,
            );
            if self.index.contains(&key) && !self.ctx.options.force {
                tracing::info!("Configuration already tested on this machine, skipping: {}", point);
                report.skipped += 1;
                continue;
            }

            tracing::info!("[{}/{}] {}", i + 1, points.len(), point);
            let record = match self.measure(point) {
                Ok(record) => {
                    report.succeeded += 1;
                    record
                }
                Err(e) => match self.ctx.options.on_failure {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Record => {
                        let reason = match &e {
                            BenchError::TrialFailed { source, .. } => format!("{:#}", source),
                            other => other.to_string(),
                        };
                        tracing::warn!("Point failed, recording and continuing: {}", reason);
                        report.failed += 1;
                        self.finish(ResultRecord::failed(self.ctx, point, reason))
                    }
                },
            };

            if let Some(intake) = &self.intake {
                report.staged.push(intake.stage(&record)?);
            }
            report.records.push(record);
        }

        Ok(report)
    }

    fn measure(&mut self, point: &ConfigPoint) -> Result<ResultRecord> {
        let offload_layers = point.offload_layers(self.metadata.block_count);
        let load_config = LoadConfig {
            model_path: self.model_path.to_path_buf(),
            n_threads: point.n_threads,
            n_threads_batch: point.n_threads_batch,
            n_batch: point.n_batch,
            n_gpu_layers: offload_layers,
            n_ctx: point.ctx,
        };
        let trial_failed = |source: anyhow::Error| BenchError::TrialFailed {
            point: point.to_string(),
            source,
        };

        tracing::debug!("Loading model with {} offloaded layers", offload_layers);
        let mut model = self.engine.load(&load_config).map_err(trial_failed)?;
        let outcome = self
            .runner
            .run(&mut model, point, &mut *self.memory)
            .map_err(trial_failed)?;
        drop(model);

        let summary = Summary::from_samples(&outcome.samples).ok_or_else(|| {
            trial_failed(anyhow::anyhow!("no timed trials were run"))
        })?;
        let id = outcome
            .completion_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut record = ResultRecord::completed(self.ctx, point, &summary, id, offload_layers);
        record.memory_mb = outcome
            .memory
            .map(|m| m.report(self.ctx.options.memory));
        Ok(self.finish(record))
    }

    /// Attach fields shared by success and failure records
    fn finish(&self, mut record: ResultRecord) -> ResultRecord {
        record.engine = Some(self.engine.name().to_string());
        record.kernel = self.engine.kernel().map(str::to_string);
        record.quant_method = self.metadata.quantization.clone();
        record
    }
}

/// One complete invocation: sweep, then merge into the dataset
///
/// In debug mode nothing is staged and the dataset file is untouched.
pub fn run_benchmark<E, P>(
    engine: &E,
    config: &BenchConfig,
    model_path: &Path,
    ctx: &RunContext,
    memory: &mut P,
) -> Result<SweepReport>
where
    E: InferenceEngine,
    P: MemoryProbe + ?Sized,
{
    let points = expand(&config.sweep)?;
    let dataset = Dataset::load(&config.storage.store)?;
    let index = dataset.index();
    tracing::info!(
        "{} points to sweep, {} already measured in {}",
        points.len(),
        index.len(),
        config.storage.store.display()
    );

    let debug = ctx.options.debug;
    let intake = Intake::new(&config.storage.intake);
    let mut sweep = Sweep::new(engine, ctx, model_path, index, memory)?;
    if !debug {
        sweep = sweep.with_intake(intake.clone());
    }
    let report = sweep.run(&points)?;
    report.log_summary(&ctx.run_name);

    if debug {
        tracing::info!("Debug mode: results were not persisted");
    } else {
        let merged = store::merge_intake(dataset, &intake)?;
        merged.save(&config.storage.store)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::context::tests::machine;
    use crate::config::{GenerationConfig, RunOptions, SweepAxes};
    use crate::engine::NoMemoryProbe;
    use crate::testing::ScriptedEngine;
    use std::sync::atomic::Ordering;

    fn axes() -> SweepAxes {
        SweepAxes {
            n_threads: vec![8, 16],
            n_threads_batch: vec![8],
            n_batch: vec![256, 512],
            ngl: vec![0.5],
            prompt_length: vec![16],
            new_tokens: vec![4],
            ctx: 64,
        }
    }

    fn context(options: RunOptions) -> RunContext {
        RunContext::new(machine(), options, GenerationConfig::default()).with_run_name("calm_heron")
    }

    fn options(k_folds: usize) -> RunOptions {
        RunOptions {
            k_folds,
            ..Default::default()
        }
    }

    struct Workspace {
        _dir: tempfile::TempDir,
        config: BenchConfig,
        model: PathBuf,
    }

    fn workspace() -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("llama-2-7b.Q5_K_M.gguf");
        std::fs::write(&model, b"GGUF").unwrap();
        let mut config = BenchConfig::default();
        config.sweep = axes();
        config.storage.store = dir.path().join("output").join("bulb.csv");
        config.storage.intake = dir.path().join("input");
        Workspace {
            _dir: dir,
            config,
            model,
        }
    }

    #[test]
    fn test_sweep_emits_one_record_per_point() {
        let engine = ScriptedEngine::new();
        let ctx = context(options(2));
        let points = expand(&axes()).unwrap();

        let mut probe = NoMemoryProbe;
        let mut sweep =
            Sweep::new(&engine, &ctx, Path::new("m.gguf"), DedupIndex::default(), &mut probe).unwrap();
        let report = sweep.run(&points).unwrap();

        assert_eq!(report.records.len(), 4);
        assert_eq!(report.succeeded, 4);
        assert!(report.records.iter().all(|r| r.trials == 2));
        assert!(report.records.iter().all(|r| r.offload_layers == Some(20)));
        assert!(report.records.iter().all(|r| r.run_name == "calm_heron"));
        assert_eq!(report.records[0].quant_method.as_deref(), Some("Q5_K"));
        assert_eq!(report.records[0].engine.as_deref(), Some("scripted"));
        assert_eq!(report.records[0].kernel.as_deref(), Some("naive"));
        assert_eq!(engine.calls.loads.get(), 4);
        assert_eq!(engine.calls.runs.get(), 8);
        assert!(report.staged.is_empty());
    }

    #[test]
    fn test_second_sweep_skips_stored_points() {
        let ws = workspace();
        let engine = ScriptedEngine::new();
        let ctx = context(options(1));

        let first = run_benchmark(&engine, &ws.config, &ws.model, &ctx, &mut NoMemoryProbe).unwrap();
        assert_eq!(first.succeeded, 4);
        assert_eq!(first.staged.len(), 4);
        assert_eq!(Dataset::load(&ws.config.storage.store).unwrap().len(), 4);

        let engine = ScriptedEngine::new();
        let second = run_benchmark(&engine, &ws.config, &ws.model, &ctx, &mut NoMemoryProbe).unwrap();
        assert_eq!(second.skipped, 4);
        assert!(second.records.is_empty());
        assert_eq!(engine.calls.loads.get(), 0);
        assert_eq!(engine.calls.runs.get(), 0);
        assert_eq!(Dataset::load(&ws.config.storage.store).unwrap().len(), 4);
    }

    #[test]
    fn test_forced_rerun_dedups_by_id() {
        let ws = workspace();
        let mut config = ws.config.clone();
        config.sweep.n_threads = vec![8];
        config.sweep.n_batch = vec![256];

        let mut engine = ScriptedEngine::new();
        engine.fixed_id = Some("cmpl-same".to_string());
        let ctx = context(RunOptions {
            memo: "first".to_string(),
            ..options(1)
        });
        run_benchmark(&engine, &config, &ws.model, &ctx, &mut NoMemoryProbe).unwrap();

        let forced = context(RunOptions {
            force: true,
            memo: "forced".to_string(),
            ..options(1)
        })
        .with_run_name("bold_otter");
        let report = run_benchmark(&engine, &config, &ws.model, &forced, &mut NoMemoryProbe).unwrap();
        assert_eq!(report.succeeded, 1);

        // the latest measurement of an id replaces the stored one
        let stored = Dataset::load(&config.storage.store).unwrap();
        assert_eq!(stored.len(), 1);
        let row = &stored.rows()[0];
        assert_eq!(row["memo"], serde_json::json!("forced"));
        assert_eq!(row["Run Name"], serde_json::json!("bold_otter"));
        assert_eq!(row["run_time"], serde_json::json!(report.records[0].run_time));

        // distinct ids survive the merge side by side
        let engine = ScriptedEngine::new();
        run_benchmark(&engine, &config, &ws.model, &forced, &mut NoMemoryProbe).unwrap();
        assert_eq!(Dataset::load(&config.storage.store).unwrap().len(), 2);
    }

    #[test]
    fn test_failure_is_recorded_and_sweep_continues() {
        let mut engine = ScriptedEngine::new();
        engine.fail_threads = Some(8);
        let ctx = context(options(1));
        let points = expand(&axes()).unwrap();

        let mut probe = NoMemoryProbe;
        let mut sweep =
            Sweep::new(&engine, &ctx, Path::new("m.gguf"), DedupIndex::default(), &mut probe).unwrap();
        let report = sweep.run(&points).unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(report.succeeded, 2);
        let failure = &report.records[0];
        assert!(failure.is_failure());
        assert!(failure.error.as_deref().unwrap().contains("out of memory"));
        assert_eq!(failure.total_s, None);
    }

    #[test]
    fn test_failed_points_are_retried_next_time() {
        let ws = workspace();
        let mut engine = ScriptedEngine::new();
        engine.fail_threads = Some(8);
        let ctx = context(options(1));
        run_benchmark(&engine, &ws.config, &ws.model, &ctx, &mut NoMemoryProbe).unwrap();

        let engine = ScriptedEngine::new();
        let report = run_benchmark(&engine, &ws.config, &ws.model, &ctx, &mut NoMemoryProbe).unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.succeeded, 2);
    }

    #[test]
    fn test_abort_policy_stops_sweep() {
        let mut engine = ScriptedEngine::new();
        engine.fail_threads = Some(16);
        let ctx = context(RunOptions {
            on_failure: FailurePolicy::Abort,
            ..options(1)
        });
        let points = expand(&axes()).unwrap();

        let mut probe = NoMemoryProbe;
        let mut sweep =
            Sweep::new(&engine, &ctx, Path::new("m.gguf"), DedupIndex::default(), &mut probe).unwrap();
        let err = sweep.run(&points).unwrap_err();
        assert!(matches!(err, BenchError::TrialFailed { .. }));
        assert_eq!(engine.calls.loads.get(), 3);
    }

    #[test]
    fn test_cancelled_sweep_stops_before_next_point() {
        let engine = ScriptedEngine::new();
        let ctx = context(options(1));
        ctx.cancel_handle().store(true, Ordering::SeqCst);
        let points = expand(&axes()).unwrap();

        let mut probe = NoMemoryProbe;
        let mut sweep =
            Sweep::new(&engine, &ctx, Path::new("m.gguf"), DedupIndex::default(), &mut probe).unwrap();
        let report = sweep.run(&points).unwrap();
        assert!(report.cancelled);
        assert!(report.records.is_empty());
        assert_eq!(engine.calls.loads.get(), 0);
    }

    #[test]
    fn test_debug_mode_writes_nothing() {
        let ws = workspace();
        let engine = ScriptedEngine::new();
        let ctx = context(RunOptions {
            debug: true,
            ..options(1)
        });
        let report = run_benchmark(&engine, &ws.config, &ws.model, &ctx, &mut NoMemoryProbe).unwrap();
        assert_eq!(report.succeeded, 4);
        assert!(!ws.config.storage.store.exists());
        assert!(!ws.config.storage.intake.exists());
    }

    #[test]
    fn test_repeated_axis_value_measured_once() {
        let engine = ScriptedEngine::new();
        let ctx = context(options(1));
        let mut repeated = axes();
        repeated.n_threads = vec![8, 8];
        repeated.n_batch = vec![256];

        let mut memory = NoMemoryProbe;
        let mut sweep =
            Sweep::new(&engine, &ctx, Path::new("m.gguf"), DedupIndex::default(), &mut memory).unwrap();
        let report = sweep.run(&expand(&repeated).unwrap()).unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(engine.calls.loads.get(), 1);
    }

    #[test]
    fn test_negative_temperature_rejected() {
        let engine = ScriptedEngine::new();
        let generation = GenerationConfig {
            temperature: -0.5,
            ..Default::default()
        };
        let ctx = RunContext::new(machine(), options(1), generation);
        let mut memory = NoMemoryProbe;
        let mut sweep =
            Sweep::new(&engine, &ctx, Path::new("m.gguf"), DedupIndex::default(), &mut memory).unwrap();
        let err = sweep.run(&expand(&axes()).unwrap()).unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfig { field: "temperature", .. }));
        assert_eq!(engine.calls.loads.get(), 0);
    }

    #[test]
    fn test_zero_k_folds_rejected() {
        let engine = ScriptedEngine::new();
        let ctx = context(options(0));
        let mut probe = NoMemoryProbe;
        let mut sweep =
            Sweep::new(&engine, &ctx, Path::new("m.gguf"), DedupIndex::default(), &mut probe).unwrap();
        let err = sweep.run(&expand(&axes()).unwrap()).unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfig { field: "k_folds", .. }));
    }
}
