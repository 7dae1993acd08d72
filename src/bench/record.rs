//! Result records: one persisted row per configuration point

use serde::{Deserialize, Serialize};

use crate::bench::aggregate::Summary;
use crate::bench::context::RunContext;
use crate::bench::point::ConfigPoint;
use crate::machine::MachineIdentity;
use crate::store::DedupKey;

/// Aggregated outcome of one configuration point
///
/// Field names match the column headers of the dataset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,
    #[serde(rename = "Run Name")]
    pub run_name: String,
    pub run_time: String,

    #[serde(flatten)]
    pub machine: MachineIdentity,

    #[serde(rename = "Context Window")]
    pub ctx: usize,
    #[serde(rename = "Batch")]
    pub n_batch: usize,
    #[serde(rename = "Threads")]
    pub n_threads: usize,
    #[serde(rename = "Batch Threads")]
    pub n_threads_batch: usize,
    #[serde(rename = "Prompt Length")]
    pub prompt_length: usize,
    #[serde(rename = "New Tokens")]
    pub new_tokens: usize,

    #[serde(rename = "Load Time (s)")]
    pub load_s: Option<f64>,
    #[serde(rename = "Sample Time (s)")]
    pub sample_s: Option<f64>,
    #[serde(rename = "Prompt Eval Time (s)")]
    pub prompt_eval_s: Option<f64>,
    #[serde(rename = "Eval Time (s)")]
    pub eval_s: Option<f64>,
    #[serde(rename = "Total Time (s)")]
    pub total_s: Option<f64>,
    #[serde(rename = "Sample Time (Tk/s)")]
    pub sample_tps: Option<f64>,
    #[serde(rename = "Prompt Eval Time (Tk/s)")]
    pub prompt_eval_tps: Option<f64>,
    #[serde(rename = "Eval Time (Tk/s)")]
    pub eval_tps: Option<f64>,
    #[serde(rename = "Trials")]
    pub trials: usize,

    pub memo: String,
    /// Offload fraction, as given on the command line
    #[serde(rename = "GPU Layers")]
    pub gpu_offload: f64,
    #[serde(rename = "Offload Layers", default, skip_serializing_if = "Option::is_none")]
    pub offload_layers: Option<usize>,

    #[serde(rename = "Mem. Usage (MB)", default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    #[serde(rename = "Quant. Method", default, skip_serializing_if = "Option::is_none")]
    pub quant_method: Option<String>,
    #[serde(rename = "Kernel", default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    #[serde(rename = "Engine", default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Failure reason; present only on failure rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultRecord {
    /// Record for a point whose trials all completed
    pub fn completed(
        ctx: &RunContext,
        point: &ConfigPoint,
        summary: &Summary,
        id: String,
        offload_layers: usize,
    ) -> Self {
        let mut record = Self::base(ctx, point, id);
        record.offload_layers = Some(offload_layers);
        record.load_s = Some(summary.load_s);
        record.sample_s = Some(summary.sample_s);
        record.prompt_eval_s = Some(summary.prompt_eval_s);
        record.eval_s = Some(summary.eval_s);
        record.total_s = Some(summary.total_s);
        record.sample_tps = summary.sample_tps;
        record.prompt_eval_tps = summary.prompt_eval_tps;
        record.eval_tps = summary.eval_tps;
        record.trials = summary.trials;
        record
    }

    /// Record for a point whose trials raised an error
    pub fn failed(ctx: &RunContext, point: &ConfigPoint, reason: String) -> Self {
        let mut record = Self::base(ctx, point, uuid::Uuid::new_v4().to_string());
        record.error = Some(reason);
        record
    }

    fn base(ctx: &RunContext, point: &ConfigPoint, id: String) -> Self {
        Self {
            id,
            run_name: ctx.run_name.clone(),
            run_time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            machine: ctx.machine.clone(),
            ctx: point.ctx,
            n_batch: point.n_batch,
            n_threads: point.n_threads,
            n_threads_batch: point.n_threads_batch,
            prompt_length: point.prompt_length,
            new_tokens: point.new_tokens,
            load_s: None,
            sample_s: None,
            prompt_eval_s: None,
            eval_s: None,
            total_s: None,
            sample_tps: None,
            prompt_eval_tps: None,
            eval_tps: None,
            trials: 0,
            memo: ctx.options.memo.clone(),
            gpu_offload: point.gpu_offload,
            offload_layers: None,
            memory_mb: None,
            quant_method: None,
            kernel: None,
            engine: None,
            error: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Composite identity used to decide whether a point was already measured
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(
            &self.machine,
            self.n_threads,
            self.n_threads_batch,
            self.n_batch,
            self.gpu_offload,
        )
    }

    /// Serialize into a dataset row
    pub fn to_row(&self) -> serde_json::Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "record serialized to {} instead of an object",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::context::tests::context;

    fn point() -> ConfigPoint {
        ConfigPoint {
            n_threads: 8,
            n_threads_batch: 8,
            n_batch: 256,
            gpu_offload: 0.5,
            prompt_length: 500,
            new_tokens: 100,
            ctx: 1100,
        }
    }

    fn summary() -> Summary {
        Summary {
            load_s: 1.5,
            sample_s: 0.02,
            prompt_eval_s: 0.4,
            eval_s: 2.0,
            total_s: 2.5,
            sample_tps: Some(5000.0),
            prompt_eval_tps: Some(1250.0),
            eval_tps: None,
            trials: 2,
        }
    }

    #[test]
    fn test_row_uses_dataset_columns() {
        let ctx = context();
        let record = ResultRecord::completed(&ctx, &point(), &summary(), "cmpl-1".into(), 20);
        let row = record.to_row().unwrap();

        let columns: Vec<&str> = row.keys().map(String::as_str).take(9).collect();
        assert_eq!(
            columns,
            vec![
                "id",
                "Run Name",
                "run_time",
                "Device",
                "VRAM (GB)",
                "RAM (GB)",
                "CPU Count",
                "Model",
                "Model Size (GB)"
            ]
        );
        assert_eq!(row["GPU Layers"], serde_json::json!(0.5));
        assert_eq!(row["Offload Layers"], serde_json::json!(20));
        assert_eq!(row["Eval Time (Tk/s)"], serde_json::Value::Null);
        assert!(!row.contains_key("error"));
        assert!(!row.contains_key("Mem. Usage (MB)"));
    }

    #[test]
    fn test_failed_record() {
        let ctx = context();
        let record = ResultRecord::failed(&ctx, &point(), "CUDA out of memory".into());
        assert!(record.is_failure());
        assert_eq!(record.total_s, None);
        assert_eq!(record.trials, 0);

        let row = record.to_row().unwrap();
        assert_eq!(row["error"], serde_json::json!("CUDA out of memory"));
    }

    #[test]
    fn test_dedup_key_ignores_lengths() {
        let ctx = context();
        let a = ResultRecord::completed(&ctx, &point(), &summary(), "a".into(), 20);
        let mut other = point();
        other.prompt_length = 32;
        other.new_tokens = 8;
        let b = ResultRecord::completed(&ctx, &other, &summary(), "b".into(), 20);
        assert_eq!(a.dedup_key(), b.dedup_key());

        other.n_batch = 512;
        let c = ResultRecord::completed(&ctx, &other, &summary(), "c".into(), 20);
        assert_ne!(a.dedup_key(), c.dedup_key());
    }
}
