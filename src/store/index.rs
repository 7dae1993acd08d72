//! "Already tested" index over the stored dataset

use std::collections::HashSet;

use serde_json::Value;

use crate::machine::MachineIdentity;
use crate::store::Row;

/// Machine identity plus the swept engine parameters
///
/// Floats are compared bitwise after normalizing `-0.0`, so a value read back
/// from the dataset matches the one that was written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    device: String,
    vram_gb: u64,
    ram_gb: u64,
    cpu_count: u64,
    model: String,
    n_threads: u64,
    n_threads_batch: u64,
    n_batch: u64,
    gpu_offload: u64,
}

fn float_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

impl DedupKey {
    pub fn new(
        machine: &MachineIdentity,
        n_threads: usize,
        n_threads_batch: usize,
        n_batch: usize,
        gpu_offload: f64,
    ) -> Self {
        Self {
            device: machine.device.clone(),
            vram_gb: float_bits(machine.vram_gb),
            ram_gb: float_bits(machine.ram_gb),
            cpu_count: machine.cpu_count as u64,
            model: machine.model.clone(),
            n_threads: n_threads as u64,
            n_threads_batch: n_threads_batch as u64,
            n_batch: n_batch as u64,
            gpu_offload: float_bits(gpu_offload),
        }
    }

    /// Extract the key from a dataset row
    ///
    /// Returns `None` when any key column is missing or has the wrong type.
    pub fn from_row(row: &Row) -> Option<Self> {
        let text = |col: &str| match row.get(col)? {
            Value::String(s) => Some(s.clone()),
            _ => None,
        };
        let float = |col: &str| row.get(col)?.as_f64().map(float_bits);
        // Integer columns holding nulls are written as floats ("8.0") by pandas
        let int = |col: &str| {
            let value = row.get(col)?;
            value.as_u64().or_else(|| {
                value
                    .as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
        };

        Some(Self {
            device: text("Device")?,
            vram_gb: float("VRAM (GB)")?,
            ram_gb: float("RAM (GB)")?,
            cpu_count: int("CPU Count")?,
            model: text("Model")?,
            n_threads: int("Threads")?,
            n_threads_batch: int("Batch Threads")?,
            n_batch: int("Batch")?,
            gpu_offload: float("GPU Layers")?,
        })
    }
}

/// Hash set of keys for every successfully measured row
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    keys: HashSet<DedupKey>,
}

impl DedupIndex {
    /// Build the index; failure rows do not count as tested
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a Row>) -> Self {
        let keys = rows
            .into_iter()
            .filter(|row| !is_failure_row(row))
            .filter_map(DedupKey::from_row)
            .collect();
        Self { keys }
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn is_failure_row(row: &Row) -> bool {
    match row.get("error") {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::context::tests::machine;
    use serde_json::json;

    fn row(threads: u64, ngl: f64) -> Row {
        let value = json!({
            "Device": "NVIDIA A10",
            "VRAM (GB)": 22.49,
            "RAM (GB)": 62.8,
            "CPU Count": 16,
            "Model": "llama-2-7b.Q5_K_M.gguf",
            "Threads": threads,
            "Batch Threads": 8,
            "Batch": 256,
            "GPU Layers": ngl,
        });
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_key_from_row_matches_record_key() {
        let key = DedupKey::from_row(&row(8, 0.5)).unwrap();
        assert_eq!(key, DedupKey::new(&machine(), 8, 8, 256, 0.5));
        assert_ne!(key, DedupKey::new(&machine(), 8, 8, 256, 0.6));
    }

    #[test]
    fn test_integer_offload_matches_float() {
        let mut r = row(8, 0.0);
        r.insert("GPU Layers".into(), json!(1));
        let key = DedupKey::from_row(&r).unwrap();
        assert_eq!(key, DedupKey::new(&machine(), 8, 8, 256, 1.0));
    }

    #[test]
    fn test_index_skips_failures_and_partial_rows() {
        let mut failed = row(16, 0.5);
        failed.insert("error".into(), json!("out of memory"));
        let mut partial = row(32, 0.5);
        partial.remove("Model");
        let mut null_error = row(8, 0.5);
        null_error.insert("error".into(), Value::Null);

        let rows = vec![null_error, failed, partial];
        let index = DedupIndex::from_rows(&rows);
        assert_eq!(index.len(), 1);
        assert!(index.contains(&DedupKey::new(&machine(), 8, 8, 256, 0.5)));
        assert!(!index.contains(&DedupKey::new(&machine(), 16, 8, 256, 0.5)));
    }
}
