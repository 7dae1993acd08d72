//! Persistent, deduplicated result dataset
//!
//! The dataset is a flat CSV table whose columns are the union of every
//! field ever written, in first-seen order. Every operation takes and returns
//! an explicit [`Dataset`] value; the file is fully read, modified and
//! rewritten.

mod index;
mod intake;

pub use index::{DedupIndex, DedupKey};
pub use intake::Intake;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::{Map, Number, Value};

use crate::bench::ResultRecord;
use crate::error::{BenchError, Result};

/// One dataset row, keyed by column name
pub type Row = Map<String, Value>;

/// In-memory copy of the dataset file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the dataset; a missing file is an empty dataset
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No dataset at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let mut reader = csv::Reader::from_path(path)?;
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut dataset = Self {
            columns: Vec::new(),
            rows: Vec::new(),
        };
        for name in &columns {
            dataset.add_column(name);
        }

        for (line, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                if matches!(e.kind(), csv::ErrorKind::UnequalLengths { .. }) {
                    BenchError::corrupt(path, e.to_string())
                } else {
                    BenchError::Csv(e)
                }
            })?;
            if record.len() != columns.len() {
                return Err(BenchError::corrupt(
                    path,
                    format!("row {} has {} fields, expected {}", line + 1, record.len(), columns.len()),
                ));
            }
            let row: Row = columns
                .iter()
                .zip(record.iter())
                .map(|(name, cell)| (name.clone(), parse_cell(name, cell)))
                .collect();
            dataset.rows.push(row);
        }

        tracing::debug!("Loaded {} rows from {}", dataset.rows.len(), path.display());
        Ok(dataset)
    }

    /// Rewrite the dataset file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(self.columns.iter().map(|c| format_cell(row.get(c))))?;
        }
        writer.flush()?;

        tracing::info!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn add_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
    }

    /// Append a row, extending the column set with any new fields
    pub fn push_row(&mut self, row: Row) {
        for name in row.keys() {
            self.add_column(name);
        }
        self.rows.push(row);
    }

    pub fn push_record(&mut self, record: &ResultRecord) -> Result<()> {
        self.push_row(record.to_row()?);
        Ok(())
    }

    /// Concatenate another dataset after this one
    pub fn append(&mut self, other: Dataset) {
        for name in &other.columns {
            self.add_column(name);
        }
        self.rows.extend(other.rows);
    }

    /// Index of successfully measured points
    pub fn index(&self) -> DedupIndex {
        DedupIndex::from_rows(&self.rows)
    }
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Columns written as numbers by the benchmark
const NUMERIC_COLUMNS: &[&str] = &[
    "VRAM (GB)",
    "RAM (GB)",
    "CPU Count",
    "Model Size (GB)",
    "Context Window",
    "Batch",
    "Threads",
    "Batch Threads",
    "Prompt Length",
    "New Tokens",
    "Load Time (s)",
    "Sample Time (s)",
    "Prompt Eval Time (s)",
    "Eval Time (s)",
    "Total Time (s)",
    "Sample Time (Tk/s)",
    "Prompt Eval Time (Tk/s)",
    "Eval Time (Tk/s)",
    "Trials",
    "GPU Layers",
    "Offload Layers",
    "Mem. Usage (MB)",
];

/// Type a CSV cell
///
/// Only known numeric columns are parsed; every other cell keeps its text
/// exactly, so a load/save cycle never rewrites free-text fields.
fn parse_cell(column: &str, cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if NUMERIC_COLUMNS.contains(&column) {
        if let Ok(i) = cell.parse::<i64>() {
            return Value::from(i);
        }
        if let Some(n) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(cell.to_string())
}

fn format_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Bool(true)) => "True".to_string(),
        Some(Value::Bool(false)) => "False".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Append `newer` to `dataset`, keeping the last row of each id
///
/// A stored row whose id reappears later is dropped, so the latest
/// measurement of an id wins while the remaining rows keep their order.
fn merge_newer(mut dataset: Dataset, newer: Dataset) -> Dataset {
    dataset.append(newer);

    let mut last = HashMap::new();
    for (pos, row) in dataset.rows.iter().enumerate() {
        if let Some(id) = row.get("id").filter(|id| !id.is_null()) {
            last.insert(id_text(id), pos);
        }
    }

    let before = dataset.rows.len();
    let mut pos = 0;
    dataset.rows.retain(|row| {
        let keep = match row.get("id") {
            None | Some(Value::Null) => true,
            Some(id) => last.get(&id_text(id)) == Some(&pos),
        };
        pos += 1;
        keep
    });

    let dropped = before - dataset.rows.len();
    if dropped > 0 {
        tracing::info!("Dropped {} rows with duplicate ids", dropped);
    }
    dataset
}

/// Merge freshly measured records into the dataset
pub fn merge(dataset: Dataset, records: &[ResultRecord]) -> Result<Dataset> {
    let mut newer = Dataset::new();
    for record in records {
        newer.push_record(record)?;
    }
    Ok(merge_newer(dataset, newer))
}

/// Batch ingestion: merge every intake file into the dataset
pub fn merge_intake(dataset: Dataset, intake: &Intake) -> Result<Dataset> {
    let staged = intake.read_all()?;
    tracing::info!("Merging {} staged rows from {}", staged.len(), intake.dir().display());
    Ok(merge_newer(dataset, staged))
}
