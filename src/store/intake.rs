//! Intake directory: one JSON file per completed point
//!
//! Records are staged here as soon as they are produced, so a crash midway
//! through a sweep loses at most the point in flight. The merge reads every
//! file back in name order.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::bench::ResultRecord;
use crate::error::{BenchError, Result};
use crate::store::{Dataset, Row};

/// Staging directory for per-point records
#[derive(Debug, Clone)]
pub struct Intake {
    dir: PathBuf,
}

impl Intake {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Durably write one record
    pub fn stage(&self, record: &ResultRecord) -> Result<PathBuf> {
        self.stage_row(&record.to_row()?)
    }

    /// Durably write one row
    ///
    /// The file is written under a temporary name and renamed into place, so
    /// the merge never sees a partial file.
    pub fn stage_row(&self, row: &Row) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.6f");
        let suffix = match row.get("id") {
            Some(Value::String(id)) if is_safe_name(id) => id.clone(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let path = self.dir.join(format!("{}_{}.json", stamp, suffix));
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, serde_json::to_vec(row)?)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!("Staged {}", path.display());
        Ok(path)
    }

    /// Staged files in name order
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let pattern = self.dir.join("*.json");
        let pattern = pattern.to_string_lossy();
        let mut files = glob::glob(&pattern)
            .map_err(|e| BenchError::corrupt(self.dir.clone(), e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| BenchError::Io(e.into_error()))?;
        files.sort();
        Ok(files)
    }

    /// Read every staged file into one dataset
    pub fn read_all(&self) -> Result<Dataset> {
        let mut dataset = Dataset::new();
        for path in self.files()? {
            for row in read_file(&path)? {
                dataset.push_row(row);
            }
        }
        Ok(dataset)
    }
}

fn is_safe_name(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse one intake file into rows
///
/// Array values expand into one row per element; scalar values are
/// broadcast to every row. Arrays of different lengths are rejected.
fn read_file(path: &Path) -> Result<Vec<Row>> {
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| BenchError::corrupt(path, format!("malformed JSON: {}", e)))?;
    let Value::Object(object) = value else {
        return Err(BenchError::corrupt(path, "expected a JSON object"));
    };

    let mut len: Option<usize> = None;
    for value in object.values() {
        if let Value::Array(items) = value {
            match len {
                Some(n) if n != items.len() => {
                    return Err(BenchError::corrupt(
                        path,
                        format!("array fields have different lengths ({} and {})", n, items.len()),
                    ));
                }
                _ => len = Some(items.len()),
            }
        }
    }

    let rows = (0..len.unwrap_or(1))
        .map(|i| {
            object
                .iter()
                .map(|(key, value)| {
                    let cell = match value {
                        Value::Array(items) => items[i].clone(),
                        scalar => scalar.clone(),
                    };
                    (key.clone(), cell)
                })
                .collect()
        })
        .collect();
    Ok(rows)
}
