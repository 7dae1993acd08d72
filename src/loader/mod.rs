//! Model file lookup
//!
//! Benchmarks take a model name or path. Names are resolved against the model
//! directory (`LIGHTHOUSE_MODEL_DIR`); a directory resolves to the first GGUF
//! file inside it.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::config::model_dir;

/// Resolve `model` against the configured model directory
pub fn resolve_model_path(model: &str) -> Result<PathBuf> {
    resolve_in(model, &model_dir())
}

/// Resolve `model` as a direct path, then relative to `dir`
///
/// A bare name without extension also matches `<name>.gguf`.
pub fn resolve_in(model: &str, dir: &Path) -> Result<PathBuf> {
    let direct = PathBuf::from(model);
    let in_dir = dir.join(model);
    let with_ext = dir.join(format!("{}.gguf", model));

    for candidate in [direct, in_dir, with_ext] {
        if candidate.is_file() {
            return Ok(candidate);
        }
        if candidate.is_dir() {
            return first_gguf(&candidate);
        }
    }

    Err(anyhow!(
        "Model not found: {} (searched {})",
        model,
        dir.display()
    ))
}

/// GGUF files in `dir`, sorted by name
pub fn gguf_files(dir: &Path) -> Vec<PathBuf> {
    let pattern = dir.join("*.gguf");
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .map(|paths| paths.filter_map(|p| p.ok()).collect())
        .unwrap_or_default();
    files.sort();
    files
}

fn first_gguf(dir: &Path) -> Result<PathBuf> {
    gguf_files(dir)
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No .gguf file in {}", dir.display()))
}
