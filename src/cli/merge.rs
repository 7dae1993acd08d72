//! Batch ingestion command

use std::path::PathBuf;

use anyhow::Result;

use crate::config::StorageConfig;
use crate::store::{self, Dataset, Intake};

/// Merge every staged intake file into the dataset
pub async fn merge(intake: Option<PathBuf>, store_path: Option<PathBuf>) -> Result<()> {
    let defaults = StorageConfig::default();
    let intake = Intake::new(intake.unwrap_or(defaults.intake));
    let store_path = store_path.unwrap_or(defaults.store);

    let dataset = Dataset::load(&store_path)?;
    let before = dataset.len();
    let merged = store::merge_intake(dataset, &intake)?;
    merged.save(&store_path)?;

    println!(
        "{}: {} rows ({} new) from {} intake files",
        store_path.display(),
        merged.len(),
        merged.len().saturating_sub(before),
        intake.files()?.len()
    );
    Ok(())
}
