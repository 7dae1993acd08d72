//! Model info command

use std::path::Path;

use anyhow::Result;

use crate::bench::offload_layers;
use crate::engine::ModelMetadata;
use crate::loader::resolve_model_path;

/// Show model metadata and how offload fractions map to layers
pub async fn info(model: String) -> Result<()> {
    let model_path = resolve_model_path(&model)?;

    println!("Model: {}\n", model);
    println!("Path: {}", model_path.display());
    if let Ok(metadata) = std::fs::metadata(&model_path) {
        let size_gb = metadata.len() as f64 / (1024.0 * 1024.0 * 1024.0);
        println!("File size: {:.2} GB", size_gb);
    }

    match inspect(&model_path)? {
        Some(metadata) => print_metadata(&metadata),
        None => println!("\nRebuild with --features boostr to read GGUF metadata."),
    }

    Ok(())
}

#[cfg(feature = "boostr")]
fn inspect(path: &Path) -> Result<Option<ModelMetadata>> {
    use crate::engine::InferenceEngine;

    let engine = crate::engine::GgufEngine::new();
    Ok(Some(engine.inspect(path)?))
}

#[cfg(not(feature = "boostr"))]
fn inspect(_path: &Path) -> Result<Option<ModelMetadata>> {
    Ok(None)
}

fn print_metadata(metadata: &ModelMetadata) {
    println!("\nConfiguration:");
    println!("  Architecture: {}", metadata.architecture);
    println!("  Blocks: {}", metadata.block_count);
    println!("  Vocab size: {}", metadata.vocab_size);
    if let Some(context_length) = metadata.context_length {
        println!("  Max context: {}", context_length);
    }
    if let Some(quantization) = &metadata.quantization {
        println!("\nQuantization: {}", quantization);
    }

    println!("\nOffload layers:");
    for line in offload_table(metadata.block_count) {
        println!("  {}", line);
    }
}

/// `ngl` fraction to layer count, in steps of 0.1
fn offload_table(block_count: usize) -> Vec<String> {
    (0..=10)
        .map(|i| {
            let fraction = i as f64 / 10.0;
            format!("{:.1} -> {}", fraction, offload_layers(block_count, fraction))
        })
        .collect()
}
