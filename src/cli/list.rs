//! List stored runs command

use std::path::PathBuf;

use anyhow::Result;
use serde_json::Value;

use crate::config::StorageConfig;
use crate::store::{Dataset, Row};

/// Rows of one run, in dataset order
struct RunGroup<'a> {
    name: String,
    rows: Vec<&'a Row>,
}

/// Summarize the dataset, one entry per run
pub async fn list(store_path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let store_path = store_path.unwrap_or_else(|| StorageConfig::default().store);
    let dataset = Dataset::load(&store_path)?;

    if dataset.is_empty() {
        println!("No results in {}", store_path.display());
        println!("\nRun 'lighthouse bench --model <model>' to record some.");
        return Ok(());
    }

    println!("{} ({} rows):\n", store_path.display(), dataset.len());
    for group in group_by_run(&dataset) {
        let failed = group.rows.iter().filter(|r| has_error(r)).count();
        let first = group.rows[0];
        println!(
            "  {} - {} on {} ({} configurations, {} failed)",
            group.name,
            cell(first, "Model"),
            cell(first, "Device"),
            group.rows.len(),
            failed
        );

        if verbose {
            for row in &group.rows {
                println!(
                    "    threads={} batch_threads={} batch={} ngl={}  total={}s  eval={} tk/s{}",
                    cell(row, "Threads"),
                    cell(row, "Batch Threads"),
                    cell(row, "Batch"),
                    cell(row, "GPU Layers"),
                    cell(row, "Total Time (s)"),
                    cell(row, "Eval Time (Tk/s)"),
                    if has_error(row) {
                        format!("  error: {}", cell(row, "error"))
                    } else {
                        String::new()
                    }
                );
            }
            println!();
        }
    }

    Ok(())
}

fn group_by_run(dataset: &Dataset) -> Vec<RunGroup<'_>> {
    let mut groups: Vec<RunGroup<'_>> = Vec::new();
    for row in dataset.rows() {
        let name = cell(row, "Run Name");
        match groups.iter_mut().find(|g| g.name == name) {
            Some(group) => group.rows.push(row),
            None => groups.push(RunGroup {
                name,
                rows: vec![row],
            }),
        }
    }
    groups
}

fn has_error(row: &Row) -> bool {
    matches!(row.get("error"), Some(Value::String(s)) if !s.is_empty())
}

fn cell(row: &Row, column: &str) -> String {
    match row.get(column) {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_group_by_run_keeps_first_seen_order() {
        let mut dataset = Dataset::new();
        for name in ["calm_heron", "bold_otter", "calm_heron"] {
            dataset.push_row(json!({"Run Name": name}).as_object().unwrap().clone());
        }
        dataset.push_row(json!({"Threads": 8}).as_object().unwrap().clone());

        let groups = group_by_run(&dataset);
        let summary: Vec<(&str, usize)> =
            groups.iter().map(|g| (g.name.as_str(), g.rows.len())).collect();
        assert_eq!(summary, vec![("calm_heron", 2), ("bold_otter", 1), ("-", 1)]);
    }
}
