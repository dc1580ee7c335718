use crate::models::{JudgmentRecord, RunSummary};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

/// Output format options
#[derive(Debug, Clone, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Model name usable as a file name: path separators become underscores
pub fn safe_model_name(model: &str) -> String {
    model.replace(['/', '\\'], "_")
}

/// Judgment file of a model inside the judge's output directory
pub fn judgment_file(judgment_dir: &Path, model: &str) -> PathBuf {
    judgment_dir.join(format!("{}.jsonl", safe_model_name(model)))
}

/// Appends judgment records to per-model JSON-lines files.
///
/// Each record is written as one complete line while holding that file's
/// lock, so concurrent tasks for the same model never interleave. Files are
/// opened for the duration of a single append only.
#[derive(Debug, Default)]
pub struct JudgmentWriter {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl JudgmentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Append one record as a single line
    pub async fn append(&self, path: &Path, record: &JudgmentRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("Failed to serialize judgment")?;
        line.push('\n');

        let lock = self.lock_for(path);
        let _guard = lock.lock().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open judgment file: {}", path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to append judgment to: {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("Failed to flush judgment file: {}", path.display()))?;

        Ok(())
    }
}

/// Print the run summary in the specified format
pub fn print_summary(summary: &RunSummary, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print_plain(summary),
        OutputFormat::Json => print_json(summary),
    }
}

/// Print the summary in plain text format
fn print_plain(summary: &RunSummary) {
    println!("=== Judgment run: {} ===", summary.judge_model);
    println!();
    println!("{:<30} {}", "Tasks planned", summary.planned);
    println!("{:<30} {}", "Completed", summary.completed);
    println!("{:<30} {}", "Failed", summary.failed);
    println!("{:<30} {}", "Batches", summary.batches);
    println!("{:<30} {}", "Existing judgments", summary.existing);
    println!("{}", "-".repeat(40));
    println!("{:<30} {}", "Skipped (no model answer)", summary.skipped_missing_answer);
    println!("{:<30} {}", "Skipped (no baseline answer)", summary.skipped_missing_baseline);
    println!("{:<30} {}", "Skipped (no reference answer)", summary.skipped_missing_reference);

    if !summary.models_without_answers.is_empty() {
        println!();
        println!(
            "Models without answers: {}",
            summary.models_without_answers.join(", ")
        );
    }
}

/// Print the summary in JSON format
fn print_json(summary: &RunSummary) {
    match serde_json::to_string_pretty(summary) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing summary to JSON: {}", e),
    }
}
