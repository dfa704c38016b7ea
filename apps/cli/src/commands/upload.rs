//! Upload command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use netops_training::ModelOrigin;
use std::path::Path;

use super::open_pipeline;

pub fn execute(config: Option<&Path>, file: &Path, json_output: bool) -> Result<()> {
    let mut pipeline = open_pipeline(config)?;
    let outcome = pipeline.ingest(file).with_context(|| format!("Failed to process {}", file.display()))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let anomalies = outcome.summary.get(&-1).copied().unwrap_or(0);
    println!();
    println!("{}", format!("Upload {} processed", outcome.upload_id).bold().cyan());
    println!("  {:<12} {}", "File:", outcome.filename);
    println!("  {:<12} {}", "Samples:", outcome.total_samples);
    println!("  {:<12} {}", "Anomalies:", if anomalies > 0 { anomalies.to_string().red() } else { "0".green() });
    if outcome.model_origin == ModelOrigin::Trained {
        println!("  {}", "No anomaly model was persisted; trained one on this file.".yellow());
    }
    println!();
    Ok(())
}
