//! Batch scoring command implementation.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use super::open_pipeline;

pub fn execute(config: Option<&Path>, file: &Path, json_output: bool) -> Result<()> {
    let mut pipeline = open_pipeline(config)?;
    let outcome = pipeline.batch_score(file)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("{} {} rows ({} anomalies)", "Scored".bold().green(), outcome.scored, outcome.anomalies);
    Ok(())
}
