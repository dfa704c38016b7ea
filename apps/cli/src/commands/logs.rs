//! Syslog incident extraction command.

use anyhow::{Context, Result};
use colored::Colorize;
use netops_core::{extract_incidents, is_log_file};
use serde_json::json;
use std::path::Path;

pub fn execute(file: &Path, json_output: bool) -> Result<()> {
    if !is_log_file(file) {
        anyhow::bail!("Only log/txt files are supported: {}", file.display());
    }
    let text = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let report = extract_incidents(&text);

    if json_output {
        let filename = file.file_name().map(|n| n.to_string_lossy().into_owned());
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "filename": filename,
                "summary": report.summary,
                "incident_counts": report.incident_counts,
                "top_incidents": report.top_incidents,
            }))?
        );
        return Ok(());
    }

    println!();
    println!("{}", report.summary.bold());
    for (category, count) in &report.incident_counts {
        let count = if *count > 0 { count.to_string().red() } else { count.to_string().dimmed() };
        println!("  {category:<16} {count}");
    }
    println!();
    Ok(())
}
