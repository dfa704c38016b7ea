//! Report and upload listing commands.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use super::open_pipeline;

pub fn execute(config: Option<&Path>, upload_id: i64, json_output: bool) -> Result<()> {
    let mut pipeline = open_pipeline(config)?;
    let report = pipeline.report(upload_id)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Upload {upload_id}").bold().cyan());
    println!("  {:<14} {}", "Total:", report.total);
    println!("  {:<14} {}", "Anomalies:", report.anomalies);
    println!("  {:<14} {:.2}%", "Anomaly rate:", report.anomaly_rate);
    println!();
    Ok(())
}

pub fn list(config: Option<&Path>, json_output: bool) -> Result<()> {
    let mut pipeline = open_pipeline(config)?;
    let uploads = pipeline.list_uploads()?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&uploads)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Uploads ({})", uploads.len()).bold().cyan());
    println!();
    if uploads.is_empty() {
        println!("  {}", "No uploads yet.".dimmed());
        println!();
        return Ok(());
    }

    println!("{:<8} {:<40} {}", "ID", "Filename", "Created");
    println!("{}", "─".repeat(80));
    for upload in uploads {
        println!(
            "{:<8} {:<40} {}",
            upload.id.to_string().cyan(),
            upload.filename,
            upload.created_at.to_rfc3339().dimmed()
        );
    }
    println!();
    Ok(())
}
