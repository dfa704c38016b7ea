//! Predictive analysis command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use netops_training::{ModelOrigin, PredictiveAnalysis};
use serde_json::json;
use std::path::Path;

use super::open_pipeline;

pub fn execute(config: Option<&Path>, upload_id: Option<i64>, file: Option<&Path>, json_output: bool) -> Result<()> {
    let mut pipeline = open_pipeline(config)?;

    let (title, analysis) = match (upload_id, file) {
        (Some(id), _) => {
            let result = pipeline.analyze(id).with_context(|| format!("Failed to analyze upload {id}"))?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            if result.skipped > 0 {
                println!("{}", format!("{} stored rows lacked raw features and were skipped.", result.skipped).yellow());
            }
            (format!("Upload {id}"), result.analysis)
        }
        (None, Some(path)) => {
            let analysis = pipeline.analyze_file(path).with_context(|| format!("Failed to analyze {}", path.display()))?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&json!({ "file": path, "analysis": analysis }))?);
                return Ok(());
            }
            (path.display().to_string(), analysis)
        }
        (None, None) => anyhow::bail!("either an upload id or --file is required"),
    };

    print_analysis(&title, &analysis);
    Ok(())
}

fn print_analysis(title: &str, analysis: &PredictiveAnalysis) {
    let summary = &analysis.summary;
    println!();
    println!("{}", format!("Predictive analysis: {title}").bold().cyan());
    if analysis.origin == ModelOrigin::Trained {
        println!("  {}", "Predictive models were trained on this batch.".yellow());
    }
    println!("  {:<28} {}", "Most common status:", summary.most_common_status.bold());
    println!("  {:<28} {:.3}", "Average confidence:", summary.average_confidence);
    println!("  {:<28} {:.2} Mbps", "Average predicted throughput:", summary.average_predicted_throughput);

    println!();
    println!("  {}", "Status distribution".bold());
    for (status, count) in &summary.status_distribution {
        println!("    {status:<10} {count}");
    }

    println!();
    println!("  {:<18} {:>14} {:>12}", "Feature", "Classification", "Regression");
    for (feature, weight) in &analysis.feature_importance.classification {
        let regression = analysis.feature_importance.regression.get(feature).copied().unwrap_or(0.0);
        println!("  {feature:<18} {weight:>14.4} {regression:>12.4}");
    }
    println!();
}
