//! Training command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use netops_training::{TrainingReport, load_kpi_csv};
use serde_json::json;
use std::path::Path;

use super::open_pipeline;

pub fn execute(config: Option<&Path>, file: &Path, predictive: bool, json_output: bool) -> Result<()> {
    let pipeline = open_pipeline(config)?;

    if predictive {
        let table = load_kpi_csv(file).with_context(|| format!("Failed to load {}", file.display()))?;
        let (_, report) = pipeline.engine().train(&table).context("Predictive training failed")?;
        return print_predictive(&report, json_output);
    }

    let rows = pipeline.batch_train(file).context("Anomaly model training failed")?;
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "trained": rows,
                "contamination": pipeline.config().contamination,
                "model_dir": pipeline.config().model_dir,
            }))?
        );
        return Ok(());
    }

    println!();
    println!("{}", "Anomaly model trained".bold().green());
    println!("  {:<16} {}", "Rows:", rows);
    println!("  {:<16} {}", "Contamination:", pipeline.config().contamination);
    println!("  {:<16} {}", "Model dir:", pipeline.config().model_dir.display().to_string().dimmed());
    println!();
    Ok(())
}

fn print_predictive(report: &TrainingReport, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let metric = |v: Option<f64>| v.map_or_else(|| "n/a".dimmed().to_string(), |v| format!("{v:.4}"));
    println!();
    println!("{}", "Predictive models trained".bold().green());
    println!("  {:<22} {}", "Train / test rows:", format!("{} / {}", report.train_rows, report.test_rows));
    println!("  {:<22} {}", "Classifier accuracy:", metric(report.metrics.classifier_accuracy));
    println!("  {:<22} {}", "Regressor R²:", metric(report.metrics.regressor_r2));
    println!("  {:<22} {}", "Regressor RMSE:", metric(report.metrics.regressor_rmse));
    if !report.exclude_target_from_regressor {
        println!("  {}", "Note: regressor inputs include Throughput_Mbps (its own target).".yellow());
    }
    println!();
    Ok(())
}
