//! Integration tests for the `netops-cli` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Command isolated inside `temp`: no global or local config leaks in.
fn netops(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("netops-cli").unwrap();
    cmd.current_dir(temp.path())
        .env("HOME", temp.path())
        .env("NETOPS_DATABASE_PATH", temp.path().join("netops.db"))
        .env("NETOPS_MODEL_DIR", temp.path().join("models"))
        .arg("--log-level")
        .arg("error");
    cmd
}

fn write_kpi_csv(dir: &Path, name: &str, rows: usize) -> PathBuf {
    let mut out = String::from("cell_id,timestamp,PRB_Util,RRC_Conn,Throughput_Mbps,BLER\n");
    for i in 0..rows {
        let j = (i % 9) as f64;
        out.push_str(&format!(
            "CELL_{},2024-08-01 {:02}:{:02}:00,{},{},{},{}\n",
            i % 3,
            i / 60 % 24,
            i % 60,
            48.0 + j * 5.0,
            110.0 + j * 6.0,
            66.0 - j * 6.0,
            0.006 + j * 0.006
        ));
    }
    let path = dir.join(name);
    fs::write(&path, out).unwrap();
    path
}

#[test]
fn test_score_without_model_fails() {
    let temp = TempDir::new().unwrap();
    let csv = write_kpi_csv(temp.path(), "batch.csv", 30);

    netops(&temp)
        .arg("score")
        .arg(&csv)
        .assert()
        .failure()
        .stderr(predicate::str::contains("model missing"));
}

#[test]
fn test_train_then_score() {
    let temp = TempDir::new().unwrap();
    let csv = write_kpi_csv(temp.path(), "batch.csv", 80);

    netops(&temp).arg("train").arg(&csv).assert().success().stdout(predicate::str::contains("Anomaly model trained"));
    assert!(temp.path().join("models").join("model_isoforest.json").is_file());

    netops(&temp)
        .arg("score")
        .arg(&csv)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"upload_id\": 0").and(predicate::str::contains("\"scored\": 80")));
}

#[test]
fn test_upload_report_and_list() {
    let temp = TempDir::new().unwrap();
    let csv = write_kpi_csv(temp.path(), "day1.csv", 100);

    netops(&temp)
        .arg("upload")
        .arg(&csv)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_samples\": 100").and(predicate::str::contains("\"upload_id\": 1")));

    netops(&temp)
        .args(["report", "1", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 100"));

    netops(&temp).arg("uploads").assert().success().stdout(predicate::str::contains("day1.csv"));
}

#[test]
fn test_upload_rejects_non_csv() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kpi.xlsx");
    fs::write(&path, "not a csv").unwrap();

    netops(&temp)
        .arg("upload")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("only CSV files are supported"));
}

#[test]
fn test_report_unknown_upload_fails() {
    let temp = TempDir::new().unwrap();
    netops(&temp).args(["report", "7"]).assert().failure().stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_analyze_stored_upload() {
    let temp = TempDir::new().unwrap();
    let csv = write_kpi_csv(temp.path(), "day1.csv", 90);
    netops(&temp).arg("upload").arg(&csv).assert().success();

    netops(&temp)
        .args(["analyze", "1", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("most_common_status").and(predicate::str::contains("feature_importance")));
    assert!(temp.path().join("models").join("model_rf_classifier.json").is_file());
    assert!(temp.path().join("models").join("label_encoder.json").is_file());
}

#[test]
fn test_train_predictive_reports_metrics() {
    let temp = TempDir::new().unwrap();
    let csv = write_kpi_csv(temp.path(), "train.csv", 90);

    netops(&temp)
        .arg("train")
        .arg(&csv)
        .arg("--predictive")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("classifier_accuracy").and(predicate::str::contains("\"test_rows\": 18")));
}

#[test]
fn test_explicit_config_flag() {
    let temp = TempDir::new().unwrap();
    let csv = write_kpi_csv(temp.path(), "batch.csv", 40);
    let config = temp.path().join("custom.toml");
    fs::write(&config, "contamination = 0.1\n").unwrap();

    netops(&temp)
        .arg("--config")
        .arg(&config)
        .arg("train")
        .arg(&csv)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"contamination\": 0.1"));
}

#[test]
fn test_invalid_config_fails() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("netops.toml"), "contamination = 0.9\n").unwrap();

    netops(&temp).arg("uploads").assert().failure().stderr(predicate::str::contains("contamination"));
}

#[test]
fn test_logs_counts_incidents() {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("enb.log");
    fs::write(&log, "CRIT link down\nERROR timeout\nWARN high load\nINFO ok\n").unwrap();

    netops(&temp)
        .arg("logs")
        .arg(&log)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"critical_errors\": 1").and(predicate::str::contains("2 lines flagged")));
}

#[test]
fn test_logs_rejects_other_extensions() {
    let temp = TempDir::new().unwrap();
    let csv = write_kpi_csv(temp.path(), "kpi.csv", 3);

    netops(&temp)
        .arg("logs")
        .arg(&csv)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Only log/txt files are supported"));
}
