//! KPI file loading and schema validation.

use crate::dataset::{FEATURES, FeatureTable, FeatureVector, KpiRecord, N_FEATURES};
use crate::error::{ModelError, ModelResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Identifier column, required in every KPI file.
pub const CELL_ID_COLUMN: &str = "cell_id";
/// Timestamp column, required in every KPI file.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Cell values read as missing.
const NULL_TOKENS: [&str; 8] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Loads and validates a KPI CSV file.
pub fn load_kpi_csv<P: AsRef<Path>>(path: P) -> ModelResult<FeatureTable> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading KPI file");
    let file = std::fs::File::open(path)?;
    read_kpi_csv(file)
}

/// Validates KPI rows from any reader.
///
/// Fails with [`ModelError::Schema`] when a required column is missing, a
/// timestamp does not parse, or a feature value is not a finite number.
/// Rows with a missing value in any feature column are dropped.
pub fn read_kpi_csv<R: Read>(reader: R) -> ModelResult<FeatureTable> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).flexible(true).from_reader(reader);
    let headers = csv.headers()?.clone();

    let position = |name: &str| headers.iter().position(|h| h == name);
    let mut missing = Vec::new();
    let cell_idx = position(CELL_ID_COLUMN);
    let ts_idx = position(TIMESTAMP_COLUMN);
    if cell_idx.is_none() {
        missing.push(CELL_ID_COLUMN);
    }
    if ts_idx.is_none() {
        missing.push(TIMESTAMP_COLUMN);
    }
    let mut feature_idx = [0usize; N_FEATURES];
    for (slot, name) in feature_idx.iter_mut().zip(FEATURES) {
        match position(name) {
            Some(idx) => *slot = idx,
            None => missing.push(name),
        }
    }
    let (Some(cell_idx), Some(ts_idx)) = (cell_idx, ts_idx) else {
        return Err(ModelError::Schema(format!("missing required columns: {missing:?}")));
    };
    if !missing.is_empty() {
        return Err(ModelError::Schema(format!("missing required columns: {missing:?}")));
    }

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for (row_no, row) in csv.records().enumerate() {
        let row = row?;
        let line = row_no + 2;

        let mut values = [0.0; N_FEATURES];
        let mut has_null = false;
        for (slot, (&idx, name)) in values.iter_mut().zip(feature_idx.iter().zip(FEATURES)) {
            match parse_feature(row.get(idx).unwrap_or(""), name, line)? {
                Some(v) => *slot = v,
                None => has_null = true,
            }
        }
        if has_null {
            dropped += 1;
            continue;
        }

        let raw_timestamp = row.get(ts_idx).unwrap_or("").to_string();
        let timestamp = parse_timestamp(&raw_timestamp).ok_or_else(|| {
            ModelError::Schema(format!("line {line}: unparseable timestamp {raw_timestamp:?}"))
        })?;

        records.push(KpiRecord {
            cell_id: row.get(cell_idx).unwrap_or("").to_string(),
            raw_timestamp,
            timestamp,
            features: FeatureVector::new(values[0], values[1], values[2], values[3]),
        });
    }

    if dropped > 0 {
        warn!(dropped, kept = records.len(), "Dropped KPI rows with missing feature values");
    }
    Ok(FeatureTable::new(records))
}

fn parse_feature(raw: &str, column: &str, line: usize) -> ModelResult<Option<f64>> {
    if NULL_TOKENS.contains(&raw) {
        return Ok(None);
    }
    let value: f64 = raw.parse().map_err(|_| {
        ModelError::Schema(format!("line {line}: column {column} is not numeric: {raw:?}"))
    })?;
    if value.is_nan() {
        return Ok(None);
    }
    if !value.is_finite() {
        return Err(ModelError::Schema(format!("line {line}: column {column} is not finite: {raw:?}")));
    }
    Ok(Some(value))
}

/// Parses the timestamp formats KPI exports commonly use.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0))
}
