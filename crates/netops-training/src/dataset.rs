//! The feature contract shared by every model.
//!
//! All models consume the same four KPI columns in a fixed order:
//! `PRB_Util`, `RRC_Conn`, `Throughput_Mbps`, `BLER`. Values are used as-is;
//! no clipping or normalization happens here.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of features in the canonical feature vector.
pub const N_FEATURES: usize = 4;

/// Canonical feature column names, in model input order.
pub const FEATURES: [&str; N_FEATURES] = ["PRB_Util", "RRC_Conn", "Throughput_Mbps", "BLER"];

/// One of the four canonical KPI features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Feature {
    PrbUtil,
    RrcConn,
    ThroughputMbps,
    Bler,
}

impl Feature {
    pub const ALL: [Feature; N_FEATURES] =
        [Feature::PrbUtil, Feature::RrcConn, Feature::ThroughputMbps, Feature::Bler];

    /// Column position in a projected matrix row.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::PrbUtil => 0,
            Self::RrcConn => 1,
            Self::ThroughputMbps => 2,
            Self::Bler => 3,
        }
    }

    /// Column name as it appears in KPI files.
    #[must_use]
    pub fn name(self) -> &'static str {
        FEATURES[self.index()]
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The four numeric KPI values of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Physical resource block utilization, percent.
    pub prb_util: f64,
    /// Connected RRC users.
    pub rrc_conn: f64,
    /// Cell throughput, Mbps.
    pub throughput_mbps: f64,
    /// Block error ratio, 0..1.
    pub bler: f64,
}

impl FeatureVector {
    #[must_use]
    pub fn new(prb_util: f64, rrc_conn: f64, throughput_mbps: f64, bler: f64) -> Self {
        Self { prb_util, rrc_conn, throughput_mbps, bler }
    }

    #[must_use]
    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::PrbUtil => self.prb_util,
            Feature::RrcConn => self.rrc_conn,
            Feature::ThroughputMbps => self.throughput_mbps,
            Feature::Bler => self.bler,
        }
    }

    #[must_use]
    pub fn to_array(&self) -> [f64; N_FEATURES] {
        [self.prb_util, self.rrc_conn, self.throughput_mbps, self.bler]
    }
}

/// One validated KPI sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    pub cell_id: String,
    /// Timestamp exactly as it appeared in the source.
    pub raw_timestamp: String,
    /// Parsed, comparable timestamp.
    pub timestamp: NaiveDateTime,
    pub features: FeatureVector,
}

/// A validated batch of KPI samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    records: Vec<KpiRecord>,
}

impl FeatureTable {
    #[must_use]
    pub fn new(records: Vec<KpiRecord>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[KpiRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &KpiRecord> {
        self.records.iter()
    }

    /// Projects the table onto the canonical feature columns, in fixed order.
    #[must_use]
    pub fn project(&self) -> FeatureMatrix {
        FeatureMatrix::new(self.records.iter().map(|r| r.features.to_array()).collect())
    }
}

/// Row-major numeric model input: one `[f64; 4]` per sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    rows: Vec<[f64; N_FEATURES]>,
}

impl FeatureMatrix {
    #[must_use]
    pub fn new(rows: Vec<[f64; N_FEATURES]>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn rows(&self) -> &[[f64; N_FEATURES]] {
        &self.rows
    }

    #[must_use]
    pub fn column(&self, feature: Feature) -> Vec<f64> {
        self.rows.iter().map(|row| row[feature.index()]).collect()
    }

    /// Row count and per-feature ranges, for diagnostics.
    #[must_use]
    pub fn summary(&self) -> FeatureSummary {
        let mut stats = [ColumnStats::default(); N_FEATURES];
        for (idx, slot) in stats.iter_mut().enumerate() {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            let mut sum = 0.0;
            for row in &self.rows {
                min = min.min(row[idx]);
                max = max.max(row[idx]);
                sum += row[idx];
            }
            if !self.rows.is_empty() {
                *slot = ColumnStats { min, max, mean: sum / self.rows.len() as f64 };
            }
        }
        FeatureSummary { rows: self.rows.len(), columns: stats }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Batch size and per-feature statistics attached to training failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub rows: usize,
    pub columns: [ColumnStats; N_FEATURES],
}

impl fmt::Display for FeatureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rows={}", self.rows)?;
        if self.rows == 0 {
            return Ok(());
        }
        for feature in Feature::ALL {
            let c = &self.columns[feature.index()];
            write!(f, "; {}: min={} max={} mean={:.4}", feature, c.min, c.max, c.mean)?;
        }
        Ok(())
    }
}
