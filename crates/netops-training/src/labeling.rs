//! Threshold policy that derives health labels from raw KPI values.
//!
//! There is no ground-truth label source; the classifier is trained to
//! approximate this hand-written rule.

use crate::dataset::{FeatureTable, FeatureVector};
use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Three-level ordinal health label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Normal,
    Warning,
    Critical,
}

impl HealthStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(Self::Normal),
            "WARNING" => Ok(Self::Warning),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(ModelError::InvalidConfig(format!("unknown health status: {other}"))),
        }
    }
}

/// Trigger levels for one severity; any single breach triggers it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Triggers when `prb_util` is strictly above this value.
    pub prb_util_above: f64,
    /// Triggers when `throughput_mbps` is strictly below this value.
    pub throughput_below: f64,
    /// Triggers when `bler` is strictly above this value.
    pub bler_above: f64,
}

impl Thresholds {
    #[must_use]
    pub fn breached_by(&self, v: &FeatureVector) -> bool {
        v.prb_util > self.prb_util_above
            || v.throughput_mbps < self.throughput_below
            || v.bler > self.bler_above
    }
}

/// Injectable threshold set; changing thresholds is a configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelingPolicy {
    pub critical: Thresholds,
    pub warning: Thresholds,
}

impl Default for LabelingPolicy {
    fn default() -> Self {
        Self {
            critical: Thresholds { prb_util_above: 90.0, throughput_below: 20.0, bler_above: 0.05 },
            warning: Thresholds { prb_util_above: 80.0, throughput_below: 40.0, bler_above: 0.02 },
        }
    }
}

impl LabelingPolicy {
    /// Labels one row. `CRITICAL` is checked before `WARNING`.
    #[must_use]
    pub fn label(&self, v: &FeatureVector) -> HealthStatus {
        if self.critical.breached_by(v) {
            HealthStatus::Critical
        } else if self.warning.breached_by(v) {
            HealthStatus::Warning
        } else {
            HealthStatus::Normal
        }
    }

    /// Labels every row of a table, positionally aligned.
    #[must_use]
    pub fn label_table(&self, table: &FeatureTable) -> Vec<HealthStatus> {
        table.iter().map(|r| self.label(&r.features)).collect()
    }

    /// Rejects policies whose warning band is stricter than the critical band.
    pub fn validate(&self) -> ModelResult<()> {
        let c = &self.critical;
        let w = &self.warning;
        let all_finite = [c.prb_util_above, c.throughput_below, c.bler_above, w.prb_util_above, w.throughput_below, w.bler_above]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(ModelError::InvalidConfig("labeling thresholds must be finite".to_string()));
        }
        if w.prb_util_above > c.prb_util_above
            || w.throughput_below < c.throughput_below
            || w.bler_above > c.bler_above
        {
            return Err(ModelError::InvalidConfig(
                "warning thresholds must not be stricter than critical thresholds".to_string(),
            ));
        }
        Ok(())
    }
}
