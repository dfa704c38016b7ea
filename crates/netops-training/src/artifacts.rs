use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Persisted model artifacts. Each kind has one fixed, well-known file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    AnomalyModel,
    Classifier,
    Regressor,
    LabelEncoder,
    PredictiveReport,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::AnomalyModel,
        ArtifactKind::Classifier,
        ArtifactKind::Regressor,
        ArtifactKind::LabelEncoder,
        ArtifactKind::PredictiveReport,
    ];

    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::AnomalyModel => "model_isoforest.json",
            Self::Classifier => "model_rf_classifier.json",
            Self::Regressor => "model_rf_regressor.json",
            Self::LabelEncoder => "label_encoder.json",
            Self::PredictiveReport => "predictive_report.json",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AnomalyModel => "anomaly model",
            Self::Classifier => "classifier",
            Self::Regressor => "regressor",
            Self::LabelEncoder => "label encoder",
            Self::PredictiveReport => "predictive report",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDigest {
    pub kind: ArtifactKind,
    pub sha256: String,
}

/// Held-out metrics from the 20% test partition; `None` when it was empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PredictiveMetrics {
    pub classifier_accuracy: Option<f64>,
    pub regressor_r2: Option<f64>,
    pub regressor_rmse: Option<f64>,
}

/// Written next to the predictive models after each training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub created_at: DateTime<Utc>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub exclude_target_from_regressor: bool,
    #[serde(default)]
    pub metrics: PredictiveMetrics,
    pub artifacts: Vec<ArtifactDigest>,
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_file_names_are_distinct() {
        let names: HashSet<_> = ArtifactKind::ALL.iter().map(|k| k.file_name()).collect();
        assert_eq!(names.len(), ArtifactKind::ALL.len());
    }

    #[test]
    fn test_sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
