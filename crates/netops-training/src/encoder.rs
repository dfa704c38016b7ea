use crate::error::{ModelError, ModelResult};
use crate::labeling::HealthStatus;
use serde::{Deserialize, Serialize};

/// Maps health labels to dense class indices.
///
/// Classes are the labels seen while fitting, sorted by name, so
/// `CRITICAL = 0`, `NORMAL = 1`, `WARNING = 2` when all three occur.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<HealthStatus>,
}

impl LabelEncoder {
    pub fn fit(labels: &[HealthStatus]) -> ModelResult<Self> {
        if labels.is_empty() {
            return Err(ModelError::InvalidConfig("cannot fit a label encoder on no labels".to_string()));
        }
        let mut classes = labels.to_vec();
        classes.sort_by_key(|c| c.as_str());
        classes.dedup();
        Ok(Self { classes })
    }

    #[must_use]
    pub fn classes(&self) -> &[HealthStatus] {
        &self.classes
    }

    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn transform(&self, label: HealthStatus) -> ModelResult<usize> {
        self.classes
            .iter()
            .position(|c| *c == label)
            .ok_or_else(|| ModelError::InvalidConfig(format!("label {label} was not seen during fitting")))
    }

    pub fn transform_all(&self, labels: &[HealthStatus]) -> ModelResult<Vec<usize>> {
        labels.iter().map(|l| self.transform(*l)).collect()
    }

    pub fn inverse_transform(&self, class: usize) -> ModelResult<HealthStatus> {
        self.classes
            .get(class)
            .copied()
            .ok_or_else(|| ModelError::InvalidConfig(format!("class index {class} out of range")))
    }
}
