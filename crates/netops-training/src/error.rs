use crate::artifacts::ArtifactKind;
use crate::dataset::FeatureSummary;
use thiserror::Error;

pub type ModelResult<T> = std::result::Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    /// Missing or invalid columns, or a timestamp that does not parse.
    #[error("schema error: {0}")]
    Schema(String),

    /// Scoring was requested but no model has been persisted and training
    /// on demand was not permitted.
    #[error("model missing: no persisted {0} artifact; train one first")]
    ModelAbsent(ArtifactKind),

    /// The underlying fit failed; carries a summary of the offending batch.
    #[error("training failed: {message} ({summary})")]
    Training { message: String, summary: FeatureSummary },

    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl ModelError {
    pub(crate) fn training(message: impl Into<String>, summary: FeatureSummary) -> Self {
        Self::Training { message: message.into(), summary }
    }
}
