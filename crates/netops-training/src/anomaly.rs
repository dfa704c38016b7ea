//! Anomaly Detector: train, persist, reuse and score the isolation forest.

use crate::artifacts::ArtifactKind;
use crate::dataset::FeatureMatrix;
use crate::error::{ModelError, ModelResult};
use crate::isolation_forest::{IsolationForest, IsolationForestParams, labels_from_decision};
use crate::progress::{ProgressEvent, ProgressSink, TracingProgressSink, TrainingRun};
use crate::store::{ModelStore, load_artifact, save_artifact};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Per-row detector output, positionally aligned with the scored matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScores {
    /// `-1` anomalous, `1` normal.
    pub labels: Vec<i32>,
    /// Decision function; negative is anomalous, no fixed range.
    pub scores: Vec<f64>,
}

impl AnomalyScores {
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn anomaly_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == -1).count()
    }
}

/// Whether a model came from the store or was fitted during the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelOrigin {
    Loaded,
    Trained,
}

/// Owns the persisted isolation forest.
///
/// Nothing is cached in memory: every [`AnomalyDetector::load`] deserializes
/// a fresh model from the store. The writer lock serializes the
/// absent → train → persist transition for callers sharing this detector.
pub struct AnomalyDetector {
    store: Arc<dyn ModelStore>,
    params: IsolationForestParams,
    writer: Mutex<()>,
    progress: Arc<dyn ProgressSink>,
}

impl AnomalyDetector {
    #[must_use]
    pub fn new(store: Arc<dyn ModelStore>) -> Self {
        Self {
            store,
            params: IsolationForestParams::default(),
            writer: Mutex::new(()),
            progress: Arc::new(TracingProgressSink),
        }
    }

    /// Overrides ensemble size and seed; contamination is still per call.
    #[must_use]
    pub fn with_params(mut self, params: IsolationForestParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Fits on `matrix` and persists, overwriting any previous model.
    pub fn train(&self, matrix: &FeatureMatrix, contamination: f64) -> ModelResult<IsolationForest> {
        let params = IsolationForestParams { contamination, ..self.params };
        self.progress.on_event(ProgressEvent::Started { run: TrainingRun::Anomaly, rows: matrix.len() });
        let model = IsolationForest::fit(matrix, params)?;
        self.progress.on_event(ProgressEvent::Message {
            run: TrainingRun::Anomaly,
            message: format!(
                "fitted {} trees (contamination={contamination}, offset={:.6})",
                params.n_estimators,
                model.offset()
            ),
        });
        save_artifact(self.store.as_ref(), ArtifactKind::AnomalyModel, &model)?;
        info!(rows = matrix.len(), contamination, "Persisted anomaly model");
        self.progress.on_event(ProgressEvent::Finished { run: TrainingRun::Anomaly });
        Ok(model)
    }

    /// Returns `Ok(None)` when no model has been persisted yet.
    pub fn load(&self) -> ModelResult<Option<IsolationForest>> {
        let model = load_artifact::<IsolationForest>(self.store.as_ref(), ArtifactKind::AnomalyModel)?;
        debug!(present = model.is_some(), "Loaded anomaly model");
        Ok(model)
    }

    /// Loads the persisted model, training one on `matrix` when none exists
    /// and `train_if_missing` allows it.
    ///
    /// Concurrent callers on the same detector train at most once; the
    /// others wait on the writer lock and then load the winner's model.
    pub fn load_or_train(
        &self,
        matrix: &FeatureMatrix,
        contamination: f64,
        train_if_missing: bool,
    ) -> ModelResult<(IsolationForest, ModelOrigin)> {
        if let Some(model) = self.load()? {
            return Ok((model, ModelOrigin::Loaded));
        }
        if !train_if_missing {
            return Err(ModelError::ModelAbsent(ArtifactKind::AnomalyModel));
        }

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = self.load()? {
            debug!("Anomaly model appeared while waiting for the writer lock");
            return Ok((model, ModelOrigin::Loaded));
        }
        info!(rows = matrix.len(), "No anomaly model persisted; training on the current batch");
        let model = self.train(matrix, contamination)?;
        Ok((model, ModelOrigin::Trained))
    }
}

/// Labels and decision scores for every row of `matrix`.
#[must_use]
pub fn score(model: &IsolationForest, matrix: &FeatureMatrix) -> AnomalyScores {
    let scores = model.decision_function(matrix);
    let labels = labels_from_decision(&scores);
    AnomalyScores { labels, scores }
}
