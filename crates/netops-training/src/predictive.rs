//! Predictive Analytics Engine: health-status classification and throughput
//! regression over threshold-derived labels.
//!
//! The regressor's target is `Throughput_Mbps`, and by default that same
//! column is also one of its input features. This self-reference is kept so
//! results stay comparable with earlier trained models; set
//! [`PredictiveOptions::exclude_target_from_regressor`] to train without it.

use crate::artifacts::{ArtifactDigest, ArtifactKind, PredictiveMetrics, TrainingReport, sha256_hex};
use crate::anomaly::ModelOrigin;
use crate::dataset::{Feature, FeatureMatrix, FeatureTable, N_FEATURES};
use crate::encoder::LabelEncoder;
use crate::error::{ModelError, ModelResult};
use crate::evaluation::{accuracy, population_std, r2_score, rmse, running_mean, stratified_split};
use crate::forest::{ForestParams, RandomForestClassifier, RandomForestRegressor, argmax};
use crate::labeling::{HealthStatus, LabelingPolicy};
use crate::progress::{ProgressEvent, ProgressSink, TracingProgressSink, TrainingRun};
use crate::store::{ModelStore, load_artifact, save_artifact};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Half-width of the throughput band in standard deviations.
const INTERVAL_Z: f64 = 1.96;

/// Sentinel status reported by [`summarize`] for an empty batch.
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveOptions {
    pub policy: LabelingPolicy,
    /// Drop `Throughput_Mbps` from the regressor's inputs.
    pub exclude_target_from_regressor: bool,
    pub classifier: ForestParams,
    pub regressor: ForestParams,
    pub test_size: f64,
    pub split_seed: u64,
}

impl Default for PredictiveOptions {
    fn default() -> Self {
        Self {
            policy: LabelingPolicy::default(),
            exclude_target_from_regressor: false,
            classifier: ForestParams::classifier(),
            regressor: ForestParams::regressor(),
            test_size: 0.2,
            split_seed: 42,
        }
    }
}

impl PredictiveOptions {
    pub fn validate(&self) -> ModelResult<()> {
        self.policy.validate()?;
        self.classifier.validate()?;
        self.regressor.validate()?;
        if !(0.0..1.0).contains(&self.test_size) {
            return Err(ModelError::InvalidConfig(format!("test_size must be in [0, 1), got {}", self.test_size)));
        }
        Ok(())
    }

    fn regressor_features(&self) -> Vec<usize> {
        (0..N_FEATURES)
            .filter(|&f| !(self.exclude_target_from_regressor && f == Feature::ThroughputMbps.index()))
            .collect()
    }
}

/// The three sibling artifacts of the supervised models.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictiveModels {
    pub classifier: RandomForestClassifier,
    pub regressor: RandomForestRegressor,
    pub encoder: LabelEncoder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPrediction {
    pub status: HealthStatus,
    /// Largest class probability.
    pub confidence: f64,
    /// One entry per class seen during training.
    pub probabilities: BTreeMap<HealthStatus, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputPrediction {
    pub value: f64,
    /// `[lower, upper]`, lower bound clamped at zero.
    pub interval: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub classification: BTreeMap<String, f64>,
    pub regression: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub most_common_status: String,
    pub status_distribution: BTreeMap<String, usize>,
    pub average_confidence: f64,
    pub average_predicted_throughput: f64,
}

/// Everything a caller needs to render one predictive analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveAnalysis {
    pub origin: ModelOrigin,
    pub status: Vec<StatusPrediction>,
    pub throughput: Vec<ThroughputPrediction>,
    pub feature_importance: FeatureImportance,
    pub summary: PredictionSummary,
}

pub struct PredictiveEngine {
    store: Arc<dyn ModelStore>,
    options: PredictiveOptions,
    writer: Mutex<()>,
    progress: Arc<dyn ProgressSink>,
}

impl PredictiveEngine {
    #[must_use]
    pub fn new(store: Arc<dyn ModelStore>, options: PredictiveOptions) -> Self {
        Self { store, options, writer: Mutex::new(()), progress: Arc::new(TracingProgressSink) }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn options(&self) -> &PredictiveOptions {
        &self.options
    }

    /// Loads all three artifacts; `None` if any one of them is missing.
    pub fn load(&self) -> ModelResult<Option<PredictiveModels>> {
        let store = self.store.as_ref();
        let classifier = load_artifact::<RandomForestClassifier>(store, ArtifactKind::Classifier)?;
        let regressor = load_artifact::<RandomForestRegressor>(store, ArtifactKind::Regressor)?;
        let encoder = load_artifact::<LabelEncoder>(store, ArtifactKind::LabelEncoder)?;
        match (classifier, regressor, encoder) {
            (Some(classifier), Some(regressor), Some(encoder)) => {
                debug!(classes = encoder.n_classes(), "Loaded predictive models");
                Ok(Some(PredictiveModels { classifier, regressor, encoder }))
            }
            _ => Ok(None),
        }
    }

    /// The report written by the most recent training run, if any.
    pub fn last_report(&self) -> ModelResult<Option<TrainingReport>> {
        load_artifact(self.store.as_ref(), ArtifactKind::PredictiveReport)
    }

    /// Loads the persisted models or, if any artifact is absent, trains on
    /// `table` and persists all three. Concurrent callers on one engine
    /// train at most once.
    pub fn get_or_train(&self, table: &FeatureTable) -> ModelResult<(PredictiveModels, ModelOrigin)> {
        if let Some(models) = self.load()? {
            return Ok((models, ModelOrigin::Loaded));
        }
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(models) = self.load()? {
            return Ok((models, ModelOrigin::Loaded));
        }
        let (models, _) = self.train(table)?;
        Ok((models, ModelOrigin::Trained))
    }

    /// Derives labels, fits both forests on the training split, evaluates
    /// on the held-out split and persists every artifact.
    pub fn train(&self, table: &FeatureTable) -> ModelResult<(PredictiveModels, TrainingReport)> {
        self.options.validate()?;
        let matrix = table.project();
        if matrix.is_empty() {
            return Err(ModelError::training("cannot train predictive models on an empty batch", matrix.summary()));
        }
        self.progress.on_event(ProgressEvent::Started { run: TrainingRun::Predictive, rows: matrix.len() });

        let labels = self.options.policy.label_table(table);
        let encoder = LabelEncoder::fit(&labels)?;
        let y = encoder.transform_all(&labels)?;
        let throughput = matrix.column(Feature::ThroughputMbps);

        let split = stratified_split(&y, self.options.test_size, self.options.split_seed);
        let train_x = select_rows(&matrix, &split.train);
        let test_x = select_rows(&matrix, &split.test);
        let train_y: Vec<usize> = split.train.iter().map(|&i| y[i]).collect();
        let test_y: Vec<usize> = split.test.iter().map(|&i| y[i]).collect();
        let train_t: Vec<f64> = split.train.iter().map(|&i| throughput[i]).collect();
        let test_t: Vec<f64> = split.test.iter().map(|&i| throughput[i]).collect();

        let classifier =
            RandomForestClassifier::fit(&train_x, &train_y, encoder.n_classes(), self.options.classifier.clone())?;

        let features = self.options.regressor_features();
        if !self.options.exclude_target_from_regressor {
            warn!("Regressor uses Throughput_Mbps as both input feature and target");
        }
        let regressor = RandomForestRegressor::fit_on(&train_x, &train_t, &features, self.options.regressor.clone())?;

        if !classifier.is_finite() || !regressor.is_finite() {
            return Err(ModelError::training(
                "fitted predictive models hold non-finite values and cannot be persisted",
                matrix.summary(),
            ));
        }

        let metrics = PredictiveMetrics {
            classifier_accuracy: accuracy(&test_y, &classifier.predict(&test_x)),
            regressor_r2: r2_score(&test_t, &regressor.predict(&test_x)),
            regressor_rmse: rmse(&test_t, &regressor.predict(&test_x)),
        };
        self.progress.on_event(ProgressEvent::Message {
            run: TrainingRun::Predictive,
            message: format!(
                "train={} test={} accuracy={:?} r2={:?} rmse={:?}",
                split.train.len(),
                split.test.len(),
                metrics.classifier_accuracy,
                metrics.regressor_r2,
                metrics.regressor_rmse
            ),
        });

        let store = self.store.as_ref();
        let artifacts = vec![
            ArtifactDigest {
                kind: ArtifactKind::Classifier,
                sha256: sha256_hex(&save_artifact(store, ArtifactKind::Classifier, &classifier)?),
            },
            ArtifactDigest {
                kind: ArtifactKind::Regressor,
                sha256: sha256_hex(&save_artifact(store, ArtifactKind::Regressor, &regressor)?),
            },
            ArtifactDigest {
                kind: ArtifactKind::LabelEncoder,
                sha256: sha256_hex(&save_artifact(store, ArtifactKind::LabelEncoder, &encoder)?),
            },
        ];
        let report = TrainingReport {
            created_at: Utc::now(),
            train_rows: split.train.len(),
            test_rows: split.test.len(),
            exclude_target_from_regressor: self.options.exclude_target_from_regressor,
            metrics,
            artifacts,
        };
        save_artifact(store, ArtifactKind::PredictiveReport, &report)?;
        info!(
            rows = matrix.len(),
            classes = encoder.n_classes(),
            train_rows = report.train_rows,
            test_rows = report.test_rows,
            "Persisted predictive models"
        );
        self.progress.on_event(ProgressEvent::Finished { run: TrainingRun::Predictive });

        Ok((PredictiveModels { classifier, regressor, encoder }, report))
    }

    /// Train-or-load followed by every prediction and aggregate.
    pub fn analyze(&self, table: &FeatureTable) -> ModelResult<PredictiveAnalysis> {
        let (models, origin) = self.get_or_train(table)?;
        let status = predict_status(table, &models.classifier, &models.encoder)?;
        let throughput = predict_throughput(table, &models.regressor);
        let summary = summarize(&status, &throughput);
        Ok(PredictiveAnalysis {
            origin,
            feature_importance: feature_importance(&models.classifier, &models.regressor),
            status,
            throughput,
            summary,
        })
    }
}

fn select_rows(matrix: &FeatureMatrix, indices: &[usize]) -> FeatureMatrix {
    FeatureMatrix::new(indices.iter().map(|&i| matrix.rows()[i]).collect())
}

/// Per-row status with its class probabilities.
pub fn predict_status(
    table: &FeatureTable,
    classifier: &RandomForestClassifier,
    encoder: &LabelEncoder,
) -> ModelResult<Vec<StatusPrediction>> {
    if classifier.n_classes() != encoder.n_classes() {
        return Err(ModelError::InvalidConfig(format!(
            "classifier has {} classes but the label encoder has {}",
            classifier.n_classes(),
            encoder.n_classes()
        )));
    }
    classifier
        .predict_proba(&table.project())
        .into_iter()
        .map(|proba| -> ModelResult<StatusPrediction> {
            let best = argmax(&proba);
            let probabilities = encoder.classes().iter().copied().zip(proba.iter().copied()).collect();
            Ok(StatusPrediction { status: encoder.inverse_transform(best)?, confidence: proba[best], probabilities })
        })
        .collect()
}

/// Per-row throughput with a band of ±1.96σ, where σ is the population
/// standard deviation of this batch's predictions.
#[must_use]
pub fn predict_throughput(table: &FeatureTable, regressor: &RandomForestRegressor) -> Vec<ThroughputPrediction> {
    let values = regressor.predict(&table.project());
    if values.is_empty() {
        return Vec::new();
    }
    let sigma = population_std(&values);
    values
        .into_iter()
        .map(|value| ThroughputPrediction {
            value,
            interval: [(value - INTERVAL_Z * sigma).max(0.0), value + INTERVAL_Z * sigma],
        })
        .collect()
}

#[must_use]
pub fn feature_importance(classifier: &RandomForestClassifier, regressor: &RandomForestRegressor) -> FeatureImportance {
    let named = |weights: [f64; N_FEATURES]| -> BTreeMap<String, f64> {
        Feature::ALL.iter().map(|f| (f.name().to_string(), weights[f.index()])).collect()
    };
    FeatureImportance {
        classification: named(classifier.feature_importances()),
        regression: named(regressor.feature_importances()),
    }
}

/// Aggregates predictions. Ties for the most common status go to the
/// status encountered first; an empty batch yields `UNKNOWN` and zeros.
#[must_use]
pub fn summarize(status: &[StatusPrediction], throughput: &[ThroughputPrediction]) -> PredictionSummary {
    let mut counts: Vec<(HealthStatus, usize)> = Vec::new();
    for row in status {
        match counts.iter_mut().find(|(s, _)| *s == row.status) {
            Some((_, n)) => *n += 1,
            None => counts.push((row.status, 1)),
        }
    }

    let mut most_common: Option<(HealthStatus, usize)> = None;
    for &(s, n) in &counts {
        if most_common.is_none_or(|(_, best)| n > best) {
            most_common = Some((s, n));
        }
    }

    PredictionSummary {
        most_common_status: most_common.map_or_else(|| UNKNOWN_STATUS.to_string(), |(s, _)| s.to_string()),
        status_distribution: counts.iter().map(|(s, n)| (s.to_string(), *n)).collect(),
        average_confidence: running_mean(status.iter().map(|s| s.confidence)),
        average_predicted_throughput: running_mean(throughput.iter().map(|t| t.value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FeatureVector, KpiRecord};
    use crate::store::InMemoryModelStore;
    use chrono::NaiveDate;

    fn table(vectors: &[FeatureVector]) -> FeatureTable {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        FeatureTable::new(
            vectors
                .iter()
                .enumerate()
                .map(|(i, v)| KpiRecord {
                    cell_id: format!("cell-{}", i % 4),
                    raw_timestamp: "2024-01-01 00:00:00".to_string(),
                    timestamp: ts,
                    features: *v,
                })
                .collect(),
        )
    }

    fn mixed() -> FeatureTable {
        let vectors: Vec<FeatureVector> = (0..90_i32)
            .map(|i| {
                let j = f64::from(i % 10);
                match i % 3 {
                    0 => FeatureVector::new(50.0 + j, 100.0, 60.0 + j, 0.01),
                    1 => FeatureVector::new(85.0, 150.0 + j, 35.0, 0.03),
                    _ => FeatureVector::new(95.0, 200.0, 10.0 + j / 2.0, 0.08),
                }
            })
            .collect();
        table(&vectors)
    }

    fn small_options() -> PredictiveOptions {
        let mut options = PredictiveOptions::default();
        options.classifier.n_estimators = 15;
        options.regressor.n_estimators = 15;
        options
    }

    fn prediction(status: HealthStatus, confidence: f64) -> StatusPrediction {
        StatusPrediction { status, confidence, probabilities: BTreeMap::from([(status, confidence)]) }
    }

    #[test]
    fn test_train_persists_three_models_and_report() {
        let store = Arc::new(InMemoryModelStore::new());
        let engine = PredictiveEngine::new(store.clone(), small_options());
        let (models, report) = engine.train(&mixed()).unwrap();

        assert_eq!(models.encoder.classes(), &[HealthStatus::Critical, HealthStatus::Normal, HealthStatus::Warning]);
        for kind in [ArtifactKind::Classifier, ArtifactKind::Regressor, ArtifactKind::LabelEncoder] {
            assert_eq!(store.save_count(kind), 1);
        }
        assert_eq!(report.train_rows + report.test_rows, 90);
        assert_eq!(report.test_rows, 18);
        assert_eq!(report.artifacts.len(), 3);
        assert_eq!(engine.last_report().unwrap(), Some(report));
    }

    #[test]
    fn test_get_or_train_falls_through_when_one_artifact_missing() {
        let store = Arc::new(InMemoryModelStore::new());
        let engine = PredictiveEngine::new(store.clone(), small_options());
        engine.get_or_train(&mixed()).unwrap();
        store.remove(ArtifactKind::LabelEncoder);

        let (_, origin) = engine.get_or_train(&mixed()).unwrap();
        assert_eq!(origin, ModelOrigin::Trained);
        assert_eq!(store.save_count(ArtifactKind::Classifier), 2);

        let (_, origin) = engine.get_or_train(&mixed()).unwrap();
        assert_eq!(origin, ModelOrigin::Loaded);
    }

    #[test]
    fn test_probabilities_cover_trained_classes() {
        let engine = PredictiveEngine::new(Arc::new(InMemoryModelStore::new()), small_options());
        let t = mixed();
        let (models, _) = engine.get_or_train(&t).unwrap();
        let rows = predict_status(&t, &models.classifier, &models.encoder).unwrap();
        assert_eq!(rows.len(), t.len());
        for row in &rows {
            assert_eq!(row.probabilities.len(), 3);
            let total: f64 = row.probabilities.values().sum();
            assert!((total - 1.0).abs() < 1e-9);
            assert!((row.probabilities[&row.status] - row.confidence).abs() < 1e-12);
        }
    }

    #[test]
    fn test_exclude_target_flag_drops_throughput_importance() {
        let mut options = small_options();
        options.exclude_target_from_regressor = true;
        let engine = PredictiveEngine::new(Arc::new(InMemoryModelStore::new()), options);
        let (models, report) = engine.train(&mixed()).unwrap();
        assert!(report.exclude_target_from_regressor);
        assert_eq!(models.regressor.features(), &[0, 1, 3]);

        let importance = feature_importance(&models.classifier, &models.regressor);
        assert!(importance.regression["Throughput_Mbps"].abs() < f64::EPSILON);
    }

    #[test]
    fn test_interval_contains_prediction() {
        let engine = PredictiveEngine::new(Arc::new(InMemoryModelStore::new()), small_options());
        let t = mixed();
        let (models, _) = engine.get_or_train(&t).unwrap();
        for p in predict_throughput(&t, &models.regressor) {
            assert!(p.interval[0] >= 0.0);
            assert!(p.interval[0] <= p.value && p.value <= p.interval[1]);
        }
    }

    #[test]
    fn test_summarize_ties_go_to_first_encountered() {
        let status = vec![
            prediction(HealthStatus::Warning, 0.6),
            prediction(HealthStatus::Normal, 0.8),
            prediction(HealthStatus::Normal, 0.9),
            prediction(HealthStatus::Warning, 0.7),
        ];
        let throughput = vec![ThroughputPrediction { value: 10.0, interval: [0.0, 20.0] }; 4];
        let summary = summarize(&status, &throughput);
        assert_eq!(summary.most_common_status, "WARNING");
        assert_eq!(summary.status_distribution["NORMAL"], 2);
        assert!((summary.average_confidence - 0.75).abs() < 1e-12);
        assert!((summary.average_predicted_throughput - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[], &[]);
        assert_eq!(summary.most_common_status, UNKNOWN_STATUS);
        assert!(summary.status_distribution.is_empty());
        assert!(summary.average_confidence.abs() < f64::EPSILON);
        assert!(summary.average_predicted_throughput.abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_table_is_training_error() {
        let engine = PredictiveEngine::new(Arc::new(InMemoryModelStore::new()), small_options());
        let err = engine.get_or_train(&FeatureTable::default()).unwrap_err();
        assert!(matches!(err, ModelError::Training { .. }));
    }
}
