//! NetOps Training
//!
//! Modeling primitives for per-cell KPI batches:
//! - Loading and validating the four-feature contract (`load_kpi_csv`)
//! - Unsupervised anomaly scoring with an isolation forest (`AnomalyDetector`)
//! - Threshold-derived health labels (`LabelingPolicy`)
//! - Status classification and throughput regression (`PredictiveEngine`)
//! - Persisting fitted models behind a `ModelStore`

pub mod anomaly;
pub mod artifacts;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod evaluation;
pub mod forest;
pub mod isolation_forest;
pub mod labeling;
pub mod layout;
pub mod loader;
pub mod predictive;
pub mod progress;
pub mod store;
mod tree;

pub use anomaly::{AnomalyDetector, AnomalyScores, ModelOrigin, score};
pub use artifacts::{ArtifactDigest, ArtifactKind, PredictiveMetrics, TrainingReport};
pub use dataset::{FEATURES, Feature, FeatureMatrix, FeatureSummary, FeatureTable, FeatureVector, KpiRecord, N_FEATURES};
pub use encoder::LabelEncoder;
pub use error::{ModelError, ModelResult};
pub use forest::{ForestParams, MaxFeatures, RandomForestClassifier, RandomForestRegressor};
pub use isolation_forest::{IsolationForest, IsolationForestParams};
pub use labeling::{HealthStatus, LabelingPolicy, Thresholds};
pub use layout::ModelLayout;
pub use loader::{load_kpi_csv, parse_timestamp, read_kpi_csv};
pub use predictive::{
    FeatureImportance, PredictionSummary, PredictiveAnalysis, PredictiveEngine, PredictiveModels, PredictiveOptions,
    StatusPrediction, ThroughputPrediction, UNKNOWN_STATUS, feature_importance, predict_status, predict_throughput,
    summarize,
};
pub use progress::{NullProgressSink, ProgressEvent, ProgressSink, TracingProgressSink, TrainingRun};
pub use store::{FsModelStore, InMemoryModelStore, ModelStore, load_artifact, save_artifact};
