//! NetOps Core
//!
//! Glue around the modeling crate: configuration, the SQLite Score Record
//! Store, the ingest / batch / re-analysis flows and syslog incident
//! extraction.

pub mod config;
pub mod error;
pub mod incidents;
pub mod pipeline;
pub mod storage;

pub use config::{ConfigError, ConfigLayer, PipelineConfig, PredictiveConfig};
pub use error::{NetopsError, Result};
pub use incidents::{IncidentReport, extract_incidents, is_log_file};
pub use pipeline::{BatchScoreOutcome, IngestOutcome, Pipeline, UploadAnalysis};
pub use storage::{
    BATCH_UPLOAD_ID, Database, ScoreRepository, ScoreRow, SqliteScoreRepository, StorageError, Upload, UploadReport,
};
