//! Caller-level flows: ingest an upload, batch train/score, report and
//! re-analyze stored batches.

use crate::config::PipelineConfig;
use crate::error::{NetopsError, Result};
use crate::storage::{
    BATCH_UPLOAD_ID, Database, ScoreRepository, ScoreRow, SqliteScoreRepository, StorageError, Upload, UploadReport,
};
use netops_training::{
    AnomalyDetector, AnomalyScores, ArtifactKind, FeatureTable, FsModelStore, KpiRecord, ModelError, ModelLayout,
    ModelOrigin, ModelStore, PredictiveAnalysis, PredictiveEngine, load_kpi_csv, parse_timestamp, read_kpi_csv,
    score,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of scoring one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub upload_id: i64,
    pub filename: String,
    pub total_samples: usize,
    /// Row count per anomaly label (`-1` / `1`), only labels that occur.
    pub summary: BTreeMap<i32, usize>,
    pub model_origin: ModelOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchScoreOutcome {
    pub upload_id: i64,
    pub scored: usize,
    pub anomalies: usize,
}

/// Predictive analysis of one stored upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadAnalysis {
    pub upload_id: i64,
    pub rows: usize,
    /// Stored rows left out because a raw feature value was missing.
    pub skipped: usize,
    pub analysis: PredictiveAnalysis,
}

pub struct Pipeline {
    config: PipelineConfig,
    db: Database,
    detector: AnomalyDetector,
    engine: PredictiveEngine,
}

impl Pipeline {
    /// Opens the database and a filesystem model store as configured.
    pub fn open(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let db = Database::open(&config.database_path)?;
        let store = Arc::new(FsModelStore::new(ModelLayout::new(config.model_dir.clone())));
        info!(
            database = %config.database_path.display(),
            model_dir = %config.model_dir.display(),
            "Opened pipeline"
        );
        Ok(Self::with_parts(config, db, store))
    }

    /// Assembles a pipeline from explicit parts, e.g. an in-memory database
    /// and model store.
    pub fn with_parts(config: PipelineConfig, db: Database, store: Arc<dyn ModelStore>) -> Self {
        let detector = AnomalyDetector::new(Arc::clone(&store));
        let engine = PredictiveEngine::new(store, config.predictive_options());
        Self { config, db, detector, engine }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn engine(&self) -> &PredictiveEngine {
        &self.engine
    }

    fn repo(&mut self) -> SqliteScoreRepository<'_> {
        SqliteScoreRepository::new(&mut self.db)
    }

    /// Ingests a `.csv` file from disk. See [`Pipeline::ingest_reader`].
    pub fn ingest(&mut self, path: &Path) -> Result<IngestOutcome> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| NetopsError::InvalidInput(format!("not a file path: {}", path.display())))?
            .to_string();
        check_csv_name(&filename)?;
        let file = std::fs::File::open(path)?;
        self.ingest_reader(&filename, file)
    }

    /// Creates the upload, then validates, scores and stores every row.
    ///
    /// The upload record is created before anything else, so a file that
    /// fails validation or scoring still leaves its upload behind.
    pub fn ingest_reader<R: Read>(&mut self, filename: &str, reader: R) -> Result<IngestOutcome> {
        check_csv_name(filename)?;
        let upload_id = self.repo().create_upload(filename)?;

        let table = read_kpi_csv(reader)?;
        let matrix = table.project();
        let (model, model_origin) =
            self.detector.load_or_train(&matrix, self.config.contamination, self.config.train_if_missing)?;
        let scores = score(&model, &matrix);

        let rows = score_rows(upload_id, &table, &scores);
        self.repo().append_scores(upload_id, &rows)?;

        let mut summary = BTreeMap::new();
        for label in &scores.labels {
            *summary.entry(*label).or_insert(0) += 1;
        }
        info!(upload_id, filename, rows = rows.len(), anomalies = scores.anomaly_count(), "Scored upload");
        Ok(IngestOutcome { upload_id, filename: filename.to_string(), total_samples: rows.len(), summary, model_origin })
    }

    /// Trains the anomaly model from a file, replacing any persisted one.
    pub fn batch_train(&self, path: &Path) -> Result<usize> {
        let matrix = load_kpi_csv(path)?.project();
        self.detector.train(&matrix, self.config.contamination)?;
        Ok(matrix.len())
    }

    /// Scores a file with the persisted model and stores the rows under
    /// [`BATCH_UPLOAD_ID`]. Never trains.
    pub fn batch_score(&mut self, path: &Path) -> Result<BatchScoreOutcome> {
        let table = load_kpi_csv(path)?;
        let model = self.detector.load()?.ok_or(ModelError::ModelAbsent(ArtifactKind::AnomalyModel))?;
        let scores = score(&model, &table.project());
        let rows = score_rows(BATCH_UPLOAD_ID, &table, &scores);
        let scored = self.repo().append_scores(BATCH_UPLOAD_ID, &rows)?;
        Ok(BatchScoreOutcome { upload_id: BATCH_UPLOAD_ID, scored, anomalies: scores.anomaly_count() })
    }

    pub fn report(&mut self, upload_id: i64) -> Result<UploadReport> {
        Ok(self.repo().report(upload_id)?)
    }

    pub fn list_uploads(&mut self) -> Result<Vec<Upload>> {
        Ok(self.repo().list_uploads()?)
    }

    pub fn scores_for(&mut self, upload_id: i64) -> Result<Vec<ScoreRow>> {
        Ok(self.repo().scores_for(upload_id)?)
    }

    pub fn delete_scores(&mut self, upload_id: i64) -> Result<usize> {
        Ok(self.repo().delete_scores(upload_id)?)
    }

    /// Runs the predictive engine on a stored upload, rebuilding the
    /// feature table from its score rows rather than the original file.
    pub fn analyze(&mut self, upload_id: i64) -> Result<UploadAnalysis> {
        let stored = self.repo().scores_for(upload_id)?;
        if stored.is_empty() {
            return Err(StorageError::NotFound(format!("no scores for upload {upload_id}")).into());
        }
        let (table, skipped) = table_from_rows(&stored);
        if skipped > 0 {
            warn!(upload_id, skipped, "Stored rows without raw feature values were left out");
        }
        if table.is_empty() {
            return Err(NetopsError::InvalidInput(format!(
                "upload {upload_id} has no rows with raw feature values"
            )));
        }
        let analysis = self.engine.analyze(&table)?;
        Ok(UploadAnalysis { upload_id, rows: table.len(), skipped, analysis })
    }

    /// Runs the predictive engine directly on a file.
    pub fn analyze_file(&self, path: &Path) -> Result<PredictiveAnalysis> {
        let table = load_kpi_csv(path)?;
        Ok(self.engine.analyze(&table)?)
    }
}

fn check_csv_name(filename: &str) -> Result<()> {
    if Path::new(filename).extension().and_then(|e| e.to_str()) == Some("csv") {
        Ok(())
    } else {
        Err(NetopsError::InvalidInput(format!("only CSV files are supported: {filename}")))
    }
}

fn score_rows(upload_id: i64, table: &FeatureTable, scores: &AnomalyScores) -> Vec<ScoreRow> {
    table
        .iter()
        .zip(scores.labels.iter().zip(&scores.scores))
        .map(|(record, (&anomaly, &score))| ScoreRow {
            upload_id,
            cell_id: record.cell_id.clone(),
            timestamp: record.raw_timestamp.clone(),
            anomaly,
            score,
            prb_util: Some(record.features.prb_util),
            rrc_conn: Some(record.features.rrc_conn),
            throughput_mbps: Some(record.features.throughput_mbps),
            bler: Some(record.features.bler),
        })
        .collect()
}

/// Rebuilds a feature table from stored rows. Rows missing a raw value or
/// carrying an unparseable timestamp are counted as skipped.
fn table_from_rows(rows: &[ScoreRow]) -> (FeatureTable, usize) {
    let records: Vec<KpiRecord> = rows
        .iter()
        .filter_map(|row| {
            Some(KpiRecord {
                cell_id: row.cell_id.clone(),
                timestamp: parse_timestamp(&row.timestamp)?,
                raw_timestamp: row.timestamp.clone(),
                features: row.feature_vector()?,
            })
        })
        .collect();
    let skipped = rows.len() - records.len();
    (FeatureTable::new(records), skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netops_training::InMemoryModelStore;

    fn csv(rows: usize) -> String {
        let mut out = String::from("cell_id,timestamp,PRB_Util,RRC_Conn,Throughput_Mbps,BLER\n");
        for i in 0..rows {
            let j = (i % 11) as f64;
            out.push_str(&format!(
                "CELL_{},2024-06-01 {:02}:{:02}:00,{},{},{},{}\n",
                i % 3,
                i / 60 % 24,
                i % 60,
                45.0 + j * 4.5,
                100.0 + j * 7.0,
                70.0 - j * 5.0,
                0.005 + j * 0.005
            ));
        }
        out
    }

    fn pipeline() -> Pipeline {
        Pipeline::with_parts(
            PipelineConfig::default(),
            Database::open_in_memory().unwrap(),
            Arc::new(InMemoryModelStore::new()),
        )
    }

    #[test]
    fn test_ingest_trains_then_reuses() {
        let mut p = pipeline();
        let first = p.ingest_reader("day1.csv", csv(120).as_bytes()).unwrap();
        assert_eq!(first.model_origin, ModelOrigin::Trained);
        assert_eq!(first.total_samples, 120);
        assert_eq!(first.summary.values().sum::<usize>(), 120);

        let second = p.ingest_reader("day2.csv", csv(60).as_bytes()).unwrap();
        assert_eq!(second.model_origin, ModelOrigin::Loaded);
        assert_eq!(p.scores_for(second.upload_id).unwrap().len(), 60);
    }

    #[test]
    fn test_ingest_rejects_non_csv() {
        let mut p = pipeline();
        let err = p.ingest_reader("notes.txt", csv(5).as_bytes()).unwrap_err();
        assert!(matches!(err, NetopsError::InvalidInput(_)));
        assert!(p.list_uploads().unwrap().is_empty());
    }

    #[test]
    fn test_failed_validation_leaves_upload() {
        let mut p = pipeline();
        let err = p.ingest_reader("broken.csv", "cell_id,timestamp,PRB_Util\nC1,2024-01-01,5\n".as_bytes()).unwrap_err();
        assert!(matches!(err, NetopsError::Model(ModelError::Schema(_))));

        let uploads = p.list_uploads().unwrap();
        assert_eq!(uploads.len(), 1);
        assert!(p.scores_for(uploads[0].id).unwrap().is_empty());
    }

    #[test]
    fn test_missing_model_without_training_permission() {
        let config = PipelineConfig { train_if_missing: false, ..PipelineConfig::default() };
        let mut p =
            Pipeline::with_parts(config, Database::open_in_memory().unwrap(), Arc::new(InMemoryModelStore::new()));
        let err = p.ingest_reader("day1.csv", csv(30).as_bytes()).unwrap_err();
        assert!(matches!(err, NetopsError::Model(ModelError::ModelAbsent(ArtifactKind::AnomalyModel))));
    }

    #[test]
    fn test_analyze_skips_rows_without_features() {
        let mut p = pipeline();
        let outcome = p.ingest_reader("day1.csv", csv(90).as_bytes()).unwrap();
        let mut legacy = p.scores_for(outcome.upload_id).unwrap()[0].clone();
        legacy.prb_util = None;
        p.repo().append_scores(outcome.upload_id, &[legacy]).unwrap();

        let result = p.analyze(outcome.upload_id).unwrap();
        assert_eq!(result.rows, 90);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.analysis.status.len(), 90);
        assert_eq!(result.analysis.throughput.len(), 90);
    }

    #[test]
    fn test_analyze_unknown_upload() {
        let mut p = pipeline();
        assert!(matches!(p.analyze(42), Err(NetopsError::Storage(StorageError::NotFound(_)))));
    }
}
