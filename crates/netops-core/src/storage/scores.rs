//! Score Record Store: uploads and their per-row detector output.

use crate::storage::database::Database;
use crate::storage::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use netops_training::FeatureVector;
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Upload id used by batch jobs that are not tied to an ingested file.
pub const BATCH_UPLOAD_ID: i64 = 0;

/// One ingested batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub id: i64,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

/// One scored record. Raw feature values are optional so rows written
/// without them can still be read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub upload_id: i64,
    pub cell_id: String,
    /// Source-preserved timestamp string.
    pub timestamp: String,
    /// `-1` anomalous, `1` normal.
    pub anomaly: i32,
    pub score: f64,
    pub prb_util: Option<f64>,
    pub rrc_conn: Option<f64>,
    pub throughput_mbps: Option<f64>,
    pub bler: Option<f64>,
}

impl ScoreRow {
    /// The four raw values, if all of them were stored.
    #[must_use]
    pub fn feature_vector(&self) -> Option<FeatureVector> {
        Some(FeatureVector::new(self.prb_util?, self.rrc_conn?, self.throughput_mbps?, self.bler?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReport {
    pub upload_id: i64,
    pub total: usize,
    pub anomalies: usize,
    /// Percentage of anomalous rows, rounded to two decimals.
    pub anomaly_rate: f64,
}

impl UploadReport {
    #[must_use]
    pub fn from_rows(upload_id: i64, rows: &[ScoreRow]) -> Self {
        let total = rows.len();
        let anomalies = rows.iter().filter(|r| r.anomaly == -1).count();
        let anomaly_rate =
            if total == 0 { 0.0 } else { (anomalies as f64 / total as f64 * 100.0 * 100.0).round() / 100.0 };
        Self { upload_id, total, anomalies, anomaly_rate }
    }
}

/// Repository trait for uploads and score rows.
pub trait ScoreRepository {
    /// Allocates an upload id and stamps its creation time.
    fn create_upload(&mut self, filename: &str) -> StorageResult<i64>;

    fn get_upload(&self, upload_id: i64) -> StorageResult<Upload>;

    /// All uploads in creation order.
    fn list_uploads(&self) -> StorageResult<Vec<Upload>>;

    /// Inserts every row in one transaction. Rows are appended, never
    /// upserted; re-scoring an upload duplicates its rows.
    fn append_scores(&mut self, upload_id: i64, rows: &[ScoreRow]) -> StorageResult<usize>;

    /// All rows for one upload, in insertion order.
    fn scores_for(&self, upload_id: i64) -> StorageResult<Vec<ScoreRow>>;

    /// Removes every row for one upload; returns the number removed.
    fn delete_scores(&mut self, upload_id: i64) -> StorageResult<usize>;

    /// Counts for one upload; `NotFound` if it has no rows.
    fn report(&self, upload_id: i64) -> StorageResult<UploadReport>;
}

/// SQLite implementation of ScoreRepository.
pub struct SqliteScoreRepository<'a> {
    db: &'a mut Database,
}

impl<'a> SqliteScoreRepository<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }
}

fn row_to_upload(row: &Row) -> rusqlite::Result<Upload> {
    let created_at: String = row.get(2)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidColumnType(2, "created_at".to_string(), rusqlite::types::Type::Text))?;
    Ok(Upload { id: row.get(0)?, filename: row.get(1)?, created_at })
}

fn row_to_score(row: &Row) -> rusqlite::Result<ScoreRow> {
    Ok(ScoreRow {
        upload_id: row.get(0)?,
        cell_id: row.get(1)?,
        timestamp: row.get(2)?,
        anomaly: row.get(3)?,
        score: row.get(4)?,
        prb_util: row.get(5)?,
        rrc_conn: row.get(6)?,
        throughput_mbps: row.get(7)?,
        bler: row.get(8)?,
    })
}

impl ScoreRepository for SqliteScoreRepository<'_> {
    fn create_upload(&mut self, filename: &str) -> StorageResult<i64> {
        if filename.trim().is_empty() {
            return Err(StorageError::InvalidData("upload filename must not be empty".to_string()));
        }
        let conn = self.db.conn_mut();
        conn.execute(
            "INSERT INTO uploads (filename, created_at) VALUES (?1, ?2)",
            params![filename, Utc::now().to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        info!(upload_id = id, filename, "Created upload");
        Ok(id)
    }

    fn get_upload(&self, upload_id: i64) -> StorageResult<Upload> {
        self.db
            .conn()
            .query_row("SELECT id, filename, created_at FROM uploads WHERE id = ?1", params![upload_id], row_to_upload)
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("upload {upload_id}")))
    }

    fn list_uploads(&self) -> StorageResult<Vec<Upload>> {
        let mut stmt = self.db.conn().prepare("SELECT id, filename, created_at FROM uploads ORDER BY id")?;
        let uploads = stmt.query_map([], row_to_upload)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(uploads)
    }

    fn append_scores(&mut self, upload_id: i64, rows: &[ScoreRow]) -> StorageResult<usize> {
        let tx = self.db.conn_mut().transaction()?;
        {
            let mut stmt = tx.prepare(
                r"
                INSERT INTO scores (
                    upload_id, cell_id, timestamp, anomaly, score,
                    prb_util, rrc_conn, throughput_mbps, bler
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
            )?;
            for row in rows {
                stmt.execute(params![
                    upload_id,
                    row.cell_id,
                    row.timestamp,
                    row.anomaly,
                    row.score,
                    row.prb_util,
                    row.rrc_conn,
                    row.throughput_mbps,
                    row.bler,
                ])?;
            }
        }
        tx.commit()?;
        debug!(upload_id, rows = rows.len(), "Appended score rows");
        Ok(rows.len())
    }

    fn scores_for(&self, upload_id: i64) -> StorageResult<Vec<ScoreRow>> {
        let mut stmt = self.db.conn().prepare(
            r"
            SELECT upload_id, cell_id, timestamp, anomaly, score,
                   prb_util, rrc_conn, throughput_mbps, bler
            FROM scores WHERE upload_id = ?1 ORDER BY id
            ",
        )?;
        let rows = stmt.query_map(params![upload_id], row_to_score)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn delete_scores(&mut self, upload_id: i64) -> StorageResult<usize> {
        let removed = self.db.conn_mut().execute("DELETE FROM scores WHERE upload_id = ?1", params![upload_id])?;
        info!(upload_id, removed, "Deleted score rows");
        Ok(removed)
    }

    fn report(&self, upload_id: i64) -> StorageResult<UploadReport> {
        let rows = self.scores_for(upload_id)?;
        if rows.is_empty() {
            return Err(StorageError::NotFound(format!("no scores for upload {upload_id}")));
        }
        Ok(UploadReport::from_rows(upload_id, &rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn score_row(cell: &str, anomaly: i32, score: f64) -> ScoreRow {
        ScoreRow {
            upload_id: 0,
            cell_id: cell.to_string(),
            timestamp: "2024-05-01T12:00:00".to_string(),
            anomaly,
            score,
            prb_util: Some(71.25),
            rrc_conn: Some(188.0),
            throughput_mbps: Some(34.5),
            bler: Some(0.013),
        }
    }

    #[test]
    fn test_create_and_list_uploads() {
        let mut db = setup_db();
        let mut repo = SqliteScoreRepository::new(&mut db);
        let a = repo.create_upload("a.csv").unwrap();
        let b = repo.create_upload("b.csv").unwrap();
        assert!(b > a);

        let uploads = repo.list_uploads().unwrap();
        assert_eq!(uploads.iter().map(|u| u.filename.as_str()).collect::<Vec<_>>(), vec!["a.csv", "b.csv"]);
        assert_eq!(repo.get_upload(a).unwrap().filename, "a.csv");
        assert!(matches!(repo.get_upload(999), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_create_upload_rejects_empty_filename() {
        let mut db = setup_db();
        let mut repo = SqliteScoreRepository::new(&mut db);
        assert!(matches!(repo.create_upload("  "), Err(StorageError::InvalidData(_))));
    }

    #[test]
    fn test_append_duplicates_rather_than_upserts() {
        let mut db = setup_db();
        let mut repo = SqliteScoreRepository::new(&mut db);
        let id = repo.create_upload("kpi.csv").unwrap();
        let rows = vec![score_row("C1", 1, 0.12), score_row("C2", -1, -0.04)];
        repo.append_scores(id, &rows).unwrap();
        repo.append_scores(id, &rows).unwrap();
        assert_eq!(repo.scores_for(id).unwrap().len(), 4);

        assert_eq!(repo.delete_scores(id).unwrap(), 4);
        assert!(repo.scores_for(id).unwrap().is_empty());
    }

    #[test]
    fn test_rows_carry_owning_upload_id() {
        let mut db = setup_db();
        let mut repo = SqliteScoreRepository::new(&mut db);
        let id = repo.create_upload("kpi.csv").unwrap();
        repo.append_scores(id, &[score_row("C1", 1, 0.1)]).unwrap();
        let stored = repo.scores_for(id).unwrap();
        assert_eq!(stored[0].upload_id, id);
    }

    #[test]
    fn test_missing_features_read_back_as_none() {
        let mut db = setup_db();
        let mut repo = SqliteScoreRepository::new(&mut db);
        let mut row = score_row("C9", 1, 0.2);
        row.bler = None;
        repo.append_scores(BATCH_UPLOAD_ID, &[row]).unwrap();

        let stored = repo.scores_for(BATCH_UPLOAD_ID).unwrap();
        assert_eq!(stored[0].bler, None);
        assert!(stored[0].feature_vector().is_none());
    }

    #[test]
    fn test_report() {
        let mut db = setup_db();
        let mut repo = SqliteScoreRepository::new(&mut db);
        let id = repo.create_upload("kpi.csv").unwrap();
        let rows = vec![score_row("C1", 1, 0.1), score_row("C1", -1, -0.1), score_row("C2", 1, 0.2)];
        repo.append_scores(id, &rows).unwrap();

        let report = repo.report(id).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.anomalies, 1);
        assert!((report.anomaly_rate - 33.33).abs() < 1e-9);

        let empty = repo.create_upload("empty.csv").unwrap();
        assert!(matches!(repo.report(empty), Err(StorageError::NotFound(_))));
    }
}
