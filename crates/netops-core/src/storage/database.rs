//! Database connection and schema management.

use rusqlite::Connection;
use std::path::Path;
use tracing::info;

use crate::storage::error::StorageResult;

/// Database connection wrapper.
///
/// Manages the SQLite connection and creates the `uploads` and `scores`
/// tables on open.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (or creates) the database file at `path`.
    ///
    /// # Errors
    /// * `StorageError::Connection` - If the database connection fails
    /// * `StorageError::Io` - If the parent directory cannot be created
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Opens an in-memory database for testing.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    fn init_schema(&self) -> StorageResult<()> {
        info!("Initializing database schema");

        self.conn.execute(
            r"
            CREATE TABLE IF NOT EXISTS uploads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
            [],
        )?;

        // No foreign key: batch jobs write under the sentinel upload id 0.
        // Raw feature columns are nullable for rows written before they existed.
        self.conn.execute(
            r"
            CREATE TABLE IF NOT EXISTS scores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                upload_id INTEGER NOT NULL,
                cell_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                anomaly INTEGER NOT NULL,
                score REAL NOT NULL,
                prb_util REAL,
                rrc_conn REAL,
                throughput_mbps REAL,
                bler REAL
            )
            ",
            [],
        )?;

        self.conn.execute("CREATE INDEX IF NOT EXISTS idx_scores_upload_id ON scores(upload_id)", [])?;

        Ok(())
    }
}
