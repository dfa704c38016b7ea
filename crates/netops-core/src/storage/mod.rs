//! Storage layer for NetOps Core.
//!
//! SQLite persistence of uploads and score rows using the Repository pattern.

pub mod database;
pub mod error;
pub mod scores;

pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use scores::{BATCH_UPLOAD_ID, ScoreRepository, ScoreRow, SqliteScoreRepository, Upload, UploadReport};
