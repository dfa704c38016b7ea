//! Error types for NetOps Core.

use thiserror::Error;

use crate::config::ConfigError;
use crate::storage::StorageError;
use netops_training::ModelError;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum NetopsError {
    /// Loading, training or scoring failed.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Score Record Store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The caller supplied something the pipeline will not process.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, NetopsError>;
