//! Command implementations for the NetOps CLI.

pub mod analyze;
pub mod logs;
pub mod report;
pub mod score;
pub mod train;
pub mod upload;

use anyhow::{Context, Result};
use netops_core::{Pipeline, PipelineConfig};
use std::path::Path;

/// Resolves configuration and opens the database and model store.
pub fn open_pipeline(config: Option<&Path>) -> Result<Pipeline> {
    let config = PipelineConfig::discover_and_load(config).context("Failed to load configuration")?;
    Pipeline::open(config).context("Failed to open pipeline")
}
