//! Pipeline configuration.
//!
//! Settings are layered: built-in defaults, then the global file
//! (`~/.netops/config.toml`), then a local `./netops.toml`, then an explicit
//! file passed by the caller, then environment overrides. Each file only
//! needs to name the keys it changes.

use netops_training::{LabelingPolicy, PredictiveOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DATABASE_PATH_ENV: &str = "NETOPS_DATABASE_PATH";
pub const MODEL_DIR_ENV: &str = "NETOPS_MODEL_DIR";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictiveConfig {
    /// Train the regressor without `Throughput_Mbps` among its inputs.
    #[serde(default)]
    pub exclude_target_from_regressor: bool,
}

/// Resolved settings for one pipeline instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub database_path: PathBuf,
    /// Directory holding the fixed-name model artifacts.
    pub model_dir: PathBuf,
    /// Expected anomaly fraction used when training the detector.
    pub contamination: f64,
    /// Train the detector on the current batch when no model is persisted.
    pub train_if_missing: bool,
    pub labeling: LabelingPolicy,
    pub predictive: PredictiveConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("netops.db"),
            model_dir: PathBuf::from("."),
            contamination: 0.02,
            train_if_missing: true,
            labeling: LabelingPolicy::default(),
            predictive: PredictiveConfig::default(),
        }
    }
}

/// One configuration file; absent keys leave the lower layer untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
    #[serde(default)]
    pub contamination: Option<f64>,
    #[serde(default)]
    pub train_if_missing: Option<bool>,
    #[serde(default)]
    pub labeling: Option<LabelingPolicy>,
    #[serde(default)]
    pub predictive: Option<PredictiveConfig>,
}

impl ConfigLayer {
    /// Load a layer from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::ParseError(msg) => ConfigError::ParseError(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn parse(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl PipelineConfig {
    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME").map_or_else(|_| PathBuf::from("."), PathBuf::from).join(".netops").join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from("netops.toml")
    }

    /// Discover and load configuration.
    ///
    /// Missing global/local files are skipped, but a file that exists and
    /// fails to parse is an error. `explicit`, when given, must exist.
    pub fn discover_and_load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();

        for path in [Self::default_global_path(), Self::default_local_path()] {
            if path.is_file() {
                config.merge(&ConfigLayer::load_from_file(&path)?);
            }
        }
        if let Some(path) = explicit {
            config.merge(&ConfigLayer::load_from_file(path)?);
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Values present in `layer` override values in `self`.
    pub fn merge(&mut self, layer: &ConfigLayer) {
        if let Some(ref path) = layer.database_path {
            self.database_path.clone_from(path);
        }
        if let Some(ref dir) = layer.model_dir {
            self.model_dir.clone_from(dir);
        }
        if let Some(contamination) = layer.contamination {
            self.contamination = contamination;
        }
        if let Some(train) = layer.train_if_missing {
            self.train_if_missing = train;
        }
        if let Some(labeling) = layer.labeling {
            self.labeling = labeling;
        }
        if let Some(ref predictive) = layer.predictive {
            self.predictive = predictive.clone();
        }
    }

    /// Environment overrides for the two paths; empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(DATABASE_PATH_ENV).filter(|v| !v.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(MODEL_DIR_ENV).filter(|v| !v.is_empty()) {
            self.model_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ConfigError::InvalidValue(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        self.labeling.validate().map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    /// Options for the predictive engine derived from this configuration.
    pub fn predictive_options(&self) -> PredictiveOptions {
        PredictiveOptions {
            policy: self.labeling,
            exclude_target_from_regressor: self.predictive.exclude_target_from_regressor,
            ..PredictiveOptions::default()
        }
    }
}
