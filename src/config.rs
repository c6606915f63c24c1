//! Configuration for the occupancy pipeline.

use crate::core::{AnalysisRange, CountMode, Granularity};
use crate::loader::SnapshotSchema;
use crate::model::ModelSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Window length used for aggregation
    pub granularity: Granularity,

    /// Which events are counted
    pub count_mode: CountMode,

    /// Fixed analysis range shared by every house
    pub range: Option<AnalysisRange>,

    /// Table names in the snapshot
    pub schema: SnapshotSchema,

    /// Train/test split settings
    pub split: SplitConfig,

    /// Classifier settings
    pub model: ModelSettings,

    /// Cross-validation folds on the training houses
    pub folds: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            granularity: Granularity::Hourly,
            count_mode: CountMode::default(),
            range: None,
            schema: SnapshotSchema::default(),
            split: SplitConfig::default(),
            model: ModelSettings::default(),
            folds: 5,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let config_path = Self::config_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(io)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("occupancy-sensor-pipeline")
            .join("config.json")
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.split.test_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "test_ratio must be in (0, 1), got {ratio}"
            )));
        }
        if self.model.knn_k == 0 {
            return Err(ConfigError::Invalid("knn_k must be at least 1".to_string()));
        }
        if self.model.var_lag == Some(0) {
            return Err(ConfigError::Invalid("var_lag must be at least 1".to_string()));
        }
        if let Some(range) = self.range {
            if range.start >= range.end {
                return Err(ConfigError::Invalid(format!(
                    "analysis range is empty: {} .. {}",
                    range.start, range.end
                )));
            }
        }
        for table in [&self.schema.events_table, &self.schema.labels_table] {
            if table.trim().is_empty() {
                return Err(ConfigError::Invalid("table names must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// How houses are partitioned into train and test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Share of houses held out for testing
    pub test_ratio: f64,
    pub seed: u64,
    /// Keep the label mix similar in train and test
    pub stratify: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.3,
            seed: 42,
            stratify: true,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
