//! Per-run record of counters, settings and scores.

use crate::config::Config;
use crate::core::{AnalysisRange, CleaningReport, CountMode, ExclusionReport, Granularity, Split};
use crate::model::{CvScores, ModelSettings, SplitEvaluation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Settings a run was executed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub granularity: Granularity,
    pub count_mode: CountMode,
    pub range: Option<AnalysisRange>,
    pub model: ModelSettings,
    pub test_ratio: f64,
    pub seed: u64,
    pub stratify: bool,
    pub folds: usize,
}

impl From<&Config> for RunSettings {
    fn from(config: &Config) -> Self {
        Self {
            granularity: config.granularity,
            count_mode: config.count_mode,
            range: config.range,
            model: config.model.clone(),
            test_ratio: config.split.test_ratio,
            seed: config.split.seed,
            stratify: config.split.stratify,
            folds: config.folds,
        }
    }
}

/// Row and house counts per stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageCounts {
    pub raw_events: usize,
    pub raw_labels: usize,
    /// Label rows skipped as malformed
    pub skipped_labels: usize,
    pub cleaning: CleaningReport,
    /// Events outside the analysis range
    pub out_of_range: usize,
    pub windowed_rows: usize,
    pub houses_used: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub snapshot: PathBuf,
    pub settings: RunSettings,
    pub counts: StageCounts,
    /// Room columns shared by every house matrix
    pub rooms: Vec<String>,
    pub exclusions: ExclusionReport,
    pub split: Split,
    /// `None` when the training set was too small to fold.
    pub cross_validation: Option<CvScores>,
    pub test: SplitEvaluation,
}

impl RunReport {
    /// Held-out accuracy.
    pub fn accuracy(&self) -> f64 {
        self.test.evaluation.accuracy
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let counts = &self.counts;
        let evaluation = &self.test.evaluation;
        let cv = self
            .cross_validation
            .as_ref()
            .map(|cv| cv.summary())
            .unwrap_or_else(|| "CV skipped (too few training houses)".to_string());

        format!(
            "Run {}\n\
             - Snapshot: {}\n\
             - Granularity: {} ({} counting)\n\
             - Model: {}\n\
             \n\
             Data:\n\
             - Raw events: {} ({} kept, {} dropped)\n\
             - Labels: {} ({} malformed rows skipped)\n\
             - Events outside range: {}\n\
             - Windowed rows: {}\n\
             - Rooms: {}\n\
             - Houses used: {} ({} excluded)\n\
             - Split: {} train / {} test (seed {})\n\
             \n\
             Evaluation:\n\
             - {}\n\
             - Test accuracy={:.4} precision={:.4} recall={:.4} F1={:.4}\n\
             - Confusion: tp={} fp={} fn={} tn={}",
            self.run_id,
            self.snapshot.display(),
            self.settings.granularity,
            self.settings.count_mode.as_str(),
            self.test.classifier,
            counts.raw_events,
            counts.cleaning.kept_rows,
            counts.cleaning.dropped(),
            counts.raw_labels,
            counts.skipped_labels,
            counts.out_of_range,
            counts.windowed_rows,
            self.rooms.join(", "),
            counts.houses_used,
            self.exclusions.excluded.len(),
            self.split.train.len(),
            self.split.test.len(),
            self.settings.seed,
            cv,
            evaluation.accuracy,
            evaluation.precision,
            evaluation.recall,
            evaluation.f1,
            evaluation.confusion.tp,
            evaluation.confusion.fp,
            evaluation.confusion.fn_,
            evaluation.confusion.tn,
        )
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }
}
