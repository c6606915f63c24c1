//! End-to-end pipeline: snapshot in, run report out.

use crate::config::{Config, ConfigError};
use crate::core::{
    build_feature_set, clean_events, Aggregation, CleaningReport, DataError, FeatureSet,
    Granularity, Split, Splitter, WindowAggregator,
};
use crate::loader::{Snapshot, SnapshotError, SnapshotLoader};
use crate::model::{cross_validate, evaluate_split, ModelError};
use crate::report::{RunReport, RunSettings, StageCounts};
use chrono::Utc;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("failed to write report to {}: {source}", .path.display())]
    Report {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Output of the data stages, before any model is fitted.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub raw_events: usize,
    pub raw_labels: usize,
    pub skipped_labels: usize,
    pub cleaning: CleaningReport,
    pub aggregation: Aggregation,
    pub features: FeatureSet,
}

pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Same settings with a different window length.
    pub fn with_granularity(&self, granularity: Granularity) -> Self {
        let mut config = self.config.clone();
        config.granularity = granularity;
        Self { config }
    }

    pub fn load(&self, path: &Path) -> Result<Snapshot, PipelineError> {
        let snapshot = SnapshotLoader::new(self.config.schema.clone()).load(path)?;
        info!(
            path = %path.display(),
            events = snapshot.events.len(),
            labels = snapshot.labels.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Clean and aggregate without building features.
    pub fn windows(&self, snapshot: &Snapshot) -> (CleaningReport, Aggregation) {
        let cleaned = clean_events(&snapshot.events);
        let aggregation = self.aggregator().aggregate(&cleaned.events);
        (cleaned.report, aggregation)
    }

    /// Run every data stage up to labelled feature matrices.
    pub fn prepare(&self, snapshot: &Snapshot) -> Result<Prepared, PipelineError> {
        let (cleaning, aggregation) = self.windows(snapshot);
        let mut features = build_feature_set(&aggregation.counts, &snapshot.labels)?;
        features
            .exclusions
            .mark_out_of_range(&aggregation.out_of_range_houses);

        Ok(Prepared {
            raw_events: snapshot.events.len(),
            raw_labels: snapshot.labels.len(),
            skipped_labels: snapshot.skipped_labels,
            cleaning,
            aggregation,
            features,
        })
    }

    /// Load the snapshot at `path` and run the whole pipeline.
    pub fn run(&self, path: &Path) -> Result<RunReport, PipelineError> {
        let snapshot = self.load(path)?;
        self.run_snapshot(path, &snapshot)
    }

    /// Run the pipeline and write the report as JSON to `report_path`.
    pub fn run_to(&self, path: &Path, report_path: &Path) -> Result<RunReport, PipelineError> {
        let report = self.run(path)?;
        report
            .save(report_path)
            .map_err(|source| PipelineError::Report {
                path: report_path.to_path_buf(),
                source,
            })?;
        info!(path = %report_path.display(), "report written");
        Ok(report)
    }

    /// Run the pipeline on an already loaded snapshot. `source` is recorded
    /// in the report.
    pub fn run_snapshot(&self, source: &Path, snapshot: &Snapshot) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, granularity = %self.config.granularity, "pipeline started");

        let prepared = self.prepare(snapshot)?;
        let features = &prepared.features;

        let split = self.split(features)?;
        let train = features.select(&split.train);
        let test = features.select(&split.test);
        info!(train = train.len(), test = test.len(), "houses split");

        let model = &self.config.model;
        let cross_validation = cross_validate(
            &train,
            &features.rooms,
            model,
            self.config.folds,
            self.config.split.seed,
        )?;
        if let Some(cv) = &cross_validation {
            info!("{}", cv.summary());
        }

        let test_result = evaluate_split(&train, &test, &features.rooms, model)?;
        info!(
            classifier = %test_result.classifier,
            accuracy = test_result.evaluation.accuracy,
            f1 = test_result.evaluation.f1,
            "held-out evaluation finished"
        );

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            snapshot: source.to_path_buf(),
            settings: RunSettings::from(&self.config),
            counts: StageCounts {
                raw_events: prepared.raw_events,
                raw_labels: prepared.raw_labels,
                skipped_labels: prepared.skipped_labels,
                cleaning: prepared.cleaning.clone(),
                out_of_range: prepared.aggregation.out_of_range,
                windowed_rows: prepared.aggregation.counts.len(),
                houses_used: features.houses.len(),
            },
            rooms: features.rooms.clone(),
            exclusions: features.exclusions.clone(),
            split,
            cross_validation,
            test: test_result,
        })
    }

    fn aggregator(&self) -> WindowAggregator {
        WindowAggregator::new(self.config.granularity)
            .with_count_mode(self.config.count_mode)
            .with_range(self.config.range)
    }

    fn split(&self, features: &FeatureSet) -> Result<Split, PipelineError> {
        let splitter = Splitter::new(self.config.split.test_ratio, self.config.split.seed)?;
        let split = if self.config.split.stratify {
            let labelled: Vec<(String, _)> = features
                .houses
                .iter()
                .map(|h| (h.house_id().to_string(), h.label))
                .collect();
            splitter.split_stratified(&labelled)?
        } else {
            splitter.split(&features.house_ids())?
        };
        Ok(split)
    }
}
