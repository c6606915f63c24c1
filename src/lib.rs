//! Occupancy Sensor Pipeline - household occupancy classification from
//! motion-sensor events.
//!
//! This library loads a snapshot of motion-sensor events, aggregates them
//! into fixed time windows per house and room, and trains a classifier that
//! predicts whether a house has a single occupant or several.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    Occupancy Sensor Pipeline                     │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌────────────┐    │
//! │  │  Loader  │──▶│ Cleaner  │──▶│ Windowing │──▶│  Features  │    │
//! │  │ (SQLite) │   │ (dedup)  │   │ (0-fill)  │   │ (per house)│    │
//! │  └──────────┘   └──────────┘   └───────────┘   └────────────┘    │
//! │                                                      │           │
//! │                                                      ▼           │
//! │  ┌──────────┐                 ┌───────────┐   ┌────────────┐     │
//! │  │  Report  │◀────────────────│   Model   │◀──│  Splitter  │     │
//! │  │  (JSON)  │                 │ (CV+test) │   │  (seeded)  │     │
//! │  └──────────┘                 └───────────┘   └────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use occupancy_sensor_pipeline::{Config, Pipeline};
//! use std::path::Path;
//!
//! let pipeline = Pipeline::new(Config::default()).expect("valid config");
//! let report = pipeline.run(Path::new("snapshot.db")).expect("pipeline run");
//! println!("{}", report.summary());
//! ```

pub mod config;
pub mod core;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod report;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, SplitConfig};
pub use core::{
    AnalysisRange, CountMode, DataError, FeatureSet, Granularity, HouseFeatureMatrix,
    WindowAggregator, WindowedCount,
};
pub use loader::{Occupancy, OccupancyLabel, RawEvent, Snapshot, SnapshotError, SnapshotLoader};
pub use model::{Classifier, ModelError, ModelKind, ModelSettings, OccupancyModel};
pub use pipeline::{Pipeline, PipelineError, Prepared};
pub use report::RunReport;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
