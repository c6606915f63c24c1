//! Core data shaping for the occupancy pipeline.
//!
//! This module contains:
//! - Cleaning of raw snapshot rows
//! - Window aggregation with zero-fill
//! - Per-house feature matrices and exclusion reporting
//! - Seeded house-level splitting and k-fold assignment
//! - Vector autoregression fits over per-room count series

pub mod cleaning;
pub mod features;
pub mod split;
pub mod var;
pub mod windowing;

use chrono::{DateTime, Utc};
use thiserror::Error;

// Re-export commonly used types
pub use cleaning::{
    clean_events, is_plausible, parse_timestamp, Cleaned, CleaningReport, DropReason,
};
pub use features::{
    build_feature_set, Exclusion, ExclusionReason, ExclusionReport, FeatureSet,
    HouseFeatureMatrix, LabeledHouse,
};
pub use split::{k_fold, Fold, Split, Splitter};
pub use var::{fit_var, VarModel};
pub use windowing::{
    validate_series, Aggregation, AnalysisRange, CountMode, Granularity, WindowAggregator,
    WindowedCount,
};

/// Errors raised by the data-shaping stages.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("analysis range is empty: {start} .. {end}")]
    EmptyRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("windows for house '{house_id}' room '{room_id}' are not contiguous at {at}")]
    NonContiguousWindows {
        house_id: String,
        room_id: String,
        at: DateTime<Utc>,
    },

    #[error("house '{house_id}' mixes window lengths ({expected}s and {found}s)")]
    MixedWindowLength {
        house_id: String,
        expected: i64,
        found: i64,
    },

    #[error("rooms of house '{0}' do not share the same windows")]
    MisalignedRooms(String),

    #[error("need at least {required} houses, found {found}")]
    TooFewHouses { found: usize, required: usize },

    #[error("house '{0}' is listed with conflicting labels")]
    ConflictingLabels(String),

    #[error("test ratio must be strictly between 0 and 1, got {0}")]
    InvalidRatio(f64),

    #[error("series of {windows} windows is too short for a VAR({lag}) fit")]
    SeriesTooShort { windows: usize, lag: usize },

    #[error("VAR normal equations are singular")]
    SingularSystem,
}
