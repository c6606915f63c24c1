//! Snapshot loading.
//!
//! Reads raw motion events and occupancy labels from a relational sensor
//! snapshot. Nothing here validates event content; that is the cleaner's job.

pub mod snapshot;
pub mod types;

pub use snapshot::{Snapshot, SnapshotError, SnapshotLoader, SnapshotSchema};
pub use types::{CleanedEvent, MotionState, Occupancy, OccupancyLabel, RawEvent};
