//! Run reports.
//!
//! A [`RunReport`] records what every stage kept, dropped and excluded,
//! alongside the evaluation scores, so a run can be audited afterwards.

pub mod run;

// Re-export commonly used types
pub use run::{RunReport, RunSettings, StageCounts};
