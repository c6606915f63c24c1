//! Binary classification metrics.
//!
//! `Multiple` is the positive class.

use crate::loader::types::Occupancy;
use crate::model::ModelError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tn: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[Occupancy], y_pred: &[Occupancy]) -> Self {
        let mut m = Self::default();
        for (t, p) in y_true.iter().zip(y_pred) {
            match (*t == Occupancy::Multiple, *p == Occupancy::Multiple) {
                (true, true) => m.tp += 1,
                (false, true) => m.fp += 1,
                (true, false) => m.fn_ += 1,
                (false, false) => m.tn += 1,
            }
        }
        m
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.fn_ + self.tn
    }
}

/// Scores for one set of predictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub confusion: ConfusionMatrix,
    /// Number of scored houses.
    pub support: usize,
}

impl Evaluation {
    /// Score predictions against ground truth. Empty input scores zero.
    pub fn score(y_true: &[Occupancy], y_pred: &[Occupancy]) -> Result<Self, ModelError> {
        if y_true.len() != y_pred.len() {
            return Err(ModelError::DimensionMismatch {
                expected: y_true.len(),
                got: y_pred.len(),
            });
        }
        if y_true.is_empty() {
            return Ok(Self::default());
        }

        let confusion = ConfusionMatrix::from_labels(y_true, y_pred);
        let ratio = |num: usize, den: usize| {
            if den == 0 {
                0.0
            } else {
                num as f64 / den as f64
            }
        };

        let accuracy = ratio(confusion.tp + confusion.tn, confusion.total());
        let precision = ratio(confusion.tp, confusion.tp + confusion.fp);
        let recall = ratio(confusion.tp, confusion.tp + confusion.fn_);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Ok(Self {
            accuracy,
            precision,
            recall,
            f1,
            confusion,
            support: y_true.len(),
        })
    }
}
