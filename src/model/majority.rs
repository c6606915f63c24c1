//! Always-majority baseline.

use crate::loader::types::Occupancy;
use crate::model::{check_training_shape, majority_label, Classifier, ModelError};
use ndarray::Array2;

/// Predicts the most common training label for every house.
#[derive(Debug, Clone, Default)]
pub struct MajorityClassifier {
    label: Option<Occupancy>,
}

impl MajorityClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fitted label, if any.
    pub fn label(&self) -> Option<Occupancy> {
        self.label
    }
}

impl Classifier for MajorityClassifier {
    fn name(&self) -> &'static str {
        "majority"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &[Occupancy]) -> Result<(), ModelError> {
        check_training_shape(x, y)?;
        self.label = majority_label(y);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<Occupancy>, ModelError> {
        let label = self.label.ok_or(ModelError::NotFitted)?;
        Ok(vec![label; x.nrows()])
    }
}
