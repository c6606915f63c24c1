//! Gaussian naive Bayes.
//!
//! Each feature is modelled as an independent normal per class. Variances are
//! smoothed by a fraction of the largest feature variance so constant
//! features (a room that never fires) stay usable.

use crate::loader::types::Occupancy;
use crate::model::{check_training_shape, Classifier, ModelError};
use ndarray::{Array2, Axis};
use statrs::distribution::{Continuous, Normal};
use statrs::statistics::Statistics;

/// Portion of the largest variance added to every variance.
const VAR_SMOOTHING: f64 = 1e-9;

#[derive(Debug, Clone)]
struct ClassModel {
    label: Occupancy,
    log_prior: f64,
    features: Vec<Normal>,
}

#[derive(Debug, Clone, Default)]
pub struct GaussianNaiveBayes {
    classes: Vec<ClassModel>,
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log joint likelihood of one sample per fitted class.
    fn joint_log_likelihood(&self, sample: &[f64]) -> Vec<(Occupancy, f64)> {
        self.classes
            .iter()
            .map(|class| {
                let ll: f64 = class
                    .features
                    .iter()
                    .zip(sample)
                    .map(|(dist, &v)| dist.ln_pdf(v))
                    .sum();
                (class.label, class.log_prior + ll)
            })
            .collect()
    }
}

impl Classifier for GaussianNaiveBayes {
    fn name(&self) -> &'static str {
        "naive-bayes"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &[Occupancy]) -> Result<(), ModelError> {
        check_training_shape(x, y)?;

        let max_variance = x
            .columns()
            .into_iter()
            .map(|c| c.iter().population_variance())
            .filter(|v| v.is_finite())
            .fold(0.0, f64::max);
        let epsilon = (VAR_SMOOTHING * max_variance).max(f64::EPSILON);

        let n = y.len() as f64;
        let mut classes = Vec::new();

        for label in Occupancy::ALL {
            let rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] == label).collect();
            if rows.is_empty() {
                continue;
            }
            let subset = x.select(Axis(0), &rows);

            let features = subset
                .columns()
                .into_iter()
                .map(|column| {
                    let mean = column.iter().mean();
                    let variance = column.iter().population_variance() + epsilon;
                    Normal::new(mean, variance.sqrt())
                        .map_err(|e| ModelError::Distribution(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;

            classes.push(ClassModel {
                label,
                log_prior: (rows.len() as f64 / n).ln(),
                features,
            });
        }

        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<Occupancy>, ModelError> {
        let expected = self
            .classes
            .first()
            .map(|c| c.features.len())
            .ok_or(ModelError::NotFitted)?;
        if x.ncols() != expected {
            return Err(ModelError::DimensionMismatch {
                expected,
                got: x.ncols(),
            });
        }

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let sample = row.to_vec();
                self.joint_log_likelihood(&sample)
                    .into_iter()
                    .fold(None, |best: Option<(Occupancy, f64)>, (label, score)| match best {
                        Some((_, best_score)) if best_score >= score => best,
                        _ => Some((label, score)),
                    })
                    .map(|(label, _)| label)
                    .unwrap_or(Occupancy::Single)
            })
            .collect())
    }
}
