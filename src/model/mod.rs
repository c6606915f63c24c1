//! Occupancy classifiers.
//!
//! Feature matrices are first turned into fixed-length vectors by a
//! [`FeatureExtractor`], then handed to a [`Classifier`]. [`OccupancyModel`]
//! bundles the two so callers work in terms of houses and labels only.

pub mod evaluate;
pub mod extract;
pub mod knn;
pub mod majority;
pub mod metrics;
pub mod naive_bayes;

use crate::core::{DataError, HouseFeatureMatrix, LabeledHouse};
use crate::loader::types::Occupancy;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// Re-export commonly used types
pub use evaluate::{cross_validate, evaluate_split, CvScores, HousePrediction, SplitEvaluation};
pub use extract::FeatureExtractor;
pub use knn::KnnClassifier;
pub use majority::MajorityClassifier;
pub use metrics::{ConfusionMatrix, Evaluation};
pub use naive_bayes::GaussianNaiveBayes;

/// Errors raised while fitting or applying a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model has not been fitted")]
    NotFitted,

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("distribution error: {0}")]
    Distribution(String),

    #[error("feature extraction failed for house '{house_id}': {source}")]
    Features {
        house_id: String,
        #[source]
        source: DataError,
    },
}

/// A batch binary classifier over feature vectors.
pub trait Classifier {
    fn name(&self) -> &'static str;

    /// Fit on rows of `x` with one label per row.
    fn fit(&mut self, x: &Array2<f64>, y: &[Occupancy]) -> Result<(), ModelError>;

    /// Predict one label per row of `x`.
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<Occupancy>, ModelError>;
}

/// Which classifier to train.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// Always predicts the most common training label.
    Majority,
    #[default]
    NaiveBayes,
    Knn,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Majority, ModelKind::NaiveBayes, ModelKind::Knn];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Majority => "majority",
            ModelKind::NaiveBayes => "naive-bayes",
            ModelKind::Knn => "knn",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "majority" => Ok(ModelKind::Majority),
            "naive-bayes" | "naive_bayes" | "nb" => Ok(ModelKind::NaiveBayes),
            "knn" => Ok(ModelKind::Knn),
            other => Err(format!(
                "unknown model '{other}' (expected majority, naive-bayes or knn)"
            )),
        }
    }
}

/// Everything needed to build an [`OccupancyModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub kind: ModelKind,
    /// Neighbours consulted by the kNN classifier.
    pub knn_k: usize,
    /// Append VAR(p) coefficients to the feature vector when set.
    pub var_lag: Option<usize>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            kind: ModelKind::default(),
            knn_k: 3,
            var_lag: None,
        }
    }
}

impl ModelSettings {
    pub fn build_classifier(&self) -> Box<dyn Classifier> {
        match self.kind {
            ModelKind::Majority => Box::new(MajorityClassifier::new()),
            ModelKind::NaiveBayes => Box::new(GaussianNaiveBayes::new()),
            ModelKind::Knn => Box::new(KnnClassifier::new(self.knn_k)),
        }
    }
}

/// Feature extraction plus a fitted classifier.
pub struct OccupancyModel {
    extractor: FeatureExtractor,
    classifier: Box<dyn Classifier>,
}

impl OccupancyModel {
    /// Fit on labelled houses. `rooms` fixes the feature layout.
    pub fn fit(
        settings: &ModelSettings,
        rooms: &[String],
        houses: &[&LabeledHouse],
    ) -> Result<Self, ModelError> {
        if houses.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }

        let extractor = FeatureExtractor::new(rooms.to_vec(), settings.var_lag);
        let matrices: Vec<&HouseFeatureMatrix> = houses.iter().map(|h| &h.matrix).collect();
        let labels: Vec<Occupancy> = houses.iter().map(|h| h.label).collect();

        let x = extractor.transform(&matrices)?;
        let mut classifier = settings.build_classifier();
        classifier.fit(&x, &labels)?;

        Ok(Self {
            extractor,
            classifier,
        })
    }

    pub fn predict(&self, matrices: &[&HouseFeatureMatrix]) -> Result<Vec<Occupancy>, ModelError> {
        if matrices.is_empty() {
            return Ok(Vec::new());
        }
        let x = self.extractor.transform(matrices)?;
        self.classifier.predict(&x)
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.extractor.feature_names()
    }
}

/// Most frequent label; ties go to `Multiple`.
pub(crate) fn majority_label(labels: &[Occupancy]) -> Option<Occupancy> {
    if labels.is_empty() {
        return None;
    }
    let multiple = labels.iter().filter(|l| **l == Occupancy::Multiple).count();
    let single = labels.len() - multiple;
    Some(if single > multiple {
        Occupancy::Single
    } else {
        Occupancy::Multiple
    })
}

pub(crate) fn check_training_shape(x: &Array2<f64>, y: &[Occupancy]) -> Result<(), ModelError> {
    if y.is_empty() || x.nrows() == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    if x.nrows() != y.len() {
        return Err(ModelError::DimensionMismatch {
            expected: x.nrows(),
            got: y.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("knn".parse::<ModelKind>(), Ok(ModelKind::Knn));
        assert_eq!("Naive-Bayes".parse::<ModelKind>(), Ok(ModelKind::NaiveBayes));
        assert_eq!("majority".parse::<ModelKind>(), Ok(ModelKind::Majority));
        assert!("forest".parse::<ModelKind>().is_err());
        for kind in ModelKind::ALL {
            assert_eq!(kind.as_str().parse::<ModelKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_majority_label_ties() {
        use Occupancy::*;
        assert_eq!(majority_label(&[]), None);
        assert_eq!(majority_label(&[Single, Single, Multiple]), Some(Single));
        assert_eq!(majority_label(&[Single, Multiple]), Some(Multiple));
    }
}
