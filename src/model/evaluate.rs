//! Held-out evaluation and k-fold cross-validation over houses.

use crate::core::split::k_fold;
use crate::core::{HouseFeatureMatrix, LabeledHouse};
use crate::loader::types::Occupancy;
use crate::model::metrics::Evaluation;
use crate::model::{ModelError, ModelSettings, OccupancyModel};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, warn};

/// Per-fold scores with summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvScores {
    pub folds: Vec<Evaluation>,
    pub mean_accuracy: f64,
    pub std_accuracy: f64,
    pub mean_f1: f64,
    pub min_accuracy: f64,
    pub max_accuracy: f64,
}

impl CvScores {
    pub fn from_folds(folds: Vec<Evaluation>) -> Self {
        let accuracies: Vec<f64> = folds.iter().map(|f| f.accuracy).collect();
        let f1s: Vec<f64> = folds.iter().map(|f| f.f1).collect();

        Self {
            mean_accuracy: accuracies.iter().mean(),
            std_accuracy: accuracies.iter().population_std_dev(),
            mean_f1: f1s.iter().mean(),
            min_accuracy: accuracies.iter().copied().fold(f64::INFINITY, f64::min),
            max_accuracy: accuracies.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            folds,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "CV accuracy: mean={:.4} (+/- {:.4}), min={:.4}, max={:.4}, mean F1={:.4} over {} folds",
            self.mean_accuracy,
            self.std_accuracy * 2.0,
            self.min_accuracy,
            self.max_accuracy,
            self.mean_f1,
            self.folds.len()
        )
    }
}

/// k-fold cross-validation on `houses`.
///
/// `folds` is clamped to the number of houses. Returns `None` when fewer than
/// two folds are possible.
pub fn cross_validate(
    houses: &[&LabeledHouse],
    rooms: &[String],
    settings: &ModelSettings,
    folds: usize,
    seed: u64,
) -> Result<Option<CvScores>, ModelError> {
    let k = folds.min(houses.len());
    if k < 2 {
        warn!(
            houses = houses.len(),
            folds, "skipping cross-validation: need at least two folds"
        );
        return Ok(None);
    }

    let mut evaluations = Vec::with_capacity(k);
    for (i, fold) in k_fold(houses.len(), k, seed).into_iter().enumerate() {
        let train: Vec<&LabeledHouse> = fold.train_indices.iter().map(|&j| houses[j]).collect();
        let test: Vec<&LabeledHouse> = fold.test_indices.iter().map(|&j| houses[j]).collect();

        let model = OccupancyModel::fit(settings, rooms, &train)?;
        let matrices: Vec<&HouseFeatureMatrix> = test.iter().map(|h| &h.matrix).collect();
        let predicted = model.predict(&matrices)?;
        let actual: Vec<Occupancy> = test.iter().map(|h| h.label).collect();

        let evaluation = Evaluation::score(&actual, &predicted)?;
        debug!(fold = i, accuracy = evaluation.accuracy, "fold scored");
        evaluations.push(evaluation);
    }

    Ok(Some(CvScores::from_folds(evaluations)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HousePrediction {
    pub house_id: String,
    pub actual: Occupancy,
    pub predicted: Occupancy,
}

impl HousePrediction {
    pub fn is_correct(&self) -> bool {
        self.actual == self.predicted
    }
}

/// Outcome of fitting on the training houses and scoring the test houses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitEvaluation {
    pub classifier: String,
    pub feature_names: Vec<String>,
    pub evaluation: Evaluation,
    pub predictions: Vec<HousePrediction>,
}

pub fn evaluate_split(
    train: &[&LabeledHouse],
    test: &[&LabeledHouse],
    rooms: &[String],
    settings: &ModelSettings,
) -> Result<SplitEvaluation, ModelError> {
    let model = OccupancyModel::fit(settings, rooms, train)?;

    let matrices: Vec<&HouseFeatureMatrix> = test.iter().map(|h| &h.matrix).collect();
    let predicted = model.predict(&matrices)?;
    let actual: Vec<Occupancy> = test.iter().map(|h| h.label).collect();
    let evaluation = Evaluation::score(&actual, &predicted)?;

    let predictions = test
        .iter()
        .zip(predicted)
        .map(|(house, predicted)| HousePrediction {
            house_id: house.house_id().to_string(),
            actual: house.label,
            predicted,
        })
        .collect();

    Ok(SplitEvaluation {
        classifier: model.classifier_name().to_string(),
        feature_names: model.feature_names(),
        evaluation,
        predictions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelKind;
    use chrono::{Duration, TimeZone, Utc};
    use ndarray::Array2;

    fn house(id: &str, level: f64, label: Occupancy) -> LabeledHouse {
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let counts = Array2::from_shape_fn((6, 2), |(w, r)| {
            if (w + r) % 2 == 0 {
                level
            } else {
                0.0
            }
        });
        LabeledHouse {
            matrix: HouseFeatureMatrix {
                house_id: id.to_string(),
                rooms: vec!["a".into(), "b".into()],
                window_starts: (0..6).map(|i| base + Duration::hours(i)).collect(),
                window_length_secs: 3600,
                counts,
            },
            label,
        }
    }

    fn houses() -> Vec<LabeledHouse> {
        vec![
            house("h1", 1.0, Occupancy::Single),
            house("h2", 1.5, Occupancy::Single),
            house("h3", 1.2, Occupancy::Single),
            house("h4", 9.0, Occupancy::Multiple),
            house("h5", 10.0, Occupancy::Multiple),
            house("h6", 8.5, Occupancy::Multiple),
        ]
    }

    fn rooms() -> Vec<String> {
        vec!["a".into(), "b".into()]
    }

    #[test]
    fn test_evaluate_split_majority() {
        let all = houses();
        let train: Vec<&LabeledHouse> = all[..4].iter().collect();
        let test: Vec<&LabeledHouse> = all[4..].iter().collect();
        let settings = ModelSettings {
            kind: ModelKind::Majority,
            ..ModelSettings::default()
        };

        let result = evaluate_split(&train, &test, &rooms(), &settings).unwrap();
        assert_eq!(result.classifier, "majority");
        // Train labels are 3 Single vs 1 Multiple
        assert!(result
            .predictions
            .iter()
            .all(|p| p.predicted == Occupancy::Single));
        assert_eq!(result.evaluation.accuracy, 0.0);
        assert_eq!(result.predictions.len(), 2);
    }

    #[test]
    fn test_cross_validate_separable() {
        let all = houses();
        let refs: Vec<&LabeledHouse> = all.iter().collect();
        let settings = ModelSettings {
            kind: ModelKind::Knn,
            knn_k: 1,
            var_lag: None,
        };

        let scores = cross_validate(&refs, &rooms(), &settings, 3, 42)
            .unwrap()
            .unwrap();
        assert_eq!(scores.folds.len(), 3);
        assert!((scores.mean_accuracy - 1.0).abs() < 1e-12);
        assert!(scores.summary().contains("3 folds"));
    }

    #[test]
    fn test_cross_validate_too_few_houses() {
        let all = houses();
        let refs: Vec<&LabeledHouse> = all[..1].iter().collect();
        let scores = cross_validate(&refs, &rooms(), &ModelSettings::default(), 5, 1).unwrap();
        assert!(scores.is_none());
    }
}
