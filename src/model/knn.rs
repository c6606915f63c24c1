//! k-nearest-neighbours on standardised features.

use crate::loader::types::Occupancy;
use crate::model::{check_training_shape, Classifier, ModelError};
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Majority vote among the `k` nearest training houses (Euclidean distance
/// after z-scoring with training statistics).
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    k: usize,
    fitted: Option<Fitted>,
}

#[derive(Debug, Clone)]
struct Fitted {
    mean: Array1<f64>,
    scale: Array1<f64>,
    x: Array2<f64>,
    y: Vec<Occupancy>,
}

impl KnnClassifier {
    pub fn new(k: usize) -> Self {
        Self { k, fitted: None }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn standardise(&self, fitted: &Fitted, x: &Array2<f64>) -> Array2<f64> {
        (x - &fitted.mean) / &fitted.scale
    }

    /// Vote among the nearest neighbours; a tie goes to the single nearest.
    fn vote(&self, fitted: &Fitted, sample: ArrayView1<'_, f64>) -> Occupancy {
        let mut distances: Vec<(f64, usize)> = fitted
            .x
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let d: f64 = row
                    .iter()
                    .zip(sample.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                (d.sqrt(), i)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let k = self.k.min(distances.len());
        let neighbours = &distances[..k];
        let multiple = neighbours
            .iter()
            .filter(|(_, i)| fitted.y[*i] == Occupancy::Multiple)
            .count();
        let single = k - multiple;

        match single.cmp(&multiple) {
            std::cmp::Ordering::Greater => Occupancy::Single,
            std::cmp::Ordering::Less => Occupancy::Multiple,
            std::cmp::Ordering::Equal => fitted.y[neighbours[0].1],
        }
    }
}

impl Classifier for KnnClassifier {
    fn name(&self) -> &'static str {
        "knn"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &[Occupancy]) -> Result<(), ModelError> {
        if self.k == 0 {
            return Err(ModelError::InvalidParameter("k must be at least 1".to_string()));
        }
        check_training_shape(x, y)?;

        let mean = x
            .mean_axis(Axis(0))
            .ok_or(ModelError::EmptyTrainingSet)?;
        // Constant features keep unit scale
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });

        let mut fitted = Fitted {
            mean,
            scale,
            x: Array2::zeros((0, 0)),
            y: y.to_vec(),
        };
        fitted.x = self.standardise(&fitted, x);
        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<Occupancy>, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        if x.ncols() != fitted.mean.len() {
            return Err(ModelError::DimensionMismatch {
                expected: fitted.mean.len(),
                got: x.ncols(),
            });
        }

        let scaled = self.standardise(fitted, x);
        Ok(scaled
            .rows()
            .into_iter()
            .map(|row| self.vote(fitted, row))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_knn_classifier() {
        let x_train = array![
            [1.0, 1.0],
            [1.0, 2.0],
            [2.0, 1.0],
            [5.0, 5.0],
            [5.0, 6.0],
            [6.0, 5.0]
        ];
        let y_train = [
            Occupancy::Single,
            Occupancy::Single,
            Occupancy::Single,
            Occupancy::Multiple,
            Occupancy::Multiple,
            Occupancy::Multiple,
        ];

        let mut knn = KnnClassifier::new(3);
        knn.fit(&x_train, &y_train).unwrap();

        let predictions = knn.predict(&array![[1.5, 1.5], [5.5, 5.5]]).unwrap();
        assert_eq!(predictions, vec![Occupancy::Single, Occupancy::Multiple]);
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let mut knn = KnnClassifier::new(10);
        knn.fit(
            &array![[0.0], [1.0], [10.0]],
            &[Occupancy::Single, Occupancy::Multiple, Occupancy::Multiple],
        )
        .unwrap();
        assert_eq!(
            knn.predict(&array![[0.0]]).unwrap(),
            vec![Occupancy::Multiple]
        );
    }

    #[test]
    fn test_tie_goes_to_nearest() {
        let mut knn = KnnClassifier::new(2);
        knn.fit(
            &array![[0.0], [10.0]],
            &[Occupancy::Single, Occupancy::Multiple],
        )
        .unwrap();
        assert_eq!(
            knn.predict(&array![[1.0], [9.0]]).unwrap(),
            vec![Occupancy::Single, Occupancy::Multiple]
        );
    }

    #[test]
    fn test_invalid_k() {
        let mut knn = KnnClassifier::new(0);
        assert!(matches!(
            knn.fit(&array![[0.0]], &[Occupancy::Single]),
            Err(ModelError::InvalidParameter(_))
        ));
    }
}
