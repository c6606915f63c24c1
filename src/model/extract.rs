//! Fixed-length feature vectors from house matrices.
//!
//! Houses observe different numbers of windows, so classifiers work on
//! summaries of the series rather than the raw matrix.

use crate::core::var::{fit_var, VarModel, DEFAULT_RIDGE};
use crate::core::HouseFeatureMatrix;
use crate::model::ModelError;
use ndarray::{Array1, Array2};
use statrs::statistics::Statistics;

/// Turns a [`HouseFeatureMatrix`] into a feature vector with a fixed layout.
///
/// Per room: mean count per window, population standard deviation, and the
/// fraction of windows with any activity. Across rooms: the fraction of
/// windows where two or more rooms are active, and the mean number of active
/// rooms per window. Optionally followed by VAR(p) intercepts and coefficients.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    rooms: Vec<String>,
    var_lag: Option<usize>,
}

const PER_ROOM: [&str; 3] = ["mean", "std", "active_fraction"];

impl FeatureExtractor {
    pub fn new(rooms: Vec<String>, var_lag: Option<usize>) -> Self {
        Self { rooms, var_lag }
    }

    pub fn rooms(&self) -> &[String] {
        &self.rooms
    }

    pub fn dimension(&self) -> usize {
        let var = self
            .var_lag
            .map(|lag| VarModel::flat_len(self.rooms.len(), lag))
            .unwrap_or(0);
        self.rooms.len() * PER_ROOM.len() + 2 + var
    }

    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .rooms
            .iter()
            .flat_map(|room| PER_ROOM.iter().map(move |stat| format!("{room}.{stat}")))
            .collect();
        names.push("co_active_fraction".to_string());
        names.push("mean_active_rooms".to_string());

        if let Some(lag) = self.var_lag {
            names.extend(self.rooms.iter().map(|room| format!("var.intercept.{room}")));
            for target in &self.rooms {
                for l in 1..=lag {
                    for source in &self.rooms {
                        names.push(format!("var.{target}.{source}.lag{l}"));
                    }
                }
            }
        }

        names
    }

    /// Room columns re-ordered to this extractor's layout. Unknown rooms are zero.
    fn aligned(&self, matrix: &HouseFeatureMatrix) -> Array2<f64> {
        let mut aligned = Array2::<f64>::zeros((matrix.n_windows(), self.rooms.len()));
        for (col, room) in self.rooms.iter().enumerate() {
            if let Some(series) = matrix.room_series(room) {
                aligned.column_mut(col).assign(&series);
            }
        }
        aligned
    }

    pub fn vectorize(&self, matrix: &HouseFeatureMatrix) -> Result<Array1<f64>, ModelError> {
        let series = self.aligned(matrix);
        let n_windows = series.nrows();
        let mut features = Vec::with_capacity(self.dimension());

        for column in series.columns() {
            if n_windows == 0 {
                features.extend([0.0; 3]);
                continue;
            }
            let active = column.iter().filter(|&&v| v > 0.0).count();
            features.push(column.iter().mean());
            features.push(column.iter().population_std_dev());
            features.push(active as f64 / n_windows as f64);
        }

        let active_rooms: Vec<f64> = series
            .rows()
            .into_iter()
            .map(|row| row.iter().filter(|&&v| v > 0.0).count() as f64)
            .collect();
        if active_rooms.is_empty() {
            features.extend([0.0, 0.0]);
        } else {
            let co_active = active_rooms.iter().filter(|&&n| n >= 2.0).count();
            features.push(co_active as f64 / active_rooms.len() as f64);
            features.push(active_rooms.iter().mean());
        }

        if let Some(lag) = self.var_lag {
            let model = fit_var(&series, lag, DEFAULT_RIDGE).map_err(|source| {
                ModelError::Features {
                    house_id: matrix.house_id.clone(),
                    source,
                }
            })?;
            features.extend(model.flatten());
        }

        Ok(Array1::from_vec(features))
    }

    /// Stack feature vectors into a `(houses, features)` matrix.
    pub fn transform(&self, matrices: &[&HouseFeatureMatrix]) -> Result<Array2<f64>, ModelError> {
        let dim = self.dimension();
        let mut x = Array2::<f64>::zeros((matrices.len(), dim));
        for (row, matrix) in matrices.iter().enumerate() {
            let features = self.vectorize(matrix)?;
            if features.len() != dim {
                return Err(ModelError::DimensionMismatch {
                    expected: dim,
                    got: features.len(),
                });
            }
            x.row_mut(row).assign(&features);
        }
        Ok(x)
    }
}
