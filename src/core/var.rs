//! Vector autoregression over per-room count series.
//!
//! Fits `y_t = c + A_1 y_{t-1} + ... + A_p y_{t-p} + e_t` by least squares,
//! solving the normal equations with a Cholesky factorisation. A small ridge
//! term on the lag coefficients keeps the system positive definite when a
//! room never fires (an all-zero column).

use crate::core::DataError;
use ndarray::{s, Array1, Array2, Axis};

/// Default ridge penalty on lag coefficients.
pub const DEFAULT_RIDGE: f64 = 1e-6;

/// Fitted VAR(p) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct VarModel {
    pub lag: usize,
    /// One intercept per room.
    pub intercept: Array1<f64>,
    /// Shape `(rooms, rooms * lag)`. Entry `[i, l * rooms + j]` is the effect
    /// of room `j` at lag `l + 1` on room `i`.
    pub coefficients: Array2<f64>,
}

impl VarModel {
    pub fn n_rooms(&self) -> usize {
        self.intercept.len()
    }

    /// Intercepts followed by the row-major coefficient matrix.
    pub fn flatten(&self) -> Vec<f64> {
        self.intercept
            .iter()
            .chain(self.coefficients.iter())
            .copied()
            .collect()
    }

    /// Length of [`VarModel::flatten`] for a given shape.
    pub fn flat_len(rooms: usize, lag: usize) -> usize {
        rooms + rooms * rooms * lag
    }

    /// One-step-ahead prediction from the most recent `lag` observations,
    /// newest last.
    pub fn forecast(&self, history: &Array2<f64>) -> Option<Array1<f64>> {
        let k = self.n_rooms();
        if history.nrows() < self.lag || history.ncols() != k {
            return None;
        }

        let mut prediction = self.intercept.clone();
        for l in 0..self.lag {
            let row = history.row(history.nrows() - 1 - l);
            let block = self.coefficients.slice(s![.., l * k..(l + 1) * k]);
            prediction += &block.dot(&row);
        }
        Some(prediction)
    }
}

/// Fit a VAR(`lag`) model to a `(windows, rooms)` series.
pub fn fit_var(series: &Array2<f64>, lag: usize, ridge: f64) -> Result<VarModel, DataError> {
    let (n_windows, k) = series.dim();
    if lag == 0 || n_windows <= lag {
        return Err(DataError::SeriesTooShort {
            windows: n_windows,
            lag,
        });
    }

    let n_obs = n_windows - lag;
    let n_params = 1 + k * lag;

    // Design row for time t: [1, y_{t-1}, ..., y_{t-lag}]
    let mut design = Array2::<f64>::zeros((n_obs, n_params));
    for (row, t) in (lag..n_windows).enumerate() {
        design[[row, 0]] = 1.0;
        for l in 0..lag {
            let past = series.row(t - 1 - l);
            design
                .slice_mut(s![row, 1 + l * k..1 + (l + 1) * k])
                .assign(&past);
        }
    }
    let targets = series.slice(s![lag.., ..]);

    let mut xtx = design.t().dot(&design);
    for i in 0..n_params {
        xtx[[i, i]] += if i == 0 { 1e-10 } else { ridge };
    }
    let xty = design.t().dot(&targets);

    let l = cholesky(&xtx)?;

    let mut intercept = Array1::<f64>::zeros(k);
    let mut coefficients = Array2::<f64>::zeros((k, k * lag));
    for (room, rhs) in xty.axis_iter(Axis(1)).enumerate() {
        let beta = cholesky_solve(&l, &rhs.to_owned());
        intercept[room] = beta[0];
        coefficients.row_mut(room).assign(&beta.slice(s![1..]));
    }

    Ok(VarModel {
        lag,
        intercept,
        coefficients,
    })
}

/// Lower-triangular factor `L` with `A = L Lᵀ`.
fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>, DataError> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return Err(DataError::SingularSystem);
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    Ok(l)
}

/// Solve `L Lᵀ x = b` by forward then backward substitution.
fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (z[i] - sum) / l[[i, i]];
    }

    x
}
