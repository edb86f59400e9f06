//! Small descriptive statistics used by the fitter and the calibration.

use nalgebra::{DMatrix, DVector};

use crate::math::solve_least_squares;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Coefficient of determination `1 - SS_res / SS_tot`.
///
/// Not clamped: a fit worse than the mean-only model yields a negative value.
/// Returns `NaN` when the observations have zero variance (R² is undefined).
pub fn r_squared(observed: &[f64], fitted: &[f64]) -> f64 {
    let Some(y_bar) = mean(observed) else {
        return f64::NAN;
    };
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (&y, &f) in observed.iter().zip(fitted) {
        ss_res += (y - f) * (y - f);
        ss_tot += (y - y_bar) * (y - y_bar);
    }
    if ss_tot <= 0.0 {
        return f64::NAN;
    }
    1.0 - ss_res / ss_tot
}

/// Ordinary least squares line `y = slope · x + intercept`.
///
/// Returns `None` with fewer than two points or when `x` is constant.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let x0 = x[0];
    if x[..n].iter().all(|&v| (v - x0).abs() <= f64::EPSILON * x0.abs().max(1.0)) {
        return None;
    }

    let mut design = DMatrix::<f64>::zeros(n, 2);
    let mut obs = DVector::<f64>::zeros(n);
    for i in 0..n {
        design[(i, 0)] = 1.0;
        design[(i, 1)] = x[i];
        obs[i] = y[i];
    }
    let beta = solve_least_squares(&design, &obs)?;
    Some((beta[1], beta[0]))
}
