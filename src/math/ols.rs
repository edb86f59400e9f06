//! Least squares solvers.
//!
//! Two small problems show up repeatedly:
//!
//! ```text
//! minimize ‖y - X β‖²
//! ```
//!
//! - seeding the decay fitter: for a fixed τ the relaxation model is linear in
//!   `(asymptote, amplitude)`
//! - the heater calibration line `measured = slope · nominal + intercept`
//!
//! Implementation choices:
//! - We use SVD so tall design matrices (more rows than columns) are handled
//!   robustly. (Nalgebra's `QR::solve` is intended for square systems and will
//!   panic for non-square matrices.)
//! - Parameter dimension is tiny (2–3 columns), so SVD cost is irrelevant.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the small symmetric system `A δ = g` arising from damped normal equations.
///
/// Cholesky first (the damped matrix is positive definite unless the Jacobian
/// is degenerate), then SVD as a fallback.
pub fn solve_normal_equations(a: &DMatrix<f64>, g: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = a.clone().cholesky() {
        let delta = chol.solve(g);
        if delta.iter().all(|v| v.is_finite()) {
            return Some(delta);
        }
    }
    solve_least_squares(a, g)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn normal_equations_match_direct_solution() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let g = DVector::from_row_slice(&[1.0, 2.0]);
        let delta = solve_normal_equations(&a, &g).unwrap();
        let back = &a * &delta;
        assert!((back[0] - 1.0).abs() < 1e-12);
        assert!((back[1] - 2.0).abs() < 1e-12);
    }
}
