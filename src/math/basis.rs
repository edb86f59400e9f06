//! Stable basis functions for single-exponential relaxation.
//!
//! The relaxation basis is:
//!
//! - `g(t, τ) = exp(-t/τ)`
//! - `∂g/∂τ = g(t, τ) · t / τ²`
//!
//! Numerical notes:
//! - `t` is measured from the cutoff, so it is non-negative; tiny negative values
//!   from timestamp jitter are clamped to zero.
//! - For very large `t/τ` the exponential underflows to zero, which is the
//!   correct limit; we short-circuit to avoid denormal arithmetic.

/// Beyond this exponent `exp(-x)` is below `1e-300` and treated as zero.
const MAX_X: f64 = 690.0;

/// Compute `exp(-t/τ)`.
///
/// Returns `NaN` for non-positive or non-finite `τ`; callers treat that as an
/// invalid parameter set.
pub fn relaxation(t: f64, tau: f64) -> f64 {
    if !(tau.is_finite() && tau > 0.0) {
        return f64::NAN;
    }
    let x = t.max(0.0) / tau;
    if x > MAX_X {
        return 0.0;
    }
    (-x).exp()
}

/// Compute `∂/∂τ exp(-t/τ) = exp(-t/τ) · t / τ²`.
pub fn relaxation_dtau(t: f64, tau: f64) -> f64 {
    let g = relaxation(t, tau);
    if g == 0.0 || !g.is_finite() {
        return g;
    }
    let t = t.max(0.0);
    g * t / (tau * tau)
}
