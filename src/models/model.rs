//! Single-exponential relaxation model.
//!
//! ```text
//! y(t) = asymptote + amplitude · exp(-(t - t_cutoff) / tau)
//! ```
//!
//! The fitter relies on two primitive operations:
//! - predict `y(t)` for a parameter vector (residuals, R², plots)
//! - fill a Jacobian row `∂y/∂(asymptote, amplitude, tau)` (Levenberg–Marquardt)
//!
//! Times passed here are already relative to the cutoff.

use crate::math::{relaxation, relaxation_dtau};

/// Number of free parameters.
pub const PARAM_COUNT: usize = 3;

/// Parameter vector in solver order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayParams {
    pub asymptote: f64,
    pub amplitude: f64,
    pub tau: f64,
}

impl DecayParams {
    pub fn to_array(self) -> [f64; PARAM_COUNT] {
        [self.asymptote, self.amplitude, self.tau]
    }

    pub fn from_array(p: [f64; PARAM_COUNT]) -> Self {
        Self {
            asymptote: p[0],
            amplitude: p[1],
            tau: p[2],
        }
    }

    /// All parameters finite and `tau > 0`.
    pub fn is_physical(&self) -> bool {
        self.asymptote.is_finite() && self.amplitude.is_finite() && self.tau.is_finite() && self.tau > 0.0
    }
}

/// Predict `y(t)` at time `t` relative to the cutoff.
pub fn predict(params: &DecayParams, t: f64) -> f64 {
    params.asymptote + params.amplitude * relaxation(t, params.tau)
}

/// Fill `∂y/∂(asymptote, amplitude, tau)` at time `t`.
pub fn fill_jacobian_row(params: &DecayParams, t: f64, out: &mut [f64; PARAM_COUNT]) {
    out[0] = 1.0;
    out[1] = relaxation(t, params.tau);
    out[2] = params.amplitude * relaxation_dtau(t, params.tau);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_endpoints() {
        let p = DecayParams {
            asymptote: 4.5,
            amplitude: -2.0,
            tau: 12.0,
        };
        assert!((predict(&p, 0.0) - 2.5).abs() < 1e-12);
        assert!((predict(&p, 1e5) - 4.5).abs() < 1e-12);
    }

    #[test]
    fn jacobian_matches_finite_difference() {
        let p = DecayParams {
            asymptote: 1.0,
            amplitude: 3.0,
            tau: 7.0,
        };
        let t = 4.2;
        let mut row = [0.0; PARAM_COUNT];
        fill_jacobian_row(&p, t, &mut row);

        let base = p.to_array();
        for j in 0..PARAM_COUNT {
            let h = 1e-6 * base[j].abs().max(1.0);
            let mut up = base;
            let mut dn = base;
            up[j] += h;
            dn[j] -= h;
            let fd = (predict(&DecayParams::from_array(up), t) - predict(&DecayParams::from_array(dn), t)) / (2.0 * h);
            assert!((fd - row[j]).abs() < 1e-7, "param {j}: fd={fd} an={}", row[j]);
        }
    }
}
