//! Heater calibration curve.
//!
//! Heater runs deposit a known electric load. Regressing the fitted
//! (measured) loads on the nominal loads gives
//!
//! ```text
//! measured = slope · nominal + intercept
//! ```
//!
//! and inverting that line corrects any raw load back to the nominal scale:
//!
//! ```text
//! corrected = (raw - intercept) / slope = raw / slope + intercept_adjust_w
//! ```
//!
//! Fewer than two distinct heater loads cannot pin down both coefficients, so
//! the builder degrades (proportional, then identity) and reports a warning
//! instead of failing the session.

use log::debug;

use crate::domain::{CalibrationCurve, CalibrationKind};
use crate::error::CalorimetryError;
use crate::math::linear_fit;

impl CalibrationCurve {
    /// Pass-through calibration.
    pub fn identity() -> Self {
        Self {
            slope: 1.0,
            intercept: 0.0,
            intercept_adjust_w: 0.0,
            n_runs: 0,
            kind: CalibrationKind::Identity,
        }
    }

    /// Map a raw fitted load onto the nominal (electric) scale.
    pub fn correct(&self, raw_w: f64) -> f64 {
        (raw_w - self.intercept) / self.slope
    }
}

/// Calibration plus the reason it was degraded, if it was.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationBuild {
    pub curve: CalibrationCurve,
    pub warning: Option<CalorimetryError>,
}

/// Build the session calibration from `(nominal_w, measured_w)` heater pairs.
///
/// The result does not depend on the order of `points`.
pub fn build_calibration(points: &[(f64, f64)]) -> CalibrationBuild {
    let mut usable: Vec<(f64, f64)> = points
        .iter()
        .copied()
        .filter(|(n, m)| n.is_finite() && m.is_finite())
        .collect();
    usable.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

    let Some((&(first, _), &(last, _))) = usable.first().zip(usable.last()) else {
        return degraded(CalibrationCurve::identity(), "no usable heater runs; loads are not corrected");
    };

    if first != last {
        let (x, y): (Vec<f64>, Vec<f64>) = usable.iter().copied().unzip();
        return match linear_fit(&x, &y) {
            Some((slope, intercept)) if slope.is_finite() && slope > 0.0 && intercept.is_finite() => {
                debug!("calibration regression over {} heater runs: slope={slope:.6} intercept={intercept:.6}", usable.len());
                CalibrationBuild {
                    curve: CalibrationCurve {
                        slope,
                        intercept,
                        intercept_adjust_w: -intercept / slope,
                        n_runs: usable.len(),
                        kind: CalibrationKind::Regression,
                    },
                    warning: None,
                }
            }
            _ => degraded(
                CalibrationCurve::identity(),
                "heater regression produced a non-positive slope; loads are not corrected",
            ),
        };
    }

    // One distinct heater load: only a gain can be determined.
    let nominal_sum: f64 = usable.iter().map(|p| p.0).sum();
    let measured_sum: f64 = usable.iter().map(|p| p.1).sum();
    let slope = measured_sum / nominal_sum;
    if !(slope.is_finite() && slope > 0.0) {
        return degraded(
            CalibrationCurve::identity(),
            "single heater load gives no usable gain; loads are not corrected",
        );
    }

    degraded(
        CalibrationCurve {
            slope,
            intercept: 0.0,
            intercept_adjust_w: 0.0,
            n_runs: usable.len(),
            kind: CalibrationKind::Proportional,
        },
        "only one distinct heater load; using a proportional calibration",
    )
}

fn degraded(curve: CalibrationCurve, reason: &str) -> CalibrationBuild {
    CalibrationBuild {
        curve,
        warning: Some(CalorimetryError::DegenerateCalibration {
            reason: reason.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // measured = 1.04 · nominal + 0.35
    const ANCHORS: [(f64, f64); 2] = [(1.13, 1.5252), (9.81, 10.5524)];

    #[test]
    fn intercept_adjust_is_order_independent() {
        let forward = build_calibration(&ANCHORS);
        let reversed = build_calibration(&[ANCHORS[1], ANCHORS[0]]);
        assert_eq!(
            forward.curve.intercept_adjust_w.to_bits(),
            reversed.curve.intercept_adjust_w.to_bits()
        );
        assert_eq!(forward.curve.slope.to_bits(), reversed.curve.slope.to_bits());
        assert!(forward.warning.is_none());
        assert_eq!(forward.curve.kind, CalibrationKind::Regression);
    }

    #[test]
    fn regression_recovers_line_and_intercept_adjust() {
        let curve = build_calibration(&ANCHORS).curve;
        assert!((curve.slope - 1.04).abs() < 1e-9);
        assert!((curve.intercept - 0.35).abs() < 1e-9);
        assert!((curve.intercept_adjust_w + 0.35 / 1.04).abs() < 1e-9);
        assert_eq!(curve.n_runs, 2);
    }

    #[test]
    fn correction_reproduces_anchor_loads() {
        let curve = build_calibration(&ANCHORS).curve;
        for (nominal, measured) in ANCHORS {
            assert!((curve.correct(measured) - nominal).abs() < 1e-9);
        }
    }

    #[test]
    fn unit_slope_correction_subtracts_intercept() {
        let curve = build_calibration(&[(2.0, 2.5), (8.0, 8.5)]).curve;
        assert!((curve.correct(20.5) - 20.0).abs() < 1e-9);
        assert!((curve.intercept_adjust_w + 0.5).abs() < 1e-9);
    }

    #[test]
    fn single_load_is_proportional_with_warning() {
        let build = build_calibration(&[(5.0, 5.5), (5.0, 5.3)]);
        assert_eq!(build.curve.kind, CalibrationKind::Proportional);
        assert!((build.curve.slope - 1.08).abs() < 1e-12);
        assert_eq!(build.curve.intercept, 0.0);
        assert!(matches!(build.warning, Some(CalorimetryError::DegenerateCalibration { .. })));
    }

    #[test]
    fn no_points_is_identity_with_warning() {
        let build = build_calibration(&[]);
        assert_eq!(build.curve, CalibrationCurve::identity());
        assert_eq!(build.curve.correct(12.5), 12.5);
        assert!(build.warning.is_some());
    }

    #[test]
    fn negative_slope_falls_back_to_identity() {
        let build = build_calibration(&[(1.0, 5.0), (5.0, 1.0)]);
        assert_eq!(build.curve.kind, CalibrationKind::Identity);
        assert!(build.warning.is_some());
    }
}
