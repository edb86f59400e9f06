//! Fitted transient → heat load in Watts.
//!
//! The transform is supplied by the session constants (see [`HeatLoadModel`]).
//! Both models are monotonic in `|amplitude|`, so a larger step response
//! always means a larger load.

use crate::domain::{FitConfidence, FitResult, HeatLoadEstimate, HeatLoadModel, RunId};
use crate::error::CalorimetryError;

/// Convert a fit into a heat-load estimate for `run`.
pub fn heat_load(
    run: &RunId,
    fit: &FitResult,
    model: Option<&HeatLoadModel>,
) -> Result<HeatLoadEstimate, CalorimetryError> {
    let model = model.ok_or_else(|| CalorimetryError::missing_constant("calorimeter"))?;

    if fit.confidence == FitConfidence::Invalid {
        return Err(CalorimetryError::InvalidFit {
            reason: format!("tau={}, amplitude={}, r2={}", fit.tau, fit.amplitude, fit.r2),
        });
    }

    let watts = match *model {
        HeatLoadModel::Conductance { watts_per_unit } => {
            require_constant("watts_per_unit", watts_per_unit)? * fit.amplitude.abs()
        }
        HeatLoadModel::HeatCapacity { joules_per_unit } => {
            let c = require_constant("joules_per_unit", joules_per_unit)?;
            if !(fit.tau.is_finite() && fit.tau > 0.0) {
                return Err(CalorimetryError::InvalidFit {
                    reason: format!("non-positive tau {}", fit.tau),
                });
            }
            c * fit.amplitude.abs() / fit.tau
        }
    };

    if !watts.is_finite() {
        return Err(CalorimetryError::InvalidHeatLoad { watts });
    }

    Ok(HeatLoadEstimate {
        run: run.clone(),
        watts,
    })
}

fn require_constant(name: &str, value: f64) -> Result<f64, CalorimetryError> {
    if value.is_finite() && value != 0.0 {
        Ok(value.abs())
    } else {
        Err(CalorimetryError::missing_constant(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(amplitude: f64, tau: f64, confidence: FitConfidence) -> FitResult {
        FitResult {
            tau,
            amplitude,
            asymptote: 1.0,
            r2: 0.99,
            sse: 0.0,
            rmse: 0.0,
            n_samples: 40,
            iterations: 5,
            t_cutoff: 0.0,
            duration_seconds: 30.0,
            confidence,
        }
    }

    fn id() -> RunId {
        RunId::new("CAV1", 1)
    }

    #[test]
    fn conductance_scales_absolute_amplitude() {
        let model = HeatLoadModel::Conductance { watts_per_unit: 2.5 };
        let up = heat_load(&id(), &fit(-4.0, 6.0, FitConfidence::Good), Some(&model)).unwrap();
        let down = heat_load(&id(), &fit(4.0, 6.0, FitConfidence::Good), Some(&model)).unwrap();
        assert!((up.watts - 10.0).abs() < 1e-12);
        assert_eq!(up.watts, down.watts);
        assert_eq!(up.run, id());
    }

    #[test]
    fn heat_capacity_divides_by_tau() {
        let model = HeatLoadModel::HeatCapacity { joules_per_unit: 30.0 };
        let est = heat_load(&id(), &fit(2.0, 6.0, FitConfidence::Low), Some(&model)).unwrap();
        assert!((est.watts - 10.0).abs() < 1e-12);
    }

    #[test]
    fn monotonic_in_amplitude() {
        let model = HeatLoadModel::HeatCapacity { joules_per_unit: 1.0 };
        let mut last = 0.0;
        for a in [0.0, 0.5, 1.0, 2.0, 8.0] {
            let w = heat_load(&id(), &fit(a, 3.0, FitConfidence::Good), Some(&model)).unwrap().watts;
            assert!(w >= last);
            last = w;
        }
    }

    #[test]
    fn missing_or_zero_constant_is_rejected() {
        let f = fit(1.0, 1.0, FitConfidence::Good);
        assert!(matches!(
            heat_load(&id(), &f, None),
            Err(CalorimetryError::MissingCalibrationConstant { .. })
        ));
        let zero = HeatLoadModel::Conductance { watts_per_unit: 0.0 };
        assert!(matches!(
            heat_load(&id(), &f, Some(&zero)),
            Err(CalorimetryError::MissingCalibrationConstant { .. })
        ));
    }

    #[test]
    fn invalid_fit_is_rejected() {
        let model = HeatLoadModel::Conductance { watts_per_unit: 1.0 };
        let err = heat_load(&id(), &fit(1.0, 1.0, FitConfidence::Invalid), Some(&model)).unwrap_err();
        assert!(matches!(err, CalorimetryError::InvalidFit { .. }));
    }
}
