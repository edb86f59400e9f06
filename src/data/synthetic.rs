//! Synthetic calorimeter transients.
//!
//! Used by the `demo` command and throughout the tests. A transient is a flat
//! pre-step baseline followed by a single-exponential approach to a new level:
//!
//! ```text
//! y_i = baseline                                   (i < pre_step_samples)
//! y_i = baseline + step · (1 - exp(-k·dt / tau))   (k = i - pre_step_samples)
//! ```
//!
//! plus optional Gaussian noise from a seeded `StdRng`, so the same seed always
//! reproduces the same series.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{HeatLoadModel, Q0Formula, Run, RunId, SampleSeries, Session, SessionConstants};
use crate::error::CalorimetryError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransientSpec {
    pub pre_step_samples: usize,
    pub post_step_samples: usize,
    /// Sample spacing in seconds.
    pub dt: f64,
    pub t_start: f64,
    pub baseline: f64,
    /// Final change in signal (asymptote − baseline).
    pub step: f64,
    pub tau: f64,
    pub noise_sigma: f64,
}

pub fn generate_transient(spec: &TransientSpec, seed: u64) -> Result<SampleSeries, CalorimetryError> {
    if !(spec.dt.is_finite() && spec.dt > 0.0) {
        return Err(CalorimetryError::InvalidSamples {
            reason: format!("sample spacing must be > 0, got {}", spec.dt),
        });
    }
    if !(spec.tau.is_finite() && spec.tau > 0.0) {
        return Err(CalorimetryError::InvalidSamples {
            reason: format!("tau must be > 0, got {}", spec.tau),
        });
    }
    if !(spec.noise_sigma.is_finite() && spec.noise_sigma >= 0.0) {
        return Err(CalorimetryError::InvalidSamples {
            reason: format!("noise sigma must be >= 0, got {}", spec.noise_sigma),
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).map_err(|e| CalorimetryError::InvalidSamples {
        reason: format!("noise distribution error: {e}"),
    })?;

    let n = spec.pre_step_samples + spec.post_step_samples;
    let mut times = Vec::with_capacity(n);
    let mut signal = Vec::with_capacity(n);
    for i in 0..n {
        let t = spec.t_start + i as f64 * spec.dt;
        let clean = match i.checked_sub(spec.pre_step_samples) {
            None => spec.baseline,
            Some(k) => spec.baseline + spec.step * (1.0 - (-(k as f64) * spec.dt / spec.tau).exp()),
        };
        // Always draw, so the noise pattern is the same for every sigma.
        let z: f64 = normal.sample(&mut rng);
        times.push(t);
        signal.push(clean + spec.noise_sigma * z);
    }

    SampleSeries::new(times, signal)
}

/// True Q0 of the demo cavity.
pub const DEMO_Q0: f64 = 1e10;
/// Calorimeter bias applied to every demo load: `measured = gain · actual + offset`.
pub const DEMO_GAIN: f64 = 1.04;
pub const DEMO_OFFSET_W: f64 = 0.35;

const DEMO_CAVITY: &str = "DEMO-1";
const DEMO_WATTS_PER_UNIT: f64 = 2.0;
const DEMO_R_OVER_Q_OHM: f64 = 1012.0;
const DEMO_LENGTH_M: f64 = 1.038;
const DEMO_HEATER_LOADS_W: [f64; 3] = [1.13, 4.9, 9.81];
const DEMO_GRADIENTS_MVM: [f64; 3] = [8.0, 12.0, 16.0];
const DEMO_PRESSURE_TORR: f64 = 23.6;

fn demo_transient(actual_w: f64, noise_sigma: f64, seed: u64) -> Result<SampleSeries, CalorimetryError> {
    let measured_w = DEMO_GAIN * actual_w + DEMO_OFFSET_W;
    generate_transient(
        &TransientSpec {
            pre_step_samples: 10,
            post_step_samples: 43,
            dt: 0.9,
            t_start: 0.0,
            baseline: 1.0,
            step: measured_w / DEMO_WATTS_PER_UNIT,
            tau: 6.0,
            noise_sigma,
        },
        seed,
    )
}

/// A complete session: three heater anchors and three RF runs on a cavity
/// with Q0 = [`DEMO_Q0`]. The last RF run carries a concurrent 2 W heater load.
pub fn demo_session(seed: u64, noise_sigma: f64) -> Result<Session, CalorimetryError> {
    let mut runs = Vec::with_capacity(DEMO_HEATER_LOADS_W.len() + DEMO_GRADIENTS_MVM.len());
    let mut index = 1;

    for &load in &DEMO_HEATER_LOADS_W {
        let samples = demo_transient(load, noise_sigma, seed.wrapping_add(index as u64))?;
        runs.push(Run::heater(RunId::new(DEMO_CAVITY, index), samples, load));
        index += 1;
    }

    for (i, &gradient) in DEMO_GRADIENTS_MVM.iter().enumerate() {
        let voltage = gradient * 1e6 * DEMO_LENGTH_M;
        let rf_w = voltage * voltage / (DEMO_R_OVER_Q_OHM * DEMO_Q0);
        let electric_w = if i + 1 == DEMO_GRADIENTS_MVM.len() { 2.0 } else { 0.0 };
        let samples = demo_transient(rf_w + electric_w, noise_sigma, seed.wrapping_add(index as u64))?;
        let mut run = Run::rf(RunId::new(DEMO_CAVITY, index), samples, gradient, Some(DEMO_PRESSURE_TORR));
        if electric_w > 0.0 {
            run = run.with_electric_load(electric_w);
        }
        runs.push(run);
        index += 1;
    }

    Ok(Session {
        cavity_id: DEMO_CAVITY.to_string(),
        constants: SessionConstants {
            calorimeter: Some(HeatLoadModel::Conductance {
                watts_per_unit: DEMO_WATTS_PER_UNIT,
            }),
            q0: Some(Q0Formula::Geometry {
                r_over_q_ohm: DEMO_R_OVER_Q_OHM,
                effective_length_m: DEMO_LENGTH_M,
            }),
        },
        runs,
        rejected: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunKind;

    #[test]
    fn transient_is_flat_then_relaxes() {
        let spec = TransientSpec {
            pre_step_samples: 5,
            post_step_samples: 20,
            dt: 1.0,
            t_start: 10.0,
            baseline: 2.0,
            step: 3.0,
            tau: 4.0,
            noise_sigma: 0.0,
        };
        let series = generate_transient(&spec, 0).unwrap();
        assert_eq!(series.len(), 25);
        assert!(series.signal()[..6].iter().all(|&y| y == 2.0));
        assert!((series.signal()[9] - (2.0 + 3.0 * (1.0 - (-1.0_f64).exp()))).abs() < 1e-12);
        assert_eq!(series.times()[0], 10.0);
    }

    #[test]
    fn same_seed_same_noise() {
        let spec = TransientSpec {
            pre_step_samples: 0,
            post_step_samples: 30,
            dt: 0.5,
            t_start: 0.0,
            baseline: 0.0,
            step: 1.0,
            tau: 3.0,
            noise_sigma: 0.1,
        };
        assert_eq!(generate_transient(&spec, 5).unwrap(), generate_transient(&spec, 5).unwrap());
        assert_ne!(generate_transient(&spec, 5).unwrap(), generate_transient(&spec, 6).unwrap());
    }

    #[test]
    fn demo_session_has_heaters_and_rf_runs() {
        let session = demo_session(1, 0.0).unwrap();
        let heaters = session.runs.iter().filter(|r| r.kind == RunKind::Heater).count();
        let rf = session.runs.iter().filter(|r| r.kind == RunKind::Rf).count();
        assert_eq!((heaters, rf), (3, 3));
        assert!(session.constants.calorimeter.is_some());
        assert_eq!(session.runs.last().and_then(|r| r.electric_load_w), Some(2.0));
    }
}
