//! Unloaded quality factor from the corrected RF heat load.
//!
//! ```text
//! Q0 = (E · L)² / ((R/Q) · P)
//! ```
//!
//! - `E`: accelerating gradient (V/m)
//! - `L`: effective accelerating length (m)
//! - `R/Q`: geometric shunt impedance (Ω)
//! - `P`: RF heat load dissipated in the cavity walls (W)
//!
//! The helium-corrected variant refers the result to a 2 K bath using the
//! bath temperature inferred from the average helium pressure.

use crate::domain::{Q0Formula, Q0Result};
use crate::error::CalorimetryError;

/// Design RF dissipation at the reference gradient.
const DESIGN_HEAT_W: f64 = 9.6;
const DESIGN_GRADIENT_MVM: f64 = 16.0;

// Bath temperature from pressure: T = slope · p + offset (K, Torr).
const BATH_T_PER_TORR: f64 = 0.0125;
const BATH_T_OFFSET_K: f64 = 1.705;
const REFERENCE_T_K: f64 = 2.0;

// Surface resistance fit coefficients.
const RS_C1: f64 = 271.0;
const RS_C2: f64 = 0.0000726;
const RS_C3: f64 = 0.00000214;
const RS_C4_OFFSET: f64 = 0.7;
const RS_C5: f64 = 0.000000043;
const RS_C6: f64 = -17.02;

/// Expected RF heat load at `gradient_mvm` for a design-Q0 cavity.
pub fn design_heat_estimate_w(gradient_mvm: f64) -> f64 {
    if gradient_mvm > 0.0 {
        DESIGN_HEAT_W * (gradient_mvm / DESIGN_GRADIENT_MVM).powi(2)
    } else {
        0.0
    }
}

/// Bath temperature (K) for an average helium pressure (Torr).
pub fn bath_temperature_k(pressure_torr: f64) -> f64 {
    BATH_T_PER_TORR * pressure_torr + BATH_T_OFFSET_K
}

/// Compute Q0 from a corrected RF heat load.
pub fn compute_q0(
    formula: &Q0Formula,
    rf_heat_load_w: f64,
    gradient_mvm: f64,
    avg_pressure_torr: Option<f64>,
) -> Result<Q0Result, CalorimetryError> {
    if !(rf_heat_load_w.is_finite() && rf_heat_load_w > 0.0) {
        return Err(CalorimetryError::InvalidHeatLoad { watts: rf_heat_load_w });
    }
    if !(gradient_mvm.is_finite() && gradient_mvm > 0.0) {
        return Err(CalorimetryError::InvalidGradient { gradient_mvm });
    }

    let (r_over_q, length, corrected) = match *formula {
        Q0Formula::Geometry {
            r_over_q_ohm,
            effective_length_m,
        } => (r_over_q_ohm, effective_length_m, false),
        Q0Formula::HeliumCorrected {
            r_over_q_ohm,
            effective_length_m,
        } => (r_over_q_ohm, effective_length_m, true),
    };
    if !(r_over_q.is_finite() && r_over_q > 0.0) {
        return Err(CalorimetryError::missing_constant("r_over_q_ohm"));
    }
    if !(length.is_finite() && length > 0.0) {
        return Err(CalorimetryError::missing_constant("effective_length_m"));
    }

    let voltage = gradient_mvm * 1e6 * length;
    let mut q0 = voltage * voltage / (r_over_q * rf_heat_load_w);

    if corrected {
        let pressure = avg_pressure_torr
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| CalorimetryError::missing_constant("avg_pressure_torr"))?;
        q0 = refer_to_reference_temperature(q0, gradient_mvm, bath_temperature_k(pressure))
            .ok_or(CalorimetryError::InvalidHeatLoad { watts: rf_heat_load_w })?;
    }

    Ok(Q0Result {
        q0,
        gradient_mvm,
        rf_heat_load_w,
        temperature_corrected: corrected,
    })
}

/// Move a Q0 measured at `temperature_k` to the 2 K reference.
fn refer_to_reference_temperature(q0: f64, gradient_mvm: f64, temperature_k: f64) -> Option<f64> {
    let c4 = gradient_mvm - RS_C4_OFFSET;
    let c7 = RS_C2 - RS_C3 * c4 + RS_C5 * c4 * c4;

    let denom = (c7 / REFERENCE_T_K) * (RS_C6 / REFERENCE_T_K).exp() + RS_C1 / q0
        - (c7 / temperature_k) * (RS_C6 / temperature_k).exp();
    let corrected = RS_C1 / denom;
    (corrected.is_finite() && corrected > 0.0).then_some(corrected)
}
