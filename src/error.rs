//! Error types.
//!
//! Two layers:
//!
//! - [`CalorimetryError`]: the numerical core's taxonomy. Per-run failures are
//!   carried inside reports, so the type is `Clone` and serializable.
//! - [`AppError`]: what the `q0` binary surfaces, a message plus a process exit code.

use serde::{Deserialize, Serialize};

/// Failures produced by the estimation pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalorimetryError {
    /// Too few samples remain after the cutoff for a fit.
    #[error("insufficient data: {available} samples available, {required} required")]
    InsufficientData { available: usize, required: usize },

    /// The solver exhausted its iteration budget.
    #[error("fit did not converge within {iterations} iterations")]
    FitDidNotConverge { iterations: usize },

    /// A required physical constant is absent, zero or non-finite.
    #[error("missing calibration constant: {name}")]
    MissingCalibrationConstant { name: String },

    /// A heat load that cannot feed a Q0 computation.
    #[error("invalid heat load: {watts} W")]
    InvalidHeatLoad { watts: f64 },

    /// Not enough heater runs for a full regression.
    #[error("degenerate calibration: {reason}")]
    DegenerateCalibration { reason: String },

    /// The sample series violates its invariants.
    #[error("invalid samples: {reason}")]
    InvalidSamples { reason: String },

    /// A fit that converged to a non-physical or non-finite solution.
    #[error("invalid fit: {reason}")]
    InvalidFit { reason: String },

    #[error("invalid RF gradient: {gradient_mvm} MV/m")]
    InvalidGradient { gradient_mvm: f64 },
}

impl CalorimetryError {
    pub fn missing_constant(name: impl Into<String>) -> Self {
        Self::MissingCalibrationConstant { name: name.into() }
    }

    /// Exit code used when this error aborts the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            CalorimetryError::MissingCalibrationConstant { .. } => 2,
            CalorimetryError::InsufficientData { .. }
            | CalorimetryError::InvalidSamples { .. }
            | CalorimetryError::DegenerateCalibration { .. }
            | CalorimetryError::InvalidGradient { .. } => 3,
            CalorimetryError::FitDidNotConverge { .. }
            | CalorimetryError::InvalidHeatLoad { .. }
            | CalorimetryError::InvalidFit { .. } => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<CalorimetryError> for AppError {
    fn from(err: CalorimetryError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calorimetry_errors_map_to_exit_codes() {
        let err: AppError = CalorimetryError::InsufficientData {
            available: 4,
            required: 10,
        }
        .into();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("4 samples available"));

        let err: AppError = CalorimetryError::FitDidNotConverge { iterations: 200 }.into();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn error_serializes_with_kind_tag() {
        let json = serde_json::to_string(&CalorimetryError::missing_constant("r_over_q_ohm")).unwrap();
        assert!(json.contains("\"kind\":\"missing_calibration_constant\""));
        assert!(json.contains("r_over_q_ohm"));
    }
}
