//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - loaded from session JSON files
//! - exported to JSON/CSV reports

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CalorimetryError;

/// Hard floor on the number of samples any fit window may contain.
pub const MIN_FIT_WINDOW: usize = 10;

/// What drove the transient in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Known electric heater power; used as a calibration anchor.
    Heater,
    /// RF field in the cavity; heat load is inferred and turned into Q0.
    Rf,
}

impl RunKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            RunKind::Heater => "Heater",
            RunKind::Rf => "RF",
        }
    }
}

/// Identity of a run within a test session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId {
    pub cavity_id: String,
    pub index: usize,
}

impl RunId {
    pub fn new(cavity_id: impl Into<String>, index: usize) -> Self {
        Self {
            cavity_id: cavity_id.into(),
            index,
        }
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} run {}", self.cavity_id, self.index)
    }
}

/// Validated `(time, signal)` samples for one run.
///
/// Invariants (checked on construction):
/// - equal-length, finite time and signal vectors
/// - time strictly increasing (no duplicate timestamps)
/// - at least [`MIN_FIT_WINDOW`] samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct SampleSeries {
    times: Vec<f64>,
    signal: Vec<f64>,
}

impl SampleSeries {
    pub fn new(times: Vec<f64>, signal: Vec<f64>) -> Result<Self, CalorimetryError> {
        if times.len() != signal.len() {
            return Err(CalorimetryError::InvalidSamples {
                reason: format!(
                    "time/signal length mismatch ({} vs {})",
                    times.len(),
                    signal.len()
                ),
            });
        }
        if times.len() < MIN_FIT_WINDOW {
            return Err(CalorimetryError::InsufficientData {
                available: times.len(),
                required: MIN_FIT_WINDOW,
            });
        }
        if let Some(i) = times.iter().position(|t| !t.is_finite()) {
            return Err(CalorimetryError::InvalidSamples {
                reason: format!("non-finite timestamp at index {i}"),
            });
        }
        if let Some(i) = signal.iter().position(|s| !s.is_finite()) {
            return Err(CalorimetryError::InvalidSamples {
                reason: format!("non-finite signal at index {i}"),
            });
        }
        if let Some(i) = times.windows(2).position(|w| w[1] <= w[0]) {
            return Err(CalorimetryError::InvalidSamples {
                reason: format!("timestamps not strictly increasing at index {}", i + 1),
            });
        }
        Ok(Self { times, signal })
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (f64, f64)>) -> Result<Self, CalorimetryError> {
        let (times, signal) = pairs.into_iter().unzip();
        Self::new(times, signal)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn signal(&self) -> &[f64] {
        &self.signal
    }

    /// Samples from `index` to the end.
    pub fn tail(&self, index: usize) -> (&[f64], &[f64]) {
        let index = index.min(self.len());
        (&self.times[index..], &self.signal[index..])
    }

    /// Time span from sample `index` to the last sample.
    pub fn duration_from(&self, index: usize) -> f64 {
        match (self.times.get(index), self.times.last()) {
            (Some(start), Some(end)) => end - start,
            _ => 0.0,
        }
    }
}

impl TryFrom<Vec<(f64, f64)>> for SampleSeries {
    type Error = CalorimetryError;

    fn try_from(pairs: Vec<(f64, f64)>) -> Result<Self, Self::Error> {
        Self::from_pairs(pairs)
    }
}

impl From<SampleSeries> for Vec<(f64, f64)> {
    fn from(series: SampleSeries) -> Self {
        series.times.into_iter().zip(series.signal).collect()
    }
}

/// One recorded transient plus its metadata. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub kind: RunKind,
    pub samples: SampleSeries,
    /// Known electric load (W) for heater runs used as calibration anchors.
    pub nominal_electric_load_w: Option<f64>,
    /// Average helium bath pressure during an RF run.
    pub avg_pressure_torr: Option<f64>,
    /// Accelerating gradient during an RF run.
    pub rf_gradient_mvm: Option<f64>,
    /// Heater power applied concurrently with RF; subtracted from the RF load.
    pub electric_load_w: Option<f64>,
}

impl Run {
    pub fn heater(id: RunId, samples: SampleSeries, nominal_electric_load_w: f64) -> Self {
        Self {
            id,
            kind: RunKind::Heater,
            samples,
            nominal_electric_load_w: Some(nominal_electric_load_w),
            avg_pressure_torr: None,
            rf_gradient_mvm: None,
            electric_load_w: None,
        }
    }

    pub fn rf(id: RunId, samples: SampleSeries, rf_gradient_mvm: f64, avg_pressure_torr: Option<f64>) -> Self {
        Self {
            id,
            kind: RunKind::Rf,
            samples,
            nominal_electric_load_w: None,
            avg_pressure_torr,
            rf_gradient_mvm: Some(rf_gradient_mvm),
            electric_load_w: None,
        }
    }

    pub fn with_electric_load(mut self, watts: f64) -> Self {
        self.electric_load_w = Some(watts);
        self
    }
}

/// Where the fit window starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutoffResult {
    /// First sample index included in the fit.
    pub cutoff_index: usize,
    /// Time span from the cutoff sample to the last sample.
    pub duration_seconds: f64,
}

/// How much to trust a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitConfidence {
    Good,
    /// R² below the configured floor. Still reported and used.
    Low,
    /// Non-physical or non-finite parameters. Excluded from aggregation.
    Invalid,
}

/// Fitted relaxation `asymptote + amplitude · exp(-(t - t_cutoff)/tau)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    pub tau: f64,
    pub amplitude: f64,
    pub asymptote: f64,
    pub r2: f64,
    pub sse: f64,
    pub rmse: f64,
    pub n_samples: usize,
    pub iterations: usize,
    /// Absolute time of the first fitted sample.
    pub t_cutoff: f64,
    pub duration_seconds: f64,
    pub confidence: FitConfidence,
}

/// Heat load implied by one run's transient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatLoadEstimate {
    pub run: RunId,
    pub watts: f64,
}

/// Transform from a fitted transient to Watts. Supplied per test stand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum HeatLoadModel {
    /// Signal is a temperature difference across a known conductance:
    /// `watts = watts_per_unit · |amplitude|`.
    Conductance { watts_per_unit: f64 },
    /// Lumped heat capacity: `watts = joules_per_unit · |amplitude| / tau`.
    HeatCapacity { joules_per_unit: f64 },
}

/// Formula turning a corrected RF heat load into Q0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "formula", rename_all = "snake_case")]
pub enum Q0Formula {
    /// `Q0 = (E · L)² / ((R/Q) · P)`.
    Geometry { r_over_q_ohm: f64, effective_length_m: f64 },
    /// Geometry Q0 referred to a 2 K bath using the measured helium pressure.
    HeliumCorrected { r_over_q_ohm: f64, effective_length_m: f64 },
}

/// Which kind of calibration a session ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationKind {
    /// Least squares line over two or more distinct heater loads.
    Regression,
    /// Single anchor: slope only, zero intercept.
    Proportional,
    /// No usable heater runs: loads pass through unchanged.
    Identity,
}

/// Linear map `measured = slope · nominal + intercept` fitted over heater runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCurve {
    pub slope: f64,
    pub intercept: f64,
    /// Nominal load at which the measured load is zero: `-intercept / slope`.
    pub intercept_adjust_w: f64,
    pub n_runs: usize,
    pub kind: CalibrationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Q0Result {
    pub q0: f64,
    pub gradient_mvm: f64,
    pub rf_heat_load_w: f64,
    pub temperature_corrected: bool,
}

/// Physical constants for one cavity/test stand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConstants {
    pub calorimeter: Option<HeatLoadModel>,
    pub q0: Option<Q0Formula>,
}

/// All runs belonging to one cavity test session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub cavity_id: String,
    pub constants: SessionConstants,
    pub runs: Vec<Run>,
    /// Runs whose samples could not be loaded. Reported as failed at ingest.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedRun>,
}

/// A run entry that never made it into a [`SampleSeries`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRun {
    pub id: RunId,
    pub kind: RunKind,
    pub nominal_electric_load_w: Option<f64>,
    pub avg_pressure_torr: Option<f64>,
    pub rf_gradient_mvm: Option<f64>,
    pub error: CalorimetryError,
}

/// Cutoff search mode as exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CutoffMode {
    /// Scan candidate cutoffs and keep the best R².
    BestFit,
    /// Start right after the largest sample-to-sample jump.
    PastSpike,
    /// Skip a settling time proportional to the expected heat-load change.
    SettleTime,
    /// Use a fixed index.
    Fixed,
}

/// Pipeline stage at which a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Cutoff,
    Fit,
    HeatLoad,
    Correction,
    Q0,
}

impl Stage {
    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Cutoff => "cutoff",
            Stage::Fit => "fit",
            Stage::HeatLoad => "heat load",
            Stage::Correction => "correction",
            Stage::Q0 => "Q0",
        }
    }
}

/// Explicit failure marker attached to a run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub stage: Stage,
    pub error: CalorimetryError,
}

/// Structured per-run output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub id: RunId,
    pub kind: RunKind,
    pub nominal_electric_load_w: Option<f64>,
    pub avg_pressure_torr: Option<f64>,
    pub rf_gradient_mvm: Option<f64>,
    pub cutoff: Option<CutoffResult>,
    pub fit: Option<FitResult>,
    /// Raw heat load from the fitted transient.
    pub heat_load_w: Option<f64>,
    /// Heat load after the session calibration.
    pub corrected_heat_load_w: Option<f64>,
    /// RF runs: corrected load minus any concurrent electric load.
    pub rf_heat_load_w: Option<f64>,
    pub q0: Option<Q0Result>,
    pub failure: Option<RunFailure>,
}

impl RunReport {
    pub fn new(run: &Run) -> Self {
        Self {
            id: run.id.clone(),
            kind: run.kind,
            nominal_electric_load_w: run.nominal_electric_load_w,
            avg_pressure_torr: run.avg_pressure_torr,
            rf_gradient_mvm: run.rf_gradient_mvm,
            cutoff: None,
            fit: None,
            heat_load_w: None,
            corrected_heat_load_w: None,
            rf_heat_load_w: None,
            q0: None,
            failure: None,
        }
    }

    /// Report for a run rejected at load time.
    pub fn rejected(run: &RejectedRun) -> Self {
        Self {
            id: run.id.clone(),
            kind: run.kind,
            nominal_electric_load_w: run.nominal_electric_load_w,
            avg_pressure_torr: run.avg_pressure_torr,
            rf_gradient_mvm: run.rf_gradient_mvm,
            cutoff: None,
            fit: None,
            heat_load_w: None,
            corrected_heat_load_w: None,
            rf_heat_load_w: None,
            q0: None,
            failure: Some(RunFailure {
                stage: Stage::Ingest,
                error: run.error.clone(),
            }),
        }
    }

    /// R² of the run's fit, `NaN` when no fit exists.
    pub fn r2(&self) -> f64 {
        self.fit.as_ref().map(|f| f.r2).unwrap_or(f64::NAN)
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Structured per-session output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub cavity_id: String,
    pub runs: Vec<RunReport>,
    pub calibration: CalibrationCurve,
    /// Degraded-but-continued conditions (e.g. identity calibration).
    pub warnings: Vec<String>,
}

impl SessionReport {
    pub fn calibration_intercept_adjust_w(&self) -> f64 {
        self.calibration.intercept_adjust_w
    }
}
