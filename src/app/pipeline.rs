//! Session processing pipeline shared by the `process` and `demo` commands.
//!
//! Three phases separated by explicit barriers:
//!
//! 1. per run, in parallel: cutoff -> fit -> raw heat load
//! 2. heater runs -> calibration curve (built once, read-only afterwards)
//! 3. per run, in parallel: corrected load; RF runs also get the RF-only load and Q0
//!
//! A failing run is marked with the stage that failed and never aborts the
//! session. Runs rejected while loading are reported as failed at ingest. Session-level problems (no usable heaters) degrade to warnings.

use log::{info, warn};
use rayon::prelude::*;

use crate::domain::{
    CalibrationCurve, FitConfidence, Run, RunFailure, RunKind, RunReport, Session, SessionConstants, SessionReport,
    Stage,
};
use crate::error::CalorimetryError;
use crate::fit::{fit_decay, select_cutoff, CutoffOptions, FitOptions};
use crate::physics::{build_calibration, compute_q0, design_heat_estimate_w, heat_load};

/// Numerical settings for a session run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    pub cutoff: CutoffOptions,
    pub fit: FitOptions,
}

/// Run the full pipeline over every run of `session`.
pub fn process_session(session: &Session, opts: &ProcessOptions) -> SessionReport {
    info!(
        "processing {} runs for cavity {} ({} rejected at load)",
        session.runs.len(),
        session.cavity_id,
        session.rejected.len()
    );

    // 1) Per-run analysis.
    let analyzed: Vec<RunReport> = session
        .runs
        .par_iter()
        .map(|run| analyze_run(run, &session.constants, opts))
        .collect();

    // 2) Calibration from the heater anchors that survived phase 1.
    let anchors: Vec<(f64, f64)> = analyzed
        .iter()
        .filter(|r| r.kind == RunKind::Heater && !r.is_failed())
        .filter_map(|r| Some((r.nominal_electric_load_w?, r.heat_load_w?)))
        .collect();
    let build = build_calibration(&anchors);
    let calibration = build.curve;

    let mut warnings = Vec::new();
    if let Some(w) = &build.warning {
        warn!("{}: {w}", session.cavity_id);
        warnings.push(w.to_string());
    }
    info!(
        "calibration ({:?}, {} heater runs): slope={:.6} intercept adjust={:.6} W",
        calibration.kind, calibration.n_runs, calibration.slope, calibration.intercept_adjust_w
    );

    // 3) Correction and Q0. Runs rejected at load follow the processed ones.
    let mut runs: Vec<RunReport> = analyzed
        .into_par_iter()
        .zip(session.runs.par_iter())
        .map(|(report, run)| finish_run(report, run, &calibration, &session.constants))
        .collect();
    runs.extend(session.rejected.iter().map(RunReport::rejected));

    for report in &runs {
        if let Some(failure) = &report.failure {
            warnings.push(format!(
                "{}: {} failed: {}",
                report.id,
                failure.stage.display_name(),
                failure.error
            ));
        } else if report.fit.as_ref().is_some_and(|f| f.confidence == FitConfidence::Low) {
            warn!("{}: low-confidence fit (R² = {:.4})", report.id, report.r2());
            warnings.push(format!("{}: low-confidence fit (R² = {:.4})", report.id, report.r2()));
        }
    }

    let failed = runs.iter().filter(|r| r.is_failed()).count();
    info!("processed {} runs ({} failed)", runs.len(), failed);

    SessionReport {
        cavity_id: session.cavity_id.clone(),
        runs,
        calibration,
        warnings,
    }
}

/// Heat-load change the run is expected to produce, used by settle-time cutoffs.
pub fn expected_heat_delta_w(run: &Run) -> Option<f64> {
    match run.kind {
        RunKind::Heater => run.nominal_electric_load_w,
        RunKind::Rf => {
            let rf = run.rf_gradient_mvm.map(design_heat_estimate_w).unwrap_or(0.0);
            Some(rf + run.electric_load_w.unwrap_or(0.0))
        }
    }
}

fn analyze_run(run: &Run, constants: &SessionConstants, opts: &ProcessOptions) -> RunReport {
    let mut report = RunReport::new(run);

    let selection = match select_cutoff(&run.samples, &opts.cutoff, &opts.fit, expected_heat_delta_w(run)) {
        Ok(s) => s,
        Err(e) => return fail(report, Stage::Cutoff, e),
    };
    report.cutoff = Some(selection.result);

    let (t, y) = run.samples.tail(selection.result.cutoff_index);
    let mut fit = match fit_decay(t, y, &opts.fit) {
        Ok(f) => f,
        Err(e) => return fail(report, Stage::Fit, e),
    };
    if selection.below_floor && fit.confidence == FitConfidence::Good {
        fit.confidence = FitConfidence::Low;
    }

    let estimate = heat_load(&run.id, &fit, constants.calorimeter.as_ref());
    report.fit = Some(fit);
    match estimate {
        Ok(e) => report.heat_load_w = Some(e.watts),
        Err(e) => return fail(report, Stage::HeatLoad, e),
    }
    report
}

fn finish_run(
    mut report: RunReport,
    run: &Run,
    calibration: &CalibrationCurve,
    constants: &SessionConstants,
) -> RunReport {
    let Some(raw) = report.heat_load_w.filter(|_| !report.is_failed()) else {
        return report;
    };

    let corrected = calibration.correct(raw);
    if !corrected.is_finite() {
        return fail(report, Stage::Correction, CalorimetryError::InvalidHeatLoad { watts: corrected });
    }
    report.corrected_heat_load_w = Some(corrected);

    if run.kind == RunKind::Rf {
        let rf_w = corrected - run.electric_load_w.unwrap_or(0.0);
        report.rf_heat_load_w = Some(rf_w);

        let Some(formula) = constants.q0.as_ref() else {
            return fail(report, Stage::Q0, CalorimetryError::missing_constant("q0"));
        };
        let Some(gradient) = run.rf_gradient_mvm else {
            return fail(report, Stage::Q0, CalorimetryError::missing_constant("rf_gradient_mvm"));
        };
        match compute_q0(formula, rf_w, gradient, run.avg_pressure_torr) {
            Ok(q0) => report.q0 = Some(q0),
            Err(e) => return fail(report, Stage::Q0, e),
        }
    }
    report
}

fn fail(mut report: RunReport, stage: Stage, error: CalorimetryError) -> RunReport {
    warn!("{}: {} failed: {error}", report.id, stage.display_name());
    report.failure = Some(RunFailure { stage, error });
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{demo_session, DEMO_Q0};
    use crate::domain::{CalibrationKind, RejectedRun, RunId, SampleSeries};

    #[test]
    fn demo_session_recovers_nominal_loads_and_q0() {
        let session = demo_session(7, 0.0).unwrap();
        let report = process_session(&session, &ProcessOptions::default());

        assert_eq!(report.calibration.kind, CalibrationKind::Regression);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);

        for run in &report.runs {
            assert!(!run.is_failed(), "{}: {:?}", run.id, run.failure);
            assert_eq!(run.cutoff.map(|c| c.cutoff_index), Some(10));
            if let Some(nominal) = run.nominal_electric_load_w {
                let corrected = run.corrected_heat_load_w.unwrap();
                assert!((corrected - nominal).abs() < 1e-6, "{}: {corrected} vs {nominal}", run.id);
            }
            if run.kind == RunKind::Rf {
                let q0 = run.q0.unwrap().q0;
                assert!((q0 / DEMO_Q0 - 1.0).abs() < 1e-4, "{}: q0={q0:e}", run.id);
            }
        }
    }

    #[test]
    fn bad_run_fails_without_sinking_the_session() {
        let mut session = demo_session(3, 0.0).unwrap();
        let flat = SampleSeries::from_pairs((0..30).map(|i| (i as f64, 1.0))).unwrap();
        session.runs.push(Run::heater(RunId::new("DEMO-1", 99), flat, 3.0));

        let report = process_session(&session, &ProcessOptions::default());
        let bad = report.runs.last().unwrap();
        assert!(bad.is_failed());
        assert!(bad.r2().is_nan());
        assert_eq!(report.runs.iter().filter(|r| r.is_failed()).count(), 1);
        assert!(report.warnings.iter().any(|w| w.contains("run 99")));
        assert_eq!(report.calibration.n_runs, 3);
    }

    #[test]
    fn rejected_run_is_reported_at_ingest() {
        let mut session = demo_session(11, 0.0).unwrap();
        session.rejected.push(RejectedRun {
            id: RunId::new("DEMO-1", 42),
            kind: RunKind::Heater,
            nominal_electric_load_w: Some(5.0),
            avg_pressure_torr: None,
            rf_gradient_mvm: None,
            error: CalorimetryError::InsufficientData {
                available: 5,
                required: 10,
            },
        });

        let report = process_session(&session, &ProcessOptions::default());
        assert_eq!(report.runs.len(), session.runs.len() + 1);

        let rejected = report.runs.last().unwrap();
        assert_eq!(rejected.id, RunId::new("DEMO-1", 42));
        assert_eq!(rejected.failure.as_ref().map(|f| f.stage), Some(Stage::Ingest));
        assert!(rejected.r2().is_nan());
        assert_eq!(report.runs.iter().filter(|r| r.is_failed()).count(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("run 42: ingest failed"));
        assert_eq!(report.calibration.kind, CalibrationKind::Regression);
    }

    #[test]
    fn no_heater_runs_gives_identity_and_still_computes_q0() {
        let mut session = demo_session(5, 0.0).unwrap();
        session.runs.retain(|r| r.kind == RunKind::Rf);

        let report = process_session(&session, &ProcessOptions::default());
        assert_eq!(report.calibration.kind, CalibrationKind::Identity);
        assert_eq!(report.calibration_intercept_adjust_w(), 0.0);
        assert!(!report.warnings.is_empty());
        for run in &report.runs {
            assert_eq!(run.corrected_heat_load_w, run.heat_load_w);
            assert!(run.q0.is_some(), "{}: {:?}", run.id, run.failure);
        }
    }

    #[test]
    fn missing_q0_formula_fails_only_rf_runs() {
        let mut session = demo_session(2, 0.0).unwrap();
        session.constants.q0 = None;

        let report = process_session(&session, &ProcessOptions::default());
        for run in &report.runs {
            match run.kind {
                RunKind::Heater => assert!(!run.is_failed()),
                RunKind::Rf => {
                    assert_eq!(run.failure.as_ref().map(|f| f.stage), Some(Stage::Q0));
                    assert!(run.rf_heat_load_w.is_some());
                }
            }
        }
    }

    #[test]
    fn expected_delta_uses_design_estimate_for_rf() {
        let series = SampleSeries::from_pairs((0..12).map(|i| (i as f64, 0.0))).unwrap();
        let run = Run::rf(RunId::new("C", 1), series, 16.0, None).with_electric_load(1.5);
        assert!((expected_heat_delta_w(&run).unwrap() - 11.1).abs() < 1e-12);
    }
}
