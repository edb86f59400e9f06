//! Formatted terminal output for a processed session.
//!
//! We keep formatting code in one place so:
//! - the numerical code stays free of presentation concerns
//! - output changes are localized (useful for snapshot-style tests)
//!
//! Per-run sections always list load, cutoff, duration, R² in that order.

use crate::domain::{CalibrationKind, FitConfidence, RunKind, RunReport, SessionReport};

/// Format the full session report: calibration, per-run sections, summary table, warnings.
pub fn format_session_report(report: &SessionReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== q0 - Calorimetry session {} ===\n", report.cavity_id));
    out.push_str(&format_calibration(report));
    out.push('\n');

    for run in &report.runs {
        out.push_str(&format_run(run));
        out.push('\n');
    }

    out.push_str(&format_summary_table(&report.runs));
    out.push('\n');
    out.push_str(&format!(
        "Calibration curve intercept adjust = {:.4} W\n",
        report.calibration_intercept_adjust_w()
    ));

    if !report.warnings.is_empty() {
        out.push_str("\nWarnings:\n");
        for w in &report.warnings {
            out.push_str(&format!("- {w}\n"));
        }
    }

    out
}

fn format_calibration(report: &SessionReport) -> String {
    let c = &report.calibration;
    match c.kind {
        CalibrationKind::Regression => format!(
            "Calibration: regression over {} heater runs | measured = {:.6} x nominal + {:.6} W\n",
            c.n_runs, c.slope, c.intercept
        ),
        CalibrationKind::Proportional => format!(
            "Calibration: proportional ({} heater runs) | measured = {:.6} x nominal\n",
            c.n_runs, c.slope
        ),
        CalibrationKind::Identity => "Calibration: none (heat loads are uncorrected)\n".to_string(),
    }
}

/// One run section.
pub fn format_run(run: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} run {}\n", run.kind.display_name(), run.id.index));

    match run.kind {
        RunKind::Heater => {
            if let Some(nominal) = run.nominal_electric_load_w {
                out.push_str(&format!("  Electric heat load: {nominal:.3} W\n"));
            }
        }
        RunKind::Rf => {
            if let Some(g) = run.rf_gradient_mvm {
                out.push_str(&format!("  Gradient: {g:.2} MV/m\n"));
            }
            if let Some(p) = run.avg_pressure_torr {
                out.push_str(&format!("  Average pressure: {p:.2} Torr\n"));
            }
        }
    }

    if let Some(w) = run.corrected_heat_load_w {
        out.push_str(&format!("  Calculated heat load: {w:.4} W"));
        if let Some(raw) = run.heat_load_w {
            out.push_str(&format!(" (raw {raw:.4} W)"));
        }
        out.push('\n');
    } else if let Some(raw) = run.heat_load_w {
        out.push_str(&format!("  Calculated heat load: uncorrected {raw:.4} W\n"));
    }
    if let Some(rf) = run.rf_heat_load_w {
        out.push_str(&format!("  RF heat load: {rf:.4} W\n"));
    }
    if let Some(c) = run.cutoff {
        out.push_str(&format!("  Cutoff: index {}\n", c.cutoff_index));
        out.push_str(&format!("  Duration: {:.1} s\n", c.duration_seconds));
    }
    if let Some(fit) = &run.fit {
        let flag = match fit.confidence {
            FitConfidence::Good => "",
            FitConfidence::Low => " (low confidence)",
            FitConfidence::Invalid => " (invalid)",
        };
        out.push_str(&format!("  R²: {:.6}{flag}\n", fit.r2));
        out.push_str(&format!("  Tau: {:.3} s\n", fit.tau));
    }
    if let Some(q) = &run.q0 {
        let note = if q.temperature_corrected { " (2 K corrected)" } else { "" };
        out.push_str(&format!("  Q0: {:.2e}{note}\n", q.q0));
    }
    if let Some(f) = &run.failure {
        out.push_str(&format!("  FAILED at {}: {}\n", f.stage.display_name(), f.error));
    }

    out
}

fn format_summary_table(runs: &[RunReport]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<6} {:<7} {:>12} {:>10} {:>10} {:>10} {:>10}\n",
            "run", "kind", "load_w", "cutoff", "dur_s", "r2", "q0"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<6} {:-<7} {:-<12} {:-<10} {:-<10} {:-<10} {:-<10}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for r in runs {
        let load = r
            .corrected_heat_load_w
            .or(r.heat_load_w)
            .map(|w| format!("{w:.4}"))
            .unwrap_or_else(|| "-".to_string());
        let cutoff = r.cutoff.map(|c| c.cutoff_index.to_string()).unwrap_or_else(|| "-".to_string());
        let duration = r
            .cutoff
            .map(|c| format!("{:.1}", c.duration_seconds))
            .unwrap_or_else(|| "-".to_string());
        let r2 = if r.r2().is_nan() { "NaN".to_string() } else { format!("{:.6}", r.r2()) };
        let q0 = r.q0.map(|q| format!("{:.2e}", q.q0)).unwrap_or_else(|| "-".to_string());
        out.push_str(
            format!(
                "{:<6} {:<7} {:>12} {:>10} {:>10} {:>10} {:>10}\n",
                r.id.index,
                r.kind.display_name(),
                load,
                cutoff,
                duration,
                r2,
                q0
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}
