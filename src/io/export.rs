//! Export session results.
//!
//! - per-run CSV (one row per run; easy to consume in spreadsheets)
//! - full session report JSON, stamped with tool name and generation time

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{FitConfidence, SessionReport};
use crate::error::AppError;

const CSV_HEADER: [&str; 18] = [
    "cavity_id",
    "run",
    "kind",
    "nominal_electric_load_w",
    "cutoff_index",
    "duration_s",
    "tau_s",
    "amplitude",
    "asymptote",
    "r2",
    "confidence",
    "heat_load_w",
    "corrected_heat_load_w",
    "rf_heat_load_w",
    "gradient_mvm",
    "q0",
    "failed_stage",
    "error",
];

/// Write one CSV row per run.
pub fn write_results_csv(path: &Path, report: &SessionReport) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;

    writer
        .write_record(CSV_HEADER)
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    for run in &report.runs {
        let fit = run.fit.as_ref();
        let record = [
            run.id.cavity_id.clone(),
            run.id.index.to_string(),
            run.kind.display_name().to_string(),
            opt(run.nominal_electric_load_w, 4),
            run.cutoff.map(|c| c.cutoff_index.to_string()).unwrap_or_default(),
            opt(run.cutoff.map(|c| c.duration_seconds), 3),
            opt(fit.map(|f| f.tau), 6),
            opt(fit.map(|f| f.amplitude), 6),
            opt(fit.map(|f| f.asymptote), 6),
            opt(fit.map(|f| f.r2), 8),
            fit.map(|f| confidence_label(f.confidence).to_string()).unwrap_or_default(),
            opt(run.heat_load_w, 6),
            opt(run.corrected_heat_load_w, 6),
            opt(run.rf_heat_load_w, 6),
            opt(run.rf_gradient_mvm, 3),
            run.q0.map(|q| format!("{:.6e}", q.q0)).unwrap_or_default(),
            run.failure.as_ref().map(|f| f.stage.display_name().to_string()).unwrap_or_default(),
            run.failure.as_ref().map(|f| f.error.to_string()).unwrap_or_default(),
        ];
        writer
            .write_record(&record)
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

#[derive(Serialize)]
struct ReportFile<'a> {
    tool: &'static str,
    generated_at: DateTime<Utc>,
    report: &'a SessionReport,
}

/// Write the full session report as pretty JSON.
pub fn write_report_json(path: &Path, report: &SessionReport) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create report JSON '{}': {e}", path.display())))?;

    let out = ReportFile {
        tool: "q0",
        generated_at: Utc::now(),
        report,
    };
    serde_json::to_writer_pretty(file, &out)
        .map_err(|e| AppError::new(2, format!("Failed to write report JSON: {e}")))?;
    Ok(())
}

fn opt(value: Option<f64>, decimals: usize) -> String {
    value.map(|v| format!("{v:.decimals$}")).unwrap_or_default()
}

fn confidence_label(c: FitConfidence) -> &'static str {
    match c {
        FitConfidence::Good => "good",
        FitConfidence::Low => "low",
        FitConfidence::Invalid => "invalid",
    }
}
