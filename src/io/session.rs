//! Session file loading and saving.
//!
//! A session file is JSON:
//!
//! ```text
//! {
//!   "cavity_id": "CAV-07",
//!   "constants": {
//!     "calorimeter": { "model": "conductance", "watts_per_unit": 2.0 },
//!     "q0": { "formula": "geometry", "r_over_q_ohm": 1012.0, "effective_length_m": 1.038 }
//!   },
//!   "runs": [
//!     { "index": 1, "kind": "heater", "nominal_electric_load_w": 9.81, "samples_csv": "run1.csv" },
//!     { "index": 2, "kind": "rf", "rf_gradient_mvm": 16.0, "avg_pressure_torr": 23.6,
//!       "samples": [[0.0, 1.02], [0.9, 1.03], ...] }
//!   ]
//! }
//! ```
//!
//! Samples are either inline `[time, signal]` pairs or a CSV file with
//! `time,signal` headers, resolved relative to the session file.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::domain::{RejectedRun, Run, RunId, RunKind, SampleSeries, Session, SessionConstants};
use crate::error::{AppError, CalorimetryError};

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    cavity_id: String,
    #[serde(default)]
    constants: SessionConstants,
    runs: Vec<RunEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunEntry {
    index: usize,
    kind: RunKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nominal_electric_load_w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avg_pressure_torr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rf_gradient_mvm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    electric_load_w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    samples: Option<Vec<(f64, f64)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    samples_csv: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SampleRow {
    time: f64,
    signal: f64,
}

/// Load and validate a session file.
///
/// Only an unreadable or malformed session file fails the load. A run whose
/// samples are missing or invalid lands in [`Session::rejected`] and the
/// remaining runs load normally.
pub fn load_session(path: &Path) -> Result<Session, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open session '{}': {e}", path.display())))?;
    let parsed: SessionFile = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid session JSON '{}': {e}", path.display())))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut runs = Vec::with_capacity(parsed.runs.len());
    let mut rejected = Vec::new();
    for entry in parsed.runs {
        let id = RunId::new(parsed.cavity_id.clone(), entry.index);
        let samples = match entry_samples(base, entry.samples, entry.samples_csv.as_deref()) {
            Ok(samples) => samples,
            Err(error) => {
                warn!("{id}: rejected at load: {error}");
                rejected.push(RejectedRun {
                    id,
                    kind: entry.kind,
                    nominal_electric_load_w: entry.nominal_electric_load_w,
                    avg_pressure_torr: entry.avg_pressure_torr,
                    rf_gradient_mvm: entry.rf_gradient_mvm,
                    error,
                });
                continue;
            }
        };

        runs.push(Run {
            id,
            kind: entry.kind,
            samples,
            nominal_electric_load_w: entry.nominal_electric_load_w,
            avg_pressure_torr: entry.avg_pressure_torr,
            rf_gradient_mvm: entry.rf_gradient_mvm,
            electric_load_w: entry.electric_load_w,
        });
    }

    Ok(Session {
        cavity_id: parsed.cavity_id,
        constants: parsed.constants,
        runs,
        rejected,
    })
}

fn entry_samples(
    base: &Path,
    inline: Option<Vec<(f64, f64)>>,
    csv_path: Option<&Path>,
) -> Result<SampleSeries, CalorimetryError> {
    let pairs = match (inline, csv_path) {
        (Some(pairs), None) => pairs,
        (None, Some(csv_path)) => read_samples_csv(&base.join(csv_path))?,
        _ => {
            return Err(CalorimetryError::InvalidSamples {
                reason: "exactly one of 'samples' or 'samples_csv' is required".to_string(),
            });
        }
    };
    SampleSeries::from_pairs(pairs)
}

/// Write a session with inline samples (e.g. the synthetic demo session).
pub fn save_session(path: &Path, session: &Session) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create session '{}': {e}", path.display())))?;

    let out = SessionFile {
        cavity_id: session.cavity_id.clone(),
        constants: session.constants.clone(),
        runs: session
            .runs
            .iter()
            .map(|run| RunEntry {
                index: run.id.index,
                kind: run.kind,
                nominal_electric_load_w: run.nominal_electric_load_w,
                avg_pressure_torr: run.avg_pressure_torr,
                rf_gradient_mvm: run.rf_gradient_mvm,
                electric_load_w: run.electric_load_w,
                samples: Some(run.samples.clone().into()),
                samples_csv: None,
            })
            .collect(),
    };

    serde_json::to_writer_pretty(file, &out)
        .map_err(|e| AppError::new(2, format!("Failed to write session JSON: {e}")))?;
    Ok(())
}

fn read_samples_csv(path: &Path) -> Result<Vec<(f64, f64)>, CalorimetryError> {
    let file = File::open(path).map_err(|e| CalorimetryError::InvalidSamples {
        reason: format!("failed to open samples CSV '{}': {e}", path.display()),
    })?;

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut pairs = Vec::new();
    for (i, row) in reader.deserialize::<SampleRow>().enumerate() {
        // Header is line 1.
        let row = row.map_err(|e| CalorimetryError::InvalidSamples {
            reason: format!("{}: line {}: {e}", path.display(), i + 2),
        })?;
        pairs.push((row.time, row.signal));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::domain::{HeatLoadModel, MIN_FIT_WINDOW};

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn csv_rows(n: usize) -> String {
        let mut s = String::from("time, signal\n");
        for i in 0..n {
            s.push_str(&format!("{}, {}\n", i as f64 * 0.5, 1.0 + i as f64 * 0.01));
        }
        s
    }

    #[test]
    fn loads_inline_and_csv_samples() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "run2.csv", &csv_rows(12));
        let inline: Vec<String> = (0..10).map(|i| format!("[{i}.0, 2.0]")).collect();
        let json = format!(
            r#"{{
                "cavity_id": "CAV-07",
                "constants": {{ "calorimeter": {{ "model": "conductance", "watts_per_unit": 2.0 }} }},
                "runs": [
                    {{ "index": 1, "kind": "heater", "nominal_electric_load_w": 9.81, "samples": [{}] }},
                    {{ "index": 2, "kind": "rf", "rf_gradient_mvm": 16.0, "samples_csv": "run2.csv" }}
                ]
            }}"#,
            inline.join(",")
        );
        let path = write(dir.path(), "session.json", &json);

        let session = load_session(&path).unwrap();
        assert_eq!(session.cavity_id, "CAV-07");
        assert_eq!(
            session.constants.calorimeter,
            Some(HeatLoadModel::Conductance { watts_per_unit: 2.0 })
        );
        assert_eq!(session.constants.q0, None);
        assert_eq!(session.runs.len(), 2);
        assert_eq!(session.runs[0].samples.len(), MIN_FIT_WINDOW);
        assert_eq!(session.runs[1].samples.len(), 12);
        assert_eq!(session.runs[1].id, RunId::new("CAV-07", 2));
        assert_eq!(session.runs[1].rf_gradient_mvm, Some(16.0));
    }

    #[test]
    fn run_without_samples_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "session.json",
            r#"{ "cavity_id": "X", "runs": [ { "index": 4, "kind": "heater" } ] }"#,
        );
        let session = load_session(&path).unwrap();
        assert!(session.runs.is_empty());
        assert_eq!(session.rejected.len(), 1);
        assert_eq!(session.rejected[0].id, RunId::new("X", 4));
        assert!(matches!(session.rejected[0].error, CalorimetryError::InvalidSamples { .. }));
    }

    #[test]
    fn short_run_is_rejected_and_the_rest_still_load() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.csv", &csv_rows(30));
        write(dir.path(), "short.csv", &csv_rows(5));
        let path = write(
            dir.path(),
            "session.json",
            r#"{ "cavity_id": "X", "runs": [
                { "index": 1, "kind": "heater", "nominal_electric_load_w": 2.0, "samples_csv": "good.csv" },
                { "index": 2, "kind": "heater", "nominal_electric_load_w": 4.0, "samples_csv": "short.csv" }
            ] }"#,
        );
        let session = load_session(&path).unwrap();

        assert_eq!(session.runs.len(), 1);
        assert_eq!(session.runs[0].id, RunId::new("X", 1));
        assert_eq!(session.runs[0].samples.len(), 30);

        let rejected = &session.rejected[0];
        assert_eq!(rejected.id, RunId::new("X", 2));
        assert_eq!(rejected.nominal_electric_load_w, Some(4.0));
        assert_eq!(
            rejected.error,
            CalorimetryError::InsufficientData {
                available: 5,
                required: MIN_FIT_WINDOW
            }
        );
    }

    #[test]
    fn missing_csv_file_rejects_only_that_run() {
        let dir = tempfile::tempdir().unwrap();
        let inline: Vec<String> = (0..12).map(|i| format!("[{i}.0, 2.0]")).collect();
        let json = format!(
            r#"{{ "cavity_id": "X", "runs": [
                {{ "index": 1, "kind": "heater", "samples": [{}] }},
                {{ "index": 2, "kind": "rf", "samples_csv": "absent.csv" }}
            ] }}"#,
            inline.join(",")
        );
        let path = write(dir.path(), "session.json", &json);

        let session = load_session(&path).unwrap();
        assert_eq!(session.runs.len(), 1);
        assert_eq!(session.rejected.len(), 1);
        assert_eq!(session.rejected[0].kind, RunKind::Rf);
    }

    #[test]
    fn malformed_session_json_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "session.json", r#"{ "cavity_id": "X", "runs": [ "#);
        let err = load_session(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn saved_session_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.json");
        let session = crate::data::demo_session(4, 0.01).unwrap();
        save_session(&path, &session).unwrap();

        let loaded = load_session(&path).unwrap();
        assert_eq!(loaded.constants, session.constants);
        assert_eq!(loaded.runs.len(), session.runs.len());
        for (a, b) in loaded.runs.iter().zip(&session.runs) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.electric_load_w, b.electric_load_w);
            assert_eq!(a.samples.len(), b.samples.len());
            for (x, y) in a.samples.signal().iter().zip(b.samples.signal()) {
                assert!((x - y).abs() < 1e-12);
            }
        }
    }
}
