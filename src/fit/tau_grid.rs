//! Tau seed generation.
//!
//! Levenberg–Marquardt is local. When the heuristic start (`tau = duration/3`)
//! fails, the fitter restarts from a deterministic log-spaced set of τ values
//! that spans well below and above the fit window.

use crate::error::CalorimetryError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, CalorimetryError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(CalorimetryError::InvalidFit {
            reason: format!("invalid tau range: min={min}, max={max} (must be finite, >0, and max>min)"),
        });
    }
    if steps < 2 {
        return Err(CalorimetryError::InvalidFit {
            reason: "tau seed steps must be >= 2".to_string(),
        });
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    Ok(out)
}

/// Restart seeds for a window of length `duration`: `[duration/50, 2·duration]`.
pub fn tau_seeds(duration: f64, steps: usize) -> Result<Vec<f64>, CalorimetryError> {
    log_space(duration / 50.0, duration * 2.0, steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(0.1, 10.0, 5).unwrap();
        assert!((v[0] - 0.1).abs() < 1e-12);
        assert!((v[v.len() - 1] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn tau_seeds_bracket_the_window() {
        let seeds = tau_seeds(40.0, 6).unwrap();
        assert_eq!(seeds.len(), 6);
        assert!(seeds[0] < 1.0 && *seeds.last().unwrap() > 40.0);
        assert!(seeds.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn tau_seeds_reject_zero_duration() {
        assert!(tau_seeds(0.0, 6).is_err());
    }
}
