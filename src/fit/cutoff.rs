//! Cutoff selection: where the post-step transient starts.
//!
//! The default policy is a bounded scan. Every candidate index gets a trial
//! relaxation fit (in parallel) and candidates are ranked by:
//!
//! 1. R² (higher is better)
//! 2. window duration (longer is better)
//! 3. index (earlier wins)
//!
//! R² values within `tie_tolerance` of the best are treated as ties, so a
//! longer window is never given up for a numerically meaningless R² gain.

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{CutoffMode, CutoffResult, SampleSeries};
use crate::error::CalorimetryError;
use crate::fit::fitter::{fit_decay, FitOptions};

/// Settling allowance per Watt of heat-load change.
pub const SETTLE_SECONDS_PER_WATT: f64 = 25.0;

/// How the cutoff index is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CutoffPolicy {
    /// Scan `[search_from, search_to]` and keep the best-scoring window.
    BestFit { search_from: usize, search_to: Option<usize> },
    /// First index after the largest sample-to-sample jump.
    PastSpike { search_to: Option<usize> },
    /// Skip `expected heat delta × seconds_per_watt` seconds from the first sample.
    SettleTime { seconds_per_watt: f64 },
    Fixed { index: usize },
}

impl Default for CutoffPolicy {
    fn default() -> Self {
        CutoffPolicy::BestFit {
            search_from: 0,
            search_to: None,
        }
    }
}

impl CutoffPolicy {
    /// Build a policy from the CLI mode plus its optional parameters.
    pub fn from_mode(mode: CutoffMode, search_to: Option<usize>, fixed_index: usize, seconds_per_watt: f64) -> Self {
        match mode {
            CutoffMode::BestFit => CutoffPolicy::BestFit {
                search_from: 0,
                search_to,
            },
            CutoffMode::PastSpike => CutoffPolicy::PastSpike { search_to },
            CutoffMode::SettleTime => CutoffPolicy::SettleTime { seconds_per_watt },
            CutoffMode::Fixed => CutoffPolicy::Fixed { index: fixed_index },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutoffOptions {
    pub policy: CutoffPolicy,
    /// R² difference below which two candidates are considered tied.
    pub tie_tolerance: f64,
}

impl Default for CutoffOptions {
    fn default() -> Self {
        Self {
            policy: CutoffPolicy::default(),
            tie_tolerance: 1e-6,
        }
    }
}

/// One scored candidate from a best-fit scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutoffCandidate {
    pub index: usize,
    pub duration_seconds: f64,
    pub r2: f64,
}

#[derive(Debug, Clone)]
pub struct CutoffSelection {
    pub result: CutoffResult,
    /// Scan ranking with the chosen candidate first (empty for non-scan policies).
    pub ranked: Vec<CutoffCandidate>,
    /// The chosen candidate scored below `FitOptions::min_r2`.
    pub below_floor: bool,
}

/// Choose the first sample of the fit window.
///
/// `expected_heat_delta_w` is only consulted by [`CutoffPolicy::SettleTime`].
pub fn select_cutoff(
    series: &SampleSeries,
    opts: &CutoffOptions,
    fit_opts: &FitOptions,
    expected_heat_delta_w: Option<f64>,
) -> Result<CutoffSelection, CalorimetryError> {
    let n = series.len();
    let required = fit_opts.required_samples();
    let Some(last) = n.checked_sub(required) else {
        return Err(CalorimetryError::InsufficientData {
            available: n,
            required,
        });
    };

    let index = match opts.policy {
        CutoffPolicy::BestFit { search_from, search_to } => {
            return best_fit(series, opts, fit_opts, search_from, search_to.map_or(last, |t| t.min(last)));
        }
        CutoffPolicy::PastSpike { search_to } => past_spike(series.signal(), search_to.map_or(last, |t| t.min(last))),
        CutoffPolicy::SettleTime { seconds_per_watt } => settle_time(series, seconds_per_watt, expected_heat_delta_w)?,
        CutoffPolicy::Fixed { index } => index,
    };

    if index > last {
        return Err(CalorimetryError::InsufficientData {
            available: n.saturating_sub(index),
            required,
        });
    }

    Ok(CutoffSelection {
        result: CutoffResult {
            cutoff_index: index,
            duration_seconds: series.duration_from(index),
        },
        ranked: Vec::new(),
        below_floor: false,
    })
}

fn best_fit(
    series: &SampleSeries,
    opts: &CutoffOptions,
    fit_opts: &FitOptions,
    from: usize,
    to: usize,
) -> Result<CutoffSelection, CalorimetryError> {
    if from > to {
        return Err(CalorimetryError::InsufficientData {
            available: series.len().saturating_sub(from),
            required: fit_opts.required_samples(),
        });
    }

    // Failed trial fits are dropped; `None` is a converged fit without a finite R².
    let trials: Vec<Option<CutoffCandidate>> = (from..=to)
        .into_par_iter()
        .filter_map(|index| {
            let (t, y) = series.tail(index);
            let fit = fit_decay(t, y, fit_opts).ok()?;
            Some(fit.r2.is_finite().then_some(CutoffCandidate {
                index,
                duration_seconds: series.duration_from(index),
                r2: fit.r2,
            }))
        })
        .collect();

    if trials.is_empty() {
        return Err(CalorimetryError::FitDidNotConverge {
            iterations: fit_opts.max_iterations,
        });
    }
    let mut ranked: Vec<CutoffCandidate> = trials.into_iter().flatten().collect();
    if ranked.is_empty() {
        return Err(CalorimetryError::InvalidFit {
            reason: "zero-variance signal".to_string(),
        });
    }

    ranked.sort_by(|a, b| {
        b.r2.total_cmp(&a.r2)
            .then(b.duration_seconds.total_cmp(&a.duration_seconds))
            .then(a.index.cmp(&b.index))
    });

    // Among near-ties with the best R², prefer the longest window.
    let floor = ranked[0].r2 - opts.tie_tolerance;
    let mut chosen = 0;
    for (pos, c) in ranked.iter().enumerate() {
        if c.r2 >= floor && c.duration_seconds > ranked[chosen].duration_seconds {
            chosen = pos;
        }
    }
    let best = ranked.remove(chosen);
    ranked.insert(0, best);

    debug!(
        "cutoff scan over [{from}, {to}]: {} candidates, chose index {} (r2={:.6}, duration={:.3}s)",
        ranked.len(),
        best.index,
        best.r2,
        best.duration_seconds
    );

    Ok(CutoffSelection {
        result: CutoffResult {
            cutoff_index: best.index,
            duration_seconds: best.duration_seconds,
        },
        below_floor: best.r2 < fit_opts.min_r2,
        ranked,
    })
}

fn past_spike(signal: &[f64], to: usize) -> usize {
    let mut best_jump = f64::NEG_INFINITY;
    let mut cutoff = 0;
    for i in 0..to.min(signal.len().saturating_sub(1)) {
        let jump = (signal[i + 1] - signal[i]).abs();
        if jump > best_jump {
            best_jump = jump;
            cutoff = i + 1;
        }
    }
    cutoff
}

fn settle_time(series: &SampleSeries, seconds_per_watt: f64, expected_heat_delta_w: Option<f64>) -> Result<usize, CalorimetryError> {
    if !(seconds_per_watt.is_finite() && seconds_per_watt >= 0.0) {
        return Err(CalorimetryError::missing_constant("seconds_per_watt"));
    }
    let delta = expected_heat_delta_w
        .filter(|d| d.is_finite())
        .ok_or_else(|| CalorimetryError::missing_constant("expected_heat_delta_w"))?;

    let settle = delta.abs() * seconds_per_watt;
    let times = series.times();
    let t0 = times[0];
    // Settling longer than the run leaves no window at all.
    Ok(times.iter().position(|&t| t - t0 >= settle).unwrap_or(times.len()))
}
