//! Command-line parsing for the `q0` calorimetry tool.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! numerical code. `app` maps these arguments into plain option structs.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::CutoffMode;
use crate::fit::SETTLE_SECONDS_PER_WATT;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "q0",
    version,
    about = "Calorimetric heat-load calibration and Q0 extraction for cryogenic cavity tests"
)]
pub struct Cli {
    /// Increase logging verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process a session file: fit every run, calibrate, compute Q0.
    Process(ProcessArgs),
    /// Generate a synthetic session and process it.
    Demo(DemoArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ProcessArgs {
    /// Session JSON file.
    #[arg(value_name = "SESSION")]
    pub session: PathBuf,

    #[command(flatten)]
    pub analysis: AnalysisArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Random seed for the synthetic transients.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Gaussian noise sigma added to every sample.
    #[arg(long, default_value_t = 0.002)]
    pub noise: f64,

    /// Also write the generated session to this JSON file.
    #[arg(long, value_name = "JSON")]
    pub save_session: Option<PathBuf>,

    #[command(flatten)]
    pub analysis: AnalysisArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Cutoff and fit settings.
#[derive(Debug, Args, Clone)]
pub struct AnalysisArgs {
    /// How the start of the fit window is chosen.
    #[arg(long, value_enum, default_value_t = CutoffMode::BestFit)]
    pub cutoff: CutoffMode,

    /// Last candidate index for best-fit / past-spike searches.
    #[arg(long)]
    pub search_to: Option<usize>,

    /// Cutoff index for `--cutoff fixed`.
    #[arg(long, default_value_t = 0)]
    pub cutoff_index: usize,

    /// Settling seconds per Watt of expected heat-load change (`--cutoff settle-time`).
    #[arg(long, default_value_t = SETTLE_SECONDS_PER_WATT)]
    pub settle_seconds_per_watt: f64,

    /// R² difference treated as a tie between cutoff candidates.
    #[arg(long, default_value_t = 1e-6)]
    pub tie_tolerance: f64,

    /// Minimum number of samples in a fit window.
    #[arg(long, default_value_t = crate::domain::MIN_FIT_WINDOW)]
    pub min_window: usize,

    /// R² below which a fit is flagged low-confidence.
    #[arg(long, default_value_t = 0.9)]
    pub min_r2: f64,

    /// Levenberg–Marquardt iteration cap per start.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// Number of τ restart seeds when the first start fails (0 disables).
    #[arg(long, default_value_t = 8)]
    pub restart_seeds: usize,
}

/// What to print and write after processing.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Render an ASCII plot of the run with this index.
    #[arg(long, value_name = "RUN_INDEX")]
    pub plot: Option<usize>,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export per-run results to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_csv: Option<PathBuf>,

    /// Export the full session report to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_json: Option<PathBuf>,
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}
