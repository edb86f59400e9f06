//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and initialises logging
//! - loads (or synthesizes) a session
//! - runs the processing pipeline
//! - prints the report and optional plot
//! - writes optional exports

use clap::Parser;
use log::info;

use crate::cli::{AnalysisArgs, Command, DemoArgs, OutputArgs, ProcessArgs};
use crate::domain::{Session, SessionReport};
use crate::error::AppError;
use crate::fit::{CutoffOptions, CutoffPolicy, FitOptions};

pub mod pipeline;

use pipeline::{process_session, ProcessOptions};

/// Entry point for the `q0` binary.
pub fn run() -> Result<(), AppError> {
    // `q0 session.json` is shorthand for `q0 process session.json`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);
    crate::cli::init_logging(cli.verbosity());

    match cli.command {
        Command::Process(args) => handle_process(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn handle_process(args: ProcessArgs) -> Result<(), AppError> {
    let session = crate::io::load_session(&args.session)?;
    info!("loaded session {} from {}", session.cavity_id, args.session.display());

    let report = process_session(&session, &process_options_from_args(&args.analysis));
    emit(&session, &report, &args.output)
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let session = crate::data::demo_session(args.seed, args.noise)?;
    if let Some(path) = &args.save_session {
        crate::io::save_session(path, &session)?;
        info!("wrote demo session to {}", path.display());
    }

    let report = process_session(&session, &process_options_from_args(&args.analysis));
    emit(&session, &report, &args.output)
}

fn emit(session: &Session, report: &SessionReport, output: &OutputArgs) -> Result<(), AppError> {
    println!("{}", crate::report::format_session_report(report));

    if let Some(index) = output.plot {
        let Some((run, run_report)) = session
            .runs
            .iter()
            .zip(&report.runs)
            .find(|(run, _)| run.id.index == index)
        else {
            return Err(AppError::new(2, format!("No run with index {index} to plot.")));
        };
        let plot = crate::plot::render_fit_plot(
            &run.samples,
            run_report.cutoff.as_ref(),
            run_report.fit.as_ref(),
            output.width,
            output.height,
        );
        println!("{plot}");
    }

    // Optional exports.
    if let Some(path) = &output.export_csv {
        crate::io::export::write_results_csv(path, report)?;
    }
    if let Some(path) = &output.export_json {
        crate::io::export::write_report_json(path, report)?;
    }

    // A session where nothing could be processed is an error for scripting purposes.
    if !report.runs.is_empty() && report.runs.iter().all(|r| r.is_failed()) {
        if let Some(first) = report.runs.iter().find_map(|r| r.failure.as_ref()) {
            return Err(AppError::new(
                first.error.exit_code(),
                format!("All {} runs failed; first: {}", report.runs.len(), first.error),
            ));
        }
    }

    Ok(())
}

pub fn process_options_from_args(args: &AnalysisArgs) -> ProcessOptions {
    ProcessOptions {
        cutoff: CutoffOptions {
            policy: CutoffPolicy::from_mode(
                args.cutoff,
                args.search_to,
                args.cutoff_index,
                args.settle_seconds_per_watt,
            ),
            tie_tolerance: args.tie_tolerance,
        },
        fit: FitOptions {
            max_iterations: args.max_iterations,
            min_window: args.min_window,
            min_r2: args.min_r2,
            restart_seeds: args.restart_seeds,
            ..FitOptions::default()
        },
    }
}

/// Rewrite argv so a bare session path defaults to `process`.
///
/// Rules:
/// - `q0 session.json ...`     -> `q0 process session.json ...`
/// - `q0 -v session.json ...`  -> `q0 -v process session.json ...`
/// - `q0 --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    // Skip leading global verbosity flags.
    let first = argv
        .iter()
        .skip(1)
        .position(|a| !is_verbosity_flag(a))
        .map(|p| p + 1);
    let Some(pos) = first else {
        return argv;
    };

    let arg = argv[pos].as_str();
    let is_known = matches!(
        arg,
        "-h" | "--help" | "-V" | "--version" | "help" | "process" | "demo"
    );
    if is_known || arg.starts_with('-') {
        return argv;
    }

    argv.insert(pos, "process".to_string());
    argv
}

fn is_verbosity_flag(arg: &str) -> bool {
    arg == "--verbose" || (arg.len() > 1 && arg.starts_with('-') && !arg.starts_with("--") && arg[1..].chars().all(|c| c == 'v'))
}
