use std::process::ExitCode;

fn main() -> ExitCode {
    match q0_calorimetry::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
