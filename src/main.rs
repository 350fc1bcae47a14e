//! subgraft binary entry point.

use std::process::ExitCode;

fn main() -> ExitCode {
    match subgraft::cli::run() {
        Ok(code) => code,
        Err(e) => {
            subgraft::ui::output::error(format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
