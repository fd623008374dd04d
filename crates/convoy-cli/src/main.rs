//! Binary entrypoint for the `convoy` stack runner.
//!
//! The binary delegates to [`convoy_cli::run`], which parses arguments,
//! installs telemetry, and drives the orchestrator for the selected
//! lifecycle command.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    convoy_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
