//! Command-line runtime for the `convoy` stack runner.
//!
//! Parses arguments, installs telemetry, builds the stack from the
//! manifest, and dispatches the selected lifecycle command. The interface
//! is exercised both from the binary entrypoint and from integration tests
//! where IO streams can be substituted.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;

mod cli;
mod manifest;
mod paths;
mod stack;
mod telemetry;

use cli::{Cli, CliCommand};
use stack::Stack;

/// Runs the CLI against the provided arguments and IO streams.
pub fn run<I, T, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        // clap renders help and version output through its error path.
        Err(error) => {
            return if error.use_stderr() {
                let _ = write!(stderr, "{error}");
                ExitCode::FAILURE
            } else {
                let _ = write!(stdout, "{error}");
                ExitCode::SUCCESS
            };
        }
    };
    if let Err(error) = telemetry::init(cli.debug) {
        let _ = writeln!(stderr, "convoy: {error}");
        return ExitCode::FAILURE;
    }
    match dispatch(cli, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "convoy: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch<W: Write>(cli: Cli, stdout: &mut W) -> anyhow::Result<()> {
    let command = cli.command;
    let mut stack = Stack::build(&cli)?;
    match command {
        CliCommand::Start { fresh } => match stack.start(fresh) {
            Ok(report) => writeln!(stdout, "{report}")?,
            Err(error) => {
                // Surface the per-service picture before the error itself.
                if let Some(report) = error.report() {
                    writeln!(stdout, "{report}")?;
                }
                return Err(error.into());
            }
        },
        CliCommand::Stop { cleanup } => {
            let outcome = stack.stop(cleanup)?;
            writeln!(stdout, "{}", outcome.report)?;
            if !outcome.is_clean() {
                anyhow::bail!("{} service(s) could not be stopped", outcome.failures.len());
            }
        }
        CliCommand::Shutdown => {
            let outcome = stack.shutdown();
            writeln!(stdout, "{}", outcome.report)?;
            if !outcome.is_clean() {
                anyhow::bail!(
                    "{} service(s) could not be terminated",
                    outcome.failures.len()
                );
            }
        }
        CliCommand::Status => stack.status(stdout)?,
    }
    Ok(())
}
