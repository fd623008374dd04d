//! CLI argument definitions for the `convoy` stack runner.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for orchestrating a local service stack.
#[derive(Parser, Debug)]
#[command(name = "convoy", version, about = "Local multi-service stack runner")]
pub(crate) struct Cli {
    /// Host the stack's services listen on.
    #[arg(long, short = 'H', default_value = "127.0.0.1")]
    pub(crate) host: String,
    /// Client-facing port of the stack's front service.
    #[arg(long, short = 'P', default_value_t = 9669)]
    pub(crate) port: u16,
    /// Base directory for data, logs, and pid files. Defaults to
    /// `~/.convoy/stack`.
    #[arg(long, short = 'b', value_name = "DIR")]
    pub(crate) base_path: Option<Utf8PathBuf>,
    /// Path to the JSON service manifest. A built-in three-service stack
    /// is used when omitted.
    #[arg(long, short = 'm', value_name = "FILE")]
    pub(crate) manifest: Option<Utf8PathBuf>,
    /// Enables debug-level logging.
    #[arg(long, short = 'd')]
    pub(crate) debug: bool,
    /// The lifecycle command to run.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Stack lifecycle commands.
#[derive(Subcommand, Debug, Clone, Copy)]
pub(crate) enum CliCommand {
    /// Starts the stack and waits for every service to become ready.
    Start {
        /// Wipes the base directory before starting.
        #[arg(long, short = 'u')]
        fresh: bool,
    },
    /// Stops the stack gracefully, falling back to forceful termination.
    Stop {
        /// Wipes the base directory after a clean stop.
        #[arg(long)]
        cleanup: bool,
    },
    /// Forcefully terminates every tracked service.
    Shutdown,
    /// Reports pid-file and port reachability for each service.
    Status,
}
