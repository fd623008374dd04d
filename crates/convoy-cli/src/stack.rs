//! Builds the orchestrator from a manifest and drives lifecycle commands.
//!
//! The stack layer owns everything the library core deliberately does not:
//! directory provisioning, pid-file persistence so a fresh `convoy` process
//! can stop services started by an earlier one, and the bootstrap commands
//! run once the whole stack is ready.

use std::error::Error;
use std::fs;
use std::io::Write;
use std::process::Command;
use std::time::Duration;

use anyhow::Context;
use camino::Utf8Path;
use tracing::{info, warn};

use convoy::{
    GraceProbe, LaunchSpec, OrchestrationError, Orchestrator, PortProbe, PostStartHook, Probe,
    ProcessHandle, ProcessRuntime, ServiceDescriptor, ServiceStatus, StatusReport, StopReport,
};

use crate::cli::Cli;
use crate::manifest::{Manifest, Placeholders};
use crate::paths::{PathsError, StackPaths};

/// Log target for stack operations.
const STACK_TARGET: &str = "convoy_cli::stack";

/// Connect timeout used by the `status` reachability check.
const STATUS_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors raised while driving a built stack.
#[derive(Debug, thiserror::Error)]
pub(crate) enum StackError {
    /// A stack directory or pid file could not be managed.
    #[error(transparent)]
    Paths(#[from] PathsError),
    /// The orchestrator reported a lifecycle failure.
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}

impl StackError {
    /// The per-service status snapshot attached to the failure, if any.
    pub(crate) fn report(&self) -> Option<&StatusReport> {
        match self {
            Self::Paths(_) => None,
            Self::Orchestration(error) => error.report(),
        }
    }
}

struct StackService {
    name: String,
    port: Option<u16>,
}

/// One configured stack: the orchestrator plus its on-disk layout.
pub(crate) struct Stack {
    orchestrator: Orchestrator<ProcessRuntime>,
    paths: StackPaths,
    host: String,
    services: Vec<StackService>,
}

impl Stack {
    /// Resolves paths, loads the manifest, and registers every service.
    pub(crate) fn build(cli: &Cli) -> anyhow::Result<Self> {
        let paths = StackPaths::resolve(cli.base_path.clone())?;
        let manifest = match &cli.manifest {
            Some(path) => Manifest::load(path)?,
            None => Manifest::builtin(cli.port),
        };
        let mut orchestrator = Orchestrator::new(ProcessRuntime::new());
        let mut services = Vec::new();
        for entry in &manifest.services {
            let data = paths.data_dir(&entry.name);
            let logs = paths.logs_dir(&entry.name);
            let placeholders = Placeholders {
                host: &cli.host,
                port: cli.port,
                base: paths.base(),
                data: &data,
                logs: &logs,
            };
            let launch = LaunchSpec::new(placeholders.expand(&entry.command))
                .with_args(entry.args.iter().map(|arg| placeholders.expand(arg)))
                .with_working_dir(paths.base().to_path_buf());
            let mut descriptor = ServiceDescriptor::new(&entry.name, launch);
            for dependency in &entry.depends_on {
                descriptor = descriptor.with_dependency(dependency);
            }
            descriptor = match entry.port {
                Some(port) => descriptor
                    .with_port(port)
                    .with_probe(Box::new(PortProbe::new(cli.host.clone(), port))),
                None => descriptor.with_probe(Box::new(GraceProbe::new(Duration::from_secs(
                    entry.grace_secs.unwrap_or_default(),
                )))),
            };
            if let Some(secs) = entry.start_timeout_secs {
                descriptor = descriptor.with_start_timeout(Duration::from_secs(secs));
            }
            if let Some(secs) = entry.stop_timeout_secs {
                descriptor = descriptor.with_stop_timeout(Duration::from_secs(secs));
            }
            if let Some(millis) = entry.poll_interval_ms {
                descriptor = descriptor.with_poll_interval(Duration::from_millis(millis));
            }
            orchestrator
                .register(descriptor)
                .with_context(|| format!("registering service '{}'", entry.name))?;
            services.push(StackService {
                name: entry.name.clone(),
                port: entry.port,
            });
        }
        if !manifest.bootstrap.is_empty() {
            let data_root = paths.base().join("data");
            let logs_root = paths.base().join("logs");
            let placeholders = Placeholders {
                host: &cli.host,
                port: cli.port,
                base: paths.base(),
                data: &data_root,
                logs: &logs_root,
            };
            let commands = manifest
                .bootstrap
                .iter()
                .map(|entry| {
                    (
                        placeholders.expand(&entry.command),
                        entry
                            .args
                            .iter()
                            .map(|arg| placeholders.expand(arg))
                            .collect(),
                    )
                })
                .collect();
            orchestrator.set_post_start_hook(Box::new(CommandHook { commands }));
        }
        Ok(Self {
            orchestrator,
            paths,
            host: cli.host.clone(),
            services,
        })
    }

    /// Provisions directories and starts every service.
    ///
    /// With `fresh`, the base directory is wiped first. Pids of launched
    /// services are persisted under `{base}/run` so later invocations can
    /// stop them — including on a failed start, where services launched
    /// before the failure stay running and must remain reachable by a
    /// later `stop`.
    pub(crate) fn start(&mut self, fresh: bool) -> Result<StatusReport, StackError> {
        if fresh {
            info!(target: STACK_TARGET, base = %self.paths.base(), "wiping stack directory");
            self.paths.cleanup()?;
        }
        let names: Vec<String> = self.services.iter().map(|s| s.name.clone()).collect();
        self.paths.ensure(&names)?;
        let outcome = self.orchestrator.start(None);
        self.write_pid_files()?;
        Ok(outcome?)
    }

    /// Recovers handles from pid files and stops the stack gracefully.
    ///
    /// Pid files of services that actually stopped are removed; with
    /// `cleanup` and a fully clean stop, the base directory is wiped too.
    pub(crate) fn stop(&mut self, cleanup: bool) -> Result<StopReport, StackError> {
        self.recover_handles();
        let outcome = self.orchestrator.stop(None);
        self.clear_pid_files(&outcome.report);
        if cleanup && outcome.is_clean() {
            self.paths.cleanup()?;
        }
        Ok(outcome)
    }

    /// Recovers handles from pid files and terminates everything forcefully.
    pub(crate) fn shutdown(&mut self) -> StopReport {
        self.recover_handles();
        let outcome = self.orchestrator.shutdown();
        self.clear_pid_files(&outcome.report);
        outcome
    }

    /// Writes one line per service: pid-file state and, for services with a
    /// declared port, TCP reachability.
    pub(crate) fn status<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        for service in &self.services {
            let pid_part = match read_pid_file(&self.paths.pid_file(&service.name)) {
                Some(pid) => format!("pid {pid}"),
                None => String::from("no pid file"),
            };
            match service.port {
                Some(port) => {
                    let mut probe = PortProbe::new(self.host.clone(), port)
                        .with_connect_timeout(STATUS_CONNECT_TIMEOUT);
                    let reachability = if probe.check() == convoy::ProbeStatus::Ready {
                        "reachable"
                    } else {
                        "unreachable"
                    };
                    writeln!(
                        out,
                        "{}: {pid_part}, port {port} {reachability}",
                        service.name
                    )?;
                }
                None => writeln!(out, "{}: {pid_part}", service.name)?,
            }
        }
        Ok(())
    }

    fn write_pid_files(&self) -> Result<(), PathsError> {
        for (name, handle) in self.orchestrator.registry().iter() {
            let ProcessHandle::Pid(pid) = handle else {
                continue;
            };
            let path = self.paths.pid_file(name);
            fs::write(&path, format!("{pid}\n")).map_err(|source| PathsError::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Adopts handles recorded by a previous invocation, so stop and
    /// shutdown can reach processes this one never launched.
    fn recover_handles(&mut self) -> usize {
        let mut recovered = 0;
        for service in &self.services {
            let path = self.paths.pid_file(&service.name);
            let Some(pid) = read_pid_file(&path) else {
                continue;
            };
            match self
                .orchestrator
                .adopt_running(&service.name, ProcessHandle::Pid(pid))
            {
                Ok(()) => recovered += 1,
                Err(error) => warn!(
                    target: STACK_TARGET,
                    service = service.name.as_str(),
                    error = %error,
                    "failed to adopt recovered pid"
                ),
            }
        }
        recovered
    }

    /// Removes pid files of services that are confirmed stopped.
    fn clear_pid_files(&self, report: &StatusReport) {
        for entry in report.entries() {
            if entry.status != ServiceStatus::Stopped {
                continue;
            }
            let path = self.paths.pid_file(&entry.name);
            if !path.exists() {
                continue;
            }
            if let Err(error) = fs::remove_file(&path) {
                warn!(
                    target: STACK_TARGET,
                    path = %path,
                    error = %error,
                    "failed to remove pid file"
                );
            }
        }
    }
}

fn read_pid_file(path: &Utf8Path) -> Option<u32> {
    let text = fs::read_to_string(path).ok()?;
    text.trim().parse().ok()
}

/// Runs the manifest's bootstrap commands sequentially once the stack is
/// ready.
struct CommandHook {
    commands: Vec<(String, Vec<String>)>,
}

impl PostStartHook for CommandHook {
    fn after_ready(&mut self, _report: &StatusReport) -> Result<(), Box<dyn Error + Send + Sync>> {
        for (program, args) in &self.commands {
            info!(target: STACK_TARGET, command = program.as_str(), "running bootstrap command");
            let status = Command::new(program)
                .args(args)
                .status()
                .map_err(|error| format!("bootstrap command '{program}' failed to run: {error}"))?;
            if !status.success() {
                return Err(format!("bootstrap command '{program}' exited with {status}").into());
            }
        }
        Ok(())
    }
}
