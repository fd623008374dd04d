//! The runtime collaborator seam and its local-process implementation.
//!
//! The orchestrator launches and terminates services exclusively through
//! the [`Runtime`] trait, so environment-specific launch mechanics (local
//! binaries, containers, test fakes) are selected once at configuration
//! time rather than branched on throughout.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::descriptor::LaunchSpec;

/// Log target for runtime operations.
const RUNTIME_TARGET: &str = "convoy::runtime";

/// Cadence for polling a terminating process.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Opaque reference to a launched service process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProcessHandle {
    /// Operating-system process id.
    Pid(u32),
    /// Identifier issued by an external container runtime.
    Container(String),
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pid(pid) => write!(formatter, "pid {pid}"),
            Self::Container(id) => write!(formatter, "container {id}"),
        }
    }
}

/// Errors raised by runtime collaborators.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Spawning the service process failed.
    #[error("failed to launch '{program}': {source}")]
    Launch {
        /// Program that could not be spawned.
        program: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Delivering a signal to the process failed.
    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        /// Target process id.
        pid: u32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Checking the process status failed.
    #[error("failed to monitor pid {pid}: {source}")]
    Monitor {
        /// Target process id.
        pid: u32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The process outlived its graceful-stop budget.
    #[error("pid {pid} did not exit within {timeout_ms} ms")]
    TerminateTimeout {
        /// Target process id.
        pid: u32,
        /// Budget that was exhausted, in milliseconds.
        timeout_ms: u64,
    },
    /// This runtime cannot act on the given handle kind.
    #[error("handle {handle} is not managed by this runtime")]
    UnsupportedHandle {
        /// The foreign handle.
        handle: ProcessHandle,
    },
    /// No process handle is tracked for the service, so there is nothing
    /// to terminate.
    #[error("no tracked process handle for service '{service}'")]
    MissingHandle {
        /// The service without a handle.
        service: String,
    },
    /// The platform offers no process signalling.
    #[error("platform does not support process signalling")]
    UnsupportedPlatform,
}

/// External process manager the orchestrator delegates lifecycle actions
/// to.
pub trait Runtime {
    /// Launches the service described by `spec` and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns an error when the launch action fails; the orchestrator
    /// marks the service failed and aborts remaining starts.
    fn launch(&mut self, spec: &LaunchSpec) -> Result<ProcessHandle, RuntimeError>;

    /// Requests a graceful stop and waits up to `timeout` for the process
    /// to exit.
    ///
    /// # Errors
    ///
    /// Returns an error when the stop request cannot be delivered or the
    /// process outlives the budget; callers fall back to [`Runtime::kill`].
    fn terminate(&mut self, handle: &ProcessHandle, timeout: Duration) -> Result<(), RuntimeError>;

    /// Forcefully terminates the process.
    ///
    /// # Errors
    ///
    /// Returns an error when the kill cannot be delivered.
    fn kill(&mut self, handle: &ProcessHandle) -> Result<(), RuntimeError>;

    /// Whether the process behind `handle` is still believed running.
    fn is_running(&mut self, handle: &ProcessHandle) -> bool;
}

/// [`Runtime`] implementation over local child processes.
///
/// Launched children are tracked so they can be reaped; handles recovered
/// from a previous process (for example via pid files) are signalled by
/// pid directly.
#[derive(Debug, Default)]
pub struct ProcessRuntime {
    children: HashMap<u32, Child>,
}

impl ProcessRuntime {
    /// Creates a runtime with no tracked children.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn wait_for_exit(&mut self, pid: u32, timeout: Duration) -> Result<(), RuntimeError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.has_exited(pid)? {
                self.children.remove(&pid);
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RuntimeError::TerminateTimeout {
                    pid,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    fn has_exited(&mut self, pid: u32) -> Result<bool, RuntimeError> {
        if let Some(child) = self.children.get_mut(&pid) {
            return child
                .try_wait()
                .map(|status| status.is_some())
                .map_err(|source| RuntimeError::Monitor { pid, source });
        }
        // Not one of ours: probe with a null signal.
        Ok(!signal_zero_reaches(pid))
    }
}

impl Runtime for ProcessRuntime {
    fn launch(&mut self, spec: &LaunchSpec) -> Result<ProcessHandle, RuntimeError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        let child = command.spawn().map_err(|source| RuntimeError::Launch {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(
            target: RUNTIME_TARGET,
            program = %spec.program,
            pid,
            "service process spawned"
        );
        self.children.insert(pid, child);
        Ok(ProcessHandle::Pid(pid))
    }

    fn terminate(&mut self, handle: &ProcessHandle, timeout: Duration) -> Result<(), RuntimeError> {
        let pid = pid_of(handle)?;
        send_signal(pid, TERM_SIGNAL)?;
        self.wait_for_exit(pid, timeout)
    }

    fn kill(&mut self, handle: &ProcessHandle) -> Result<(), RuntimeError> {
        let pid = pid_of(handle)?;
        if let Some(mut child) = self.children.remove(&pid) {
            if let Err(source) = child.kill() {
                return Err(RuntimeError::Signal { pid, source });
            }
            if let Err(error) = child.wait() {
                warn!(
                    target: RUNTIME_TARGET,
                    pid,
                    error = %error,
                    "failed to reap killed child"
                );
            }
            return Ok(());
        }
        send_signal(pid, KILL_SIGNAL)
    }

    fn is_running(&mut self, handle: &ProcessHandle) -> bool {
        match pid_of(handle) {
            Ok(pid) => !self.has_exited(pid).unwrap_or(true),
            Err(_) => false,
        }
    }
}

fn pid_of(handle: &ProcessHandle) -> Result<u32, RuntimeError> {
    match handle {
        ProcessHandle::Pid(pid) => Ok(*pid),
        ProcessHandle::Container(_) => Err(RuntimeError::UnsupportedHandle {
            handle: handle.clone(),
        }),
    }
}

#[cfg(unix)]
const TERM_SIGNAL: i32 = libc::SIGTERM;
#[cfg(unix)]
const KILL_SIGNAL: i32 = libc::SIGKILL;
#[cfg(not(unix))]
const TERM_SIGNAL: i32 = 15;
#[cfg(not(unix))]
const KILL_SIGNAL: i32 = 9;

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> Result<(), RuntimeError> {
    // SAFETY: `kill(2)` is memory-safe even when the PID is invalid; the
    // kernel simply returns an error. We only translate the integer and
    // pass a standard signal number.
    let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if result == 0 {
        return Ok(());
    }
    let source = io::Error::last_os_error();
    // ESRCH means the process is already gone, which is the outcome the
    // caller was after in the first place.
    if source.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(RuntimeError::Signal { pid, source })
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: i32) -> Result<(), RuntimeError> {
    Err(RuntimeError::UnsupportedPlatform)
}

/// Whether a null signal reaches the process, meaning it still exists.
#[cfg(unix)]
fn signal_zero_reaches(pid: u32) -> bool {
    // SAFETY: signal 0 performs only the existence and permission checks.
    let result = unsafe { libc::kill(pid as libc::pid_t, 0) };
    result == 0
}

#[cfg(not(unix))]
fn signal_zero_reaches(_pid: u32) -> bool {
    false
}
