//! Static declarations of manageable service units.

use std::time::Duration;

use camino::Utf8PathBuf;

use crate::probe::{GraceProbe, Probe};

/// Default budget for a service to report ready after its launch action
/// succeeds.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(60);
/// Default budget for a graceful stop before forceful termination kicks in.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(15);
/// Default readiness polling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Instructions handed to the runtime collaborator to launch one service.
///
/// The orchestrator never inspects the contents; it only forwards the spec
/// to [`Runtime::launch`](crate::runtime::Runtime::launch) and observes the
/// returned handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
    /// Working directory for the launched process, when set.
    pub working_dir: Option<Utf8PathBuf>,
    /// Additional environment variables.
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Builds a spec for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replaces the argument list.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Static declaration of one manageable unit: its launch instructions,
/// startup dependencies, readiness probe, and time budgets.
///
/// Descriptors are immutable once registered with the orchestrator. The
/// probe defaults to an immediately-ready [`GraceProbe`], which suits
/// services with no readiness signal; services exposing a TCP listener
/// should declare a port and a [`PortProbe`](crate::probe::PortProbe).
pub struct ServiceDescriptor {
    name: String,
    depends_on: Vec<String>,
    launch: LaunchSpec,
    probe: Box<dyn Probe>,
    port: Option<u16>,
    start_timeout: Duration,
    stop_timeout: Duration,
    poll_interval: Duration,
}

impl ServiceDescriptor {
    /// Declares a service with default budgets and an immediately-ready
    /// probe.
    #[must_use]
    pub fn new(name: impl Into<String>, launch: LaunchSpec) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            launch,
            probe: Box::new(GraceProbe::new(Duration::ZERO)),
            port: None,
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Adds a startup dependency; the named service must be registered
    /// before this one and reach ready before this one starts.
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Replaces the readiness probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Box<dyn Probe>) -> Self {
        self.probe = probe;
        self
    }

    /// Declares the TCP port this service listens on, indexing it in the
    /// process registry for kill-by-port fallback.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Overrides the readiness budget.
    #[must_use]
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Overrides the graceful-stop budget.
    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Overrides the readiness polling cadence.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the services that must be ready before this one starts.
    #[must_use]
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    /// Launch instructions for the runtime collaborator.
    #[must_use]
    pub fn launch(&self) -> &LaunchSpec {
        &self.launch
    }

    /// Declared listening port, if any.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Readiness budget.
    #[must_use]
    pub const fn start_timeout(&self) -> Duration {
        self.start_timeout
    }

    /// Graceful-stop budget.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    /// Readiness polling cadence.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub(crate) fn probe_mut(&mut self) -> &mut dyn Probe {
        self.probe.as_mut()
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("launch", &self.launch)
            .field("port", &self.port)
            .field("start_timeout", &self.start_timeout)
            .field("stop_timeout", &self.stop_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
