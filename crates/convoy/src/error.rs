//! Error surface of the orchestration core.

use thiserror::Error;

use crate::probe::ProbeTimeout;
use crate::runtime::RuntimeError;
use crate::state::StatusReport;

/// A service set could not be configured.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A service with this name is already registered.
    #[error("service '{name}' is already registered")]
    DuplicateService {
        /// Conflicting service name.
        name: String,
    },
    /// A dependency does not name a previously registered service. This
    /// also rules out forward references and cycles at registration time.
    #[error("service '{name}' depends on unknown service '{dependency}'")]
    UnknownDependency {
        /// Service being registered.
        name: String,
        /// The unresolvable dependency.
        dependency: String,
    },
    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected involving '{name}'")]
    DependencyCycle {
        /// A service on the cycle.
        name: String,
    },
    /// Two services declared the same listening port.
    #[error("port {port} is declared by both '{first}' and '{second}'")]
    DuplicatePort {
        /// The doubly claimed port.
        port: u16,
        /// Service that declared the port first.
        first: String,
        /// Service attempting to re-declare it.
        second: String,
    },
    /// The named service is not registered.
    #[error("service '{name}' is not registered")]
    UnknownService {
        /// The unknown name.
        name: String,
    },
}

/// Why one service failed during a start sequence.
#[derive(Debug, Error)]
pub enum FailureKind {
    /// The launch action reported failure.
    #[error("launch action failed: {0}")]
    Action(#[source] RuntimeError),
    /// The launch action succeeded but readiness was never observed.
    #[error(transparent)]
    ProbeTimeout(ProbeTimeout),
}

/// A top-level orchestration operation failed.
///
/// Every variant that reflects a partial outcome carries the full
/// per-service [`StatusReport`] so callers can decide what to remediate.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The dependency graph was found cyclic at start time.
    #[error("dependency cycle detected involving '{name}'")]
    CyclicDependency {
        /// A service on the cycle.
        name: String,
    },
    /// A service failed to start; earlier services remain running.
    #[error("service '{service}' failed to start: {kind}")]
    Partial {
        /// The service that failed.
        service: String,
        /// What went wrong.
        #[source]
        kind: FailureKind,
        /// Snapshot taken at the moment of failure.
        report: StatusReport,
    },
    /// The overall deadline expired mid-sequence.
    #[error("deadline of {budget_ms} ms exceeded; services ready before cutover: {ready:?}")]
    DeadlineExceeded {
        /// The overall budget, in milliseconds.
        budget_ms: u64,
        /// Services that reached ready before the cutover.
        ready: Vec<String>,
        /// Snapshot taken at the moment of expiry.
        report: StatusReport,
    },
    /// Every service became ready but the post-start hook failed.
    #[error("post-start hook failed: {message}")]
    Hook {
        /// Rendered hook error.
        message: String,
        /// Snapshot taken after startup.
        report: StatusReport,
    },
}

impl OrchestrationError {
    /// The status snapshot attached to this failure, when one exists.
    #[must_use]
    pub fn report(&self) -> Option<&StatusReport> {
        match self {
            Self::CyclicDependency { .. } => None,
            Self::Partial { report, .. }
            | Self::DeadlineExceeded { report, .. }
            | Self::Hook { report, .. } => Some(report),
        }
    }
}
