//! Process-lifecycle orchestration for multi-service stacks.
//!
//! `convoy` starts, watches, and stops sets of cooperating service
//! processes with explicit startup dependencies. The pieces compose
//! bottom-up:
//!
//! - [`retry`] bounds flaky actions with attempt-limited backoff;
//! - [`probe`] answers "is this service ready yet?" under a time budget;
//! - [`descriptor`] declares each service's launch command, dependencies,
//!   probe, and budgets;
//! - [`graph`] orders services so dependencies start first and stop last;
//! - [`runtime`] launches and signals the actual processes;
//! - [`registry`] tracks live handles by name and declared port;
//! - [`orchestrator`] drives the whole set through start, stop, and
//!   shutdown while reporting per-service status.
//!
//! ```no_run
//! use convoy::{
//!     LaunchSpec, Orchestrator, PortProbe, ProcessRuntime, ServiceDescriptor,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut orchestrator = Orchestrator::new(ProcessRuntime::new());
//! orchestrator.register(
//!     ServiceDescriptor::new("metad", LaunchSpec::new("nebula-metad"))
//!         .with_port(9559)
//!         .with_probe(Box::new(PortProbe::new("127.0.0.1", 9559))),
//! )?;
//! orchestrator.register(
//!     ServiceDescriptor::new("graphd", LaunchSpec::new("nebula-graphd"))
//!         .with_dependency("metad")
//!         .with_port(9669)
//!         .with_probe(Box::new(PortProbe::new("127.0.0.1", 9669))),
//! )?;
//! let report = orchestrator.start(None)?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod descriptor;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod probe;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod state;

pub use descriptor::{LaunchSpec, ServiceDescriptor};
pub use error::{ConfigError, FailureKind, OrchestrationError};
pub use graph::DependencyGraph;
pub use orchestrator::{Orchestrator, PostStartHook, StopFailure, StopReport};
pub use probe::{GraceProbe, PortProbe, Probe, ProbeStatus, ProbeTimeout};
pub use registry::ProcessRegistry;
pub use retry::{RetryPolicy, retry};
pub use runtime::{ProcessHandle, ProcessRuntime, Runtime, RuntimeError};
pub use state::{ServiceStatus, StatusEntry, StatusReport};

#[cfg(test)]
mod tests;
