//! Dependency-ordered service lifecycle orchestration.
//!
//! The orchestrator owns a registered set of [`ServiceDescriptor`]s and a
//! per-service [`RunState`] table, and drives start/stop/shutdown
//! transitions on a single control thread. Launch and termination are
//! delegated to the [`Runtime`] collaborator; readiness to each service's
//! probe. The orchestrator itself never retries an action: retry budgets
//! belong inside actions and probes, keeping the transition logic
//! deterministic.
//!
//! Failure policy is deliberately asymmetric, mirroring the reference
//! behaviour: `start` aborts on the first failure and leaves
//! already-started services running (rolling back long-lived external
//! processes is itself failure-prone and non-idempotent), while `stop` and
//! `shutdown` are best-effort and sweep every service regardless of
//! individual failures.

use std::collections::HashMap;
use std::error::Error;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::descriptor::ServiceDescriptor;
use crate::error::{ConfigError, FailureKind, OrchestrationError};
use crate::graph::DependencyGraph;
use crate::probe::wait_until_ready;
use crate::registry::ProcessRegistry;
use crate::runtime::{ProcessHandle, Runtime, RuntimeError};
use crate::state::{RunState, ServiceStatus, StatusEntry, StatusReport};

/// Log target for orchestration transitions.
const ORCHESTRATOR_TARGET: &str = "convoy::orchestrator";

/// Hook invoked once after every service reaches ready, the seam for
/// one-time cluster bootstrap steps.
pub trait PostStartHook {
    /// Runs the bootstrap step.
    ///
    /// # Errors
    ///
    /// Returns an error to surface the failure as
    /// [`OrchestrationError::Hook`]; services stay running.
    fn after_ready(&mut self, report: &StatusReport) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Outcome of a best-effort `stop` or `shutdown` sweep.
///
/// Teardown never aborts early, so this is a plain report rather than a
/// `Result`: the status snapshot plus whichever services failed both the
/// graceful and forceful paths.
#[derive(Debug)]
pub struct StopReport {
    /// Snapshot taken after the sweep.
    pub report: StatusReport,
    /// Services that could not be stopped, with the terminal error.
    pub failures: Vec<StopFailure>,
}

impl StopReport {
    /// Whether every attempted stop succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One service that failed both graceful and forceful termination.
#[derive(Debug)]
pub struct StopFailure {
    /// The service that could not be stopped.
    pub service: String,
    /// The error from the final termination attempt.
    pub error: RuntimeError,
}

struct ServiceSlot {
    descriptor: ServiceDescriptor,
    state: RunState,
}

/// Owns the service set and drives lifecycle transitions in dependency
/// order.
pub struct Orchestrator<R: Runtime> {
    runtime: R,
    graph: DependencyGraph,
    services: Vec<ServiceSlot>,
    index: HashMap<String, usize>,
    registry: ProcessRegistry,
    hook: Option<Box<dyn PostStartHook>>,
}

impl<R: Runtime> Orchestrator<R> {
    /// Creates an orchestrator with no registered services.
    #[must_use]
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            graph: DependencyGraph::new(),
            services: Vec::new(),
            index: HashMap::new(),
            registry: ProcessRegistry::new(),
            hook: None,
        }
    }

    /// Installs the hook invoked once after every service reaches ready.
    pub fn set_post_start_hook(&mut self, hook: Box<dyn PostStartHook>) {
        self.hook = Some(hook);
    }

    /// Registers a service.
    ///
    /// Dependencies must name previously registered services, which rules
    /// out forward references and cycles before `start` ever runs.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for duplicate names, unknown dependencies
    /// or a listening port already declared by another service.
    pub fn register(&mut self, descriptor: ServiceDescriptor) -> Result<(), ConfigError> {
        if let Some(port) = descriptor.port() {
            if let Some(owner) = self.registry.port_owner(port) {
                if owner != descriptor.name() {
                    return Err(ConfigError::DuplicatePort {
                        port,
                        first: owner.to_owned(),
                        second: descriptor.name().to_owned(),
                    });
                }
            }
        }
        self.graph
            .insert(descriptor.name(), descriptor.depends_on())?;
        if let Some(port) = descriptor.port() {
            self.registry.declare_port(descriptor.name(), port)?;
        }
        self.index
            .insert(descriptor.name().to_owned(), self.services.len());
        self.services.push(ServiceSlot {
            descriptor,
            state: RunState::default(),
        });
        Ok(())
    }

    /// Starts every registered service in dependency order.
    ///
    /// Each service's launch action is invoked through the runtime, then
    /// its probe is polled under `start_timeout` (clipped by whatever
    /// remains of the overall `deadline`). The first failure aborts the
    /// remaining starts and surfaces as [`OrchestrationError::Partial`];
    /// services already ready are left running for the operator to stop
    /// explicitly. Services that are already ready from a previous call
    /// are skipped; every other state is reset to pending on entry.
    ///
    /// # Errors
    ///
    /// Returns an [`OrchestrationError`] carrying the full status snapshot
    /// on any launch failure, readiness timeout, deadline expiry, or hook
    /// failure.
    pub fn start(&mut self, deadline: Option<Duration>) -> Result<StatusReport, OrchestrationError> {
        let order = match self.graph.start_order() {
            Ok(order) => order,
            // insert() rules out every error kind except a cycle.
            Err(ConfigError::DependencyCycle { name }) => {
                return Err(OrchestrationError::CyclicDependency { name });
            }
            Err(other) => {
                return Err(OrchestrationError::CyclicDependency {
                    name: other.to_string(),
                });
            }
        };
        let started_at = Instant::now();
        for slot in &mut self.services {
            if slot.state.status != ServiceStatus::Ready {
                slot.state = RunState::default();
            }
        }
        for name in &order {
            let Some(&index) = self.index.get(name.as_str()) else {
                continue;
            };
            if self.services[index].state.status == ServiceStatus::Ready {
                continue;
            }
            if let Some(budget) = deadline {
                if started_at.elapsed() >= budget {
                    self.services[index]
                        .state
                        .fail("overall deadline expired before start");
                    return Err(self.deadline_exceeded(budget));
                }
            }
            let remaining = deadline.map(|budget| budget.saturating_sub(started_at.elapsed()));
            let started = self.start_one(index, name, remaining);
            if let Err(failure) = started {
                if let Some(budget) = deadline {
                    // A readiness timeout caused by the clipped budget is the
                    // deadline's fault, not the service's.
                    if started_at.elapsed() >= budget {
                        return Err(self.deadline_exceeded(budget));
                    }
                }
                return Err(failure);
            }
        }
        let report = self.status();
        if let Some(hook) = self.hook.as_mut() {
            info!(target: ORCHESTRATOR_TARGET, "running post-start hook");
            if let Err(hook_error) = hook.after_ready(&report) {
                error!(
                    target: ORCHESTRATOR_TARGET,
                    error = %hook_error,
                    "post-start hook failed"
                );
                return Err(OrchestrationError::Hook {
                    message: hook_error.to_string(),
                    report,
                });
            }
        }
        Ok(report)
    }

    fn start_one(
        &mut self,
        index: usize,
        name: &str,
        remaining: Option<Duration>,
    ) -> Result<(), OrchestrationError> {
        self.services[index].state.status = ServiceStatus::Starting;
        info!(target: ORCHESTRATOR_TARGET, service = name, "starting service");
        match self.runtime.launch(self.services[index].descriptor.launch()) {
            Ok(handle) => {
                self.services[index].state.handle = Some(handle.clone());
                self.registry.record(name, handle);
            }
            Err(launch_error) => {
                error!(
                    target: ORCHESTRATOR_TARGET,
                    service = name,
                    error = %launch_error,
                    "launch action failed; aborting remaining starts"
                );
                self.services[index].state.fail(&launch_error);
                return Err(OrchestrationError::Partial {
                    service: name.to_owned(),
                    kind: FailureKind::Action(launch_error),
                    report: self.status(),
                });
            }
        }
        let mut timeout = self.services[index].descriptor.start_timeout();
        if let Some(remaining) = remaining {
            timeout = timeout.min(remaining);
        }
        let poll_interval = self.services[index].descriptor.poll_interval();
        let probe_result = wait_until_ready(
            self.services[index].descriptor.probe_mut(),
            timeout,
            poll_interval,
        );
        match probe_result {
            Ok(()) => {
                self.services[index].state.status = ServiceStatus::Ready;
                info!(target: ORCHESTRATOR_TARGET, service = name, "service ready");
                Ok(())
            }
            Err(probe_timeout) => {
                error!(
                    target: ORCHESTRATOR_TARGET,
                    service = name,
                    error = %probe_timeout,
                    "readiness never observed; aborting remaining starts"
                );
                self.services[index].state.fail(&probe_timeout);
                Err(OrchestrationError::Partial {
                    service: name.to_owned(),
                    kind: FailureKind::ProbeTimeout(probe_timeout),
                    report: self.status(),
                })
            }
        }
    }

    fn deadline_exceeded(&self, budget: Duration) -> OrchestrationError {
        let report = self.status();
        OrchestrationError::DeadlineExceeded {
            budget_ms: budget.as_millis() as u64,
            ready: report.names_with_status(ServiceStatus::Ready),
            report,
        }
    }

    /// Stops every ready service gracefully, in reverse dependency order.
    ///
    /// A failed or timed-out graceful stop falls back to forceful
    /// termination via the tracked handle or the registry's port index.
    /// Individual failures are recorded and logged but never abort the
    /// sweep: draining the whole set is prioritised over strict ordering.
    ///
    /// The optional overall `deadline` bounds the sweep as a whole: each
    /// graceful wait is clipped to whatever remains of it, and once it
    /// expires the remaining services go straight to forceful termination.
    pub fn stop(&mut self, deadline: Option<Duration>) -> StopReport {
        let order = match self.graph.stop_order() {
            Ok(order) => order,
            Err(order_error) => {
                // Best-effort teardown must not fail on a corrupted graph.
                warn!(
                    target: ORCHESTRATOR_TARGET,
                    error = %order_error,
                    "stop order unavailable; falling back to reverse registration order"
                );
                let mut order = self.graph.registration_order().to_vec();
                order.reverse();
                order
            }
        };
        let started_at = Instant::now();
        let mut failures = Vec::new();
        for name in &order {
            let Some(&index) = self.index.get(name.as_str()) else {
                continue;
            };
            if self.services[index].state.status != ServiceStatus::Ready {
                continue;
            }
            self.services[index].state.status = ServiceStatus::Stopping;
            info!(target: ORCHESTRATOR_TARGET, service = name.as_str(), "stopping service");
            let remaining = deadline.map(|budget| budget.saturating_sub(started_at.elapsed()));
            match self.stop_one(index, name, remaining) {
                Ok(()) => self.mark_stopped(index, name),
                Err(stop_error) => {
                    warn!(
                        target: ORCHESTRATOR_TARGET,
                        service = name.as_str(),
                        error = %stop_error,
                        "service could not be stopped"
                    );
                    self.services[index].state.fail(&stop_error);
                    failures.push(StopFailure {
                        service: name.clone(),
                        error: stop_error,
                    });
                }
            }
        }
        StopReport {
            report: self.status(),
            failures,
        }
    }

    /// Graceful attempt first, then forceful fallback. Returns the error
    /// of the final attempt when both paths fail. An exhausted overall
    /// deadline skips the graceful attempt entirely.
    fn stop_one(
        &mut self,
        index: usize,
        name: &str,
        remaining: Option<Duration>,
    ) -> Result<(), RuntimeError> {
        let mut stop_timeout = self.services[index].descriptor.stop_timeout();
        if let Some(remaining) = remaining {
            stop_timeout = stop_timeout.min(remaining);
        }
        let deadline_expired = remaining.is_some_and(|left| left.is_zero());
        let port = self.services[index].descriptor.port();
        let tracked = self.services[index]
            .state
            .handle
            .clone()
            .or_else(|| self.registry.lookup_by_name(name).cloned());
        if deadline_expired {
            warn!(
                target: ORCHESTRATOR_TARGET,
                service = name,
                "overall stop deadline expired; terminating forcefully"
            );
        } else if let Some(handle) = &tracked {
            match self.runtime.terminate(handle, stop_timeout) {
                Ok(()) => return Ok(()),
                Err(graceful_error) => {
                    warn!(
                        target: ORCHESTRATOR_TARGET,
                        service = name,
                        error = %graceful_error,
                        "graceful stop failed; falling back to forceful termination"
                    );
                }
            }
        }
        let forceful = tracked
            .or_else(|| port.and_then(|port| self.registry.lookup_by_port(port).cloned()));
        match forceful {
            Some(handle) => self.runtime.kill(&handle),
            None => Err(RuntimeError::MissingHandle {
                service: name.to_owned(),
            }),
        }
    }

    /// Forcefully terminates every tracked service, regardless of order.
    ///
    /// The fast-path variant of [`Self::stop`]: no graceful attempt, no
    /// ordering guarantees, used when graceful stop is known unreliable or
    /// unnecessary.
    pub fn shutdown(&mut self) -> StopReport {
        let mut failures = Vec::new();
        for index in 0..self.services.len() {
            let name = self.services[index].descriptor.name().to_owned();
            let handle = self.services[index]
                .state
                .handle
                .clone()
                .or_else(|| self.registry.lookup_by_name(&name).cloned());
            let Some(handle) = handle else {
                continue;
            };
            self.services[index].state.status = ServiceStatus::Stopping;
            match self.runtime.kill(&handle) {
                Ok(()) => self.mark_stopped(index, &name),
                Err(kill_error) => {
                    warn!(
                        target: ORCHESTRATOR_TARGET,
                        service = name.as_str(),
                        error = %kill_error,
                        "forceful termination failed"
                    );
                    self.services[index].state.fail(&kill_error);
                    failures.push(StopFailure {
                        service: name,
                        error: kill_error,
                    });
                }
            }
        }
        StopReport {
            report: self.status(),
            failures,
        }
    }

    fn mark_stopped(&mut self, index: usize, name: &str) {
        self.services[index].state.status = ServiceStatus::Stopped;
        self.services[index].state.handle = None;
        self.registry.forget(name);
        info!(target: ORCHESTRATOR_TARGET, service = name, "service stopped");
    }

    /// Marks a service as ready with a handle recovered out-of-band (for
    /// example from a pid file), so a fresh process can drive `stop`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownService`] when `name` is not
    /// registered.
    pub fn adopt_running(
        &mut self,
        name: &str,
        handle: ProcessHandle,
    ) -> Result<(), ConfigError> {
        let Some(&index) = self.index.get(name) else {
            return Err(ConfigError::UnknownService {
                name: name.to_owned(),
            });
        };
        self.services[index].state = RunState {
            status: ServiceStatus::Ready,
            handle: Some(handle.clone()),
            last_error: None,
        };
        self.registry.record(name, handle);
        Ok(())
    }

    /// Snapshot of every service's status, in registration order.
    #[must_use]
    pub fn status(&self) -> StatusReport {
        StatusReport::from_entries(
            self.services
                .iter()
                .map(|slot| StatusEntry {
                    name: slot.descriptor.name().to_owned(),
                    status: slot.state.status,
                    last_error: slot.state.last_error.clone(),
                })
                .collect(),
        )
    }

    /// The registry of tracked process handles.
    #[must_use]
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// The runtime collaborator.
    #[must_use]
    pub fn runtime(&self) -> &R {
        &self.runtime
    }
}
