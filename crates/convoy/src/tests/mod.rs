//! End-to-end orchestration scenarios over a scripted runtime.

mod support;

use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;
use std::time::Duration;

use support::{NeverReadyProbe, ScriptedRuntime, SlowProbe};

use crate::descriptor::{LaunchSpec, ServiceDescriptor};
use crate::error::{ConfigError, FailureKind, OrchestrationError};
use crate::orchestrator::{Orchestrator, PostStartHook};
use crate::probe::ProbeStatus;
use crate::runtime::ProcessHandle;
use crate::state::{ServiceStatus, StatusReport};

fn service(name: &str, dependencies: &[&str]) -> ServiceDescriptor {
    let mut descriptor = ServiceDescriptor::new(name, LaunchSpec::new(name))
        .with_start_timeout(Duration::from_millis(200))
        .with_poll_interval(Duration::from_millis(5));
    for dependency in dependencies {
        descriptor = descriptor.with_dependency(*dependency);
    }
    descriptor
}

/// metad <- storaged <- graphd, all with immediately-ready probes.
fn three_service_stack(runtime: ScriptedRuntime) -> Orchestrator<ScriptedRuntime> {
    let mut orchestrator = Orchestrator::new(runtime);
    orchestrator.register(service("metad", &[])).expect("metad");
    orchestrator
        .register(service("storaged", &["metad"]))
        .expect("storaged");
    orchestrator
        .register(service("graphd", &["metad", "storaged"]))
        .expect("graphd");
    orchestrator
}

fn statuses(report: &StatusReport) -> Vec<(String, ServiceStatus)> {
    report
        .entries()
        .iter()
        .map(|entry| (entry.name.clone(), entry.status))
        .collect()
}

#[test]
fn start_brings_services_up_in_dependency_order() {
    let mut orchestrator = three_service_stack(ScriptedRuntime::new());
    let report = orchestrator.start(None).expect("start should succeed");

    assert!(report.all(ServiceStatus::Ready));
    assert_eq!(
        orchestrator.runtime().launched_programs(),
        ["metad", "storaged", "graphd"]
    );
    assert_eq!(orchestrator.registry().len(), 3);
}

#[test]
fn second_start_skips_services_already_ready() {
    let mut orchestrator = three_service_stack(ScriptedRuntime::new());
    orchestrator.start(None).expect("first start");
    let report = orchestrator.start(None).expect("second start");

    assert!(report.all(ServiceStatus::Ready));
    // No additional launches happened.
    assert_eq!(orchestrator.runtime().launched_programs().len(), 3);
}

#[test]
fn launch_failure_aborts_and_leaves_earlier_services_ready() {
    let runtime = ScriptedRuntime::new().fail_launch_of("storaged");
    let mut orchestrator = three_service_stack(runtime);
    let error = orchestrator.start(None).expect_err("start should fail");

    let OrchestrationError::Partial {
        service,
        kind: FailureKind::Action(_),
        report,
    } = error
    else {
        panic!("expected a partial action failure, got {error:?}");
    };
    assert_eq!(service, "storaged");
    assert_eq!(
        statuses(&report),
        [
            (String::from("metad"), ServiceStatus::Ready),
            (String::from("storaged"), ServiceStatus::Failed),
            (String::from("graphd"), ServiceStatus::Pending),
        ]
    );
    assert_eq!(orchestrator.runtime().launched_programs(), ["metad"]);
}

#[test]
fn readiness_timeout_aborts_remaining_starts() {
    let mut orchestrator = Orchestrator::new(ScriptedRuntime::new());
    orchestrator.register(service("metad", &[])).expect("metad");
    orchestrator
        .register(
            service("storaged", &["metad"])
                .with_probe(Box::new(NeverReadyProbe))
                .with_start_timeout(Duration::from_millis(20)),
        )
        .expect("storaged");
    orchestrator
        .register(service("graphd", &["storaged"]))
        .expect("graphd");

    let error = orchestrator.start(None).expect_err("start should fail");
    let OrchestrationError::Partial {
        service,
        kind: FailureKind::ProbeTimeout(_),
        report,
    } = error
    else {
        panic!("expected a readiness timeout, got {error:?}");
    };
    assert_eq!(service, "storaged");
    assert_eq!(report.status_of("metad"), Some(ServiceStatus::Ready));
    assert_eq!(report.status_of("graphd"), Some(ServiceStatus::Pending));
}

#[test]
fn deadline_expiry_reports_services_already_ready() {
    let mut orchestrator = Orchestrator::new(ScriptedRuntime::new());
    orchestrator
        .register(
            service("metad", &[]).with_probe(Box::new(SlowProbe {
                delay: Duration::from_millis(30),
                result: ProbeStatus::Ready,
            })),
        )
        .expect("metad");
    orchestrator
        .register(service("storaged", &["metad"]))
        .expect("storaged");

    let error = orchestrator
        .start(Some(Duration::from_millis(20)))
        .expect_err("deadline should expire");
    let OrchestrationError::DeadlineExceeded {
        budget_ms,
        ready,
        report,
    } = error
    else {
        panic!("expected a deadline failure, got {error:?}");
    };
    assert_eq!(budget_ms, 20);
    assert_eq!(ready, [String::from("metad")]);
    assert_eq!(report.status_of("storaged"), Some(ServiceStatus::Failed));
    // The deadline fired before storaged was ever launched.
    assert_eq!(orchestrator.runtime().launched_programs(), ["metad"]);
}

#[test]
fn stop_terminates_in_reverse_dependency_order() {
    let mut orchestrator = three_service_stack(ScriptedRuntime::new());
    orchestrator.start(None).expect("start");

    let outcome = orchestrator.stop(None);
    assert!(outcome.is_clean());
    assert!(outcome.report.all(ServiceStatus::Stopped));
    assert!(orchestrator.registry().is_empty());

    let runtime = orchestrator.runtime();
    let expected: Vec<u32> = ["graphd", "storaged", "metad"]
        .iter()
        .map(|program| runtime.pid_of(program).expect("launched"))
        .collect();
    assert_eq!(runtime.stop_attempts(), expected);
}

#[test]
fn stop_without_start_touches_nothing() {
    let mut orchestrator = three_service_stack(ScriptedRuntime::new());
    let outcome = orchestrator.stop(None);

    assert!(outcome.is_clean());
    assert!(outcome.report.all(ServiceStatus::Pending));
    assert!(orchestrator.runtime().events.is_empty());
}

#[test]
fn failed_graceful_stop_falls_back_to_forceful_termination() {
    let runtime = ScriptedRuntime::new().fail_terminate_of("graphd");
    let mut orchestrator = three_service_stack(runtime);
    orchestrator.start(None).expect("start");

    let outcome = orchestrator.stop(None);
    assert!(outcome.is_clean());
    assert!(outcome.report.all(ServiceStatus::Stopped));

    let runtime = orchestrator.runtime();
    let graphd = runtime.pid_of("graphd").expect("launched");
    // Graceful attempt first, then the forceful fallback on the same pid.
    assert_eq!(runtime.stop_attempts()[..2], [graphd, graphd]);
}

#[test]
fn unstoppable_service_is_recorded_without_aborting_the_sweep() {
    let runtime = ScriptedRuntime::new()
        .fail_terminate_of("storaged")
        .fail_kill_of("storaged");
    let mut orchestrator = three_service_stack(runtime);
    orchestrator.start(None).expect("start");

    let outcome = orchestrator.stop(None);
    assert!(!outcome.is_clean());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].service, "storaged");
    assert_eq!(
        outcome.report.status_of("storaged"),
        Some(ServiceStatus::Failed)
    );
    // The other services still came down.
    assert_eq!(
        outcome.report.status_of("metad"),
        Some(ServiceStatus::Stopped)
    );
    assert_eq!(
        outcome.report.status_of("graphd"),
        Some(ServiceStatus::Stopped)
    );
}

#[test]
fn stop_deadline_expiry_switches_to_forceful_termination() {
    let mut orchestrator = three_service_stack(ScriptedRuntime::new());
    orchestrator.start(None).expect("start");

    let outcome = orchestrator.stop(Some(Duration::ZERO));
    assert!(outcome.is_clean());
    assert!(outcome.report.all(ServiceStatus::Stopped));
    assert_eq!(orchestrator.runtime().stop_attempts().len(), 3);
    // The spent budget rules out graceful attempts entirely.
    assert!(
        orchestrator
            .runtime()
            .events
            .iter()
            .all(|event| !matches!(event, support::RuntimeEvent::Terminated { .. }))
    );
}

#[cfg(unix)]
#[test]
fn stopping_an_adopted_dead_process_reports_clean() {
    let mut child = std::process::Command::new("true")
        .spawn()
        .expect("spawn true");
    let pid = child.id();
    child.wait().expect("reap child");

    let mut orchestrator = Orchestrator::new(crate::runtime::ProcessRuntime::new());
    orchestrator.register(service("metad", &[])).expect("metad");
    orchestrator
        .adopt_running("metad", ProcessHandle::Pid(pid))
        .expect("adopt");

    let outcome = orchestrator.stop(None);
    assert!(outcome.is_clean());
    assert_eq!(
        outcome.report.status_of("metad"),
        Some(ServiceStatus::Stopped)
    );
}

#[test]
fn shutdown_kills_every_tracked_service() {
    let mut orchestrator = three_service_stack(ScriptedRuntime::new());
    orchestrator.start(None).expect("start");

    let outcome = orchestrator.shutdown();
    assert!(outcome.is_clean());
    assert!(outcome.report.all(ServiceStatus::Stopped));
    assert!(orchestrator.registry().is_empty());
    // Forceful only: no graceful terminate events at all.
    assert!(
        orchestrator
            .runtime()
            .events
            .iter()
            .all(|event| !matches!(event, support::RuntimeEvent::Terminated { .. }))
    );
}

struct RecordingHook {
    seen: Rc<RefCell<Vec<StatusReport>>>,
}

impl PostStartHook for RecordingHook {
    fn after_ready(&mut self, report: &StatusReport) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.seen.borrow_mut().push(report.clone());
        Ok(())
    }
}

struct FailingHook;

impl PostStartHook for FailingHook {
    fn after_ready(&mut self, _report: &StatusReport) -> Result<(), Box<dyn Error + Send + Sync>> {
        Err("bootstrap step exploded".into())
    }
}

#[test]
fn post_start_hook_runs_once_with_the_ready_report() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut orchestrator = three_service_stack(ScriptedRuntime::new());
    orchestrator.set_post_start_hook(Box::new(RecordingHook { seen: Rc::clone(&seen) }));

    orchestrator.start(None).expect("start");
    let calls = seen.borrow();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].all(ServiceStatus::Ready));
}

#[test]
fn post_start_hook_failure_leaves_services_running() {
    let mut orchestrator = three_service_stack(ScriptedRuntime::new());
    orchestrator.set_post_start_hook(Box::new(FailingHook));

    let error = orchestrator.start(None).expect_err("hook should fail");
    let OrchestrationError::Hook { message, report } = error else {
        panic!("expected a hook failure, got {error:?}");
    };
    assert!(message.contains("bootstrap step exploded"));
    assert!(report.all(ServiceStatus::Ready));
    assert_eq!(orchestrator.registry().len(), 3);
}

#[test]
fn adopted_handle_allows_stopping_without_a_prior_start() {
    let mut orchestrator = Orchestrator::new(ScriptedRuntime::new());
    orchestrator.register(service("metad", &[])).expect("metad");
    orchestrator
        .adopt_running("metad", ProcessHandle::Pid(4242))
        .expect("adopt");
    assert_eq!(
        orchestrator.status().status_of("metad"),
        Some(ServiceStatus::Ready)
    );

    let outcome = orchestrator.stop(None);
    assert!(outcome.is_clean());
    assert_eq!(orchestrator.runtime().stop_attempts(), [4242]);
    assert_eq!(
        outcome.report.status_of("metad"),
        Some(ServiceStatus::Stopped)
    );
}

#[test]
fn adopting_an_unregistered_service_is_rejected() {
    let mut orchestrator = Orchestrator::new(ScriptedRuntime::new());
    let error = orchestrator
        .adopt_running("ghost", ProcessHandle::Pid(1))
        .expect_err("adopt should fail");
    assert!(matches!(error, ConfigError::UnknownService { .. }));
}

#[test]
fn conflicting_port_declarations_are_rejected_at_registration() {
    let mut orchestrator = Orchestrator::new(ScriptedRuntime::new());
    orchestrator
        .register(service("metad", &[]).with_port(9559))
        .expect("metad");
    let error = orchestrator
        .register(service("storaged", &[]).with_port(9559))
        .expect_err("port clash should fail");
    assert!(matches!(
        error,
        ConfigError::DuplicatePort { port: 9559, .. }
    ));
}
