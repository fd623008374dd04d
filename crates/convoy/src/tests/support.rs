//! Test doubles shared by the orchestration scenarios.

use std::collections::{HashMap, HashSet};
use std::io;
use std::time::Duration;

use crate::descriptor::LaunchSpec;
use crate::probe::{Probe, ProbeStatus};
use crate::runtime::{ProcessHandle, Runtime, RuntimeError};

/// One recorded runtime interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Launched { program: String, pid: u32 },
    Terminated { pid: u32 },
    Killed { pid: u32 },
}

/// In-memory [`Runtime`] that records every interaction and fails on cue.
///
/// Pids are handed out sequentially from 100, so tests can correlate
/// events without depending on the operating system.
#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    pub events: Vec<RuntimeEvent>,
    next_pid: u32,
    programs: HashMap<u32, String>,
    running: HashSet<u32>,
    fail_launch: HashSet<String>,
    fail_terminate: HashSet<String>,
    fail_kill: HashSet<String>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self {
            next_pid: 100,
            ..Self::default()
        }
    }

    pub fn fail_launch_of(mut self, program: &str) -> Self {
        self.fail_launch.insert(program.to_owned());
        self
    }

    pub fn fail_terminate_of(mut self, program: &str) -> Self {
        self.fail_terminate.insert(program.to_owned());
        self
    }

    pub fn fail_kill_of(mut self, program: &str) -> Self {
        self.fail_kill.insert(program.to_owned());
        self
    }

    /// Programs successfully launched, in order.
    pub fn launched_programs(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RuntimeEvent::Launched { program, .. } => Some(program.clone()),
                _ => None,
            })
            .collect()
    }

    /// Pids targeted by terminate or kill attempts, in order.
    pub fn stop_attempts(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RuntimeEvent::Terminated { pid } | RuntimeEvent::Killed { pid } => Some(*pid),
                RuntimeEvent::Launched { .. } => None,
            })
            .collect()
    }

    /// Pid assigned to `program` at launch.
    pub fn pid_of(&self, program: &str) -> Option<u32> {
        self.programs
            .iter()
            .find(|(_, launched)| launched.as_str() == program)
            .map(|(pid, _)| *pid)
    }

    fn scripted_to_fail(&self, set: &HashSet<String>, pid: u32) -> bool {
        self.programs
            .get(&pid)
            .is_some_and(|program| set.contains(program))
    }
}

impl Runtime for ScriptedRuntime {
    fn launch(&mut self, spec: &LaunchSpec) -> Result<ProcessHandle, RuntimeError> {
        if self.fail_launch.contains(&spec.program) {
            return Err(RuntimeError::Launch {
                program: spec.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted launch failure"),
            });
        }
        let pid = self.next_pid;
        self.next_pid += 1;
        self.programs.insert(pid, spec.program.clone());
        self.running.insert(pid);
        self.events.push(RuntimeEvent::Launched {
            program: spec.program.clone(),
            pid,
        });
        Ok(ProcessHandle::Pid(pid))
    }

    fn terminate(&mut self, handle: &ProcessHandle, timeout: Duration) -> Result<(), RuntimeError> {
        let ProcessHandle::Pid(pid) = handle else {
            return Err(RuntimeError::UnsupportedHandle {
                handle: handle.clone(),
            });
        };
        self.events.push(RuntimeEvent::Terminated { pid: *pid });
        if self.scripted_to_fail(&self.fail_terminate, *pid) {
            return Err(RuntimeError::TerminateTimeout {
                pid: *pid,
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        self.running.remove(pid);
        Ok(())
    }

    fn kill(&mut self, handle: &ProcessHandle) -> Result<(), RuntimeError> {
        let ProcessHandle::Pid(pid) = handle else {
            return Err(RuntimeError::UnsupportedHandle {
                handle: handle.clone(),
            });
        };
        self.events.push(RuntimeEvent::Killed { pid: *pid });
        if self.scripted_to_fail(&self.fail_kill, *pid) {
            return Err(RuntimeError::Signal {
                pid: *pid,
                source: io::Error::new(io::ErrorKind::PermissionDenied, "scripted kill failure"),
            });
        }
        self.running.remove(pid);
        Ok(())
    }

    fn is_running(&mut self, handle: &ProcessHandle) -> bool {
        match handle {
            ProcessHandle::Pid(pid) => self.running.contains(pid),
            ProcessHandle::Container(_) => false,
        }
    }
}

/// Probe that never reports ready.
pub struct NeverReadyProbe;

impl Probe for NeverReadyProbe {
    fn check(&mut self) -> ProbeStatus {
        ProbeStatus::NotReady
    }
}

/// Probe that burns wall-clock time on every check before answering.
pub struct SlowProbe {
    pub delay: Duration,
    pub result: ProbeStatus,
}

impl Probe for SlowProbe {
    fn check(&mut self) -> ProbeStatus {
        std::thread::sleep(self.delay);
        self.result.clone()
    }
}
