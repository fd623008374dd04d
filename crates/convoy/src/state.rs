//! Per-service run state and aggregated status reporting.

use std::fmt;

use serde::Serialize;

use crate::runtime::ProcessHandle;

/// Lifecycle state of one service, as believed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Not yet attempted in the current start sequence.
    Pending,
    /// Launch action invoked; readiness not yet observed.
    Starting,
    /// Launch succeeded and the readiness probe reported ready in budget.
    Ready,
    /// A launch, readiness, or stop step failed terminally.
    Failed,
    /// Graceful or forceful stop in progress.
    Stopping,
    /// The service was stopped.
    Stopped,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        formatter.write_str(label)
    }
}

/// Mutable per-service record owned exclusively by the orchestrator.
#[derive(Debug, Clone)]
pub(crate) struct RunState {
    pub status: ServiceStatus,
    pub handle: Option<ProcessHandle>,
    pub last_error: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            status: ServiceStatus::Pending,
            handle: None,
            last_error: None,
        }
    }
}

impl RunState {
    pub fn fail(&mut self, error: impl fmt::Display) {
        self.status = ServiceStatus::Failed;
        self.last_error = Some(error.to_string());
    }
}

/// One row of a [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// Service name.
    pub name: String,
    /// Status at snapshot time.
    pub status: ServiceStatus,
    /// Rendered error from the last failed transition, if any.
    pub last_error: Option<String>,
}

/// Point-in-time snapshot of every registered service's status, in
/// registration order.
///
/// Every top-level lifecycle operation hands one of these back, success or
/// failure, so operators always see the full per-service picture instead
/// of a bare boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct StatusReport {
    entries: Vec<StatusEntry>,
}

impl StatusReport {
    pub(crate) fn from_entries(entries: Vec<StatusEntry>) -> Self {
        Self { entries }
    }

    /// Rows of the snapshot, in registration order.
    #[must_use]
    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    /// Status of `name`, when registered.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<ServiceStatus> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.status)
    }

    /// Whether every service reached the given status.
    #[must_use]
    pub fn all(&self, status: ServiceStatus) -> bool {
        self.entries.iter().all(|entry| entry.status == status)
    }

    /// Names of the services currently in the given status.
    #[must_use]
    pub fn names_with_status(&self, status: ServiceStatus) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.name.clone())
            .collect()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, entry) in self.entries.iter().enumerate() {
            if index > 0 {
                writeln!(formatter)?;
            }
            write!(formatter, "{}: {}", entry.name, entry.status)?;
            if let Some(error) = &entry.last_error {
                write!(formatter, " ({error})")?;
            }
        }
        Ok(())
    }
}
