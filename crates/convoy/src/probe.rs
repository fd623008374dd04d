//! Readiness probing with bounded polling.
//!
//! A [`Probe`] answers a tri-state readiness question; [`wait_until_ready`]
//! drives it through the retrier at a fixed poll interval until it reports
//! ready or the time budget runs out. Probe errors are not treated
//! specially: an erroring probe is simply not ready yet.

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::retry::{RetryPolicy, retry_with_sleep};

/// How long a single TCP connection attempt may take before the probe
/// reports not ready.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a single probe invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The service is ready to serve.
    Ready,
    /// The service is not ready yet; keep polling.
    NotReady,
    /// The probe itself failed; treated the same as not ready.
    Error {
        /// Description of the probe failure, surfaced in retry logging.
        message: String,
    },
}

/// A repeatable readiness check for one service.
pub trait Probe: Send {
    /// Performs one readiness check.
    fn check(&mut self) -> ProbeStatus;
}

/// Readiness was never observed within the polling budget.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("readiness not observed within {timeout_ms} ms ({attempts} probes)")]
pub struct ProbeTimeout {
    /// The overall budget that was exhausted, in milliseconds.
    pub timeout_ms: u64,
    /// Number of probe invocations performed.
    pub attempts: u32,
}

/// Internal retry error for a probe that is not ready yet.
struct NotYetReady {
    message: Option<String>,
}

impl fmt::Display for NotYetReady {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(formatter, "probe error: {message}"),
            None => formatter.write_str("not ready yet"),
        }
    }
}

/// Polls `probe` until it reports ready or `timeout` elapses.
///
/// The attempt budget is derived from `timeout / poll_interval` (at least
/// one attempt) and executed through the retrier with a constant delay, so
/// the polling cadence follows the retrier's semantics: every attempt but
/// the last sleeps `poll_interval` on failure.
///
/// # Errors
///
/// Returns [`ProbeTimeout`] when the budget is exhausted without the probe
/// ever reporting ready.
pub fn wait_until_ready(
    probe: &mut dyn Probe,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), ProbeTimeout> {
    wait_until_ready_with_sleep(probe, timeout, poll_interval, std::thread::sleep)
}

pub(crate) fn wait_until_ready_with_sleep<S>(
    probe: &mut dyn Probe,
    timeout: Duration,
    poll_interval: Duration,
    sleep: S,
) -> Result<(), ProbeTimeout>
where
    S: FnMut(Duration),
{
    let attempts = attempt_budget(timeout, poll_interval);
    let policy = RetryPolicy::new(attempts, poll_interval, 1.0);
    retry_with_sleep(
        &policy,
        || match probe.check() {
            ProbeStatus::Ready => Ok(()),
            ProbeStatus::NotReady => Err(NotYetReady { message: None }),
            ProbeStatus::Error { message } => Err(NotYetReady {
                message: Some(message),
            }),
        },
        sleep,
    )
    .map_err(|_| ProbeTimeout {
        timeout_ms: timeout.as_millis() as u64,
        attempts,
    })
}

fn attempt_budget(timeout: Duration, poll_interval: Duration) -> u32 {
    let interval_ms = poll_interval.as_millis().max(1);
    let attempts = timeout.as_millis() / interval_ms;
    u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
}

/// Probe that reports ready once something accepts TCP connections on the
/// configured address.
#[derive(Debug, Clone)]
pub struct PortProbe {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl PortProbe {
    /// Builds a probe for `host:port` with the default connect timeout.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Overrides the per-connection timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// The port this probe watches.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl Probe for PortProbe {
    fn check(&mut self) -> ProbeStatus {
        match try_connect(&self.host, self.port, self.connect_timeout) {
            Ok(()) => ProbeStatus::Ready,
            Err(error) if indicates_not_listening(&error) => ProbeStatus::NotReady,
            Err(error) => ProbeStatus::Error {
                message: format!("probing {}:{}: {error}", self.host, self.port),
            },
        }
    }
}

fn try_connect(host: &str, port: u16, timeout: Duration) -> io::Result<()> {
    let address = resolve_tcp(host, port)?;
    TcpStream::connect_timeout(&address, timeout).map(|_| ())
}

fn resolve_tcp(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved address"))
}

/// Whether a connection error means nothing is listening yet, as opposed to
/// a probe-level failure.
///
/// `ConnectionReset` is excluded: a reset means a listener accepted and
/// dropped the connection, which still counts as listening.
fn indicates_not_listening(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotFound
            | io::ErrorKind::AddrNotAvailable
    )
}

/// Last-resort probe for services with no observable readiness signal:
/// reports ready once a fixed grace period has elapsed since the first
/// check.
#[derive(Debug, Clone)]
pub struct GraceProbe {
    grace: Duration,
    first_check: Option<Instant>,
}

impl GraceProbe {
    /// Builds a probe that assumes readiness after `grace`.
    #[must_use]
    pub const fn new(grace: Duration) -> Self {
        Self {
            grace,
            first_check: None,
        }
    }
}

impl Probe for GraceProbe {
    fn check(&mut self) -> ProbeStatus {
        let started = *self.first_check.get_or_insert_with(Instant::now);
        if started.elapsed() >= self.grace {
            ProbeStatus::Ready
        } else {
            ProbeStatus::NotReady
        }
    }
}
