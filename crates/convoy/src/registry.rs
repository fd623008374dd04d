//! Tracking of launched process handles by name and declared port.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::runtime::ProcessHandle;

/// Registry of the processes currently believed running, addressable by
/// service name or by declared listening port.
///
/// The port index is derived from descriptor declarations (one port per
/// service, no aliasing) and survives [`Self::forget`], since it describes
/// configuration rather than a live process.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    handles: HashMap<String, ProcessHandle>,
    ports: HashMap<u16, String>,
}

impl ProcessRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `port` as belonging to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicatePort`] when another service already
    /// declared the port.
    pub fn declare_port(&mut self, name: &str, port: u16) -> Result<(), ConfigError> {
        if let Some(existing) = self.ports.get(&port) {
            if existing != name {
                return Err(ConfigError::DuplicatePort {
                    port,
                    first: existing.clone(),
                    second: name.to_owned(),
                });
            }
        }
        self.ports.insert(port, name.to_owned());
        Ok(())
    }

    /// Service that declared `port`, if any.
    #[must_use]
    pub fn port_owner(&self, port: u16) -> Option<&str> {
        self.ports.get(&port).map(String::as_str)
    }

    /// Records the handle of a launched service, replacing any previous
    /// entry.
    pub fn record(&mut self, name: &str, handle: ProcessHandle) {
        self.handles.insert(name.to_owned(), handle);
    }

    /// Handle recorded for `name`, if the service is believed running.
    #[must_use]
    pub fn lookup_by_name(&self, name: &str) -> Option<&ProcessHandle> {
        self.handles.get(name)
    }

    /// Handle of the service that declared `port`, if one is recorded.
    #[must_use]
    pub fn lookup_by_port(&self, port: u16) -> Option<&ProcessHandle> {
        self.ports
            .get(&port)
            .and_then(|name| self.handles.get(name))
    }

    /// Drops the handle recorded for `name`, returning it.
    pub fn forget(&mut self, name: &str) -> Option<ProcessHandle> {
        self.handles.remove(name)
    }

    /// Iterates over `(name, handle)` pairs of tracked services.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProcessHandle)> {
        self.handles
            .iter()
            .map(|(name, handle)| (name.as_str(), handle))
    }

    /// Number of tracked handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no handle is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
