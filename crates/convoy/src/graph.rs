//! Dependency graph over registered services with stable topological
//! ordering.

use std::collections::HashMap;

use crate::error::ConfigError;

/// Startup-dependency graph keyed by service name.
///
/// Insertion order is preserved and used to break ordering ties, so two
/// independent services always start in registration order. Because a
/// dependency must name a previously inserted service, the graph can never
/// contain a forward reference or a cycle through the public API; the
/// ordering walk still re-checks for cycles defensively.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Service names in registration order.
    order: Vec<String>,
    /// Dependencies of each service.
    depends_on: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with its dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateService`] when `name` is already
    /// present and [`ConfigError::UnknownDependency`] when a dependency
    /// does not name a previously registered service.
    pub fn insert(&mut self, name: &str, depends_on: &[String]) -> Result<(), ConfigError> {
        if self.depends_on.contains_key(name) {
            return Err(ConfigError::DuplicateService {
                name: name.to_owned(),
            });
        }
        for dependency in depends_on {
            if !self.depends_on.contains_key(dependency.as_str()) {
                return Err(ConfigError::UnknownDependency {
                    name: name.to_owned(),
                    dependency: dependency.clone(),
                });
            }
        }
        self.order.push(name.to_owned());
        self.depends_on.insert(name.to_owned(), depends_on.to_vec());
        Ok(())
    }

    /// Service names in registration order.
    #[must_use]
    pub fn registration_order(&self) -> &[String] {
        &self.order
    }

    /// Computes a dependency-respecting start order.
    ///
    /// Every service is placed after all of its dependencies; ties are
    /// broken by registration order, so the result is deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DependencyCycle`] if the graph somehow
    /// contains a cycle. Registration already prevents this; the check is
    /// kept so a corrupted graph fails fast instead of looping.
    pub fn start_order(&self) -> Result<Vec<String>, ConfigError> {
        let mut remaining_deps: HashMap<&str, usize> = self
            .order
            .iter()
            .map(|name| (name.as_str(), self.dependency_count(name)))
            .collect();
        let mut ordered = Vec::with_capacity(self.order.len());
        let mut placed: HashMap<&str, bool> =
            self.order.iter().map(|name| (name.as_str(), false)).collect();

        while ordered.len() < self.order.len() {
            // First unplaced service with no unplaced dependencies, scanning
            // in registration order for stable ties.
            let next = self.order.iter().find(|name| {
                !placed.get(name.as_str()).copied().unwrap_or(false)
                    && remaining_deps.get(name.as_str()).copied().unwrap_or(0) == 0
            });
            let Some(next) = next else {
                let stuck = self
                    .order
                    .iter()
                    .find(|name| !placed.get(name.as_str()).copied().unwrap_or(false))
                    .cloned()
                    .unwrap_or_default();
                return Err(ConfigError::DependencyCycle { name: stuck });
            };
            placed.insert(next.as_str(), true);
            ordered.push(next.clone());
            for (name, deps) in &self.depends_on {
                if deps.iter().any(|dep| dep == next) {
                    if let Some(count) = remaining_deps.get_mut(name.as_str()) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }
        Ok(ordered)
    }

    /// Computes the stop order: the exact reverse of [`Self::start_order`].
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigError::DependencyCycle`] from the start-order
    /// walk.
    pub fn stop_order(&self) -> Result<Vec<String>, ConfigError> {
        let mut order = self.start_order()?;
        order.reverse();
        Ok(order)
    }

    fn dependency_count(&self, name: &str) -> usize {
        self.depends_on.get(name).map_or(0, Vec::len)
    }
}
