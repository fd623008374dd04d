//! Declarative JSON description of the services making up a stack.
//!
//! A manifest lists each service's launch command, declared port, startup
//! dependencies, and time budgets, plus optional bootstrap commands to run
//! once the whole stack is ready. Command strings may reference the
//! placeholders `{host}`, `{port}`, `{base}`, `{data}` and `{logs}`, which
//! are expanded from the CLI flags and the resolved stack paths before
//! launch.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// Errors raised while loading a manifest file.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read manifest '{path}': {source}")]
    Io {
        /// Path given on the command line.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The manifest file is not valid manifest JSON.
    #[error("failed to parse manifest '{path}': {source}")]
    Parse {
        /// Path given on the command line.
        path: Utf8PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// One service declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ServiceEntry {
    /// Service name, unique within the manifest.
    pub(crate) name: String,
    /// Program to launch; placeholder-expanded.
    pub(crate) command: String,
    /// Arguments; placeholder-expanded.
    #[serde(default)]
    pub(crate) args: Vec<String>,
    /// TCP port the service listens on. Drives the readiness probe and the
    /// registry's port index.
    #[serde(default)]
    pub(crate) port: Option<u16>,
    /// Services that must be ready before this one starts.
    #[serde(default)]
    pub(crate) depends_on: Vec<String>,
    /// Readiness budget override, in seconds.
    #[serde(default)]
    pub(crate) start_timeout_secs: Option<u64>,
    /// Graceful-stop budget override, in seconds.
    #[serde(default)]
    pub(crate) stop_timeout_secs: Option<u64>,
    /// Readiness polling cadence override, in milliseconds.
    #[serde(default)]
    pub(crate) poll_interval_ms: Option<u64>,
    /// For portless services: seconds to wait before assuming readiness.
    #[serde(default)]
    pub(crate) grace_secs: Option<u64>,
}

/// One bootstrap command, run after the whole stack is ready.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CommandEntry {
    /// Program to run; placeholder-expanded.
    pub(crate) command: String,
    /// Arguments; placeholder-expanded.
    #[serde(default)]
    pub(crate) args: Vec<String>,
}

/// Parsed stack manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Manifest {
    /// Services in registration order.
    #[serde(default)]
    pub(crate) services: Vec<ServiceEntry>,
    /// Bootstrap commands, run sequentially once every service is ready.
    #[serde(default)]
    pub(crate) bootstrap: Vec<CommandEntry>,
}

impl Manifest {
    /// Loads and parses a manifest file.
    pub(crate) fn load(path: &Utf8Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// The built-in three-service graph stack used when no manifest is
    /// given: meta service, storage service, and a front graph service on
    /// the client-facing port.
    pub(crate) fn builtin(front_port: u16) -> Self {
        let meta = ServiceEntry {
            name: String::from("metad"),
            command: String::from("nebula-metad"),
            args: vec![
                String::from("--meta_server_addrs={host}:9559"),
                String::from("--local_ip={host}"),
                String::from("--data_path={data}"),
                String::from("--log_dir={logs}"),
            ],
            port: Some(9559),
            depends_on: Vec::new(),
            start_timeout_secs: None,
            stop_timeout_secs: None,
            poll_interval_ms: None,
            grace_secs: None,
        };
        let storage = ServiceEntry {
            name: String::from("storaged"),
            command: String::from("nebula-storaged"),
            args: vec![
                String::from("--meta_server_addrs={host}:9559"),
                String::from("--local_ip={host}"),
                String::from("--data_path={data}"),
                String::from("--log_dir={logs}"),
            ],
            port: Some(9779),
            depends_on: vec![String::from("metad")],
            start_timeout_secs: None,
            stop_timeout_secs: None,
            poll_interval_ms: None,
            grace_secs: None,
        };
        let graph = ServiceEntry {
            name: String::from("graphd"),
            command: String::from("nebula-graphd"),
            args: vec![
                String::from("--meta_server_addrs={host}:9559"),
                String::from("--local_ip={host}"),
                String::from("--port={port}"),
                String::from("--log_dir={logs}"),
            ],
            port: Some(front_port),
            depends_on: vec![String::from("metad"), String::from("storaged")],
            start_timeout_secs: None,
            stop_timeout_secs: None,
            poll_interval_ms: None,
            grace_secs: None,
        };
        Self {
            services: vec![meta, storage, graph],
            bootstrap: Vec::new(),
        }
    }

}

/// Values substituted into manifest command strings.
#[derive(Debug)]
pub(crate) struct Placeholders<'a> {
    pub(crate) host: &'a str,
    pub(crate) port: u16,
    pub(crate) base: &'a Utf8Path,
    pub(crate) data: &'a Utf8Path,
    pub(crate) logs: &'a Utf8Path,
}

impl Placeholders<'_> {
    /// Expands every known placeholder in `template`.
    pub(crate) fn expand(&self, template: &str) -> String {
        template
            .replace("{host}", self.host)
            .replace("{port}", &self.port.to_string())
            .replace("{base}", self.base.as_str())
            .replace("{data}", self.data.as_str())
            .replace("{logs}", self.logs.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_service_entry_fills_defaults() {
        let manifest: Manifest = serde_json::from_str(
            r#"{"services": [{"name": "metad", "command": "nebula-metad"}]}"#,
        )
        .expect("parse manifest");

        let entry = &manifest.services[0];
        assert_eq!(entry.name, "metad");
        assert!(entry.args.is_empty());
        assert_eq!(entry.port, None);
        assert!(entry.depends_on.is_empty());
        assert!(manifest.bootstrap.is_empty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Manifest, _> = serde_json::from_str(
            r#"{"services": [{"name": "x", "command": "x", "restart": "always"}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn placeholders_expand_from_flags_and_paths() {
        let placeholders = Placeholders {
            host: "127.0.0.1",
            port: 9669,
            base: Utf8Path::new("/tmp/stack"),
            data: Utf8Path::new("/tmp/stack/data/graphd"),
            logs: Utf8Path::new("/tmp/stack/logs/graphd"),
        };
        assert_eq!(
            placeholders.expand("--meta_server_addrs={host}:9559 --port={port}"),
            "--meta_server_addrs=127.0.0.1:9559 --port=9669"
        );
        assert_eq!(
            placeholders.expand("--data_path={data}"),
            "--data_path=/tmp/stack/data/graphd"
        );
        assert_eq!(placeholders.expand("{base}/scripts"), "/tmp/stack/scripts");
    }

    #[test]
    fn builtin_stack_wires_the_dependency_chain() {
        let manifest = Manifest::builtin(9669);
        let names: Vec<&str> = manifest
            .services
            .iter()
            .map(|entry| entry.name.as_str())
            .collect();
        assert_eq!(names, ["metad", "storaged", "graphd"]);
        assert_eq!(manifest.services[2].port, Some(9669));
        assert_eq!(
            manifest.services[2].depends_on,
            ["metad", "storaged"]
        );
    }
}
