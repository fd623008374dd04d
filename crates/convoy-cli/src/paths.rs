//! On-disk layout of a stack's base directory.
//!
//! Everything the stack writes lives under one base directory:
//!
//! ```text
//! {base}/data/<service>   service data directories
//! {base}/logs/<service>   service log directories
//! {base}/run              pid files
//! ```

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

/// Directory name under the home directory used when `--base-path` is not
/// given.
const DEFAULT_BASE_SEGMENTS: [&str; 2] = [".convoy", "stack"];

/// Errors raised while resolving or manipulating stack directories.
#[derive(Debug, thiserror::Error)]
pub(crate) enum PathsError {
    /// No home directory could be determined for the default base path.
    #[error("cannot determine a home directory; pass --base-path explicitly")]
    MissingHomeDirectory,
    /// The home directory is not valid UTF-8.
    #[error("home directory '{path}' is not valid UTF-8")]
    NonUtf8HomeDirectory {
        /// Lossy rendering of the offending path.
        path: String,
    },
    /// A filesystem operation under the base directory failed.
    #[error("filesystem operation on '{path}' failed: {source}")]
    Io {
        /// The path being operated on.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Cleanup was asked to remove a directory it refuses to touch.
    #[error("refusing to clean up '{path}': not a managed stack directory")]
    RefusedCleanup {
        /// The rejected path.
        path: Utf8PathBuf,
    },
}

/// Resolved base directory of one stack and the derived paths within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StackPaths {
    base: Utf8PathBuf,
}

impl StackPaths {
    /// Resolves the base directory from the CLI flag, falling back to
    /// `~/.convoy/stack`.
    pub(crate) fn resolve(flag: Option<Utf8PathBuf>) -> Result<Self, PathsError> {
        if let Some(base) = flag {
            return Ok(Self { base });
        }
        let home = dirs::home_dir().ok_or(PathsError::MissingHomeDirectory)?;
        let home =
            Utf8PathBuf::from_path_buf(home).map_err(|raw| PathsError::NonUtf8HomeDirectory {
                path: raw.to_string_lossy().into_owned(),
            })?;
        let mut base = home;
        for segment in DEFAULT_BASE_SEGMENTS {
            base.push(segment);
        }
        Ok(Self { base })
    }

    /// The base directory itself.
    pub(crate) fn base(&self) -> &Utf8Path {
        &self.base
    }

    /// Data directory for one service.
    pub(crate) fn data_dir(&self, service: &str) -> Utf8PathBuf {
        self.base.join("data").join(service)
    }

    /// Log directory for one service.
    pub(crate) fn logs_dir(&self, service: &str) -> Utf8PathBuf {
        self.base.join("logs").join(service)
    }

    /// Directory holding pid files.
    pub(crate) fn run_dir(&self) -> Utf8PathBuf {
        self.base.join("run")
    }

    /// Pid file recording the launched process of one service.
    pub(crate) fn pid_file(&self, service: &str) -> Utf8PathBuf {
        self.run_dir().join(format!("{service}.pid"))
    }

    /// Creates the full directory layout for the given services.
    ///
    /// # Errors
    ///
    /// Returns [`PathsError::Io`] when a directory cannot be created.
    pub(crate) fn ensure(&self, services: &[String]) -> Result<(), PathsError> {
        create_dir(&self.base)?;
        create_dir(&self.run_dir())?;
        for service in services {
            create_dir(&self.data_dir(service))?;
            create_dir(&self.logs_dir(service))?;
        }
        Ok(())
    }

    /// Removes the base directory and everything under it.
    ///
    /// # Errors
    ///
    /// Returns [`PathsError::RefusedCleanup`] when the base path is a
    /// filesystem root, and [`PathsError::Io`] when removal fails.
    pub(crate) fn cleanup(&self) -> Result<(), PathsError> {
        if self.base.parent().is_none() {
            return Err(PathsError::RefusedCleanup {
                path: self.base.clone(),
            });
        }
        if !self.base.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&self.base).map_err(|source| PathsError::Io {
            path: self.base.clone(),
            source,
        })
    }
}

fn create_dir(path: &Utf8Path) -> Result<(), PathsError> {
    fs::create_dir_all(path).map_err(|source| PathsError::Io {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_paths() -> (tempfile::TempDir, StackPaths) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let base = Utf8PathBuf::from_path_buf(dir.path().join("stack")).expect("utf8 temp path");
        (dir, StackPaths { base })
    }

    #[test]
    fn ensure_creates_the_full_layout() {
        let (_guard, paths) = temp_paths();
        paths
            .ensure(&[String::from("metad"), String::from("graphd")])
            .expect("ensure");

        assert!(paths.run_dir().is_dir());
        assert!(paths.data_dir("metad").is_dir());
        assert!(paths.logs_dir("metad").is_dir());
        assert!(paths.data_dir("graphd").is_dir());
    }

    #[test]
    fn cleanup_removes_the_base_directory() {
        let (_guard, paths) = temp_paths();
        paths.ensure(&[String::from("metad")]).expect("ensure");
        paths.cleanup().expect("cleanup");
        assert!(!paths.base().exists());
        // Cleaning an already-absent base is fine.
        paths.cleanup().expect("idempotent cleanup");
    }

    #[test]
    fn cleanup_refuses_filesystem_roots() {
        let paths = StackPaths {
            base: Utf8PathBuf::from("/"),
        };
        let error = paths.cleanup().expect_err("root must be refused");
        assert!(matches!(error, PathsError::RefusedCleanup { .. }));
    }

    #[test]
    fn pid_files_live_under_the_run_directory() {
        let (_guard, paths) = temp_paths();
        assert_eq!(paths.pid_file("storaged"), paths.run_dir().join("storaged.pid"));
    }
}
