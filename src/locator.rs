//! Worker binary discovery.
//!
//! The locator is an explicitly constructed capability injected into the
//! spec compiler and process supervisor. Discovery order: configured search
//! directories first, then the `PATH` environment of this process. Nothing
//! here is process-wide mutable state.

use std::env;
use std::path::{Path, PathBuf};

use crate::{AppError, Result};

/// Resolves a worker executable name to a concrete path.
#[derive(Debug, Clone, Default)]
pub struct WorkerLocator {
    search_paths: Vec<PathBuf>,
}

impl WorkerLocator {
    /// Build a locator over the given search directories.
    #[must_use]
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Resolve `name` to an existing executable path.
    ///
    /// A name containing a path separator is treated as an explicit path and
    /// only checked for existence. Bare names are searched in the configured
    /// directories, then in each `PATH` entry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when no candidate exists.
    pub fn locate(&self, name: &str) -> Result<PathBuf> {
        let candidate = Path::new(name);
        if candidate.components().count() > 1 {
            return if candidate.is_file() {
                Ok(candidate.to_path_buf())
            } else {
                Err(AppError::NotFound(format!(
                    "worker executable {name} does not exist"
                )))
            };
        }

        for dir in &self.search_paths {
            let path = dir.join(name);
            if path.is_file() {
                return Ok(path);
            }
        }

        if let Some(path_var) = env::var_os("PATH") {
            for dir in env::split_paths(&path_var) {
                let path = dir.join(name);
                if path.is_file() {
                    return Ok(path);
                }
            }
        }

        Err(AppError::NotFound(format!(
            "worker executable {name} not found in search paths or PATH"
        )))
    }
}
