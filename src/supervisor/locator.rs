//! Locating the helper executable.

use std::path::PathBuf;

use tracing::debug;

use crate::config::SupervisorConfig;
use crate::error::{Error, Result};

/// Capability to find the helper executable by name.
pub trait HelperLocator: Send + Sync {
    fn locate(&self, name: &str) -> Result<PathBuf>;
}

/// Searches a list of resource directories, then optionally `PATH`.
#[derive(Debug, Clone, Default)]
pub struct ResourceRoots {
    roots: Vec<PathBuf>,
    search_path: bool,
}

impl ResourceRoots {
    /// Search only the given roots, in order.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            search_path: false,
        }
    }

    /// Also fall back to a `PATH` lookup.
    pub fn with_path_search(mut self, search_path: bool) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(config.resource_roots.clone()).with_path_search(config.search_path)
    }
}

impl HelperLocator for ResourceRoots {
    fn locate(&self, name: &str) -> Result<PathBuf> {
        for root in &self.roots {
            let candidate = root.join(name);
            if candidate.is_file() {
                debug!("Found {} at {}", name, candidate.display());
                return Ok(candidate);
            }
        }

        if self.search_path {
            if let Ok(path) = which::which(name) {
                debug!("Found {} on PATH at {}", name, path.display());
                return Ok(path);
            }
        }

        Err(Error::HelperNotFound(name.to_string()))
    }
}

/// Always resolves to one explicit path, whatever name is asked for.
#[derive(Debug, Clone)]
pub struct FixedHelper(pub PathBuf);

impl HelperLocator for FixedHelper {
    fn locate(&self, name: &str) -> Result<PathBuf> {
        if self.0.is_file() {
            Ok(self.0.clone())
        } else {
            Err(Error::HelperNotFound(format!("{} ({})", name, self.0.display())))
        }
    }
}
