//! Host import hook
//!
//! A host runtime that failed to find a module asks the hook; the hook either
//! returns a freshly built artifact to load or declines so the host can carry
//! on with its own lookup.

use crate::coordinator::BuildCoordinator;
use crate::error::BuildResult;
use crate::resolver::resolve_by_name;
use crate::toolchain::{Cargo, Toolchain};
use std::path::PathBuf;
use tracing::debug;

pub struct ImportHook<T: Toolchain = Cargo> {
    search_roots: Vec<PathBuf>,
    coordinator: BuildCoordinator<T>,
}

impl<T: Toolchain> ImportHook<T> {
    pub fn new(search_roots: Vec<PathBuf>, coordinator: BuildCoordinator<T>) -> Self {
        Self {
            search_roots,
            coordinator,
        }
    }

    pub fn search_roots(&self) -> &[PathBuf] {
        &self.search_roots
    }

    pub fn coordinator(&self) -> &BuildCoordinator<T> {
        &self.coordinator
    }

    /// Artifact to load for `name`.
    ///
    /// `Ok(None)` when no opted-in unit is found; build failures propagate.
    pub fn find(&self, name: &str) -> BuildResult<Option<PathBuf>> {
        let unit = match resolve_by_name(name, &self.search_roots) {
            Ok(unit) => unit,
            Err(e) => {
                debug!("Declining '{}': {}", name, e);
                return Ok(None);
            }
        };

        self.coordinator.prepare(&unit).map(Some)
    }
}
