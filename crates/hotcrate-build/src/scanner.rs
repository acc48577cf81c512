//! Batch discovery and building
//!
//! Walks the given roots for opted-in units and brings each one up to date.
//! A failing unit is recorded and the scan moves on.

use crate::checksum::is_skipped_dir;
use crate::coordinator::{BuildCoordinator, BuildOutcome, BuildState};
use crate::error::{BuildError, BuildResult, ResolveError};
use crate::resolver::resolve_by_path;
use crate::toolchain::Toolchain;
use crate::unit::{SourceUnit, MANIFEST_FILE};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Outcome for one unit (or one root that could not be scanned)
#[derive(Debug)]
pub struct ScanEntry {
    /// Unit path, or the root path for scan failures
    pub path: PathBuf,
    pub result: BuildResult<BuildOutcome>,
}

impl ScanEntry {
    pub fn state(&self) -> BuildState {
        match &self.result {
            Ok(outcome) => outcome.state,
            Err(_) => BuildState::Failed,
        }
    }
}

/// Per-unit outcomes of a scan, in discovery order
#[derive(Debug, Default)]
pub struct ScanReport {
    entries: Vec<ScanEntry>,
}

impl ScanReport {
    pub fn entries(&self) -> &[ScanEntry] {
        &self.entries
    }

    /// True when nothing failed
    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.result.is_ok())
    }

    pub fn count(&self, state: BuildState) -> usize {
        self.entries.iter().filter(|e| e.state() == state).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &BuildError)> {
        self.entries
            .iter()
            .filter_map(|e| e.result.as_ref().err().map(|err| (e.path.as_path(), err)))
    }

    fn push(&mut self, path: PathBuf, result: BuildResult<BuildOutcome>) {
        self.entries.push(ScanEntry { path, result });
    }
}

/// Units found under `roots`, plus the roots that could not be scanned.
///
/// A root naming a file is taken as given. Directories, including a root
/// that is itself a crate, are walked for `.rs` files and crates carrying the
/// opt-in marker.
pub fn discover(roots: &[PathBuf]) -> (Vec<SourceUnit>, Vec<(PathBuf, BuildError)>) {
    let mut units = Vec::new();
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut add = |unit: SourceUnit, units: &mut Vec<SourceUnit>| {
        if seen.insert(unit.path().to_path_buf()) {
            units.push(unit);
        }
    };

    for root in roots {
        if !root.exists() {
            errors.push((
                root.clone(),
                ResolveError::not_found(root.display().to_string()).into(),
            ));
            continue;
        }

        if root.is_file() {
            match resolve_by_path(root, None) {
                Ok(unit) => add(unit, &mut units),
                Err(e) => errors.push((root.clone(), e.into())),
            }
            continue;
        }

        let mut walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e));
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    errors.push((path.clone(), BuildError::io(path, e.into())));
                    continue;
                }
            };
            let path = entry.path();

            let candidate = if entry.file_type().is_dir() && path.join(MANIFEST_FILE).is_file() {
                resolve_by_path(path, None).ok().filter(SourceUnit::is_opted_in)
            } else if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "rs") {
                resolve_by_path(path, None).ok().filter(SourceUnit::is_opted_in)
            } else {
                None
            };

            if let Some(unit) = candidate {
                debug!("Discovered {}", unit.path().display());
                // a crate's own sources belong to it
                if unit.is_crate() {
                    walker.skip_current_dir();
                }
                add(unit, &mut units);
            }
        }
    }

    (units, errors)
}

/// Discover every unit under `roots` and bring each up to date
pub fn scan_and_build<T: Toolchain>(
    roots: &[PathBuf],
    coordinator: &BuildCoordinator<T>,
) -> ScanReport {
    let (units, errors) = discover(roots);
    let mut report = ScanReport::default();

    for (path, error) in errors {
        report.push(path, Err(error));
    }
    for unit in &units {
        let result = coordinator.build_if_needed(unit);
        if let Err(e) = &result {
            debug!("Failed to build {}: {}", unit.name(), e);
        }
        report.push(unit.path().to_path_buf(), result);
    }

    info!(
        "Scanned {} unit(s): {} built, {} fresh, {} failed",
        units.len(),
        report.count(BuildState::Built),
        report.count(BuildState::Fresh),
        report.count(BuildState::Failed)
    );
    report
}
