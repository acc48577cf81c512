//! Source unit resolution
//!
//! Resolves a logical module name (or an explicit path) to a [`SourceUnit`].
//! Name-based lookups only accept units carrying the opt-in marker so that
//! unrelated `.rs` files on a search path are never picked up implicitly.

use crate::error::ResolveError;
use crate::unit::{SourceUnit, MANIFEST_FILE};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome of probing one filesystem location
#[derive(Debug)]
enum Probe {
    Found(SourceUnit),
    NotOptedIn(PathBuf),
    Missing,
}

/// Resolve a dotted module name against a list of search roots.
///
/// Each root is probed for `<root>/<a>/<b>.rs`, then for a crate directory
/// `<root>/<a>/<b>/Cargo.toml`. The first opted-in candidate wins.
pub fn resolve_by_name(name: &str, search_roots: &[PathBuf]) -> Result<SourceUnit, ResolveError> {
    let relative: PathBuf = name.split('.').collect();
    let mut rejected: Option<PathBuf> = None;

    for root in search_roots {
        match probe(&root.join(&relative), Some(name), true) {
            Probe::Found(unit) => {
                debug!("Resolved '{}' to {}", name, unit.path().display());
                return Ok(unit);
            }
            Probe::NotOptedIn(candidate) => {
                debug!(
                    "Skipping {}: candidate for '{}' without opt-in marker",
                    candidate.display(),
                    name
                );
                rejected.get_or_insert(candidate);
            }
            Probe::Missing => {}
        }
    }

    Err(match rejected {
        Some(candidate) => ResolveError::NotOptedIn {
            name: name.to_string(),
            candidate,
        },
        None => ResolveError::not_found(name),
    })
}

/// Resolve a unit addressed by path. The opt-in marker is not required.
///
/// Accepts `foo.rs`, `foo` (meaning `foo.rs`), a crate directory or the
/// crate's `Cargo.toml`.
pub fn resolve_by_path(path: &Path, name: Option<&str>) -> Result<SourceUnit, ResolveError> {
    match probe(path, name, false) {
        Probe::Found(unit) => Ok(unit),
        Probe::NotOptedIn(_) | Probe::Missing => {
            Err(ResolveError::not_found(path.display().to_string()))
        }
    }
}

fn probe(base: &Path, name: Option<&str>, require_opt_in: bool) -> Probe {
    let file = if base.extension().is_some_and(|ext| ext == "rs") {
        base.to_path_buf()
    } else {
        let mut os = base.as_os_str().to_owned();
        os.push(".rs");
        PathBuf::from(os)
    };

    // an unmarked file does not hide a marked crate of the same name
    let mut rejected = None;
    if file.is_file() {
        if let Ok(canonical) = file.canonicalize() {
            match accept(SourceUnit::single_file(canonical, name), require_opt_in) {
                Probe::NotOptedIn(candidate) => rejected = Some(candidate),
                found => return found,
            }
        }
    }

    let crate_dir = if base.file_name().is_some_and(|f| f.eq_ignore_ascii_case(MANIFEST_FILE)) {
        base.parent().map(Path::to_path_buf)
    } else {
        Some(base.to_path_buf())
    };

    if let Some(dir) = crate_dir {
        if dir.join(MANIFEST_FILE).is_file() {
            if let Ok(canonical) = dir.canonicalize() {
                match accept(SourceUnit::crate_dir(canonical, name), require_opt_in) {
                    Probe::NotOptedIn(candidate) => {
                        rejected.get_or_insert(candidate);
                    }
                    found => return found,
                }
            }
        }
    }

    rejected.map_or(Probe::Missing, Probe::NotOptedIn)
}

fn accept(unit: SourceUnit, require_opt_in: bool) -> Probe {
    if require_opt_in && !unit.is_opted_in() {
        Probe::NotOptedIn(unit.path().to_path_buf())
    } else {
        Probe::Found(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_name_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve_by_name("nothing.here", &[dir.path().to_path_buf()]);
        assert!(matches!(result, Err(ResolveError::NotFound { .. })));
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve_by_path(&dir.path().join("nope"), None);
        assert!(matches!(result, Err(ResolveError::NotFound { .. })));
    }
}
