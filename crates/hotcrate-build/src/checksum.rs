//! Build fingerprints and artifact trailers
//!
//! A unit's fingerprint is the SHA-256 of every tracked file's bytes,
//! concatenated in canonical-path order. With more than one tracked file the
//! concatenation is followed by each file's length and the file count (all
//! little-endian `u64`), so moving bytes between files or adding an empty
//! file changes the result. A lone file hashes as its bytes alone.
//!
//! The fingerprint of the sources an artifact was built from is stored as the
//! artifact's final 32 bytes, so staleness can be decided from the artifact
//! alone.

use crate::error::{ArtifactError, BuildError, BuildResult};
use crate::preprocess::parse_header;
use crate::profile::Profile;
use crate::unit::{SourceUnit, UnitKind, LOCK_FILE, MANIFEST_FILE};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Salt hashed ahead of the sources for release builds
const RELEASE_SALT: &[u8] = b"r\n";

/// A SHA-256 digest of a unit's tracked files
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Size of a fingerprint, and of the artifact trailer
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// Every file whose contents determine the unit's build output, deduplicated
/// and sorted by canonical path.
///
/// Single-file units track the file itself; crate units track every `*.rs`,
/// `Cargo.toml` and `Cargo.lock` under the tracking root. Both add the
/// expansions of the header's `//d:` patterns.
pub fn tracked_files(unit: &SourceUnit) -> BuildResult<Vec<PathBuf>> {
    let mut files = BTreeSet::new();

    match unit.kind() {
        UnitKind::SingleFile { path } => {
            files.insert(canonical(path)?);
        }
        UnitKind::Crate { .. } => {
            for entry in WalkDir::new(unit.tracking_root())
                .into_iter()
                .filter_entry(|e| !is_skipped_dir(e))
            {
                let entry = entry.map_err(|e| walk_error(unit.path(), e))?;
                if entry.file_type().is_file() && is_crate_source(entry.path()) {
                    files.insert(canonical(entry.path())?);
                }
            }
        }
    }

    let source_path = unit.source_path();
    let source = fs::read_to_string(&source_path).map_err(|e| BuildError::io(&source_path, e))?;
    let header = parse_header(&source_path, &source)?;
    let base = unit.pattern_base();
    for pattern in &header.dependency_patterns {
        expand_pattern(&base, pattern, &mut files)?;
    }

    Ok(files.into_iter().collect())
}

/// Fingerprint of `unit` for a build under `profile`
pub fn fingerprint(unit: &SourceUnit, profile: &Profile) -> BuildResult<Fingerprint> {
    fingerprint_files(&tracked_files(unit)?, profile)
}

/// Hash `files` in the order given
pub fn fingerprint_files(files: &[PathBuf], profile: &Profile) -> BuildResult<Fingerprint> {
    let mut hasher = Sha256::new();
    if profile.is_release() {
        hasher.update(RELEASE_SALT);
    }

    let mut lengths = Vec::with_capacity(files.len());
    for path in files {
        let mut file = File::open(path).map_err(|e| BuildError::io(path, e))?;
        let len = io::copy(&mut file, &mut hasher).map_err(|e| BuildError::io(path, e))?;
        lengths.push(len);
    }

    if lengths.len() != 1 {
        for len in &lengths {
            hasher.update(len.to_le_bytes());
        }
        hasher.update((lengths.len() as u64).to_le_bytes());
    }
    Ok(Fingerprint(hasher.finalize().into()))
}

/// Read the fingerprint stored at the end of an artifact.
///
/// A missing file or one shorter than a trailer yields `None`.
pub fn read_trailer(path: &Path) -> Result<Option<Fingerprint>, ArtifactError> {
    let unreadable = |error: io::Error| ArtifactError::TrailerUnreadable {
        path: path.to_path_buf(),
        error,
    };

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(unreadable(e)),
    };

    let len = file.metadata().map_err(unreadable)?.len();
    if len < Fingerprint::LEN as u64 {
        return Ok(None);
    }

    let mut bytes = [0u8; Fingerprint::LEN];
    file.seek(SeekFrom::End(-(Fingerprint::LEN as i64)))
        .map_err(unreadable)?;
    file.read_exact(&mut bytes).map_err(unreadable)?;
    Ok(Some(Fingerprint(bytes)))
}

/// Append `fingerprint` as the artifact's trailer.
///
/// `path` must be a fresh toolchain output without a trailer; a rebuilt
/// artifact replaces the old file instead of being stamped twice.
pub fn stamp(path: &Path, fingerprint: &Fingerprint) -> BuildResult<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| BuildError::io(path, e))?;
    file.write_all(fingerprint.as_bytes())
        .map_err(|e| BuildError::io(path, e))?;
    file.sync_all().map_err(|e| BuildError::io(path, e))?;
    debug!("Stamped {} with {}", path.display(), fingerprint);
    Ok(())
}

fn expand_pattern(base: &Path, pattern: &str, files: &mut BTreeSet<PathBuf>) -> BuildResult<()> {
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&base.to_string_lossy()),
        pattern
    );
    let paths = glob::glob(&full).map_err(|e| {
        BuildError::InvalidManifest(format!("dependency pattern '{}': {}", pattern, e))
    })?;

    let mut matched = 0usize;
    for path in paths {
        let path = match path {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping unreadable match of '{}': {}", pattern, e);
                continue;
            }
        };
        if path.is_dir() {
            for entry in WalkDir::new(&path) {
                let entry = entry.map_err(|e| walk_error(&path, e))?;
                if entry.file_type().is_file() {
                    files.insert(canonical(entry.path())?);
                    matched += 1;
                }
            }
        } else if path.is_file() {
            files.insert(canonical(&path)?);
            matched += 1;
        }
    }

    if matched == 0 {
        debug!("Dependency pattern '{}' matched nothing", pattern);
    }
    Ok(())
}

/// `target` and hidden directories below the walk root
pub(crate) fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name == "target" || name.starts_with('.'))
}

fn is_crate_source(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "rs")
        || path
            .file_name()
            .is_some_and(|name| name == MANIFEST_FILE || name == LOCK_FILE)
}

fn canonical(path: &Path) -> BuildResult<PathBuf> {
    path.canonicalize().map_err(|e| BuildError::io(path, e))
}

fn walk_error(root: &Path, error: walkdir::Error) -> BuildError {
    let path = error.path().unwrap_or(root).to_path_buf();
    BuildError::io(path, io::Error::from(error))
}
