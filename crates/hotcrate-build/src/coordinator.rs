//! Build coordination
//!
//! [`BuildCoordinator`] decides whether a unit's artifact is stale, drives
//! preprocessing and the toolchain in a staging directory, and commits the
//! result next to the unit with a fresh trailer.
//!
//! ```text
//! Fresh ──────────────────────────────────────────────► (done)
//! Stale ──► Building ──► toolchain ok ──► stamp+rename ──► Built
//!                    └─► toolchain error ──────────────► Failed (artifact untouched)
//! ```

use crate::checksum::{self, Fingerprint};
use crate::error::{ArtifactError, BuildError, BuildResult};
use crate::preprocess::{Preprocessed, Preprocessor};
use crate::profile::Profile;
use crate::template::TemplateRegistry;
use crate::toolchain::{Cargo, Toolchain, ToolchainRequest};
use crate::unit::{SourceUnit, MANIFEST_FILE};
use hotcrate_config::BuildSettings;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Build configuration, passed explicitly
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    /// Rebuild even when the trailer matches
    pub force_rebuild: bool,
    /// Never build; use whatever artifacts exist
    pub release_mode: bool,
    /// Root of the per-unit staging directories
    pub cache_dir: PathBuf,
    /// Toolchain profile
    pub profile: Profile,
    /// Cargo binary to invoke
    pub cargo_executable: PathBuf,
    /// File name suffix of built artifacts, e.g. `.so`
    pub extension_suffix: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::from_settings(&BuildSettings::default())
    }
}

impl BuildConfig {
    /// Resolve settings, filling defaults for anything unset
    pub fn from_settings(settings: &BuildSettings) -> Self {
        Self {
            force_rebuild: settings.force_rebuild(),
            release_mode: settings.release_mode(),
            cache_dir: settings.cache_dir(),
            profile: Profile::from_str(settings.profile()),
            cargo_executable: settings.cargo_executable(),
            extension_suffix: settings.extension_suffix().to_string(),
        }
    }

    pub fn with_force_rebuild(mut self, force: bool) -> Self {
        self.force_rebuild = force;
        self
    }

    pub fn with_release_mode(mut self, release_mode: bool) -> Self {
        self.release_mode = release_mode;
        self
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_extension_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.extension_suffix = suffix.into();
        self
    }
}

/// Where a unit is in the build state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Artifact exists and matches the sources
    Fresh,
    /// Artifact is missing or out of date
    Stale,
    /// Toolchain is running
    Building,
    /// A new artifact was committed
    Built,
    /// Toolchain or staging failed
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Building => "building",
            Self::Built => "built",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of bringing one unit up to date
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// `Fresh` or `Built`
    pub state: BuildState,
    /// Path of the artifact
    pub artifact: PathBuf,
    /// Fingerprint stamped on a new artifact
    pub fingerprint: Option<Fingerprint>,
    /// Compiler warnings from this build
    pub diagnostics: String,
    /// Time spent, including staging
    pub elapsed: Duration,
}

/// Ties staleness checks, preprocessing and the toolchain together
pub struct BuildCoordinator<T: Toolchain = Cargo> {
    config: BuildConfig,
    toolchain: T,
    templates: TemplateRegistry,
}

impl BuildCoordinator<Cargo> {
    /// Coordinator using the configured cargo executable
    pub fn new(config: BuildConfig) -> Self {
        let toolchain = Cargo::new(config.cargo_executable.clone());
        Self::with_toolchain(config, toolchain)
    }
}

impl<T: Toolchain> BuildCoordinator<T> {
    pub fn with_toolchain(config: BuildConfig, toolchain: T) -> Self {
        Self {
            config,
            toolchain,
            templates: TemplateRegistry::builtin(),
        }
    }

    /// Replace the template registry
    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    /// Where `unit`'s artifact lives
    pub fn artifact_path(&self, unit: &SourceUnit) -> PathBuf {
        unit.artifact_path(&self.config.extension_suffix)
    }

    /// Staging directory for `unit` under the cache directory
    pub fn staging_dir(&self, unit: &SourceUnit) -> PathBuf {
        let digest = Sha256::digest(unit.path().to_string_lossy().as_bytes());
        let hex = format!("{:x}", digest);
        self.config
            .cache_dir
            .join(format!("{}-{}", unit.lib_name(), &hex[..16]))
    }

    /// Whether `unit` has to be (re)built
    pub fn needs_rebuild(&self, unit: &SourceUnit) -> bool {
        self.state(unit) == BuildState::Stale
    }

    /// `Fresh` or `Stale`
    pub fn state(&self, unit: &SourceUnit) -> BuildState {
        if self.config.release_mode {
            return BuildState::Fresh;
        }
        if self.config.force_rebuild {
            debug!("{}: forced rebuild", unit.name());
            return BuildState::Stale;
        }

        let artifact = self.artifact_path(unit);
        let trailer = match checksum::read_trailer(&artifact) {
            Ok(Some(trailer)) => trailer,
            Ok(None) => {
                debug!("{}: no artifact at {}", unit.name(), artifact.display());
                return BuildState::Stale;
            }
            Err(e) => {
                warn!("{}: {}", unit.name(), e);
                return BuildState::Stale;
            }
        };

        match checksum::fingerprint(unit, &self.config.profile) {
            Ok(current) if current == trailer => BuildState::Fresh,
            Ok(current) => {
                debug!(
                    "{}: sources changed ({} != {})",
                    unit.name(),
                    current,
                    trailer
                );
                BuildState::Stale
            }
            Err(e) => {
                debug!("{}: cannot fingerprint sources: {}", unit.name(), e);
                BuildState::Stale
            }
        }
    }

    /// Build `unit` if it is stale
    pub fn build_if_needed(&self, unit: &SourceUnit) -> BuildResult<BuildOutcome> {
        if self.needs_rebuild(unit) {
            return self.build(unit);
        }
        Ok(BuildOutcome {
            state: BuildState::Fresh,
            artifact: self.artifact_path(unit),
            fingerprint: None,
            diagnostics: String::new(),
            elapsed: Duration::ZERO,
        })
    }

    /// Build `unit` unconditionally and commit the new artifact
    pub fn build(&self, unit: &SourceUnit) -> BuildResult<BuildOutcome> {
        let start = Instant::now();
        let artifact = self.artifact_path(unit);

        // taken before building so edits made meanwhile leave the unit stale
        let fingerprint = checksum::fingerprint(unit, &self.config.profile)?;

        let preprocessed = Preprocessor::new(&self.templates).process(unit)?;
        let crate_dir = self.stage(unit, &preprocessed)?;

        debug!("{}: {}", unit.name(), BuildState::Building);
        let output = self
            .toolchain
            .build(&ToolchainRequest {
                crate_dir: &crate_dir,
                profile: &self.config.profile,
                extra_args: &preprocessed.cargo_args,
            })
            .map_err(|e| {
                debug!("{}: {}", unit.name(), BuildState::Failed);
                e
            })?;

        commit(&output.library, &artifact, &fingerprint)?;
        info!("Built {} -> {}", unit.name(), artifact.display());

        Ok(BuildOutcome {
            state: BuildState::Built,
            artifact,
            fingerprint: Some(fingerprint),
            diagnostics: output.diagnostics,
            elapsed: start.elapsed(),
        })
    }

    /// Make `unit` loadable and return its artifact path.
    ///
    /// In release mode nothing is built and a missing artifact is an error.
    pub fn prepare(&self, unit: &SourceUnit) -> BuildResult<PathBuf> {
        if self.config.release_mode {
            let artifact = self.artifact_path(unit);
            if !artifact.is_file() {
                return Err(ArtifactError::Missing { path: artifact }.into());
            }
            return Ok(artifact);
        }
        Ok(self.build_if_needed(unit)?.artifact)
    }

    /// Lay out the unit's crate in its staging directory; returns the crate dir
    fn stage(&self, unit: &SourceUnit, preprocessed: &Preprocessed) -> BuildResult<PathBuf> {
        let staging = self.staging_dir(unit);
        let crate_dir = if unit.is_crate() {
            let root = unit.tracking_root();
            copy_tree(&root, &staging)?;
            let relative = unit.path().strip_prefix(&root).unwrap_or(Path::new(""));
            staging.join(relative)
        } else {
            staging.clone()
        };

        write_if_changed(
            &crate_dir.join(MANIFEST_FILE),
            preprocessed.manifest.to_toml_string()?.as_bytes(),
        )?;
        if !unit.is_crate() || preprocessed.source_changed {
            write_if_changed(
                &crate_dir.join("src").join("lib.rs"),
                preprocessed.source.as_bytes(),
            )?;
        }

        debug!("Staged {} in {}", unit.name(), crate_dir.display());
        Ok(crate_dir)
    }
}

/// Copy the built library next to the unit under a temporary name, stamp it
/// and rename it over the artifact.
fn commit(library: &Path, artifact: &Path, fingerprint: &Fingerprint) -> BuildResult<()> {
    let file_name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = artifact.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    let result = fs::copy(library, &temp)
        .map_err(|e| BuildError::io(library, e))
        .and_then(|_| checksum::stamp(&temp, fingerprint))
        .and_then(|_| fs::rename(&temp, artifact).map_err(|e| BuildError::io(artifact, e)));

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// Mirror `from` into `to`, skipping the root `target` directory, `.git` and
/// any directory containing `to` (a cache dir inside the tree)
fn copy_tree(from: &Path, to: &Path) -> BuildResult<()> {
    let walker = WalkDir::new(from).into_iter().filter_entry(|e| {
        let name = e.file_name();
        let holds_dest = e.depth() > 0 && to.starts_with(e.path());
        !(e.depth() == 1 && name == "target") && name != ".git" && !holds_dest
    });

    for entry in walker {
        let entry = entry.map_err(|e| BuildError::io(from, e.into()))?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let dest = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|e| BuildError::io(&dest, e))?;
        } else if entry.file_type().is_file() {
            let bytes = fs::read(entry.path()).map_err(|e| BuildError::io(entry.path(), e))?;
            write_if_changed(&dest, &bytes)?;
        }
    }
    Ok(())
}

/// Write `contents` unless the file already holds exactly that; unchanged
/// files keep their mtime so the toolchain's incremental state survives.
fn write_if_changed(path: &Path, contents: &[u8]) -> BuildResult<()> {
    if fs::read(path).is_ok_and(|existing| existing == contents) {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| BuildError::io(path, e))
}
