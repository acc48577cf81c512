//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::settings::{BuildSettings, Settings};
use crate::ConfigResult;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "hotcrate.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Project config (hotcrate.toml) - lowest priority
/// 2. Environment variables (HOTCRATE_*) - overrides project
/// 3. CLI flags - highest priority (handled by caller)
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip environment overrides (used by embedders that pass everything explicitly)
    ignore_env: bool,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Effective build settings
    pub build: BuildSettings,

    /// Directory where hotcrate.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Do not consult `HOTCRATE_*` environment variables
    pub fn without_env(mut self) -> Self {
        self.ignore_env = true;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find hotcrate.toml, then applies
    /// environment overrides.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, settings) = self.find_project_config(start_dir)?;
        self.finish(project_root, settings)
    }

    /// Load configuration from a specific config file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let settings = Settings::load_from_file(config_path)?;
        let project_root = config_path.parent().map(|p| p.to_path_buf());
        self.finish(project_root, settings)
    }

    fn finish(&self, project_root: Option<PathBuf>, settings: Settings) -> ConfigResult<Config> {
        let mut build = settings.build;
        if !self.ignore_env {
            build.merge(&env_overrides());
            build.validate()?;
        }

        Ok(Config {
            build,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(&self, start_dir: &Path) -> ConfigResult<(Option<PathBuf>, Settings)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                debug!("Using configuration from {}", config_path.display());
                let settings = Settings::load_from_file(&config_path)?;
                return Ok((Some(current), settings));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, Settings::default())),
            }
        }
    }
}

/// Read `HOTCRATE_*` environment variables
///
/// `HOTCRATE_RELEASE_BINARIES` is shorthand for `HOTCRATE_PROFILE=release`;
/// an explicit `HOTCRATE_PROFILE` wins over it.
pub fn env_overrides() -> BuildSettings {
    let mut settings = BuildSettings {
        force_rebuild: env_flag("HOTCRATE_FORCE_REBUILD"),
        release_mode: env_flag("HOTCRATE_RELEASE_MODE"),
        profile: None,
        cache_dir: env_nonempty("HOTCRATE_CACHE_DIR").map(PathBuf::from),
        cargo_executable: env_nonempty("HOTCRATE_CARGO_EXECUTABLE").map(PathBuf::from),
        extension_suffix: env_nonempty("HOTCRATE_EXTENSION_SUFFIX"),
    };

    if env_flag("HOTCRATE_RELEASE_BINARIES") == Some(true) {
        settings.profile = Some("release".to_string());
    }
    if let Some(profile) = env_nonempty("HOTCRATE_PROFILE") {
        settings.profile = Some(profile);
    }

    settings
}

/// Parse a boolean environment flag ("1", "true", "yes" are truthy)
fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Whether a hotcrate.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}
