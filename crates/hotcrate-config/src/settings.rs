//! Build settings (`hotcrate.toml`)
//!
//! Every field is optional so that a file, the environment and CLI flags can
//! each supply only what they care about. Accessors resolve the defaults.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of a `hotcrate.toml` file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Build settings
    #[serde(default)]
    pub build: BuildSettings,
}

/// The `[build]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct BuildSettings {
    /// Rebuild even when the artifact trailer matches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_rebuild: Option<bool>,

    /// Trust on-disk artifacts unconditionally; never build
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_mode: Option<bool>,

    /// Cargo profile ("dev", "release" or a custom profile name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Directory holding staging crates and cargo's incremental cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Path to the cargo executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cargo_executable: Option<PathBuf>,

    /// File suffix of produced artifacts (e.g. ".cpython-312-x86_64-linux-gnu.so")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_suffix: Option<String>,
}

impl Settings {
    /// Load settings from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let settings = Self::parse(&content).map_err(|e| match e {
            ConfigError::TomlParseError { error, .. } => ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error,
            },
            other => other,
        })?;
        Ok(settings)
    }

    /// Parse settings from TOML text
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let settings: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: PathBuf::new(),
            error: e,
        })?;
        settings.build.validate()?;
        Ok(settings)
    }
}

impl BuildSettings {
    /// Validate field values
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(profile) = &self.profile {
            validate_profile_name(profile)?;
        }
        if let Some(suffix) = &self.extension_suffix {
            if suffix.is_empty() || suffix.contains(['/', '\\']) {
                return Err(ConfigError::InvalidValue {
                    field: "build.extension-suffix".to_string(),
                    reason: format!("'{}' is not a file suffix", suffix),
                });
            }
        }
        Ok(())
    }

    /// Merge another set of settings into this one.
    /// Other settings take precedence for non-None values.
    pub fn merge(&mut self, other: &BuildSettings) {
        if other.force_rebuild.is_some() {
            self.force_rebuild = other.force_rebuild;
        }
        if other.release_mode.is_some() {
            self.release_mode = other.release_mode;
        }
        if other.profile.is_some() {
            self.profile = other.profile.clone();
        }
        if other.cache_dir.is_some() {
            self.cache_dir = other.cache_dir.clone();
        }
        if other.cargo_executable.is_some() {
            self.cargo_executable = other.cargo_executable.clone();
        }
        if other.extension_suffix.is_some() {
            self.extension_suffix = other.extension_suffix.clone();
        }
    }

    pub fn force_rebuild(&self) -> bool {
        self.force_rebuild.unwrap_or(false)
    }

    pub fn release_mode(&self) -> bool {
        self.release_mode.unwrap_or(false)
    }

    /// Effective profile name (default: "dev")
    pub fn profile(&self) -> &str {
        self.profile.as_deref().unwrap_or("dev")
    }

    /// Effective cache directory (default: `<tmp>/hotcrate`)
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("hotcrate"))
    }

    /// Effective cargo executable (default: `cargo` from PATH)
    pub fn cargo_executable(&self) -> PathBuf {
        self.cargo_executable
            .clone()
            .unwrap_or_else(|| PathBuf::from("cargo"))
    }

    /// Effective artifact suffix (default: the platform's dynamic library suffix)
    pub fn extension_suffix(&self) -> &str {
        self.extension_suffix
            .as_deref()
            .unwrap_or(std::env::consts::DLL_SUFFIX)
    }
}

/// Profile names are passed straight to cargo's `--profile`
fn validate_profile_name(name: &str) -> ConfigResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ConfigError::InvalidValue {
            field: "build.profile".to_string(),
            reason: format!("invalid profile name '{}'", name),
        });
    }
    Ok(())
}
