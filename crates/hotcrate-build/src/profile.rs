//! Build profile management
//!
//! Maps the configured profile name onto cargo's profile flags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Build profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Development profile (default)
    #[default]
    Dev,
    /// Release profile (optimized)
    Release,
    /// Custom profile declared in the unit's manifest
    Custom(String),
}

impl Profile {
    /// Parse profile from string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dev" | "debug" => Self::Dev,
            "release" => Self::Release,
            custom => Self::Custom(custom.to_string()),
        }
    }

    /// Get profile name
    pub fn name(&self) -> &str {
        match self {
            Self::Dev => "dev",
            Self::Release => "release",
            Self::Custom(name) => name,
        }
    }

    /// Whether artifacts built with this profile are release-optimized
    pub fn is_release(&self) -> bool {
        matches!(self, Self::Release)
    }

    /// Arguments selecting this profile on the cargo command line
    pub fn cargo_args(&self) -> Vec<String> {
        match self {
            Self::Dev => Vec::new(),
            Self::Release => vec!["--release".to_string()],
            Self::Custom(name) => vec!["--profile".to_string(), name.clone()],
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
