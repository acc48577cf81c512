/// Build system error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

/// Failure to locate a source unit
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No source file or crate found for '{name}'")]
    NotFound { name: String },

    #[error(
        "'{name}' matches {candidate} but it does not opt in; add a \"// hotcrate\" first line \
         (or a .hotcrate file for crates), or address it by path"
    )]
    NotOptedIn { name: String, candidate: PathBuf },
}

/// Failure while reading a unit's header or expanding its template
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Malformed directive on line {line} of {path}: {reason}")]
    MalformedDirective {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Unknown template '{name}'")]
    UnknownTemplate { name: String },

    #[error("Template '{name}' is already registered")]
    DuplicateTemplate { name: String },
}

/// Failure to read a compiled artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Compiled artifact not found at {path}")]
    Missing { path: PathBuf },

    #[error("Cannot read trailer of {path}: {error}")]
    TrailerUnreadable {
        path: PathBuf,
        error: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Toolchain failed with exit code {exit_code}:\n{output}")]
    ToolInvocationFailed { exit_code: i32, output: String },

    #[error("Failed to launch toolchain '{program}': {error}")]
    ToolNotFound {
        program: PathBuf,
        error: std::io::Error,
    },

    #[error("Toolchain succeeded but reported no library artifact for {crate_dir}")]
    NoArtifactProduced { crate_dir: PathBuf },

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a toolchain failure error
    pub fn tool_failed(exit_code: i32, output: impl Into<String>) -> Self {
        Self::ToolInvocationFailed {
            exit_code,
            output: output.into(),
        }
    }
}

impl ResolveError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }
}

impl PreprocessError {
    /// Create a malformed directive error
    pub fn malformed(path: impl Into<PathBuf>, line: usize, reason: impl ToString) -> Self {
        Self::MalformedDirective {
            path: path.into(),
            line,
            reason: reason.to_string(),
        }
    }
}
