//! Compiler invocation
//!
//! [`Toolchain`] is the seam between the coordinator and the external
//! compiler. [`Cargo`] runs `cargo rustc --lib --message-format json` and
//! picks the produced library out of cargo's message stream.

use crate::error::{BuildError, BuildResult};
use crate::profile::Profile;
use crate::unit::MANIFEST_FILE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, info};

/// What to build
#[derive(Debug, Clone, Copy)]
pub struct ToolchainRequest<'a> {
    /// Directory of the staged crate to compile
    pub crate_dir: &'a Path,
    /// Profile to build with
    pub profile: &'a Profile,
    /// Extra arguments appended to the command line
    pub extra_args: &'a [String],
}

/// A successful compilation
#[derive(Debug, Clone)]
pub struct ToolchainOutput {
    /// The compiled dynamic library, inside the toolchain's target directory
    pub library: PathBuf,
    /// Rendered compiler diagnostics (warnings)
    pub diagnostics: String,
}

/// Compiles a staged crate into a dynamic library
pub trait Toolchain {
    fn build(&self, request: &ToolchainRequest<'_>) -> BuildResult<ToolchainOutput>;
}

/// Cargo-backed toolchain
#[derive(Debug, Clone)]
pub struct Cargo {
    executable: PathBuf,
}

impl Cargo {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Full argument list for a request
    pub fn args(&self, request: &ToolchainRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "rustc".to_string(),
            "--lib".to_string(),
            "--message-format".to_string(),
            "json".to_string(),
            "--manifest-path".to_string(),
            request
                .crate_dir
                .join(MANIFEST_FILE)
                .to_string_lossy()
                .into_owned(),
        ];
        args.extend(request.profile.cargo_args());
        // may contain a `--` section, so it goes last
        args.extend(request.extra_args.iter().cloned());
        args
    }
}

impl Default for Cargo {
    fn default() -> Self {
        Self::new("cargo")
    }
}

impl Toolchain for Cargo {
    fn build(&self, request: &ToolchainRequest<'_>) -> BuildResult<ToolchainOutput> {
        let args = self.args(request);
        debug!("Running {} {}", self.executable.display(), args.join(" "));
        let start = Instant::now();

        let output = Command::new(&self.executable)
            .args(&args)
            .current_dir(request.crate_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| BuildError::ToolNotFound {
                program: self.executable.clone(),
                error: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let messages = parse_messages(&stdout);

        if !output.status.success() {
            let mut text = messages.diagnostics;
            if !stderr.trim().is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(stderr.trim_end());
            }
            // killed by a signal
            let exit_code = output.status.code().unwrap_or(-1);
            return Err(BuildError::tool_failed(exit_code, text));
        }

        info!(
            "Compiled {} in {:.2}s",
            request.crate_dir.display(),
            start.elapsed().as_secs_f64()
        );

        let library = select_library(&messages.artifacts, request.crate_dir).ok_or_else(|| {
            BuildError::NoArtifactProduced {
                crate_dir: request.crate_dir.to_path_buf(),
            }
        })?;

        Ok(ToolchainOutput {
            library,
            diagnostics: messages.diagnostics,
        })
    }
}

/// One line of cargo's `--message-format json` stream
#[derive(Debug, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
enum CargoMessage {
    CompilerArtifact(CompilerArtifact),
    CompilerMessage { message: Diagnostic },
    #[serde(other)]
    Other,
}

/// A `compiler-artifact` message
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerArtifact {
    pub manifest_path: PathBuf,
    pub target: ArtifactTarget,
    #[serde(default)]
    pub filenames: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactTarget {
    pub name: String,
    #[serde(default)]
    pub crate_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Diagnostic {
    #[serde(default)]
    rendered: Option<String>,
}

/// Artifacts and rendered diagnostics collected from a message stream
#[derive(Debug, Default)]
pub struct CargoMessages {
    pub artifacts: Vec<CompilerArtifact>,
    pub diagnostics: String,
}

/// Parse cargo's JSON message stream; lines that are not messages are ignored
pub fn parse_messages(stdout: &str) -> CargoMessages {
    let mut messages = CargoMessages::default();
    for line in stdout.lines().filter(|l| l.starts_with('{')) {
        match serde_json::from_str::<CargoMessage>(line) {
            Ok(CargoMessage::CompilerArtifact(artifact)) => messages.artifacts.push(artifact),
            Ok(CargoMessage::CompilerMessage { message }) => {
                if let Some(rendered) = message.rendered {
                    messages.diagnostics.push_str(&rendered);
                }
            }
            Ok(CargoMessage::Other) => {}
            Err(e) => debug!("Ignoring unparsable cargo message: {}", e),
        }
    }
    messages
}

/// The dynamic library cargo produced for the crate in `crate_dir`
pub fn select_library(artifacts: &[CompilerArtifact], crate_dir: &Path) -> Option<PathBuf> {
    let wanted = crate_dir
        .canonicalize()
        .unwrap_or_else(|_| crate_dir.to_path_buf());

    artifacts
        .iter()
        .filter(|artifact| {
            artifact.manifest_path.parent().is_some_and(|dir| {
                dir == wanted || dir.canonicalize().is_ok_and(|dir| dir == wanted)
            })
        })
        .filter(|artifact| artifact.target.crate_types.iter().any(|t| t == "cdylib"))
        .find_map(|artifact| {
            artifact
                .filenames
                .iter()
                .find(|f| f.to_string_lossy().ends_with(std::env::consts::DLL_SUFFIX))
                .or_else(|| artifact.filenames.first())
                .cloned()
        })
}
