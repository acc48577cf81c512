//! Shared helpers for hotcrate-build integration tests
//!
//! [`FakeToolchain`] stands in for cargo: it "compiles" a staged crate by
//! writing a library whose bytes are a fixed prefix followed by the staged
//! `src/lib.rs`, so tests can see exactly what was staged.

#![allow(dead_code)]

use hotcrate_build::{
    BuildConfig, BuildCoordinator, BuildError, BuildResult, Toolchain, ToolchainOutput,
    ToolchainRequest,
};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Prefix of every library the fake toolchain writes
pub const FAKE_LIBRARY_PREFIX: &[u8] = b"FAKELIB\n";

/// Source text that makes the fake toolchain fail
pub const FAILING_SOURCE_MARKER: &str = "compile_error!";

#[derive(Default)]
pub struct FakeToolchain {
    calls: Cell<usize>,
    requests: RefCell<Vec<RecordedRequest>>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub crate_dir: PathBuf,
    pub profile: String,
    pub extra_args: Vec<String>,
}

impl FakeToolchain {
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.borrow().last().cloned()
    }
}

impl Toolchain for FakeToolchain {
    fn build(&self, request: &ToolchainRequest<'_>) -> BuildResult<ToolchainOutput> {
        self.calls.set(self.calls.get() + 1);
        self.requests.borrow_mut().push(RecordedRequest {
            crate_dir: request.crate_dir.to_path_buf(),
            profile: request.profile.name().to_string(),
            extra_args: request.extra_args.to_vec(),
        });

        let lib_rs = request.crate_dir.join("src").join("lib.rs");
        let source = fs::read(&lib_rs).map_err(|e| BuildError::io(&lib_rs, e))?;
        if String::from_utf8_lossy(&source).contains(FAILING_SOURCE_MARKER) {
            return Err(BuildError::tool_failed(101, "error: explicit compile error"));
        }

        let out_dir = request.crate_dir.join("target").join("fake");
        fs::create_dir_all(&out_dir).map_err(|e| BuildError::io(&out_dir, e))?;
        let library = out_dir.join("libfake.so");
        let mut bytes = FAKE_LIBRARY_PREFIX.to_vec();
        bytes.extend_from_slice(&source);
        fs::write(&library, bytes).map_err(|e| BuildError::io(&library, e))?;

        Ok(ToolchainOutput {
            library,
            diagnostics: String::new(),
        })
    }
}

/// A scratch project directory plus a separate cache directory
pub struct Sandbox {
    pub root: TempDir,
    pub cache: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            cache: tempfile::tempdir().unwrap(),
        }
    }

    /// Canonical project root
    pub fn path(&self) -> PathBuf {
        self.root.path().canonicalize().unwrap()
    }

    /// Write a file relative to the project root, creating parents
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn config(&self) -> BuildConfig {
        BuildConfig::default()
            .with_cache_dir(self.cache.path())
            .with_extension_suffix(".so")
    }

    pub fn coordinator(&self) -> BuildCoordinator<FakeToolchain> {
        self.coordinator_with(self.config())
    }

    pub fn coordinator_with(&self, config: BuildConfig) -> BuildCoordinator<FakeToolchain> {
        BuildCoordinator::with_toolchain(config, FakeToolchain::default())
    }
}

/// Bytes of `path` without the trailer
pub fn artifact_body(path: &Path) -> Vec<u8> {
    let bytes = fs::read(path).unwrap();
    bytes[..bytes.len() - 32].to_vec()
}
