//! hotcrate build system
//!
//! Turns Rust source units (single files or crate directories) into dynamic
//! libraries on demand:
//! - Unit resolution by dotted name or by path, gated by an opt-in marker
//! - Header directives: templates, manifest fragments, dependency globs
//! - Content fingerprints stored as a trailer on the built artifact
//! - Staged cargo builds with atomic artifact replacement
//! - Batch scanning of directory trees
//! - An import hook for host runtimes

pub mod checksum;
pub mod coordinator;
pub mod error;
pub mod hook;
pub mod manifest;
pub mod preprocess;
pub mod profile;
pub mod resolver;
pub mod scanner;
pub mod template;
pub mod toolchain;
pub mod unit;

pub use checksum::{fingerprint, read_trailer, stamp, tracked_files, Fingerprint};
pub use coordinator::{BuildConfig, BuildCoordinator, BuildOutcome, BuildState};
pub use error::{ArtifactError, BuildError, BuildResult, PreprocessError, ResolveError};
pub use hook::ImportHook;
pub use manifest::Manifest;
pub use preprocess::{parse_header, Header, Preprocessed, Preprocessor};
pub use profile::Profile;
pub use resolver::{resolve_by_name, resolve_by_path};
pub use scanner::{discover, scan_and_build, ScanEntry, ScanReport};
pub use template::{BuiltinTemplate, Template, TemplateRegistry};
pub use toolchain::{Cargo, Toolchain, ToolchainOutput, ToolchainRequest};
pub use unit::{SourceUnit, UnitKind, CRATE_MARKER_FILE, MARKER_TOKEN};

// Re-export settings so hosts need only this crate
pub use hotcrate_config::BuildSettings;
