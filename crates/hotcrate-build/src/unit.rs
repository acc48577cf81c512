//! Source units: the single files and crate directories hotcrate builds

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Token that opts a unit into name-based discovery
pub const MARKER_TOKEN: &str = "hotcrate";

/// Marker file that opts a crate directory in
pub const CRATE_MARKER_FILE: &str = ".hotcrate";

/// Name of cargo's manifest file
pub const MANIFEST_FILE: &str = "Cargo.toml";

/// Name of cargo's lock file
pub const LOCK_FILE: &str = "Cargo.lock";

/// What a unit is on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    /// A single `.rs` file built as the crate's `lib.rs`
    SingleFile { path: PathBuf },
    /// A crate directory with its own `Cargo.toml`
    Crate { dir: PathBuf, manifest: PathBuf },
}

/// A resolved unit. Paths are canonical; identity is [`SourceUnit::path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    name: String,
    kind: UnitKind,
}

impl SourceUnit {
    /// Create a single-file unit. `path` must be canonical.
    pub fn single_file(path: PathBuf, name: Option<&str>) -> Self {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| file_stem(&path));
        Self {
            name,
            kind: UnitKind::SingleFile { path },
        }
    }

    /// Create a crate unit. `dir` must be canonical.
    pub fn crate_dir(dir: PathBuf, name: Option<&str>) -> Self {
        let name = name.map(str::to_string).unwrap_or_else(|| file_stem(&dir));
        let manifest = dir.join(MANIFEST_FILE);
        Self {
            name,
            kind: UnitKind::Crate { dir, manifest },
        }
    }

    /// Full logical name (may be dotted, e.g. `pkg.fast_math`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the produced library: the last segment of the logical name
    pub fn lib_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn kind(&self) -> &UnitKind {
        &self.kind
    }

    pub fn is_crate(&self) -> bool {
        matches!(self.kind, UnitKind::Crate { .. })
    }

    /// Canonical identity path: the source file or the crate directory
    pub fn path(&self) -> &Path {
        match &self.kind {
            UnitKind::SingleFile { path } => path,
            UnitKind::Crate { dir, .. } => dir,
        }
    }

    /// The file whose header carries the unit's directives
    pub fn source_path(&self) -> PathBuf {
        match &self.kind {
            UnitKind::SingleFile { path } => path.clone(),
            UnitKind::Crate { dir, .. } => dir.join("src").join("lib.rs"),
        }
    }

    /// The crate manifest, for crate units
    pub fn manifest_path(&self) -> Option<&Path> {
        match &self.kind {
            UnitKind::SingleFile { .. } => None,
            UnitKind::Crate { manifest, .. } => Some(manifest),
        }
    }

    /// Directory that relative paths in the unit's manifest refer to
    pub fn unit_dir(&self) -> &Path {
        match &self.kind {
            UnitKind::SingleFile { path } => path.parent().unwrap_or(path),
            UnitKind::Crate { dir, .. } => dir,
        }
    }

    /// Directory that `//d:` dependency patterns are relative to
    pub fn pattern_base(&self) -> PathBuf {
        match &self.kind {
            UnitKind::SingleFile { path } => path.parent().unwrap_or(path).to_path_buf(),
            UnitKind::Crate { dir, .. } => dir.join("src"),
        }
    }

    /// Where the compiled library lives: next to the unit, named after it
    pub fn artifact_path(&self, extension_suffix: &str) -> PathBuf {
        let parent = self.path().parent().unwrap_or(self.path());
        parent.join(format!("{}{}", self.lib_name(), extension_suffix))
    }

    /// The enclosing cargo workspace root, if this crate sits inside one
    pub fn workspace_root(&self) -> Option<PathBuf> {
        let UnitKind::Crate { dir, .. } = &self.kind else {
            return None;
        };
        dir.ancestors()
            .skip(1)
            .take_while(|p| p.parent().is_some())
            .find(|p| declares_workspace(&p.join(MANIFEST_FILE)))
            .map(Path::to_path_buf)
    }

    /// Directory copied into the staging area and walked for tracked files
    pub fn tracking_root(&self) -> PathBuf {
        self.workspace_root()
            .unwrap_or_else(|| self.unit_dir().to_path_buf())
    }

    /// Whether the unit carries the opt-in marker
    pub fn is_opted_in(&self) -> bool {
        match &self.kind {
            UnitKind::SingleFile { path } => first_line_has_marker(path),
            UnitKind::Crate { dir, manifest } => {
                dir.join(CRATE_MARKER_FILE).is_file() || first_line_has_marker(manifest)
            }
        }
    }
}

/// Check whether the first non-blank line of a file mentions the marker token
pub fn first_line_has_marker(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| line.contains(MARKER_TOKEN))
}

fn declares_workspace(manifest: &Path) -> bool {
    std::fs::read_to_string(manifest)
        .ok()
        .and_then(|text| text.parse::<toml::Table>().ok())
        .is_some_and(|table| table.contains_key("workspace"))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_single_file_names() {
        let unit = SourceUnit::single_file(PathBuf::from("/src/pkg/fast.rs"), Some("pkg.fast"));
        assert_eq!(unit.name(), "pkg.fast");
        assert_eq!(unit.lib_name(), "fast");
        assert_eq!(unit.source_path(), PathBuf::from("/src/pkg/fast.rs"));
        assert_eq!(unit.pattern_base(), PathBuf::from("/src/pkg"));
        assert_eq!(
            unit.artifact_path(".so"),
            PathBuf::from("/src/pkg/fast.so")
        );
        assert!(unit.manifest_path().is_none());
    }

    #[test]
    fn test_crate_paths() {
        let unit = SourceUnit::crate_dir(PathBuf::from("/src/my_crate"), None);
        assert_eq!(unit.lib_name(), "my_crate");
        assert_eq!(
            unit.source_path(),
            PathBuf::from("/src/my_crate/src/lib.rs")
        );
        assert_eq!(
            unit.manifest_path(),
            Some(Path::new("/src/my_crate/Cargo.toml"))
        );
        assert_eq!(unit.pattern_base(), PathBuf::from("/src/my_crate/src"));
        assert_eq!(unit.artifact_path(".so"), PathBuf::from("/src/my_crate.so"));
    }

    #[test]
    fn test_marker_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.rs");
        fs::write(&path, "\n\n   \n// hotcrate:pyo3\nfn x() {}\n").unwrap();
        assert!(first_line_has_marker(&path));

        fs::write(&path, "fn x() {}\n// hotcrate\n").unwrap();
        assert!(!first_line_has_marker(&path));

        assert!(!first_line_has_marker(&dir.path().join("missing.rs")));
    }

    #[test]
    fn test_crate_marker_file() {
        let dir = tempfile::tempdir().unwrap();
        let crate_dir = dir.path().join("c");
        fs::create_dir_all(&crate_dir).unwrap();
        fs::write(crate_dir.join(MANIFEST_FILE), "[package]\nname = \"c\"\n").unwrap();

        let unit = SourceUnit::crate_dir(crate_dir.clone(), None);
        assert!(!unit.is_opted_in());

        fs::write(crate_dir.join(CRATE_MARKER_FILE), "").unwrap();
        assert!(unit.is_opted_in());
    }

    #[test]
    fn test_workspace_root_detection() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join(MANIFEST_FILE), "[workspace]\nmembers = [\"member\"]\n").unwrap();
        let member = root.join("member");
        fs::create_dir_all(&member).unwrap();
        fs::write(member.join(MANIFEST_FILE), "[package]\nname = \"member\"\n").unwrap();

        let unit = SourceUnit::crate_dir(member, None);
        assert_eq!(unit.workspace_root(), Some(root.clone()));
        assert_eq!(unit.tracking_root(), root);
    }
}
