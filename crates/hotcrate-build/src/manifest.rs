//! Cargo manifest assembly
//!
//! A [`Manifest`] is a TOML table built by layering sources of increasing
//! precedence. Tables merge key-by-key, any other value is replaced by the
//! higher layer, and keys hotcrate does not know about pass through as-is.

use crate::error::{BuildError, BuildResult};
use std::path::Path;
use toml::{Table, Value};

const DEPENDENCY_TABLES: [&str; 3] = ["dependencies", "dev-dependencies", "build-dependencies"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    table: Table,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: Table) -> Self {
        Self { table }
    }

    /// Parse manifest text
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        text.parse::<Table>().map(Self::from_table)
    }

    /// Defaults every generated crate starts from
    pub fn toolchain_defaults(lib_name: &str) -> Self {
        let mut package = Table::new();
        package.insert("name".into(), Value::String(lib_name.to_string()));
        package.insert("version".into(), Value::String("0.1.0".into()));
        package.insert("edition".into(), Value::String("2021".into()));

        let mut table = Table::new();
        table.insert("package".into(), Value::Table(package));
        table.insert("lib".into(), Value::Table(cdylib_lib_table(lib_name)));
        Self::from_table(table)
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    /// Layer `higher` on top of this manifest; `higher` wins on conflicts
    pub fn merge(&mut self, higher: &Table) {
        merge_tables(&mut self.table, higher);
    }

    /// Look up a value by dotted key, e.g. `package.name`
    pub fn get(&self, dotted: &str) -> Option<&Value> {
        let mut parts = dotted.split('.');
        let mut current = self.table.get(parts.next()?)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    /// Rewrite relative `path = "..."` dependencies against `base`
    ///
    /// The manifest is compiled from a staging directory, so relative paths
    /// written next to the unit would no longer resolve.
    pub fn absolutize_path_dependencies(&mut self, base: &Path) {
        for key in DEPENDENCY_TABLES {
            if let Some(Value::Table(deps)) = self.table.get_mut(key) {
                absolutize_deps(deps, base);
            }
        }

        if let Some(Value::Table(targets)) = self.table.get_mut("target") {
            for (_, target) in targets.iter_mut() {
                let Value::Table(target) = target else {
                    continue;
                };
                for key in DEPENDENCY_TABLES {
                    if let Some(Value::Table(deps)) = target.get_mut(key) {
                        absolutize_deps(deps, base);
                    }
                }
            }
        }
    }

    /// Serialize to TOML text
    pub fn to_toml_string(&self) -> BuildResult<String> {
        toml::to_string(&self.table).map_err(|e| BuildError::InvalidManifest(e.to_string()))
    }
}

/// `[lib]` table producing a dynamic library named `lib_name`
pub fn cdylib_lib_table(lib_name: &str) -> Table {
    let mut lib = Table::new();
    lib.insert("name".into(), Value::String(lib_name.to_string()));
    lib.insert(
        "crate-type".into(),
        Value::Array(vec![Value::String("cdylib".into())]),
    );
    lib
}

/// Recursively merge `overlay` into `base`
pub fn merge_tables(base: &mut Table, overlay: &Table) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn absolutize_deps(deps: &mut Table, base: &Path) {
    for (_, spec) in deps.iter_mut() {
        let Value::Table(spec) = spec else {
            continue;
        };
        if let Some(Value::String(path)) = spec.get_mut("path") {
            if Path::new(path.as_str()).is_relative() {
                *path = base.join(path.as_str()).to_string_lossy().into_owned();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(text: &str) -> Table {
        text.parse::<Table>().unwrap()
    }

    #[test]
    fn test_defaults() {
        let manifest = Manifest::toolchain_defaults("fast_math");
        assert_eq!(
            manifest.get("package.name").and_then(Value::as_str),
            Some("fast_math")
        );
        assert_eq!(
            manifest.get("lib.crate-type"),
            Some(&Value::Array(vec![Value::String("cdylib".into())]))
        );
    }

    #[test]
    fn test_merge_is_key_by_key() {
        let mut manifest = Manifest::from_table(table(
            r#"
[package]
name = "a"
edition = "2021"

[dependencies]
serde = "1"
"#,
        ));
        manifest.merge(&table(
            r#"
[package]
edition = "2024"

[dependencies]
regex = "1"

[features]
fast = []
"#,
        ));

        assert_eq!(manifest.get("package.name").and_then(Value::as_str), Some("a"));
        assert_eq!(
            manifest.get("package.edition").and_then(Value::as_str),
            Some("2024")
        );
        assert!(manifest.get("dependencies.serde").is_some());
        assert!(manifest.get("dependencies.regex").is_some());
        assert!(manifest.get("features.fast").is_some());
    }

    #[test]
    fn test_merge_scalar_replaces_table() {
        let mut manifest = Manifest::from_table(table("[dependencies]\npyo3 = { version = \"0.1\" }\n"));
        manifest.merge(&table("[dependencies]\npyo3 = \"0.2\"\n"));
        assert_eq!(
            manifest.get("dependencies.pyo3").and_then(Value::as_str),
            Some("0.2")
        );
    }

    #[test]
    fn test_absolutize_path_dependencies() {
        let mut manifest = Manifest::from_table(table(
            r#"
[dependencies]
local = { path = "./local" }
absolute = { path = "/opt/abs" }
registry = "1"

[target.'cfg(unix)'.dev-dependencies]
helper = { path = "../helper" }
"#,
        ));
        manifest.absolutize_path_dependencies(Path::new("/work/unit"));

        assert_eq!(
            manifest.get("dependencies.local.path").and_then(Value::as_str),
            Some(Path::new("/work/unit").join("./local").to_str().unwrap())
        );
        assert_eq!(
            manifest.get("dependencies.absolute.path").and_then(Value::as_str),
            Some("/opt/abs")
        );
        assert_eq!(
            manifest
                .get("target.cfg(unix).dev-dependencies.helper.path")
                .and_then(Value::as_str),
            Some(Path::new("/work/unit").join("../helper").to_str().unwrap())
        );
        assert_eq!(
            manifest.get("dependencies.registry").and_then(Value::as_str),
            Some("1")
        );
    }
}
