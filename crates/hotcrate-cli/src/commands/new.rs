//! New command - scaffold a single-file extension or a crate

use anyhow::{bail, Context, Result};
use hotcrate_build::template::PYO3_VERSION;
use hotcrate_build::CRATE_MARKER_FILE;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

const NAME_PATTERN: &str = r"^[a-zA-Z]\w*(\.rs)?$";

const LIB_TEMPLATE: &str = r#"// hotcrate:pyo3

use pyo3::prelude::*;

#[pyfunction]
fn say_hello() {
    println!("Hello from {{NAME}}, implemented in Rust!")
}

// A #[pymodule] named after the library is generated for every #[pyfunction]
// and #[pyclass] above. Write your own to take over:
//
//#[pymodule]
//fn {{NAME}}(_py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {
//    m.add_function(wrap_pyfunction!(say_hello, m)?)?;
//    Ok(())
//}
"#;

const MANIFEST_TEMPLATE: &str = r#"[package]
name = "{{NAME}}"
version = "0.1.0"
edition = "2021"

# hotcrate layers this file over its generated defaults, so everything below
# may be removed or changed.
[lib]
name = "{{NAME}}"
crate-type = ["cdylib"]

[dependencies]
pyo3 = { version = "{{PYO3_VERSION}}", features = ["extension-module"] }
"#;

/// Create `name` inside `dir`; returns the created path
pub fn run(name: &str, dir: &Path) -> Result<PathBuf> {
    let pattern = Regex::new(NAME_PATTERN).context("Invalid name pattern")?;
    if !pattern.is_match(name) {
        bail!(
            "Invalid name '{}': use letters, digits and underscores, starting with a letter",
            name
        );
    }

    let path = dir.join(name);
    if path.exists() {
        bail!("{} already exists", path.display());
    }

    match name.strip_suffix(".rs") {
        Some(stem) => {
            fs::write(&path, render(LIB_TEMPLATE, stem))
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => create_crate(&path, name)?,
    }

    Ok(path)
}

fn create_crate(path: &Path, name: &str) -> Result<()> {
    let src = path.join("src");
    fs::create_dir_all(&src).with_context(|| format!("Failed to create {}", src.display()))?;

    let files = [
        (src.join("lib.rs"), render(LIB_TEMPLATE, name)),
        (path.join("Cargo.toml"), render(MANIFEST_TEMPLATE, name)),
        (
            path.join(CRATE_MARKER_FILE),
            "Marks this crate as buildable by hotcrate.\n".to_string(),
        ),
    ];
    for (file, contents) in files {
        fs::write(&file, contents).with_context(|| format!("Failed to write {}", file.display()))?;
    }
    Ok(())
}

fn render(template: &str, name: &str) -> String {
    template
        .replace("{{NAME}}", name)
        .replace("{{PYO3_VERSION}}", PYO3_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_validation() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["1fast", "fast-math", "fast.py", "", "dir/fast.rs"] {
            assert!(run(bad, dir.path()).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_render_fills_placeholders() {
        let manifest = render(MANIFEST_TEMPLATE, "fast");
        assert!(manifest.contains("name = \"fast\""));
        assert!(manifest.contains(PYO3_VERSION));
        assert!(!manifest.contains("{{"));
    }
}
