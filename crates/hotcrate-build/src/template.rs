//! Template registry
//!
//! A template activated by a `// hotcrate:<name>` header contributes two
//! things: a manifest fragment layered between the toolchain defaults and the
//! user's own fragment, and a block of generated code appended to the source
//! (skipped when the user already wrote the entry point).
//!
//! The set of templates is closed: [`BuiltinTemplate`] enumerates them and
//! [`TemplateRegistry::builtin`] registers each one explicitly.

use crate::error::PreprocessError;
use crate::manifest::cdylib_lib_table;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use toml::{Table, Value};

/// PyO3 version pinned by the `pyo3` template
pub const PYO3_VERSION: &str = "0.23.4";

/// What a template generator sees of the unit
#[derive(Debug, Clone, Copy)]
pub struct TemplateInput<'a> {
    /// Name of the library being produced
    pub lib_name: &'a str,
    /// The unit's source text
    pub source: &'a str,
}

/// Produces the template's manifest fragment
pub type FragmentFn = fn(&TemplateInput<'_>) -> Table;
/// Produces the code block appended to the source, if any
pub type CodeFn = fn(&TemplateInput<'_>) -> Option<String>;
/// Detects a user-written entry point that makes code generation unnecessary
pub type EntryPointFn = fn(&str) -> bool;
/// Extra arguments forwarded to the toolchain
pub type ArgsFn = fn() -> Vec<String>;

/// A named expansion rule
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    fragment: FragmentFn,
    code: CodeFn,
    entry_point: EntryPointFn,
    cargo_args: ArgsFn,
}

impl Template {
    pub fn new(name: impl Into<String>, fragment: FragmentFn, code: CodeFn) -> Self {
        Self {
            name: name.into(),
            fragment,
            code,
            entry_point: |_| false,
            cargo_args: Vec::new,
        }
    }

    /// Set the entry point detector
    pub fn with_entry_point(mut self, detector: EntryPointFn) -> Self {
        self.entry_point = detector;
        self
    }

    /// Set extra toolchain arguments
    pub fn with_cargo_args(mut self, args: ArgsFn) -> Self {
        self.cargo_args = args;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifest_fragment(&self, input: &TemplateInput<'_>) -> Table {
        (self.fragment)(input)
    }

    /// Whether the source already defines the export entry point
    pub fn defines_entry_point(&self, source: &str) -> bool {
        (self.entry_point)(source)
    }

    /// Code to append to the source; `None` when the user wrote the entry point
    /// or the template generates nothing.
    pub fn generated_code(&self, input: &TemplateInput<'_>) -> Option<String> {
        if self.defines_entry_point(input.source) {
            return None;
        }
        (self.code)(input)
    }

    pub fn cargo_args(&self) -> Vec<String> {
        (self.cargo_args)()
    }
}

/// Templates shipped with hotcrate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTemplate {
    /// Python extension module via PyO3
    Pyo3,
    /// Plain C-ABI dynamic library, manifest only
    Cdylib,
}

impl BuiltinTemplate {
    pub const ALL: [BuiltinTemplate; 2] = [Self::Pyo3, Self::Cdylib];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pyo3 => "pyo3",
            Self::Cdylib => "cdylib",
        }
    }

    pub fn template(&self) -> Template {
        match self {
            Self::Pyo3 => Template::new(self.name(), pyo3_fragment, pyo3_module_code)
                .with_entry_point(pyo3_defines_module)
                .with_cargo_args(pyo3_cargo_args),
            Self::Cdylib => Template::new(self.name(), cdylib_fragment, |_| None),
        }
    }
}

/// Name → template mapping
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Template>,
}

impl TemplateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every [`BuiltinTemplate`]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for builtin in BuiltinTemplate::ALL {
            let registered = registry.register(builtin.template());
            debug_assert!(registered.is_ok(), "builtin template names are distinct");
        }
        registry
    }

    /// Add a template; names must be unique
    pub fn register(&mut self, template: Template) -> Result<(), PreprocessError> {
        if self.templates.contains_key(template.name()) {
            return Err(PreprocessError::DuplicateTemplate {
                name: template.name().to_string(),
            });
        }
        self.templates.insert(template.name().to_string(), template);
        Ok(())
    }

    /// Look up a template by exact name
    pub fn lookup(&self, name: &str) -> Result<&Template, PreprocessError> {
        self.templates
            .get(name)
            .ok_or_else(|| PreprocessError::UnknownTemplate {
                name: name.to_string(),
            })
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// pyo3
// ---------------------------------------------------------------------------

fn pyo3_fragment(input: &TemplateInput<'_>) -> Table {
    let mut package = Table::new();
    package.insert("name".into(), Value::String(input.lib_name.to_string()));
    package.insert("version".into(), Value::String("0.1.0".into()));
    package.insert("edition".into(), Value::String("2021".into()));

    let mut pyo3 = Table::new();
    pyo3.insert("version".into(), Value::String(PYO3_VERSION.into()));
    pyo3.insert(
        "features".into(),
        Value::Array(vec![Value::String("extension-module".into())]),
    );
    let mut dependencies = Table::new();
    dependencies.insert("pyo3".into(), Value::Table(pyo3));

    let mut fragment = Table::new();
    fragment.insert("package".into(), Value::Table(package));
    fragment.insert("lib".into(), Value::Table(cdylib_lib_table(input.lib_name)));
    fragment.insert("dependencies".into(), Value::Table(dependencies));
    fragment
}

fn pyo3_defines_module(source: &str) -> bool {
    static MODULE: OnceLock<Regex> = OnceLock::new();
    MODULE
        .get_or_init(|| {
            Regex::new(r"#\[pymodule\]\s*(?:\w+\s+)*?(?:mod|fn)\s+\w+").expect("valid regex")
        })
        .is_match(source)
}

fn pyo3_module_code(input: &TemplateInput<'_>) -> Option<String> {
    static FUNCTIONS: OnceLock<Regex> = OnceLock::new();
    static CLASSES: OnceLock<Regex> = OnceLock::new();

    // attribute, then any further attributes or comments, then modifiers, then the item
    let functions = FUNCTIONS.get_or_init(|| {
        Regex::new(
            r"(?s)#\[pyfunction.*?\]\s*(?:(?:#\[.*?\]|//[^\n]*\n|/\*.*?\*/)\s*)*?(?:\w+\s+)*?fn\s+(?P<name>\w+)",
        )
        .expect("valid regex")
    });
    let classes = CLASSES.get_or_init(|| {
        Regex::new(
            r"(?s)#\[pyclass.*?\]\s*(?:(?:#\[.*?\]|//[^\n]*\n|/\*.*?\*/)\s*)*?(?:\w+\s+)*?(?:struct|enum)\s+(?P<name>\w+)",
        )
        .expect("valid regex")
    });

    let mut lines = vec![
        "#[pymodule]".to_string(),
        format!(
            "fn {}(_py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {{",
            input.lib_name
        ),
    ];
    for caps in functions.captures_iter(input.source) {
        lines.push(format!(
            "  m.add_function(wrap_pyfunction!({}, m)?)?;",
            &caps["name"]
        ));
    }
    for caps in classes.captures_iter(input.source) {
        lines.push(format!("  m.add_class::<{}>()?;", &caps["name"]));
    }
    lines.push("  Ok(())".to_string());
    lines.push("}".to_string());

    Some(lines.join("\n"))
}

fn pyo3_cargo_args() -> Vec<String> {
    // extension-module leaves libpython unlinked; macOS needs the symbols
    // resolved at load time instead
    if cfg!(target_os = "macos") {
        ["--", "-C", "link-arg=-undefined", "-C", "link-arg=dynamic_lookup"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    } else {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// cdylib
// ---------------------------------------------------------------------------

fn cdylib_fragment(input: &TemplateInput<'_>) -> Table {
    let mut fragment = Table::new();
    fragment.insert("lib".into(), Value::Table(cdylib_lib_table(input.lib_name)));
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PYO3_SOURCE: &str = r#"// hotcrate:pyo3
use pyo3::prelude::*;

/// Adds one.
#[pyfunction]
fn add_one(x: i64) -> i64 { x + 1 }

#[pyfunction]
#[pyo3(signature = (a, b=2))]
// keeps defaults
pub fn scaled(a: i64, b: i64) -> i64 { a * b }

#[pyclass]
#[derive(Clone)]
pub struct Counter { n: u32 }

#[pyclass(eq, eq_int)]
#[derive(PartialEq)]
enum Colour { Red, Green }
"#;

    #[test]
    fn test_builtin_registry_contents() {
        let registry = TemplateRegistry::builtin();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["cdylib", "pyo3"]);
        assert!(registry.lookup("pyo3").is_ok());
    }

    #[test]
    fn test_lookup_is_exact() {
        let registry = TemplateRegistry::builtin();
        assert!(matches!(
            registry.lookup("PyO3"),
            Err(PreprocessError::UnknownTemplate { .. })
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = TemplateRegistry::builtin();
        let result = registry.register(BuiltinTemplate::Pyo3.template());
        assert!(matches!(
            result,
            Err(PreprocessError::DuplicateTemplate { name }) if name == "pyo3"
        ));
    }

    #[test]
    fn test_custom_template_registration() {
        let mut registry = TemplateRegistry::new();
        let template = Template::new("marker", |_| Table::new(), |input| {
            Some(format!("// built for {}", input.lib_name))
        });
        registry.register(template).unwrap();

        let input = TemplateInput {
            lib_name: "demo",
            source: "",
        };
        let code = registry.lookup("marker").unwrap().generated_code(&input);
        assert_eq!(code.as_deref(), Some("// built for demo"));
    }

    #[test]
    fn test_pyo3_generates_module() {
        let template = BuiltinTemplate::Pyo3.template();
        let input = TemplateInput {
            lib_name: "demo",
            source: PYO3_SOURCE,
        };
        let code = template.generated_code(&input).unwrap();
        assert_eq!(
            code,
            [
                "#[pymodule]",
                "fn demo(_py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {",
                "  m.add_function(wrap_pyfunction!(add_one, m)?)?;",
                "  m.add_function(wrap_pyfunction!(scaled, m)?)?;",
                "  m.add_class::<Counter>()?;",
                "  m.add_class::<Colour>()?;",
                "  Ok(())",
                "}",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_pyo3_respects_user_module() {
        let template = BuiltinTemplate::Pyo3.template();
        let source = format!(
            "{}\n#[pymodule]\nfn demo(_py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {{ Ok(()) }}\n",
            PYO3_SOURCE
        );
        let input = TemplateInput {
            lib_name: "demo",
            source: &source,
        };
        assert!(template.defines_entry_point(&source));
        assert_eq!(template.generated_code(&input), None);
    }

    #[test]
    fn test_pyo3_fragment() {
        let template = BuiltinTemplate::Pyo3.template();
        let fragment = template.manifest_fragment(&TemplateInput {
            lib_name: "demo",
            source: "",
        });
        let pyo3 = fragment["dependencies"]["pyo3"].as_table().unwrap();
        assert_eq!(pyo3["version"].as_str(), Some(PYO3_VERSION));
        assert_eq!(fragment["lib"]["name"].as_str(), Some("demo"));
    }

    #[test]
    fn test_cdylib_generates_nothing() {
        let template = BuiltinTemplate::Cdylib.template();
        let input = TemplateInput {
            lib_name: "plain",
            source: "pub extern \"C\" fn f() {}",
        };
        assert_eq!(template.generated_code(&input), None);
        assert!(template.cargo_args().is_empty());
        assert!(template.manifest_fragment(&input).contains_key("lib"));
    }
}
