//! Header parsing and template expansion
//!
//! The header is the first contiguous block of `//` comment lines (blank lines
//! allowed) of a unit's source. Each line is tested against [`HEADER_RULES`]
//! in order; the first rule whose prefix matches handles the line. Comment
//! lines matching no rule are ordinary comments. The header ends at the first
//! line that is neither blank nor a comment.
//!
//! ```text
//! // hotcrate:pyo3                      template directive (also the opt-in marker)
//! //: [dependencies]                    manifest fragment, appended verbatim
//! //: rand = "0.8"
//! //d: data/*.json                      dependency glob, tracked for rebuilds
//! ```

use crate::error::{BuildError, BuildResult, PreprocessError};
use crate::manifest::Manifest;
use crate::template::{TemplateInput, TemplateRegistry};
use crate::unit::{SourceUnit, MARKER_TOKEN};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A recognized header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `// hotcrate:<name>`
    Template(String),
    /// `//d: <glob>`
    DependencyGlob(String),
    /// `//: <toml>`
    ManifestFragment(String),
}

/// One entry of the header grammar
pub struct HeaderRule {
    /// Human-readable rule name
    pub name: &'static str,
    /// Returns the remainder of the line if the rule's prefix matches
    pub matches: fn(&str) -> Option<&str>,
    /// Parses the remainder; `Err` carries the reason the line is malformed
    pub parse: fn(&str) -> Result<Directive, String>,
}

/// The header grammar, in precedence order
pub const HEADER_RULES: &[HeaderRule] = &[
    HeaderRule {
        name: "dependency-glob",
        matches: match_dependency_prefix,
        parse: parse_dependency_glob,
    },
    HeaderRule {
        name: "manifest-fragment",
        matches: match_fragment_prefix,
        parse: parse_fragment_line,
    },
    HeaderRule {
        name: "template",
        matches: match_template_prefix,
        parse: parse_template_name,
    },
];

fn match_dependency_prefix(line: &str) -> Option<&str> {
    line.strip_prefix("//d:")
}

fn match_fragment_prefix(line: &str) -> Option<&str> {
    line.strip_prefix("//:")
}

fn parse_fragment_line(rest: &str) -> Result<Directive, String> {
    Ok(Directive::ManifestFragment(rest.trim_start().to_string()))
}

fn match_template_prefix(line: &str) -> Option<&str> {
    line.strip_prefix("//")?
        .trim_start()
        .strip_prefix(MARKER_TOKEN)?
        .trim_start()
        .strip_prefix(':')
}

fn parse_template_name(rest: &str) -> Result<Directive, String> {
    let name = rest.trim();
    if name.is_empty() {
        return Err("missing template name after ':'".to_string());
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!("invalid template name '{}'", name));
    }
    Ok(Directive::Template(name.to_string()))
}

fn parse_dependency_glob(rest: &str) -> Result<Directive, String> {
    let pattern = rest.trim();
    if pattern.is_empty() {
        return Err("empty dependency pattern".to_string());
    }
    glob::Pattern::new(pattern).map_err(|e| format!("invalid glob '{}': {}", pattern, e))?;
    Ok(Directive::DependencyGlob(pattern.to_string()))
}

/// Match a single (trimmed) line against the grammar
pub fn match_line(line: &str) -> Option<(&'static HeaderRule, Result<Directive, String>)> {
    HEADER_RULES
        .iter()
        .find_map(|rule| (rule.matches)(line).map(|rest| (rule, (rule.parse)(rest))))
}

/// Everything the header declares
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    /// Active template, if any
    pub template: Option<String>,
    /// `//d:` patterns, in declaration order
    pub dependency_patterns: Vec<String>,
    /// Parsed `//:` lines
    pub manifest_fragment: Manifest,
}

/// Parse the header block of `source`. `path` is only used in error messages.
pub fn parse_header(path: &Path, source: &str) -> Result<Header, PreprocessError> {
    let mut header = Header::default();
    let mut fragment_text = String::new();
    let mut fragment_line = None;

    for (index, raw) in source.lines().enumerate() {
        let line = raw.trim();
        let line_no = index + 1;

        if line.is_empty() {
            continue;
        }
        if !line.starts_with("//") {
            break;
        }

        let Some((rule, parsed)) = match_line(line) else {
            continue;
        };
        let directive =
            parsed.map_err(|reason| PreprocessError::malformed(path, line_no, reason))?;
        debug!("{}:{}: {} directive", path.display(), line_no, rule.name);

        match directive {
            Directive::Template(name) => {
                if let Some(existing) = &header.template {
                    return Err(PreprocessError::malformed(
                        path,
                        line_no,
                        format!("template '{}' already selected", existing),
                    ));
                }
                header.template = Some(name);
            }
            Directive::DependencyGlob(pattern) => header.dependency_patterns.push(pattern),
            Directive::ManifestFragment(text) => {
                fragment_line.get_or_insert(line_no);
                fragment_text.push_str(&text);
                fragment_text.push('\n');
            }
        }
    }

    if let Some(line_no) = fragment_line {
        header.manifest_fragment = Manifest::parse(&fragment_text).map_err(|e| {
            PreprocessError::malformed(path, line_no, format!("manifest fragment: {}", e.message()))
        })?;
    }

    Ok(header)
}

/// Result of preprocessing a unit
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Final merged manifest
    pub manifest: Manifest,
    /// Source to compile as `src/lib.rs`
    pub source: String,
    /// Whether `source` differs from the unit's own source
    pub source_changed: bool,
    /// `//d:` patterns, relative to the unit's pattern base
    pub dependency_patterns: Vec<String>,
    /// Extra toolchain arguments contributed by the template
    pub cargo_args: Vec<String>,
    /// Name of the active template
    pub template: Option<String>,
}

/// Raw inputs of [`Preprocessor::process_source`]
#[derive(Debug, Clone, Copy)]
pub struct PreprocessInput<'a> {
    /// Path of the source file (for error messages)
    pub path: &'a Path,
    /// Source text
    pub source: &'a str,
    /// Library name
    pub lib_name: &'a str,
    /// Text of the crate's own `Cargo.toml`, for crate units
    pub crate_manifest: Option<&'a str>,
    /// Directory relative `path` dependencies are resolved against
    pub unit_dir: &'a Path,
}

/// Turns a unit's source into a buildable crate description
pub struct Preprocessor<'a> {
    registry: &'a TemplateRegistry,
}

impl<'a> Preprocessor<'a> {
    pub fn new(registry: &'a TemplateRegistry) -> Self {
        Self { registry }
    }

    /// Read and preprocess a unit
    pub fn process(&self, unit: &SourceUnit) -> BuildResult<Preprocessed> {
        let source_path = unit.source_path();
        let source =
            fs::read_to_string(&source_path).map_err(|e| BuildError::io(&source_path, e))?;

        let crate_manifest = match unit.manifest_path() {
            Some(path) => Some(fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?),
            None => None,
        };

        self.process_source(PreprocessInput {
            path: &source_path,
            source: &source,
            lib_name: unit.lib_name(),
            crate_manifest: crate_manifest.as_deref(),
            unit_dir: unit.unit_dir(),
        })
    }

    /// Preprocess already-loaded source text
    ///
    /// Manifest layers, lowest precedence first: toolchain defaults, template
    /// fragment, header fragment, crate `Cargo.toml`.
    pub fn process_source(&self, input: PreprocessInput<'_>) -> BuildResult<Preprocessed> {
        let header = parse_header(input.path, input.source)?;

        let template = match &header.template {
            Some(name) => Some(self.registry.lookup(name)?),
            None => None,
        };

        let template_input = TemplateInput {
            lib_name: input.lib_name,
            source: input.source,
        };

        let mut manifest = Manifest::toolchain_defaults(input.lib_name);
        if let Some(template) = template {
            manifest.merge(&template.manifest_fragment(&template_input));
        }
        manifest.merge(header.manifest_fragment.table());
        if let Some(text) = input.crate_manifest {
            let crate_manifest = Manifest::parse(text).map_err(|e| {
                BuildError::InvalidManifest(format!("{}: {}", input.path.display(), e.message()))
            })?;
            manifest.merge(crate_manifest.table());
        }
        manifest.absolutize_path_dependencies(input.unit_dir);

        let generated = template.and_then(|t| t.generated_code(&template_input));
        if let (Some(t), None) = (template, &generated) {
            debug!(
                "Template '{}' generated no code for {}",
                t.name(),
                input.path.display()
            );
        }

        let source = match &generated {
            Some(code) => format!("{}\n\n{}\n", input.source, code),
            None => input.source.to_string(),
        };

        Ok(Preprocessed {
            manifest,
            source,
            source_changed: generated.is_some(),
            dependency_patterns: header.dependency_patterns,
            cargo_args: template.map(|t| t.cargo_args()).unwrap_or_default(),
            template: header.template,
        })
    }
}

/// Resolve `patterns` against `base`
pub fn absolute_patterns(base: &Path, patterns: &[String]) -> Vec<PathBuf> {
    patterns.iter().map(|p| base.join(p)).collect()
}
