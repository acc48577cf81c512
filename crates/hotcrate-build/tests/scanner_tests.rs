//! Batch scanner tests

mod common;

use common::*;
use hotcrate_build::{discover, scan_and_build, BuildError, BuildState, ResolveError};
use pretty_assertions::assert_eq;

fn populate(sandbox: &Sandbox) {
    sandbox.write("a.rs", "// hotcrate\npub fn a() {}\n");
    sandbox.write("nested/b.rs", "// hotcrate:cdylib\npub fn b() {}\n");
    sandbox.write("plain.rs", "pub fn unmarked() {}\n");
    sandbox.write("target/skipped.rs", "// hotcrate\n");
    sandbox.write(".cache/hidden.rs", "// hotcrate\n");
    sandbox.write("native/Cargo.toml", "[package]\nname = \"native\"\n");
    sandbox.write("native/.hotcrate", "");
    sandbox.write("native/src/lib.rs", "// hotcrate\npub fn n() {}\n");
}

#[test]
fn test_discover_finds_marked_units_only() {
    let sandbox = Sandbox::new();
    populate(&sandbox);

    let (units, errors) = discover(&[sandbox.path()]);
    assert!(errors.is_empty());

    let mut paths: Vec<_> = units.iter().map(|u| u.path().to_path_buf()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            sandbox.path().join("a.rs"),
            sandbox.path().join("native"),
            sandbox.path().join("nested").join("b.rs"),
        ]
    );
}

#[test]
fn test_explicit_file_root_needs_no_marker() {
    let sandbox = Sandbox::new();
    let plain = sandbox.write("plain.rs", "pub fn unmarked() {}\n");

    let (units, errors) = discover(&[plain.clone(), plain.clone()]);
    assert!(errors.is_empty());
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].path(), plain);
}

#[test]
fn test_scan_builds_everything_then_reports_fresh() {
    let sandbox = Sandbox::new();
    populate(&sandbox);
    let coordinator = sandbox.coordinator();

    let report = scan_and_build(&[sandbox.path()], &coordinator);
    assert!(report.is_success());
    assert_eq!(report.count(BuildState::Built), 3);
    assert!(sandbox.path().join("a.so").is_file());
    assert!(sandbox.path().join("nested").join("b.so").is_file());
    assert!(sandbox.path().join("native.so").is_file());

    let again = scan_and_build(&[sandbox.path()], &coordinator);
    assert!(again.is_success());
    assert_eq!(again.count(BuildState::Fresh), 3);
    assert_eq!(coordinator.toolchain().calls(), 3);
}

#[test]
fn test_scan_continues_past_failures() {
    let sandbox = Sandbox::new();
    sandbox.write("a_broken.rs", "// hotcrate\ncompile_error!(\"x\");\n");
    sandbox.write("b_good.rs", "// hotcrate\npub fn ok() {}\n");
    let coordinator = sandbox.coordinator();

    let report = scan_and_build(&[sandbox.path()], &coordinator);
    assert!(!report.is_success());
    assert_eq!(report.entries().len(), 2);
    assert_eq!(report.count(BuildState::Failed), 1);
    assert_eq!(report.count(BuildState::Built), 1);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, sandbox.path().join("a_broken.rs"));
    assert!(matches!(
        failures[0].1,
        BuildError::ToolInvocationFailed { .. }
    ));
    assert!(sandbox.path().join("b_good.so").is_file());
}

#[test]
fn test_missing_root_is_a_failure() {
    let sandbox = Sandbox::new();
    sandbox.write("a.rs", "// hotcrate\n");
    let missing = sandbox.path().join("does-not-exist");
    let coordinator = sandbox.coordinator();

    let report = scan_and_build(&[missing.clone(), sandbox.path()], &coordinator);
    assert!(!report.is_success());
    assert_eq!(report.count(BuildState::Built), 1);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures[0].0, missing.as_path());
    assert!(matches!(
        failures[0].1,
        BuildError::Resolve(ResolveError::NotFound { .. })
    ));
}
