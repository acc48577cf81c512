//! Resolution and import hook tests

mod common;

use common::*;
use hotcrate_build::{
    resolve_by_name, resolve_by_path, ImportHook, ResolveError, UnitKind,
};
use pretty_assertions::assert_eq;
use std::fs;

#[test]
fn test_dotted_name_maps_to_nested_file() {
    let sandbox = Sandbox::new();
    let path = sandbox.write("pkg/sub/fast.rs", "// hotcrate\npub fn f() {}\n");

    let unit = resolve_by_name("pkg.sub.fast", &[sandbox.path()]).unwrap();
    assert_eq!(unit.path(), path);
    assert_eq!(unit.name(), "pkg.sub.fast");
    assert_eq!(unit.lib_name(), "fast");
}

#[test]
fn test_crate_directory_is_found_by_name() {
    let sandbox = Sandbox::new();
    sandbox.write("pkg/native/Cargo.toml", "[package]\nname = \"native\"\n");
    sandbox.write("pkg/native/.hotcrate", "");

    let unit = resolve_by_name("pkg.native", &[sandbox.path()]).unwrap();
    assert!(matches!(unit.kind(), UnitKind::Crate { .. }));
    assert_eq!(unit.path(), sandbox.path().join("pkg").join("native"));
}

#[test]
fn test_file_wins_over_crate_in_same_root() {
    let sandbox = Sandbox::new();
    sandbox.write("both.rs", "// hotcrate\n");
    sandbox.write("both/Cargo.toml", "# hotcrate\n[package]\nname = \"both\"\n");

    let unit = resolve_by_name("both", &[sandbox.path()]).unwrap();
    assert!(matches!(unit.kind(), UnitKind::SingleFile { .. }));
}

#[test]
fn test_unmarked_candidate_is_not_opted_in() {
    let sandbox = Sandbox::new();
    let path = sandbox.write("plain.rs", "pub fn f() {}\n");

    match resolve_by_name("plain", &[sandbox.path()]) {
        Err(ResolveError::NotOptedIn { candidate, .. }) => assert_eq!(candidate, path),
        other => panic!("expected NotOptedIn, got {:?}", other),
    }

    // explicit paths skip the marker check
    assert!(resolve_by_path(&path, None).is_ok());
    assert!(resolve_by_path(&sandbox.path().join("plain"), None).is_ok());
}

#[test]
fn test_unmarked_file_does_not_hide_marked_crate() {
    let sandbox = Sandbox::new();
    sandbox.write("fast.rs", "pub fn unmarked() {}\n");
    sandbox.write(
        "fast/Cargo.toml",
        "[package]\nname = \"fast\"\nversion = \"0.1.0\"\n",
    );
    sandbox.write("fast/.hotcrate", "");

    let unit = resolve_by_name("fast", &[sandbox.path()]).unwrap();
    assert!(matches!(unit.kind(), UnitKind::Crate { .. }));
    assert_eq!(unit.path(), sandbox.path().join("fast"));
}

#[test]
fn test_unmarked_file_and_crate_report_the_file() {
    let sandbox = Sandbox::new();
    let file = sandbox.write("fast.rs", "pub fn unmarked() {}\n");
    sandbox.write("fast/Cargo.toml", "[package]\nname = \"fast\"\n");

    match resolve_by_name("fast", &[sandbox.path()]) {
        Err(ResolveError::NotOptedIn { candidate, .. }) => assert_eq!(candidate, file),
        other => panic!("expected NotOptedIn, got {:?}", other),
    }
}

#[test]
fn test_later_root_with_marker_wins() {
    let first = Sandbox::new();
    let second = Sandbox::new();
    first.write("fast.rs", "pub fn unmarked() {}\n");
    let marked = second.write("fast.rs", "// hotcrate\npub fn marked() {}\n");

    let unit = resolve_by_name("fast", &[first.path(), second.path()]).unwrap();
    assert_eq!(unit.path(), marked);
}

#[test]
fn test_manifest_path_resolves_to_crate() {
    let sandbox = Sandbox::new();
    let manifest = sandbox.write("c/Cargo.toml", "[package]\nname = \"c\"\n");

    let unit = resolve_by_path(&manifest, None).unwrap();
    assert_eq!(unit.path(), sandbox.path().join("c"));
    assert_eq!(unit.manifest_path(), Some(manifest.as_path()));
}

#[test]
fn test_import_hook_builds_opted_in_units() {
    let sandbox = Sandbox::new();
    sandbox.write("pkg/fast.rs", "// hotcrate\npub fn f() {}\n");
    sandbox.write("pkg/plain.rs", "pub fn f() {}\n");
    let hook = ImportHook::new(vec![sandbox.path()], sandbox.coordinator());

    let artifact = hook.find("pkg.fast").unwrap().unwrap();
    assert_eq!(artifact, sandbox.path().join("pkg").join("fast.so"));
    assert!(artifact.is_file());

    assert_eq!(hook.find("pkg.plain").unwrap(), None);
    assert_eq!(hook.find("pkg.missing").unwrap(), None);
    assert_eq!(hook.coordinator().toolchain().calls(), 1);
}

#[test]
fn test_import_hook_propagates_build_failures() {
    let sandbox = Sandbox::new();
    sandbox.write("broken.rs", "// hotcrate\ncompile_error!(\"x\");\n");
    let hook = ImportHook::new(vec![sandbox.path()], sandbox.coordinator());

    assert!(hook.find("broken").is_err());
    assert!(!sandbox.path().join("broken.so").exists());
    assert!(fs::read_dir(sandbox.path()).unwrap().count() == 1);
}
