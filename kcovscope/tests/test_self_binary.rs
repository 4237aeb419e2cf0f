mod common;

use common::host_target;
use kcovscope::domain::CoverError;
use kcovscope::symbolization::{build_cover_index, BuildOptions};
use kcovscope::targets::TargetRegistry;
use kcovscope::{config::CoverConfig, discovery::discover_modules};
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Copy our own (uninstrumented) binary into a temp dir as `vmlinux`
fn self_image() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::copy(env!("CARGO_BIN_EXE_kcovscope"), dir.path().join("vmlinux")).unwrap();
    dir
}

fn write_config(dir: &Path, target: &str) -> std::path::PathBuf {
    let path = dir.join("cover.json");
    let config = CoverConfig::new(target, dir);
    fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();
    path
}

#[test]
fn test_discover_self_as_main_image() {
    let Some(key) = host_target() else {
        return;
    };
    let dir = self_image();
    let registry = TargetRegistry::builtin();
    let modules = discover_modules(registry.get(key).unwrap(), dir.path(), &[]).unwrap();

    assert_eq!(modules.len(), 1);
    assert!(modules[0].is_main());
    assert_eq!(modules[0].display_name(), "vmlinux");
    assert!(modules[0].size > 0);
}

#[test]
fn test_uninstrumented_binary_has_no_callbacks() {
    let Some(key) = host_target() else {
        return;
    };
    let dir = self_image();
    let registry = TargetRegistry::builtin();
    let target = registry.get(key).unwrap();
    let modules = discover_modules(target, dir.path(), &[]).unwrap();

    let options = BuildOptions { symbols_only: true, ..BuildOptions::default() };
    let err = build_cover_index(target, &modules, &options).map(|_| ()).unwrap_err();
    assert!(matches!(err, CoverError::NoCoverageCallbacks { .. }), "{err}");
    assert!(err.to_string().contains("vmlinux"));

    // With DWARF required the build either lacks debug info or callbacks
    let err = build_cover_index(target, &modules, &BuildOptions::default()).map(|_| ()).unwrap_err();
    assert!(
        matches!(err, CoverError::NoDebugInfo { .. } | CoverError::NoCoverageCallbacks { .. }),
        "{err}"
    );
}

#[test]
fn test_wrong_architecture_is_rejected() {
    let Some(key) = host_target() else {
        return;
    };
    let other = if key == "linux/amd64" { "linux/arm64" } else { "linux/amd64" };
    let dir = self_image();
    let registry = TargetRegistry::builtin();

    let err = discover_modules(registry.get(other).unwrap(), dir.path(), &[]).unwrap_err();
    assert!(matches!(err, CoverError::Discovery { .. }), "{err}");
    assert!(err.to_string().contains(other));
}

#[test]
fn test_missing_image_is_a_discovery_error() {
    let dir = tempfile::tempdir().unwrap();
    let registry = TargetRegistry::builtin();
    let err = discover_modules(registry.get("linux/amd64").unwrap(), dir.path(), &[]).unwrap_err();
    assert!(matches!(err, CoverError::Discovery { .. }));
    assert!(err.is_construction_error());
}

#[test]
fn test_cli_lists_modules() {
    let Some(key) = host_target() else {
        return;
    };
    let dir = self_image();
    let config = write_config(dir.path(), key);

    let output = Command::new(env!("CARGO_BIN_EXE_kcovscope"))
        .args(["modules", "-c"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("vmlinux ("));
}

#[test]
fn test_cli_exit_codes() {
    let dir = self_image();
    let progs = dir.path().join("progs.json");
    fs::write(&progs, r#"{"progs":[]}"#).unwrap();

    let run = |config: &Path| {
        Command::new(env!("CARGO_BIN_EXE_kcovscope"))
            .args(["report", "-f", "functions", "-c"])
            .arg(config)
            .arg("-p")
            .arg(&progs)
            .output()
            .unwrap()
    };

    let unknown = run(&write_config(dir.path(), "plan9/amd64"));
    assert_eq!(unknown.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&unknown.stderr).contains("plan9/amd64"));

    let missing = run(&dir.path().join("missing.json"));
    assert_eq!(missing.status.code(), Some(2));

    if let Some(key) = host_target() {
        let uninstrumented = run(&write_config(dir.path(), key));
        assert_eq!(uninstrumented.status.code(), Some(1));
        assert!(uninstrumented.stdout.is_empty());
    }
}
