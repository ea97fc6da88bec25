//! Command-line behaviour of the `wheelhouse` binary.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn wheelhouse(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wheelhouse"))
        .current_dir(cwd)
        .args(args)
        .env_remove("WHEELHOUSE_PYTHONS")
        .env_remove("WHEELHOUSE_PYPI_URL")
        .env_remove("BUILD_IN_CONTAINER")
        .output()
        .expect("failed to run wheelhouse")
}

#[test]
fn test_help_command() {
    let dir = TempDir::new().unwrap();
    let output = wheelhouse(dir.path(), &["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("build"));
    assert!(stdout.contains("validate"));
    assert!(stdout.contains("catalog"));
}

#[test]
fn test_version_command() {
    let dir = TempDir::new().unwrap();
    let output = wheelhouse(dir.path(), &["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("wheelhouse "));
}

#[test]
fn test_build_requires_pypi_url() {
    let dir = TempDir::new().unwrap();
    let output = wheelhouse(dir.path(), &["build"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--pypi-url"));
}

#[test]
fn test_missing_manifest_is_fatal() {
    let dir = TempDir::new().unwrap();
    let output = wheelhouse(
        dir.path(),
        &["build", "--pypi-url", "http://127.0.0.1:9/", "--packages-ini", "missing.ini"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing.ini: not found"));
}

#[test]
fn test_unknown_manifest_key_is_fatal() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("packages.ini"), "[foo==1.0]\nbogus = 1\n").unwrap();
    let output = wheelhouse(dir.path(), &["validate", "--index-url", "http://127.0.0.1:9/simple"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unexpected attrs for foo==1.0: bogus"), "{stderr}");
}

#[test]
fn test_invalid_python_setting_is_fatal() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_wheelhouse"))
        .current_dir(dir.path())
        .args(["validate", "--index-url", "http://127.0.0.1:9/simple"])
        .env("WHEELHOUSE_PYTHONS", "three")
        .output()
        .expect("failed to run wheelhouse");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid environment configuration"), "{stderr}");
}
