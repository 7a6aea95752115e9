//! Integration tests for the dynbridge command surface

use bridge_client::{BridgeError, Platform};
use dynbridge::{parse_args, run, CliError, Command};
use package_runtime::RuntimeError;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const LIBRARY_BYTES: &[u8] = b"not a shared library";

fn write_artifact(dir: &Path, module: &str, sha256: Option<String>) {
    let host = Platform::host().expect("Host platform should be supported");
    fs::write(dir.join("libmathx.so"), LIBRARY_BYTES).expect("Failed to write library");
    let mut structs = serde_json::Map::new();
    structs.insert(
        module.to_string(),
        json!({
            "Point": [
                {"name": "X", "type": "int64", "key": "x"},
                {"name": "Label", "type": "*string", "key": "label"}
            ],
            "Counter": []
        }),
    );
    let manifest = json!({
        "manifest_version": 1,
        "abi_version": 0,
        "module": module,
        "version": "v1.0.0",
        "os": host.os,
        "arch": host.arch,
        "packages": [module],
        "library": {
            "path": "libmathx.so",
            "sha256": sha256.unwrap_or_else(|| hex::encode(Sha256::digest(LIBRARY_BYTES)))
        },
        "schema": {
            "structs": structs,
            "symbols": [
                {"pkg": module, "name": "Add", "params": ["int64", "int64"], "results": ["int64"]}
            ],
            "methods": [
                {"pkg": module, "recv": "Counter", "name": "Inc", "params": [], "results": ["int64", "error"]}
            ],
            "generics": [
                {"pkg": module, "name": "Max", "type_args": ["int64"], "symbol": "Max__int64"}
            ],
            "vars": [
                {"pkg": module, "name": "Default", "type": "*Counter"}
            ]
        }
    });
    fs::write(dir.join("manifest.json"), manifest.to_string()).expect("Failed to write manifest");
}

fn run_line(words: &[&str]) -> Result<String, CliError> {
    let args: Vec<String> = words.iter().map(|w| w.to_string()).collect();
    let invocation = parse_args(&args)?;
    let mut out = Vec::new();
    run(&invocation.command, &mut out)?;
    Ok(String::from_utf8(out).expect("Output should be UTF-8"))
}

#[test]
fn test_inspect_lists_declared_surface() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write_artifact(dir.path(), "example.com/cli/inspect", None);
    let path = dir.path().to_string_lossy().to_string();

    let report = run_line(&["inspect", &path]).expect("Inspect should succeed");
    assert!(report.contains("module   example.com/cli/inspect@v1.0.0"));
    assert!(report.contains("package example.com/cli/inspect"));
    assert!(report.contains("  type Counter (opaque)"));
    assert!(report.contains("    X int64 `x`"));
    assert!(report.contains("    Label *string `label` (optional)"));
    assert!(report.contains("  func Add(int64, int64) int64"));
    assert!(report.contains("  func (Counter) Inc() (int64, error)"));
    assert!(report.contains("  generic Max[int64] -> Max__int64"));
    assert!(report.contains("  var Default Counter"));
}

#[test]
fn test_verify_reports_hash() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write_artifact(dir.path(), "example.com/cli/verify", None);
    let path = dir.path().to_string_lossy().to_string();

    let report = run_line(&["verify", &path]).expect("Verify should succeed");
    assert!(report.starts_with("ok example.com/cli/verify@v1.0.0"));
    assert!(report.trim_end().ends_with(&hex::encode(Sha256::digest(LIBRARY_BYTES))));
}

#[test]
fn test_verify_rejects_tampered_library() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write_artifact(dir.path(), "example.com/cli/tampered", Some("ab".repeat(32)));
    let path = dir.path().to_string_lossy().to_string();

    let err = run_line(&["verify", &path]).unwrap_err();
    assert!(matches!(err, CliError::Bridge(BridgeError::HashMismatch { .. })));
}

#[test]
fn test_call_surfaces_load_failure() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write_artifact(dir.path(), "example.com/cli/call", None);
    let path = dir.path().to_string_lossy().to_string();

    let err = run_line(&["call", &path, "Add", "1", "2"]).unwrap_err();
    assert!(
        matches!(err, CliError::Runtime(RuntimeError::Load(BridgeError::Open { .. }))),
        "unexpected error: {:?}",
        err
    );
}

#[test]
fn test_call_validates_before_loading() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write_artifact(dir.path(), "example.com/cli/validate", None);
    let path = dir.path().to_string_lossy().to_string();

    let err = run_line(&["call", &path, "Add", "\"one\"", "2"]).unwrap_err();
    assert!(matches!(err, CliError::Runtime(RuntimeError::Validation(_))));
}

#[test]
fn test_missing_manifest() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("nowhere").to_string_lossy().to_string();
    assert!(matches!(
        run_line(&["inspect", &path]),
        Err(CliError::Artifact(_))
    ));
}

#[test]
fn test_help_command() {
    let args = vec!["--help".to_string()];
    assert_eq!(parse_args(&args).unwrap().command, Command::Help);
}
