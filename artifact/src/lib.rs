//! Artifact manifests and on-disk resolution.
//!
//! An artifact is a directory holding a compiled bridge library and a JSON
//! manifest describing it. The loader validates the manifest and resolves the
//! library path; [`resolve_manifest`] searches an artifact root for the one
//! artifact that serves a package on the host platform.

use bridge_client::{BridgeError, Platform};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Manifest format version understood by this loader.
pub const MANIFEST_VERSION: u32 = 1;

/// Protocol version an artifact must be built for.
pub const ABI_VERSION: u32 = 0;

/// Reference to the compiled library inside an artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryRef {
    pub path: PathBuf,
    pub sha256: String,
}

/// Top-level artifact manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub manifest_version: u32,
    pub abi_version: u32,
    pub module: String,
    pub version: String,
    #[serde(alias = "goos")]
    pub os: String,
    #[serde(alias = "goarch")]
    pub arch: String,
    #[serde(default)]
    pub packages: Vec<String>,
    pub library: LibraryRef,
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
}

impl ArtifactManifest {
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.manifest_version != MANIFEST_VERSION {
            return Err(ArtifactError::UnsupportedManifestVersion(
                self.manifest_version,
            ));
        }
        if self.abi_version != ABI_VERSION {
            return Err(ArtifactError::UnsupportedAbiVersion(self.abi_version));
        }
        if self.module.trim().is_empty() {
            return Err(ArtifactError::InvalidManifest(
                "Module path cannot be empty".to_string(),
            ));
        }
        if self.version.trim().is_empty() {
            return Err(ArtifactError::InvalidManifest(format!(
                "Module {} has empty version",
                self.module
            )));
        }
        if self.library.path.as_os_str().is_empty() {
            return Err(ArtifactError::InvalidManifest(format!(
                "Module {} has empty library path",
                self.module
            )));
        }
        if !is_sha256_hex(&self.library.sha256) {
            return Err(ArtifactError::InvalidManifest(format!(
                "Library hash must be 64 lowercase hex characters, got {:?}",
                self.library.sha256
            )));
        }
        Ok(())
    }

    /// Platform the artifact was built for.
    pub fn platform(&self) -> Platform {
        Platform::new(&self.os, &self.arch)
    }

    /// Library path, resolved against the manifest directory on read.
    pub fn library_path(&self) -> &Path {
        &self.library.path
    }

    /// Returns true when the artifact lists `package` (the module root counts).
    pub fn serves_package(&self, package: &str) -> bool {
        self.module == package || self.packages.iter().any(|p| p == package)
    }

    /// Checks platform and library hash against the host.
    ///
    /// Must succeed before the library is opened for the first time.
    pub fn verify_library(&self, host: &Platform) -> Result<(), BridgeError> {
        bridge_client::verify_library(
            &self.library.path,
            &self.library.sha256,
            &self.platform(),
            host,
        )
    }
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Errors related to finding, loading, or validating artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("Failed to read manifest: {0}")]
    Io(String),

    #[error("Failed to parse manifest: {0}")]
    Parse(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Unsupported manifest_version: {0}")]
    UnsupportedManifestVersion(u32),

    #[error("Unsupported abi_version: {0}")]
    UnsupportedAbiVersion(u32),

    #[error("No matching artifact found for {wanted} on {platform} under {root}")]
    NotFound {
        wanted: String,
        platform: String,
        root: String,
    },

    #[error("Multiple artifacts found for {package} on {platform}: {versions:?}")]
    Ambiguous {
        package: String,
        platform: String,
        versions: Vec<String>,
    },
}

/// Reads a manifest from a file, or from `manifest.json` inside a directory.
///
/// A relative library path is resolved against the manifest's directory.
pub fn read_manifest(path_or_dir: impl AsRef<Path>) -> Result<ArtifactManifest, ArtifactError> {
    let mut manifest_path = path_or_dir.as_ref().to_path_buf();
    if manifest_path.is_dir() {
        manifest_path = manifest_path.join(MANIFEST_FILE_NAME);
    }
    if !manifest_path.exists() {
        return Err(ArtifactError::ManifestNotFound(
            manifest_path.display().to_string(),
        ));
    }

    let data =
        fs::read_to_string(&manifest_path).map_err(|err| ArtifactError::Io(err.to_string()))?;
    let mut manifest: ArtifactManifest =
        serde_json::from_str(&data).map_err(|err| ArtifactError::Parse(err.to_string()))?;
    manifest.validate()?;

    if manifest.library.path.is_relative() {
        let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        manifest.library.path = base.join(&manifest.library.path);
    }
    Ok(manifest)
}

/// Finds the single artifact under `root` serving `package` on `host`.
///
/// With a version, the first match in path order wins. Without one, exactly
/// one candidate must exist.
pub fn resolve_manifest(
    root: impl AsRef<Path>,
    package: &str,
    version: Option<&str>,
    host: &Platform,
) -> Result<ArtifactManifest, ArtifactError> {
    let root = root.as_ref();
    let mut manifest_paths = Vec::new();
    collect_manifests(root, &mut manifest_paths);
    manifest_paths.sort();

    let mut candidates = Vec::new();
    for path in manifest_paths {
        let manifest = match read_manifest(&path) {
            Ok(manifest) => manifest,
            Err(err) => {
                debug!(target: "artifact.resolve", path = %path.display(), error = %err, "skipping manifest");
                continue;
            }
        };
        if &manifest.platform() != host || !manifest.serves_package(package) {
            continue;
        }
        if version.is_some_and(|v| v != manifest.version) {
            continue;
        }
        candidates.push(manifest);
    }

    if candidates.is_empty() {
        let wanted = match version {
            Some(v) => format!("{}@{}", package, v),
            None => package.to_string(),
        };
        return Err(ArtifactError::NotFound {
            wanted,
            platform: host.to_string(),
            root: root.display().to_string(),
        });
    }

    if version.is_none() && candidates.len() != 1 {
        let mut versions: Vec<String> = candidates.iter().map(|m| m.version.clone()).collect();
        versions.sort();
        versions.dedup();
        return Err(ArtifactError::Ambiguous {
            package: package.to_string(),
            platform: host.to_string(),
            versions,
        });
    }

    Ok(candidates.remove(0))
}

fn collect_manifests(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_manifests(&path, out);
        } else if path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE_NAME) {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manifest_json(module: &str, version: &str, os: &str) -> String {
        format!(
            r#"{{
              "manifest_version": 1,
              "abi_version": 0,
              "module": "{module}",
              "version": "{version}",
              "goos": "{os}",
              "goarch": "amd64",
              "packages": ["{module}", "{module}/sub"],
              "library": {{ "path": "libbridge.so", "sha256": "{hash}" }}
            }}"#,
            module = module,
            version = version,
            os = os,
            hash = "ab".repeat(32),
        )
    }

    fn write_artifact(dir: &Path, module: &str, version: &str, os: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE_NAME), manifest_json(module, version, os)).unwrap();
    }

    #[test]
    fn test_read_manifest_resolves_library_path() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), "example.com/mod", "v1.0.0", "linux");

        let manifest = read_manifest(dir.path()).unwrap();
        assert_eq!(manifest.module, "example.com/mod");
        assert_eq!(manifest.os, "linux");
        assert_eq!(manifest.library_path(), dir.path().join("libbridge.so"));
        assert!(manifest.schema.is_none());
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_manifest(dir.path()),
            Err(ArtifactError::ManifestNotFound(_))
        ));
    }

    #[test]
    fn test_unsupported_versions_rejected() {
        let dir = tempdir().unwrap();
        let json = manifest_json("m", "v1", "linux").replace("\"abi_version\": 0", "\"abi_version\": 3");
        fs::write(dir.path().join(MANIFEST_FILE_NAME), json).unwrap();
        assert!(matches!(
            read_manifest(dir.path()),
            Err(ArtifactError::UnsupportedAbiVersion(3))
        ));

        let json = manifest_json("m", "v1", "linux")
            .replace("\"manifest_version\": 1", "\"manifest_version\": 2");
        fs::write(dir.path().join(MANIFEST_FILE_NAME), json).unwrap();
        assert!(matches!(
            read_manifest(dir.path()),
            Err(ArtifactError::UnsupportedManifestVersion(2))
        ));
    }

    #[test]
    fn test_uppercase_hash_rejected() {
        let dir = tempdir().unwrap();
        let json = manifest_json("m", "v1", "linux").replace(&"ab".repeat(32), &"AB".repeat(32));
        fs::write(dir.path().join(MANIFEST_FILE_NAME), json).unwrap();
        assert!(matches!(
            read_manifest(dir.path()),
            Err(ArtifactError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_resolve_filters_platform_and_package() {
        let root = tempdir().unwrap();
        write_artifact(&root.path().join("a"), "example.com/mod", "v1.0.0", "linux");
        write_artifact(&root.path().join("b"), "example.com/mod", "v1.0.0", "windows");
        write_artifact(&root.path().join("c"), "example.com/other", "v0.1.0", "linux");

        let host = Platform::new("linux", "amd64");
        let manifest = resolve_manifest(root.path(), "example.com/mod/sub", None, &host).unwrap();
        assert_eq!(manifest.module, "example.com/mod");
        assert_eq!(manifest.os, "linux");
    }

    #[test]
    fn test_resolve_ambiguous_without_version() {
        let root = tempdir().unwrap();
        write_artifact(&root.path().join("v1"), "example.com/mod", "v1.2.0", "linux");
        write_artifact(&root.path().join("v2"), "example.com/mod", "v1.3.0", "linux");
        let host = Platform::new("linux", "amd64");

        match resolve_manifest(root.path(), "example.com/mod", None, &host) {
            Err(ArtifactError::Ambiguous { versions, .. }) => {
                assert_eq!(versions, vec!["v1.2.0".to_string(), "v1.3.0".to_string()]);
            }
            other => panic!("expected ambiguity, got {:?}", other.map(|m| m.version)),
        }

        let manifest =
            resolve_manifest(root.path(), "example.com/mod", Some("v1.3.0"), &host).unwrap();
        assert_eq!(manifest.version, "v1.3.0");
    }

    #[test]
    fn test_resolve_not_found() {
        let root = tempdir().unwrap();
        let host = Platform::new("linux", "amd64");
        let err = resolve_manifest(root.path(), "example.com/mod", Some("v9"), &host).unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound { .. }));
        assert!(err.to_string().contains("example.com/mod@v9"));
    }
}
