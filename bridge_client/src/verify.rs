//! Pre-load checks for a native library.

use crate::{BridgeError, Platform};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Computes the lowercase hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String, BridgeError> {
    let mut file = File::open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            BridgeError::LibraryNotFound(path.to_path_buf())
        } else {
            BridgeError::Io(format!("{}: {}", path.display(), err))
        }
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|err| BridgeError::Io(format!("{}: {}", path.display(), err)))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verifies platform and content hash before a library is ever opened.
///
/// The platform is checked first so that a foreign artifact is rejected
/// without reading it.
pub fn verify_library(
    path: &Path,
    expected_sha256: &str,
    expected_platform: &Platform,
    host: &Platform,
) -> Result<(), BridgeError> {
    if expected_platform != host {
        return Err(BridgeError::PlatformMismatch {
            expected: expected_platform.to_string(),
            actual: host.to_string(),
        });
    }

    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected_sha256) {
        return Err(BridgeError::HashMismatch {
            path: path.to_path_buf(),
            expected: expected_sha256.to_string(),
            actual,
        });
    }
    Ok(())
}
