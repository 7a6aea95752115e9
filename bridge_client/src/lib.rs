//! # Bridge Client
//!
//! Loads a native bridge library and exposes its single request/response
//! entry point as a blocking `call(bytes) -> bytes`.
//!
//! ## Philosophy
//!
//! - **Load once, lazily**: the library is opened on the first call, never at
//!   construction time
//! - **Fail closed**: a load failure is cached and returned to every later
//!   caller; this layer never retries
//! - **Own the boundary**: native response buffers are released before `call`
//!   returns, on every exit path
//!
//! The [`Bridge`] trait is the seam where tests substitute an in-process fake.

pub mod platform;
pub mod shared_lib;
pub mod verify;

pub use platform::Platform;
pub use shared_lib::{SharedLibClient, CALL_SYMBOL, FREE_SYMBOL};
pub use verify::{sha256_file, verify_library};

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or calling a native bridge library.
///
/// Every variant is fatal for the call that produced it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("shared library not found: {0}")]
    LibraryNotFound(PathBuf),

    #[error("failed to open shared library {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("shared library is missing entry point {0}")]
    MissingEntryPoint(String),

    #[error("native call failed with status {0}")]
    CallFailed(i32),

    #[error("platform mismatch: artifact built for {expected}, host is {actual}")]
    PlatformMismatch { expected: String, actual: String },

    #[error("library hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("unsupported host platform: {0}")]
    UnsupportedPlatform(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// A blocking request/response channel to native code.
///
/// Implementations must be callable from several threads at once; no lock is
/// held around the native call itself.
pub trait Bridge: Send + Sync {
    fn call(&self, request: &[u8]) -> Result<Vec<u8>, BridgeError>;
}
