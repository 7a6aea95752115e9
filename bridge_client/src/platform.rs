//! Host platform identification.
//!
//! Artifacts name their platform with short os/arch strings (`linux/amd64`,
//! `darwin/arm64`, `windows/amd64`). The host values can be overridden with
//! `DYNBRIDGE_OS` and `DYNBRIDGE_ARCH`.

use crate::BridgeError;
use std::env;
use std::fmt;

pub const OS_OVERRIDE_ENV: &str = "DYNBRIDGE_OS";
pub const ARCH_OVERRIDE_ENV: &str = "DYNBRIDGE_ARCH";

/// An (os, arch) pair in artifact naming.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Returns the platform of the running process, honoring overrides.
    pub fn host() -> Result<Self, BridgeError> {
        let os = env::var(OS_OVERRIDE_ENV).ok();
        let arch = env::var(ARCH_OVERRIDE_ENV).ok();
        Self::resolve(
            os.as_deref(),
            arch.as_deref(),
            env::consts::OS,
            env::consts::ARCH,
        )
    }

    fn resolve(
        os_override: Option<&str>,
        arch_override: Option<&str>,
        target_os: &str,
        target_arch: &str,
    ) -> Result<Self, BridgeError> {
        let os = match os_override.filter(|value| !value.is_empty()) {
            Some(value) => value.to_string(),
            None => match target_os {
                "linux" => "linux".to_string(),
                "macos" => "darwin".to_string(),
                "windows" => "windows".to_string(),
                other => return Err(BridgeError::UnsupportedPlatform(other.to_string())),
            },
        };
        let arch = match arch_override.filter(|value| !value.is_empty()) {
            Some(value) => value.to_string(),
            None => match target_arch {
                "x86_64" => "amd64".to_string(),
                "aarch64" => "arm64".to_string(),
                other => {
                    return Err(BridgeError::UnsupportedPlatform(format!(
                        "machine architecture {}",
                        other
                    )))
                }
            },
        };
        Ok(Self { os, arch })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}
