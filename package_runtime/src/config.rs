//! Runtime configuration.

use crate::RuntimeError;
use bridge_client::Platform;
use std::env;
use std::path::PathBuf;

/// Overrides the artifact root searched by [`crate::import_package`].
pub const ARTIFACT_DIR_ENV: &str = "DYNBRIDGE_ARTIFACT_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub artifact_dir: PathBuf,
    /// Host platform override; `None` detects it at load time.
    pub platform: Option<Platform>,
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::new()
    }

    /// Reads `DYNBRIDGE_ARTIFACT_DIR`, falling back to the per-user cache.
    pub fn from_env() -> Result<Self, RuntimeError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RuntimeError> {
        let artifact_dir = match lookup(ARTIFACT_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => default_artifact_dir(&lookup)?,
        };
        let config = Self {
            artifact_dir,
            platform: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// The configured platform, or the detected host platform.
    pub fn host(&self) -> Result<Platform, RuntimeError> {
        match &self.platform {
            Some(platform) => Ok(platform.clone()),
            None => Ok(Platform::host()?),
        }
    }

    fn validate(&self) -> Result<(), RuntimeError> {
        if self.artifact_dir.as_os_str().is_empty() {
            return Err(RuntimeError::Config(
                "artifact_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_artifact_dir(lookup: &impl Fn(&str) -> Option<String>) -> Result<PathBuf, RuntimeError> {
    if cfg!(windows) {
        if let Some(base) = lookup("LOCALAPPDATA") {
            return Ok(PathBuf::from(base).join("dynbridge").join("artifacts"));
        }
    }
    lookup("HOME")
        .or_else(|| lookup("USERPROFILE"))
        .map(|home| {
            PathBuf::from(home)
                .join(".cache")
                .join("dynbridge")
                .join("artifacts")
        })
        .ok_or_else(|| {
            RuntimeError::Config(format!(
                "cannot determine artifact directory; set {}",
                ARTIFACT_DIR_ENV
            ))
        })
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigBuilder {
    artifact_dir: Option<PathBuf>,
    platform: Option<Platform>,
}

impl RuntimeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Unset values come from the environment.
    pub fn build(self) -> Result<RuntimeConfig, RuntimeError> {
        let mut config = match self.artifact_dir {
            Some(artifact_dir) => RuntimeConfig {
                artifact_dir,
                platform: None,
            },
            None => RuntimeConfig::from_env()?,
        };
        config.platform = self.platform;
        config.validate()?;
        Ok(config)
    }
}
