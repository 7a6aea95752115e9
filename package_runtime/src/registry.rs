//! Process-wide table of loaded native runtimes.

use crate::RuntimeError;
use artifact::ArtifactManifest;
use bridge_client::{Bridge, Platform, SharedLibClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::info;

struct LoadedRuntime {
    version: String,
    bridge: Arc<dyn Bridge>,
}

/// One bridge per module, at exactly one version.
///
/// Lookup, version check, verification, and insertion happen under a single
/// lock, so racing loads of one module share a bridge and a racing load of
/// another version always sees the conflict.
#[derive(Default)]
pub struct RuntimeRegistry {
    runtimes: Mutex<HashMap<String, LoadedRuntime>>,
}

static GLOBAL: OnceLock<RuntimeRegistry> = OnceLock::new();

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static RuntimeRegistry {
        GLOBAL.get_or_init(RuntimeRegistry::new)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LoadedRuntime>> {
        self.runtimes.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Returns the bridge for `manifest.module`, loading it on first use.
    ///
    /// The platform and library hash are verified before the bridge is
    /// created; the library itself opens on the first call.
    pub fn get_or_load(
        &self,
        manifest: &ArtifactManifest,
        host: &Platform,
    ) -> Result<Arc<dyn Bridge>, RuntimeError> {
        self.get_or_insert_with(&manifest.module, &manifest.version, || {
            manifest.verify_library(host)?;
            info!(
                target: "runtime.registry",
                module = %manifest.module,
                version = %manifest.version,
                library = %manifest.library_path().display(),
                "registering native runtime"
            );
            Ok(Arc::new(SharedLibClient::new(manifest.library_path())) as Arc<dyn Bridge>)
        })
    }

    /// Registry entry point with a caller-supplied bridge factory.
    ///
    /// `make` runs only when the module is not loaded yet, while the lock is
    /// held.
    pub fn get_or_insert_with<F>(
        &self,
        module: &str,
        version: &str,
        make: F,
    ) -> Result<Arc<dyn Bridge>, RuntimeError>
    where
        F: FnOnce() -> Result<Arc<dyn Bridge>, RuntimeError>,
    {
        let mut runtimes = self.lock();
        if let Some(existing) = runtimes.get(module) {
            if existing.version != version {
                return Err(RuntimeError::VersionConflict {
                    module: module.to_string(),
                    loaded: existing.version.clone(),
                    requested: version.to_string(),
                });
            }
            return Ok(Arc::clone(&existing.bridge));
        }

        let bridge = make()?;
        runtimes.insert(
            module.to_string(),
            LoadedRuntime {
                version: version.to_string(),
                bridge: Arc::clone(&bridge),
            },
        );
        Ok(bridge)
    }

    pub fn loaded_version(&self, module: &str) -> Option<String> {
        self.lock().get(module).map(|rt| rt.version.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forgets every module. Meant for tests; live handles keep their bridges.
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Drops the registry's references to every loaded runtime.
    ///
    /// A library unloads once the last handle using it is gone.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        for (module, runtime) in &drained {
            info!(target: "runtime.registry", module = %module, version = %runtime.version, "releasing native runtime");
        }
        drained.len()
    }
}
