//! Shared-library backed [`Bridge`].

use crate::{Bridge, BridgeError};
use libloading::{Library, Symbol};
use std::ffi::{c_int, c_void};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Request entry point: `int dynbridge_call(req, req_len, &resp, &resp_len)`.
pub const CALL_SYMBOL: &str = "dynbridge_call";

/// Release entry point: `void dynbridge_free(resp)`.
pub const FREE_SYMBOL: &str = "dynbridge_free";

type CallFn = unsafe extern "C" fn(*const u8, usize, *mut *mut u8, *mut usize) -> c_int;
type FreeFn = unsafe extern "C" fn(*mut c_void);

struct LoadedLibrary {
    call: CallFn,
    free: FreeFn,
    // Keeps the function pointers above valid.
    _library: Library,
}

enum LoadState {
    Unloaded,
    Loaded(Arc<LoadedLibrary>),
    Failed(BridgeError),
}

/// Response buffer owned by the native side.
///
/// Dropping the guard hands the buffer back through the release entry point,
/// so the buffer never outlives one call turnaround.
struct NativeBuffer {
    ptr: *mut u8,
    len: usize,
    free: FreeFn,
}

impl NativeBuffer {
    fn to_vec(&self) -> Vec<u8> {
        if self.ptr.is_null() || self.len == 0 {
            return Vec::new();
        }
        // SAFETY: the native side guarantees `ptr` addresses `len` readable
        // bytes until it is released, which happens in `drop`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }.to_vec()
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: `ptr` was returned by the call entry point of the same
            // library and has not been released yet.
            unsafe { (self.free)(self.ptr.cast::<c_void>()) };
        }
    }
}

/// Client for one native bridge library.
pub struct SharedLibClient {
    path: PathBuf,
    state: Mutex<LoadState>,
}

impl SharedLibClient {
    /// Creates a client; the library is not opened until the first call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(LoadState::Unloaded),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once the library has been opened successfully.
    pub fn is_loaded(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        matches!(*state, LoadState::Loaded(_))
    }

    fn library(&self) -> Result<Arc<LoadedLibrary>, BridgeError> {
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        match &*state {
            LoadState::Loaded(library) => return Ok(Arc::clone(library)),
            LoadState::Failed(err) => return Err(err.clone()),
            LoadState::Unloaded => {}
        }

        match open_library(&self.path) {
            Ok(library) => {
                let library = Arc::new(library);
                *state = LoadState::Loaded(Arc::clone(&library));
                Ok(library)
            }
            Err(err) => {
                *state = LoadState::Failed(err.clone());
                Err(err)
            }
        }
    }
}

impl Bridge for SharedLibClient {
    fn call(&self, request: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let library = self.library()?;

        let mut resp_ptr: *mut u8 = ptr::null_mut();
        let mut resp_len: usize = 0;
        // SAFETY: `request` is valid for reads of `request.len()` bytes for the
        // duration of the call; the out-pointers point at live locals.
        let status = unsafe {
            (library.call)(request.as_ptr(), request.len(), &mut resp_ptr, &mut resp_len)
        };
        let buffer = NativeBuffer {
            ptr: resp_ptr,
            len: resp_len,
            free: library.free,
        };

        if status != 0 {
            return Err(BridgeError::CallFailed(status));
        }

        let bytes = buffer.to_vec();
        drop(buffer);
        debug!(
            target: "bridge.call",
            request_bytes = request.len(),
            response_bytes = bytes.len(),
        );
        Ok(bytes)
    }
}

fn open_library(path: &Path) -> Result<LoadedLibrary, BridgeError> {
    if !path.exists() {
        return Err(BridgeError::LibraryNotFound(path.to_path_buf()));
    }

    // SAFETY: opening a library runs its initializers; the artifact hash has
    // been verified by the caller before the first call reaches this point.
    let library = unsafe { Library::new(path) }.map_err(|err| BridgeError::Open {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    // SAFETY: the symbol types match the native library contract.
    let call: CallFn = unsafe {
        let symbol: Symbol<CallFn> = library
            .get(CALL_SYMBOL.as_bytes())
            .map_err(|_| BridgeError::MissingEntryPoint(CALL_SYMBOL.to_string()))?;
        *symbol
    };
    let free: FreeFn = unsafe {
        let symbol: Symbol<FreeFn> = library
            .get(FREE_SYMBOL.as_bytes())
            .map_err(|_| BridgeError::MissingEntryPoint(FREE_SYMBOL.to_string()))?;
        *symbol
    };

    info!(target: "bridge.load", path = %path.display(), "opened native bridge library");
    Ok(LoadedLibrary {
        call,
        free,
        _library: library,
    })
}
