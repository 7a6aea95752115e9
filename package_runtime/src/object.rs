//! Handles to foreign-owned objects.

use crate::package::{Outcome, PackageCore};
use crate::RuntimeError;
use rmpv::Value;
use schema_index::Signature;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;
use wire::Request;

/// Proxy for an object living on the native side.
///
/// Open until [`close`](ObjectHandle::close) or drop; closing is idempotent
/// and never fails. Methods on a closed handle fail locally.
pub struct ObjectHandle {
    core: Arc<PackageCore>,
    type_name: String,
    id: u64,
    closed: AtomicBool,
}

impl ObjectHandle {
    pub(crate) fn new(core: Arc<PackageCore>, type_name: String, id: u64) -> Self {
        Self {
            core,
            type_name,
            id,
            closed: AtomicBool::new(false),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Native-side object id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn package(&self) -> &str {
        &self.core.package
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), RuntimeError> {
        if self.is_closed() {
            return Err(RuntimeError::ObjectClosed {
                type_name: self.type_name.clone(),
                id: self.id,
            });
        }
        Ok(())
    }

    /// Binds a declared method of this object's type.
    pub fn method(&self, name: &str) -> Result<BoundMethod<'_>, RuntimeError> {
        self.ensure_open()?;
        let signature = self
            .core
            .schema
            .require_method(&self.core.package, &self.type_name, name)?;
        Ok(BoundMethod {
            handle: self,
            name: name.to_string(),
            signature: signature.clone(),
        })
    }

    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Outcome, RuntimeError> {
        self.method(method)?.call(args)
    }

    /// Marks the handle closed, then asks the native side to release it.
    ///
    /// Release failures are logged and swallowed.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.core.round_trip(&Request::release(self.id)) {
            warn!(
                target: "runtime.object",
                type_name = %self.type_name,
                id = self.id,
                error = %err,
                "release failed"
            );
        }
    }

    pub fn describe(&self, method: &str) -> Option<String> {
        self.core
            .schema
            .describe_method(&self.core.package, &self.type_name, method)
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("type_name", &self.type_name)
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Passes the handle id, e.g. as an argument of type `*T`.
impl From<&ObjectHandle> for Value {
    fn from(handle: &ObjectHandle) -> Self {
        Value::from(handle.id)
    }
}

/// A method bound to a live object.
pub struct BoundMethod<'h> {
    handle: &'h ObjectHandle,
    name: String,
    signature: Signature,
}

impl BoundMethod<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Outcome, RuntimeError> {
        let handle = self.handle;
        handle.ensure_open()?;
        let core = &handle.core;
        core.call_signature(&self.signature, args, |wire_args| {
            Request::invoke(
                core.package.as_str(),
                handle.type_name.as_str(),
                handle.id,
                self.name.as_str(),
                wire_args,
            )
        })
    }

    pub fn call_value(&self, args: Vec<Value>) -> Result<Value, RuntimeError> {
        self.call(args)?.into_value()
    }
}
