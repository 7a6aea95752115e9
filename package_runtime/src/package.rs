//! Package handles and call-by-name dispatch.

use crate::object::ObjectHandle;
use crate::registry::RuntimeRegistry;
use crate::RuntimeError;
use artifact::ArtifactManifest;
use bridge_client::{Bridge, Platform};
use rmpv::Value;
use schema_index::{ResolvedType, ResultShape, Schema, Signature};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;
use value_converter::{pack_variadic, Converter};
use wire::{decode_response, Request};

/// State shared by a package handle and every object it produced.
pub(crate) struct PackageCore {
    pub(crate) module: String,
    pub(crate) version: String,
    pub(crate) package: String,
    pub(crate) bridge: Arc<dyn Bridge>,
    pub(crate) schema: Arc<Schema>,
}

impl PackageCore {
    pub(crate) fn converter(&self) -> Converter<'_> {
        Converter::new(&self.schema, &self.package)
    }

    /// One request/response turnaround. No lock is held here.
    pub(crate) fn round_trip(&self, request: &Request) -> Result<Value, RuntimeError> {
        let bytes = request.encode()?;
        debug!(
            target: "runtime.call",
            op = %request.operation(),
            pkg = %self.package,
            bytes = bytes.len(),
        );
        let reply = self.bridge.call(&bytes)?;
        let response = decode_response(&reply)?;
        response.result.map_err(RuntimeError::from)
    }

    /// Validates and decodes a successful result, wrapping opaque handles.
    pub(crate) fn finish(
        self: &Arc<Self>,
        signature: &Signature,
        result: Value,
    ) -> Result<Outcome, RuntimeError> {
        let conv = self.converter();
        conv.validate_result(signature, &result)
            .map_err(|err| RuntimeError::Decode(err.to_string()))?;

        let decoded = conv.decode_result(signature, &result)?;
        Ok(match (signature.result_shape(), decoded) {
            (ResultShape::Single(ty), value) => self.wrap(&ty, value),
            (ResultShape::Tuple(types), Value::Array(items)) => Outcome::Tuple(
                types
                    .iter()
                    .zip(items)
                    .map(|(ty, item)| self.wrap(ty, item))
                    .collect(),
            ),
            (_, value) => Outcome::Value(value),
        })
    }

    /// An id declared as a pointer to an opaque struct becomes a handle.
    fn wrap(self: &Arc<Self>, ty: &str, value: Value) -> Outcome {
        match (self.schema.resolve(&self.package, ty), value.as_u64()) {
            (Ok(ResolvedType::OpaqueHandle(type_name)), Some(id)) => {
                Outcome::Object(ObjectHandle::new(Arc::clone(self), type_name, id))
            }
            _ => Outcome::Value(value),
        }
    }

    pub(crate) fn call_signature(
        self: &Arc<Self>,
        signature: &Signature,
        args: Vec<Value>,
        request: impl FnOnce(Vec<Value>) -> Request,
    ) -> Result<Outcome, RuntimeError> {
        let conv = self.converter();
        let args = pack_variadic(&signature.params, args);
        conv.validate_args(signature, &args)?;
        let wire_args = conv.encode_args(signature, &args)?;
        let result = self.round_trip(&request(wire_args))?;
        self.finish(signature, result)
    }
}

/// Result of a remote call.
#[derive(Debug)]
pub enum Outcome {
    Value(Value),
    /// The declared result was a pointer to an opaque struct
    Object(ObjectHandle),
    /// One outcome per declared result of a multi-value call
    Tuple(Vec<Outcome>),
}

impl Outcome {
    /// Plain value form; a tuple becomes a sequence.
    ///
    /// Fails if any part is an object handle.
    pub fn into_value(self) -> Result<Value, RuntimeError> {
        match self {
            Outcome::Value(value) => Ok(value),
            Outcome::Object(handle) => Err(RuntimeError::Decode(format!(
                "expected a value, got object {}",
                handle.type_name()
            ))),
            Outcome::Tuple(items) => items
                .into_iter()
                .map(Outcome::into_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        }
    }

    pub fn into_object(self) -> Result<ObjectHandle, RuntimeError> {
        match self {
            Outcome::Object(handle) => Ok(handle),
            Outcome::Value(value) => Err(RuntimeError::Decode(format!(
                "expected an object handle, got {}",
                value
            ))),
            Outcome::Tuple(items) => Err(RuntimeError::Decode(format!(
                "expected an object handle, got {} results",
                items.len()
            ))),
        }
    }

    pub fn into_tuple(self) -> Result<Vec<Outcome>, RuntimeError> {
        match self {
            Outcome::Tuple(items) => Ok(items),
            _ => Err(RuntimeError::Decode(
                "expected a multi-value result".to_string(),
            )),
        }
    }
}

/// A remote function, bound to its declared signature when there is one.
///
/// Without a signature, arguments go out as given and the result comes back
/// undecoded.
pub struct RemoteFunction {
    core: Arc<PackageCore>,
    name: String,
    symbol: String,
    signature: Option<Signature>,
}

impl RemoteFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exported symbol the call is sent to; differs from `name` for generics.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Outcome, RuntimeError> {
        let core = &self.core;
        let request =
            |wire_args: Vec<Value>| Request::call(core.package.as_str(), self.symbol.as_str(), wire_args);
        match &self.signature {
            Some(signature) => core.call_signature(signature, args, request),
            None => {
                debug!(
                    target: "runtime.call",
                    pkg = %core.package,
                    symbol = %self.symbol,
                    "no declared signature, forwarding arguments unchecked"
                );
                Ok(Outcome::Value(core.round_trip(&request(args))?))
            }
        }
    }

    /// Calls and unwraps a plain value result.
    pub fn call_value(&self, args: Vec<Value>) -> Result<Value, RuntimeError> {
        self.call(args)?.into_value()
    }

    pub fn describe(&self) -> String {
        let Some(signature) = &self.signature else {
            return format!("func {} (undeclared)", self.symbol);
        };
        let header = signature.render(None, &self.symbol);
        match &signature.doc {
            Some(doc) => format!("{}\n\n{}", header, doc),
            None => header,
        }
    }
}

impl fmt::Debug for RemoteFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFunction")
            .field("package", &self.core.package)
            .field("symbol", &self.symbol)
            .field("declared", &self.signature.is_some())
            .finish()
    }
}

/// What a name resolves to on a package.
#[derive(Debug)]
pub enum Member {
    Variable(Arc<ObjectHandle>),
    Function(RemoteFunction),
}

/// Call-by-name surface for one package of a loaded module.
pub struct PackageHandle {
    core: Arc<PackageCore>,
    vars: Mutex<HashMap<String, Arc<ObjectHandle>>>,
}

impl PackageHandle {
    /// Loads `manifest` through `registry` on the detected host platform.
    pub fn from_manifest(
        manifest: &ArtifactManifest,
        package: &str,
        registry: &RuntimeRegistry,
    ) -> Result<Self, RuntimeError> {
        let host = Platform::host()?;
        Self::load(manifest, package, registry, &host)
    }

    pub fn load(
        manifest: &ArtifactManifest,
        package: &str,
        registry: &RuntimeRegistry,
        host: &Platform,
    ) -> Result<Self, RuntimeError> {
        if !manifest.serves_package(package) {
            return Err(RuntimeError::Lookup(format!(
                "module {} does not provide package {}",
                manifest.module, package
            )));
        }
        let bridge = registry.get_or_load(manifest, host)?;
        let schema = Schema::from_manifest(manifest.schema.as_ref());
        Ok(Self::with_bridge(
            &manifest.module,
            &manifest.version,
            package,
            bridge,
            Arc::new(schema),
        ))
    }

    /// Handle over an arbitrary bridge, bypassing the registry.
    pub fn with_bridge(
        module: &str,
        version: &str,
        package: &str,
        bridge: Arc<dyn Bridge>,
        schema: Arc<Schema>,
    ) -> Self {
        Self {
            core: Arc::new(PackageCore {
                module: module.to_string(),
                version: version.to_string(),
                package: package.to_string(),
                bridge,
                schema,
            }),
            vars: Mutex::new(HashMap::new()),
        }
    }

    pub fn module(&self) -> &str {
        &self.core.module
    }

    pub fn version(&self) -> &str {
        &self.core.version
    }

    pub fn package(&self) -> &str {
        &self.core.package
    }

    pub fn schema(&self) -> &Schema {
        &self.core.schema
    }

    /// Resolves `name` to a package variable or a function.
    pub fn member(&self, name: &str) -> Result<Member, RuntimeError> {
        if self.core.schema.var(&self.core.package, name).is_some() {
            return Ok(Member::Variable(self.var(name)?));
        }
        Ok(Member::Function(self.function(name)))
    }

    /// Binds `name` as a remote function. Names the schema does not declare
    /// are still callable; the native side decides whether they exist.
    pub fn function(&self, name: &str) -> RemoteFunction {
        RemoteFunction {
            core: Arc::clone(&self.core),
            name: name.to_string(),
            symbol: name.to_string(),
            signature: self.core.schema.symbol(&self.core.package, name).cloned(),
        }
    }

    /// Calls a function by name.
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Outcome, RuntimeError> {
        self.function(name).call(args)
    }

    /// Selects the concrete symbol for a generic instantiation.
    pub fn generic<S: AsRef<str>>(
        &self,
        name: &str,
        type_args: &[S],
    ) -> Result<RemoteFunction, RuntimeError> {
        let pkg = &self.core.package;
        let symbol = self.core.schema.generic_symbol(pkg, name, type_args)?;
        Ok(RemoteFunction {
            core: Arc::clone(&self.core),
            name: name.to_string(),
            symbol: symbol.to_string(),
            signature: self.core.schema.symbol(pkg, symbol).cloned(),
        })
    }

    /// Returns the handle for a package variable, fetching it once.
    pub fn var(&self, name: &str) -> Result<Arc<ObjectHandle>, RuntimeError> {
        if let Some(handle) = self.cached_var(name) {
            return Ok(handle);
        }
        let var = self
            .core
            .schema
            .var(&self.core.package, name)
            .ok_or_else(|| {
                RuntimeError::Lookup(format!("unknown variable {}.{}", self.core.package, name))
            })?;

        let result = self
            .core
            .round_trip(&Request::call(self.core.package.as_str(), name, Vec::new()))?;
        let id = result.as_u64().ok_or_else(|| {
            RuntimeError::Decode(format!("variable {} did not return a handle id", name))
        })?;
        let fetched = Arc::new(ObjectHandle::new(
            Arc::clone(&self.core),
            var.type_name.clone(),
            id,
        ));

        let mut vars = self.vars.lock().unwrap_or_else(|err| err.into_inner());
        let handle = match vars.get(name) {
            Some(existing) => Arc::clone(existing),
            None => {
                vars.insert(name.to_string(), Arc::clone(&fetched));
                Arc::clone(&fetched)
            }
        };
        drop(vars);
        // A concurrent fetch may have won; `fetched` is then released here,
        // outside the cache lock.
        drop(fetched);
        Ok(handle)
    }

    fn cached_var(&self, name: &str) -> Option<Arc<ObjectHandle>> {
        let vars = self.vars.lock().unwrap_or_else(|err| err.into_inner());
        vars.get(name).cloned()
    }

    /// Creates a foreign object; `init` is validated against the type.
    pub fn construct(&self, type_name: &str, init: Option<Value>) -> Result<ObjectHandle, RuntimeError> {
        let conv = self.core.converter();
        let init = match init {
            Some(value) => {
                conv.validate(type_name, &value)?;
                Some(conv.encode(type_name, &value)?)
            }
            None => {
                if self.core.schema.struct_schema(&self.core.package, type_name).is_none() {
                    return Err(RuntimeError::Lookup(format!(
                        "unknown type {}.{}",
                        self.core.package, type_name
                    )));
                }
                None
            }
        };
        let result = self.core.round_trip(&Request::construct(
            self.core.package.as_str(),
            type_name,
            init,
        ))?;
        let id = result.as_u64().ok_or_else(|| {
            RuntimeError::Decode(format!("construct {} did not return a handle id", type_name))
        })?;
        Ok(ObjectHandle::new(Arc::clone(&self.core), type_name.to_string(), id))
    }

    /// Constructs an object, runs `f`, and closes the object on every path.
    pub fn with_object<T>(
        &self,
        type_name: &str,
        init: Option<Value>,
        f: impl FnOnce(&ObjectHandle) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let object = self.construct(type_name, init)?;
        let result = f(&object);
        object.close();
        result
    }

    /// Signature and documentation of a function, variable, or generic.
    pub fn describe(&self, name: &str) -> Option<String> {
        let pkg = &self.core.package;
        let schema = &self.core.schema;
        schema
            .describe_symbol(pkg, name)
            .or_else(|| schema.describe_var(pkg, name))
            .or_else(|| schema.describe_generic(pkg, name))
    }
}

impl fmt::Debug for PackageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageHandle")
            .field("module", &self.core.module)
            .field("version", &self.core.version)
            .field("package", &self.core.package)
            .finish()
    }
}
