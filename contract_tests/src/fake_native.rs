//! In-process stand-in for a native bridge library.
//!
//! Speaks the serving side of the wire protocol against registered Rust
//! closures and keeps an id-keyed object store, the way a generated bridge
//! does.

use bridge_client::{Bridge, BridgeError};
use rmpv::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use wire::{ErrorKind, ErrorPayload, Operation, Request, RequestHandler};

type FunctionFn = Box<dyn Fn(&ObjectStore, &[Value]) -> Result<Value, ErrorPayload> + Send + Sync>;
type ConstructorFn = Box<dyn Fn(Option<&Value>) -> Result<Value, ErrorPayload> + Send + Sync>;
type MethodFn = Box<dyn Fn(&mut Value, &[Value]) -> Result<Value, ErrorPayload> + Send + Sync>;

/// Live objects keyed by id. Ids start at 1 and are never reused.
#[derive(Default)]
pub struct ObjectStore {
    inner: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    next_id: u64,
    live: HashMap<u64, (String, Value)>,
}

impl ObjectStore {
    fn state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Registers an object and returns its id.
    pub fn insert(&self, type_name: &str, state: Value) -> u64 {
        let mut store = self.state();
        store.next_id += 1;
        let id = store.next_id;
        store.live.insert(id, (type_name.to_string(), state));
        id
    }

    pub fn remove(&self, id: u64) -> bool {
        self.state().live.remove(&id).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.state().live.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.state().live.len()
    }

    pub fn state_of(&self, id: u64) -> Option<Value> {
        self.state().live.get(&id).map(|(_, state)| state.clone())
    }

    fn with_object<T>(
        &self,
        id: u64,
        type_name: &str,
        f: impl FnOnce(&mut Value) -> Result<T, ErrorPayload>,
    ) -> Result<T, ErrorPayload> {
        let mut store = self.state();
        match store.live.get_mut(&id) {
            Some((actual, state)) if actual == type_name => f(state),
            Some((actual, _)) => Err(ErrorPayload::new(
                ErrorKind::UnsupportedType,
                format!("object {} is a {}, not a {}", id, actual, type_name),
            )),
            None => Err(ErrorPayload::new(
                ErrorKind::RemoteError,
                format!("unknown object id {}", id),
            )),
        }
    }
}

/// Fake native library.
#[derive(Default)]
pub struct FakeNative {
    functions: HashMap<(String, String), FunctionFn>,
    constructors: HashMap<(String, String), ConstructorFn>,
    methods: HashMap<(String, String, String), MethodFn>,
    objects: ObjectStore,
    calls: AtomicUsize,
    ops: Mutex<Vec<Operation>>,
}

impl FakeNative {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a package-level function.
    pub fn function(
        mut self,
        pkg: &str,
        name: &str,
        f: impl Fn(&ObjectStore, &[Value]) -> Result<Value, ErrorPayload> + Send + Sync + 'static,
    ) -> Self {
        self.functions
            .insert((pkg.to_string(), name.to_string()), Box::new(f));
        self
    }

    /// Registers a constructible type whose state starts from `init`.
    pub fn constructor(
        mut self,
        pkg: &str,
        type_name: &str,
        f: impl Fn(Option<&Value>) -> Result<Value, ErrorPayload> + Send + Sync + 'static,
    ) -> Self {
        self.constructors
            .insert((pkg.to_string(), type_name.to_string()), Box::new(f));
        self
    }

    pub fn method(
        mut self,
        pkg: &str,
        type_name: &str,
        name: &str,
        f: impl Fn(&mut Value, &[Value]) -> Result<Value, ErrorPayload> + Send + Sync + 'static,
    ) -> Self {
        self.methods.insert(
            (pkg.to_string(), type_name.to_string(), name.to_string()),
            Box::new(f),
        );
        self
    }

    /// Registers a package variable; every fetch hands out a fresh id.
    pub fn variable(self, pkg: &str, name: &str, type_name: &str, state: Value) -> Self {
        let type_name = type_name.to_string();
        self.function(pkg, name, move |store, _| {
            Ok(Value::from(store.insert(&type_name, state.clone())))
        })
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// Number of requests served, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Operations served, in arrival order.
    pub fn operations(&self) -> Vec<Operation> {
        self.ops.lock().unwrap_or_else(|err| err.into_inner()).clone()
    }

    pub fn count_of(&self, op: Operation) -> usize {
        self.operations().into_iter().filter(|o| *o == op).count()
    }
}

fn symbol_not_found(what: String) -> ErrorPayload {
    ErrorPayload::new(ErrorKind::SymbolNotFound, what)
}

impl RequestHandler for FakeNative {
    fn handle(&self, request: Request) -> Result<Value, ErrorPayload> {
        self.ops
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(request.operation());

        match request {
            Request::Call {
                package,
                function,
                args,
            } => {
                let f = self
                    .functions
                    .get(&(package.clone(), function.clone()))
                    .ok_or_else(|| symbol_not_found(format!("{}.{}", package, function)))?;
                f(&self.objects, &args)
            }
            Request::Construct {
                package,
                type_name,
                init,
            } => {
                let f = self
                    .constructors
                    .get(&(package.clone(), type_name.clone()))
                    .ok_or_else(|| symbol_not_found(format!("{}.{}", package, type_name)))?;
                let state = f(init.as_ref())?;
                Ok(Value::from(self.objects.insert(&type_name, state)))
            }
            Request::Invoke {
                package,
                type_name,
                id,
                method,
                args,
            } => {
                let f = self
                    .methods
                    .get(&(package.clone(), type_name.clone(), method.clone()))
                    .ok_or_else(|| {
                        symbol_not_found(format!("{}.{}.{}", package, type_name, method))
                    })?;
                self.objects.with_object(id, &type_name, |state| f(state, &args))
            }
            Request::Release { id } => {
                if self.objects.remove(id) {
                    Ok(Value::Nil)
                } else {
                    Err(ErrorPayload::new(
                        ErrorKind::RemoteError,
                        format!("unknown object id {}", id),
                    ))
                }
            }
        }
    }
}

impl Bridge for FakeNative {
    fn call(&self, request: &[u8]) -> Result<Vec<u8>, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        wire::serve(self, request).map_err(|err| BridgeError::Io(err.to_string()))
    }
}

/// Replies with fixed bytes to every request.
pub struct CannedBridge {
    reply: Vec<u8>,
    calls: AtomicUsize,
}

impl CannedBridge {
    pub fn new(reply: Vec<u8>) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Bridge for CannedBridge {
    fn call(&self, _request: &[u8]) -> Result<Vec<u8>, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}
