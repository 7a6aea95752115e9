//! # Package Runtime
//!
//! Call-by-name access to a native module described by an artifact manifest.
//!
//! ## Philosophy
//!
//! - **One interception point per handle**: [`PackageHandle::member`] and
//!   [`ObjectHandle::method`] are the only places names become calls
//! - **Local before remote**: lookups, validation, and closed-handle checks
//!   fail without touching the wire
//! - **One version per module**: the [`RuntimeRegistry`] refuses a second
//!   version of a loaded module for the life of the process
//!
//! ## Example
//!
//! ```ignore
//! let pkg = package_runtime::load_artifact("artifacts/mathx")?;
//! let sum = pkg.call("Add", vec![2.into(), 3.into()])?.into_value()?;
//! ```

pub mod config;
pub mod error;
pub mod object;
pub mod package;
pub mod registry;

pub use config::{RuntimeConfig, RuntimeConfigBuilder, ARTIFACT_DIR_ENV};
pub use error::RuntimeError;
pub use object::{BoundMethod, ObjectHandle};
pub use package::{Member, Outcome, PackageHandle, RemoteFunction};
pub use registry::RuntimeRegistry;
pub use rmpv::Value;

use std::path::Path;

/// Loads the artifact at `path` (a manifest file or its directory) and
/// returns a handle for the module's root package.
pub fn load_artifact(path: impl AsRef<Path>) -> Result<PackageHandle, RuntimeError> {
    let manifest = artifact::read_manifest(path)?;
    PackageHandle::from_manifest(&manifest, &manifest.module, RuntimeRegistry::global())
}

/// Finds the artifact serving `package` under the configured root and loads it.
pub fn import_package(
    package: &str,
    version: Option<&str>,
    config: &RuntimeConfig,
) -> Result<PackageHandle, RuntimeError> {
    let host = config.host()?;
    let manifest = artifact::resolve_manifest(&config.artifact_dir, package, version, &host)?;
    PackageHandle::load(&manifest, package, RuntimeRegistry::global(), &host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_client::{Bridge, BridgeError, Platform};
    use schema_index::Schema;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use wire::{ErrorKind, ErrorPayload, Request, RequestHandler};

    type Reply = dyn Fn(&Request) -> Result<Value, ErrorPayload> + Send + Sync;

    struct Scripted {
        log: Mutex<Vec<Request>>,
        reply: Box<Reply>,
    }

    impl Scripted {
        fn new(
            reply: impl Fn(&Request) -> Result<Value, ErrorPayload> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                log: Mutex::new(Vec::new()),
                reply: Box::new(reply),
            })
        }

        fn requests(&self) -> Vec<Request> {
            self.log.lock().unwrap().clone()
        }
    }

    impl RequestHandler for Scripted {
        fn handle(&self, request: Request) -> Result<Value, ErrorPayload> {
            let reply = (self.reply)(&request);
            self.log.lock().unwrap().push(request);
            reply
        }
    }

    impl Bridge for Scripted {
        fn call(&self, request: &[u8]) -> Result<Vec<u8>, BridgeError> {
            wire::serve(self, request).map_err(|err| BridgeError::Io(err.to_string()))
        }
    }

    const PKG: &str = "example.com/mathx";

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::from_manifest(Some(&json!({
            "structs": {
                "example.com/mathx": {
                    "Person": [
                        {"name": "Name", "type": "string", "key": "name"},
                        {"name": "Age", "type": "int64", "key": "age", "aliases": ["years"]},
                        {"name": "Nick", "type": "*string", "key": "nick"}
                    ],
                    "Counter": []
                }
            },
            "symbols": [
                {"pkg": PKG, "name": "Add", "params": ["int64", "int64"], "results": ["int64"], "doc": "Add returns a+b."},
                {"pkg": PKG, "name": "Older", "params": ["Person"], "results": ["Person", "error"]},
                {"pkg": PKG, "name": "NewCounter", "params": [], "results": ["*Counter"]},
                {"pkg": PKG, "name": "Split", "params": [], "results": ["*Counter", "int64", "error"]},
                {"pkg": PKG, "name": "Sum", "params": ["...int64"], "results": ["int64"]},
                {"pkg": PKG, "name": "DivMod", "params": ["int64", "int64"], "results": ["int64", "int64", "error"]},
                {"pkg": PKG, "name": "Max__int64", "params": ["int64", "int64"], "results": ["int64"]}
            ],
            "methods": [
                {"pkg": PKG, "recv": "Counter", "name": "Inc", "params": ["int64"], "results": ["int64"]}
            ],
            "generics": [
                {"pkg": PKG, "name": "Max", "type_args": ["int64"], "symbol": "Max__int64"}
            ],
            "vars": [
                {"pkg": PKG, "name": "Default", "type": "*Counter"}
            ]
        }))))
    }

    fn handle(bridge: &Arc<Scripted>) -> PackageHandle {
        PackageHandle::with_bridge(
            PKG,
            "v1.0.0",
            PKG,
            Arc::clone(bridge) as Arc<dyn Bridge>,
            schema(),
        )
    }

    fn int_args(request: &Request) -> Vec<i64> {
        match request {
            Request::Call { args, .. } | Request::Invoke { args, .. } => {
                args.iter().filter_map(Value::as_i64).collect()
            }
            _ => Vec::new(),
        }
    }

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (Value::from(*k), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_call_round_trip() {
        let bridge = Scripted::new(|req| Ok(Value::from(int_args(req).iter().sum::<i64>())));
        let pkg = handle(&bridge);

        let sum = pkg
            .call("Add", vec![Value::from(2), Value::from(3)])
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(sum, Value::from(5));

        let requests = bridge.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0],
            Request::call(PKG, "Add", vec![Value::from(2), Value::from(3)])
        );
    }

    #[test]
    fn test_validation_happens_before_wire() {
        let bridge = Scripted::new(|_| Ok(Value::Nil));
        let pkg = handle(&bridge);

        let err = pkg.call("Add", vec![Value::from(1), Value::from("x")]).unwrap_err();
        assert!(matches!(err, RuntimeError::Validation(_)));
        let err = pkg.call("Add", vec![Value::from(1)]).unwrap_err();
        assert!(matches!(err, RuntimeError::Validation(_)));
        assert!(bridge.requests().is_empty());
    }

    #[test]
    fn test_undeclared_function_is_forwarded_unchecked() {
        let bridge = Scripted::new(|req| Ok(Value::from(int_args(req).iter().sum::<i64>())));
        let pkg = PackageHandle::with_bridge(
            "m",
            "v1",
            "m",
            Arc::clone(&bridge) as Arc<dyn Bridge>,
            Arc::new(Schema::default()),
        );

        let function = pkg.function("Add");
        assert!(function.signature().is_none());
        assert_eq!(function.describe(), "func Add (undeclared)");

        let sum = pkg
            .call("Add", vec![Value::from(1), Value::from(2)])
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(sum, Value::from(3));
        assert_eq!(
            bridge.requests(),
            vec![Request::call("m", "Add", vec![Value::from(1), Value::from(2)])]
        );
    }

    #[test]
    fn test_undeclared_function_error_comes_from_native_side() {
        let bridge = Scripted::new(|_| {
            Err(ErrorPayload::new(ErrorKind::SymbolNotFound, "m.Missing"))
        });
        let pkg = handle(&bridge);
        let err = pkg.call("Missing", vec![Value::from("raw")]).unwrap_err();
        assert!(matches!(err, RuntimeError::SymbolNotFound(_)));
        assert_eq!(
            bridge.requests(),
            vec![Request::call(PKG, "Missing", vec![Value::from("raw")])]
        );
    }

    #[test]
    fn test_struct_arguments_use_wire_keys() {
        let bridge = Scripted::new(|req| match req {
            Request::Call { args, .. } => {
                let Value::Map(entries) = &args[0] else {
                    return Err(ErrorPayload::new(ErrorKind::UnsupportedType, "not a map"));
                };
                let mut entries = entries.clone();
                for (key, value) in entries.iter_mut() {
                    if key.as_str() == Some("age") {
                        *value = Value::from(value.as_i64().unwrap_or(0) + 1);
                    }
                }
                Ok(Value::Map(entries))
            }
            _ => Ok(Value::Nil),
        });
        let pkg = handle(&bridge);

        let person = map(&[("Name", Value::from("ann")), ("years", Value::from(40))]);
        let older = pkg.call("Older", vec![person]).unwrap().into_value().unwrap();
        assert_eq!(
            older,
            map(&[
                ("Name", Value::from("ann")),
                ("Age", Value::from(41)),
                ("Nick", Value::Nil),
            ])
        );

        let Request::Call { args, .. } = &bridge.requests()[0] else {
            panic!("expected call");
        };
        assert_eq!(
            args[0],
            map(&[("name", Value::from("ann")), ("age", Value::from(40))])
        );
    }

    #[test]
    fn test_variadic_and_tuple_results() {
        let bridge = Scripted::new(|req| match req {
            Request::Call { function, args, .. } if function == "Sum" => {
                let Value::Array(items) = &args[0] else {
                    return Err(ErrorPayload::new(ErrorKind::UnsupportedType, "not packed"));
                };
                Ok(Value::from(items.iter().filter_map(Value::as_i64).sum::<i64>()))
            }
            req => {
                let args = int_args(req);
                Ok(Value::Array(vec![
                    Value::from(args[0] / args[1]),
                    Value::from(args[0] % args[1]),
                ]))
            }
        });
        let pkg = handle(&bridge);

        let total = pkg
            .call("Sum", vec![Value::from(1), Value::from(2), Value::from(3)])
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(total, Value::from(6));

        let pair = pkg
            .call("DivMod", vec![Value::from(7), Value::from(2)])
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(pair, Value::Array(vec![Value::from(3), Value::from(1)]));
    }

    #[test]
    fn test_remote_error_is_application() {
        let bridge = Scripted::new(|_| Err(ErrorPayload::new(ErrorKind::RemoteError, "overflow")));
        let pkg = handle(&bridge);
        let err = pkg.call("Add", vec![Value::from(1), Value::from(2)]).unwrap_err();
        assert!(matches!(err, RuntimeError::Application { ref message, .. } if message == "overflow"));
    }

    #[test]
    fn test_result_type_violation_is_decode_error() {
        let bridge = Scripted::new(|_| Ok(Value::from("five")));
        let pkg = handle(&bridge);
        let err = pkg.call("Add", vec![Value::from(1), Value::from(2)]).unwrap_err();
        assert!(matches!(err, RuntimeError::Decode(_)));
    }

    fn counter_bridge() -> Arc<Scripted> {
        Scripted::new(|req| match req {
            Request::Call { function, .. } if function == "NewCounter" => Ok(Value::from(3)),
            Request::Call { function, .. } if function == "Split" => {
                Ok(Value::Array(vec![Value::from(4), Value::from(5)]))
            }
            Request::Call { function, .. } if function == "Default" => Ok(Value::from(7)),
            Request::Invoke { args, .. } => Ok(Value::from(args[0].as_i64().unwrap_or(0) + 100)),
            _ => Ok(Value::Nil),
        })
    }

    fn releases(bridge: &Scripted) -> usize {
        bridge
            .requests()
            .iter()
            .filter(|r| matches!(r, Request::Release { .. }))
            .count()
    }

    #[test]
    fn test_opaque_result_becomes_handle() {
        let bridge = counter_bridge();
        let pkg = handle(&bridge);

        let counter = pkg.call("NewCounter", vec![]).unwrap().into_object().unwrap();
        assert_eq!(counter.type_name(), "Counter");
        assert_eq!(counter.id(), 3);

        let next = counter.call("Inc", vec![Value::from(1)]).unwrap().into_value().unwrap();
        assert_eq!(next, Value::from(101));
        assert_eq!(
            bridge.requests()[1],
            Request::invoke(PKG, "Counter", 3, "Inc", vec![Value::from(1)])
        );
    }

    #[test]
    fn test_opaque_ids_in_tuple_results_become_handles() {
        let bridge = counter_bridge();
        let pkg = handle(&bridge);

        let mut parts = pkg.call("Split", vec![]).unwrap().into_tuple().unwrap();
        assert_eq!(parts.len(), 2);
        let count = parts.pop().unwrap().into_value().unwrap();
        assert_eq!(count, Value::from(5));
        let counter = parts.pop().unwrap().into_object().unwrap();
        assert_eq!(counter.type_name(), "Counter");
        assert_eq!(counter.id(), 4);

        drop(counter);
        assert_eq!(releases(&bridge), 1);
    }

    #[test]
    fn test_tuple_holding_a_handle_is_not_a_plain_value() {
        let bridge = counter_bridge();
        let pkg = handle(&bridge);
        let err = pkg.call("Split", vec![]).unwrap().into_value().unwrap_err();
        assert!(matches!(err, RuntimeError::Decode(_)));
        assert_eq!(releases(&bridge), 1);
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_methods() {
        let bridge = counter_bridge();
        let pkg = handle(&bridge);
        let counter = pkg.construct("Counter", None).unwrap();

        counter.close();
        counter.close();
        assert!(counter.is_closed());
        assert_eq!(releases(&bridge), 1);

        let before = bridge.requests().len();
        let err = counter.call("Inc", vec![Value::from(1)]).unwrap_err();
        assert!(matches!(err, RuntimeError::ObjectClosed { id: 3, .. }));
        assert_eq!(bridge.requests().len(), before);

        drop(counter);
        assert_eq!(releases(&bridge), 1);
    }

    #[test]
    fn test_drop_releases_and_close_swallows_errors() {
        let bridge = Scripted::new(|req| match req {
            Request::Construct { .. } => Ok(Value::from(9)),
            _ => Err(ErrorPayload::new(ErrorKind::RemotePanic, "gone")),
        });
        let pkg = handle(&bridge);
        let counter = pkg.construct("Counter", None).unwrap();
        drop(counter);
        assert_eq!(releases(&bridge), 1);
    }

    #[test]
    fn test_with_object_closes_on_error() {
        let bridge = counter_bridge();
        let pkg = handle(&bridge);
        let result: Result<(), RuntimeError> = pkg.with_object("Counter", None, |counter| {
            counter.method("Reset")?;
            Ok(())
        });
        assert!(matches!(result, Err(RuntimeError::Lookup(_))));
        assert_eq!(releases(&bridge), 1);
    }

    #[test]
    fn test_package_variable_is_cached() {
        let bridge = counter_bridge();
        let pkg = handle(&bridge);

        let first = pkg.var("Default").unwrap();
        let second = match pkg.member("Default").unwrap() {
            Member::Variable(handle) => handle,
            Member::Function(f) => panic!("unexpected function {:?}", f),
        };
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.id(), 7);
        assert_eq!(first.type_name(), "Counter");
        assert_eq!(bridge.requests(), vec![Request::call(PKG, "Default", vec![])]);
    }

    #[test]
    fn test_generic_dispatch() {
        let bridge = Scripted::new(|req| Ok(Value::from(*int_args(req).iter().max().unwrap_or(&0))));
        let pkg = handle(&bridge);

        let max = pkg.generic("Max", &["int64"]).unwrap();
        assert_eq!(max.symbol(), "Max__int64");
        assert_eq!(
            max.call_value(vec![Value::from(4), Value::from(9)]).unwrap(),
            Value::from(9)
        );
        assert!(matches!(
            pkg.generic("Max", &["float64"]),
            Err(RuntimeError::Lookup(_))
        ));
        assert_eq!(bridge.requests().len(), 1);
    }

    #[test]
    fn test_describe() {
        let bridge = counter_bridge();
        let pkg = handle(&bridge);
        assert_eq!(
            pkg.describe("Add").unwrap(),
            "func Add(int64, int64) int64\n\nAdd returns a+b."
        );
        let counter = pkg.construct("Counter", None).unwrap();
        assert_eq!(counter.describe("Inc").unwrap(), "func (Counter) Inc(int64) int64");
        assert!(pkg.describe("Nope").is_none());
    }

    #[test]
    fn test_import_package_without_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::builder()
            .artifact_dir(dir.path())
            .platform(Platform::new("linux", "amd64"))
            .build()
            .unwrap();
        let err = import_package(PKG, None, &config).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Artifact(artifact::ArtifactError::NotFound { .. })
        ));
    }
}
