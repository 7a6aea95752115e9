//! # Bridge Contract Tests
//!
//! This crate provides "golden" tests for the host/native bridge contract so
//! the envelope layout and dispatch semantics don't drift accidentally.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: envelope keys and error kinds are written
//!   down as code
//! - **Testability first**: a [`fake_native::FakeNative`] serves the same
//!   bytes a generated bridge would, so no native toolchain is needed
//! - **Mechanism not policy**: define what must be stable, not how to use it
//!
//! ## Structure
//!
//! - `envelope`: request and response map layout
//! - `dispatch`: call-by-name through a package handle
//! - `lifecycle`: object construction, methods, and release

pub mod fake_native;

mod dispatch;
mod envelope;
mod lifecycle;

/// Common helpers for contract validation
pub mod test_helpers {
    use crate::fake_native::FakeNative;
    use bridge_client::Bridge;
    use package_runtime::PackageHandle;
    use rmpv::Value;
    use schema_index::Schema;
    use serde_json::json;
    use std::sync::Arc;
    use wire::{ErrorKind, ErrorPayload, Request};

    /// Package used by every dispatch contract.
    pub const MATHX: &str = "example.com/mathx";

    /// Top-level keys of an encoded request, in wire order.
    pub fn envelope_keys(request: &Request) -> Vec<String> {
        match request.to_value() {
            Value::Map(entries) => entries
                .iter()
                .filter_map(|(k, _)| k.as_str().map(str::to_string))
                .collect(),
            other => panic!("request envelope is not a map: {}", other),
        }
    }

    /// Verifies an encoded request carries exactly the expected op and keys.
    pub fn verify_envelope_contract(request: &Request, expected_op: &str, expected_keys: &[&str]) {
        let keys = envelope_keys(request);
        assert_eq!(
            keys, expected_keys,
            "Envelope keys changed for '{}': expected {:?}, got {:?}",
            expected_op, expected_keys, keys
        );
        assert_eq!(
            request.operation().as_str(),
            expected_op,
            "Operation identifier changed: expected '{}', got '{}'",
            expected_op,
            request.operation()
        );
        let decoded = wire::decode_request(&request.encode().expect("Failed to encode request"))
            .expect("Failed to decode request");
        assert_eq!(&decoded, request, "Request did not survive the wire");
    }

    /// Builds a string-keyed map value.
    pub fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (Value::from(*k), v.clone()))
                .collect(),
        )
    }

    /// Looks up a string key in a map value.
    pub fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
        value
            .as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn mathx_schema() -> Schema {
        Schema::from_manifest(Some(&json!({
            "structs": {
                "example.com/mathx": {
                    "Person": [
                        {"name": "Name", "type": "string", "key": "name"},
                        {"name": "Age", "type": "int64", "key": "age"},
                        {"name": "Nick", "type": "*string", "key": "nick", "omitempty": true}
                    ],
                    "Counter": []
                }
            },
            "symbols": [
                {"pkg": "example.com/mathx", "name": "Add", "params": ["int64", "int64"], "results": ["int64"], "doc": "Add returns a+b."},
                {"pkg": "example.com/mathx", "name": "Birthday", "params": ["Person"], "results": ["Person", "error"]},
                {"pkg": "example.com/mathx", "name": "Sum", "params": ["string", "...int64"], "results": ["int64"]},
                {"pkg": "example.com/mathx", "name": "DivMod", "params": ["int64", "int64"], "results": ["int64", "int64", "error"]},
                {"pkg": "example.com/mathx", "name": "Reset", "params": [], "results": ["error"]},
                {"pkg": "example.com/mathx", "name": "NewCounter", "params": ["int64"], "results": ["*Counter"]},
                {"pkg": "example.com/mathx", "name": "Broken", "params": [], "results": ["int64"]},
                {"pkg": "example.com/mathx", "name": "Max__int64", "params": ["int64", "int64"], "results": ["int64"]},
                {"pkg": "example.com/mathx", "name": "Max__float64", "params": ["float64", "float64"], "results": ["float64"]}
            ],
            "methods": [
                {"pkg": "example.com/mathx", "recv": "Counter", "name": "Inc", "params": ["int64"], "results": ["int64"]},
                {"pkg": "example.com/mathx", "recv": "Counter", "name": "Value", "params": [], "results": ["int64"], "doc": "Value reports the count."},
                {"pkg": "example.com/mathx", "recv": "Counter", "name": "Fail", "params": [], "results": ["error"]}
            ],
            "generics": [
                {"pkg": "example.com/mathx", "name": "Max", "type_args": ["int64"], "symbol": "Max__int64"},
                {"pkg": "example.com/mathx", "name": "Max", "type_args": ["float64"], "symbol": "Max__float64"}
            ],
            "vars": [
                {"pkg": "example.com/mathx", "name": "Default", "type": "*Counter", "doc": "Default is the shared counter."}
            ]
        })))
    }

    fn int(value: &Value) -> i64 {
        value.as_i64().unwrap_or(0)
    }

    fn int_arg(args: &[Value], index: usize) -> Result<i64, ErrorPayload> {
        args.get(index).and_then(Value::as_i64).ok_or_else(|| {
            ErrorPayload::new(ErrorKind::DecodeError, format!("arg{} is not an int", index))
        })
    }

    /// A native library implementing the `mathx` package.
    pub fn mathx_native() -> FakeNative {
        FakeNative::new()
            .function(MATHX, "Add", |_, args| {
                Ok(Value::from(int_arg(args, 0)? + int_arg(args, 1)?))
            })
            .function(MATHX, "Birthday", |_, args| {
                let person = args.first().cloned().unwrap_or(Value::Nil);
                let age = field(&person, "age").map(int).unwrap_or(0);
                let name = field(&person, "name").cloned().unwrap_or(Value::Nil);
                Ok(map(&[("name", name), ("age", Value::from(age + 1))]))
            })
            .function(MATHX, "Sum", |_, args| {
                let items = args.get(1).and_then(Value::as_array).cloned().unwrap_or_default();
                Ok(Value::from(items.iter().map(int).sum::<i64>()))
            })
            .function(MATHX, "DivMod", |_, args| {
                let (a, b) = (int_arg(args, 0)?, int_arg(args, 1)?);
                if b == 0 {
                    return Err(ErrorPayload::new(ErrorKind::RemoteError, "division by zero")
                        .with_detail(map(&[("op", Value::from("divmod"))])));
                }
                Ok(Value::Array(vec![Value::from(a / b), Value::from(a % b)]))
            })
            .function(MATHX, "Reset", |_, _| Ok(Value::Nil))
            .function(MATHX, "NewCounter", |store, args| {
                Ok(Value::from(store.insert("Counter", Value::from(int_arg(args, 0)?))))
            })
            .function(MATHX, "Broken", |_, _| {
                Err(ErrorPayload::new(ErrorKind::RemotePanic, "runtime error: index out of range"))
            })
            .function(MATHX, "Max__int64", |_, args| {
                Ok(Value::from(int_arg(args, 0)?.max(int_arg(args, 1)?)))
            })
            .function(MATHX, "Max__float64", |_, args| {
                let a = args.first().and_then(Value::as_f64).unwrap_or(0.0);
                let b = args.get(1).and_then(Value::as_f64).unwrap_or(0.0);
                Ok(Value::from(a.max(b)))
            })
            .constructor(MATHX, "Counter", |_| Ok(Value::from(0)))
            .method(MATHX, "Counter", "Inc", |state, args| {
                let next = int(state) + int_arg(args, 0)?;
                *state = Value::from(next);
                Ok(Value::from(next))
            })
            .method(MATHX, "Counter", "Value", |state, _| Ok(state.clone()))
            .method(MATHX, "Counter", "Fail", |_, _| {
                Err(ErrorPayload::new(ErrorKind::RemoteError, "counter failed"))
            })
            .variable(MATHX, "Default", "Counter", Value::from(100))
    }

    /// A package handle talking to `native` without the process registry.
    pub fn mathx_handle(native: &Arc<FakeNative>) -> PackageHandle {
        PackageHandle::with_bridge(
            MATHX,
            "v1.2.0",
            MATHX,
            Arc::clone(native) as Arc<dyn Bridge>,
            Arc::new(mathx_schema()),
        )
    }
}
