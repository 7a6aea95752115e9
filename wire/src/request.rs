//! Request envelopes.

use crate::codec::{self, args_of, entry, map_get, required_id, required_str, WireError};
use crate::PROTOCOL_VERSION;
use rmpv::Value;
use std::fmt;

/// Operation named by the `op` field of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Call a package-level function
    Call,
    /// Construct a new foreign object
    Construct,
    /// Invoke a method on a foreign object
    Invoke,
    /// Release a foreign object
    Release,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Call => "call",
            Operation::Construct => "construct",
            Operation::Invoke => "invoke",
            Operation::Release => "release",
        }
    }

    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "call" => Some(Operation::Call),
            "construct" => Some(Operation::Construct),
            "invoke" => Some(Operation::Invoke),
            "release" => Some(Operation::Release),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request sent across the bridge.
///
/// Field names on the wire are short (`pkg`, `fn`, `type`) and every envelope
/// carries `abi` and `op`.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// `call{pkg, fn, args}`
    Call {
        package: String,
        function: String,
        args: Vec<Value>,
    },
    /// `construct{pkg, type, init?}`
    Construct {
        package: String,
        type_name: String,
        init: Option<Value>,
    },
    /// `invoke{pkg, type, id, method, args}`
    Invoke {
        package: String,
        type_name: String,
        id: u64,
        method: String,
        args: Vec<Value>,
    },
    /// `release{id}`
    Release { id: u64 },
}

impl Request {
    /// Creates a package-level call request.
    pub fn call(package: impl Into<String>, function: impl Into<String>, args: Vec<Value>) -> Self {
        Request::Call {
            package: package.into(),
            function: function.into(),
            args,
        }
    }

    /// Creates a construct request.
    pub fn construct(
        package: impl Into<String>,
        type_name: impl Into<String>,
        init: Option<Value>,
    ) -> Self {
        Request::Construct {
            package: package.into(),
            type_name: type_name.into(),
            init,
        }
    }

    /// Creates a method invocation request.
    pub fn invoke(
        package: impl Into<String>,
        type_name: impl Into<String>,
        id: u64,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Request::Invoke {
            package: package.into(),
            type_name: type_name.into(),
            id,
            method: method.into(),
            args,
        }
    }

    /// Creates a release request.
    pub fn release(id: u64) -> Self {
        Request::Release { id }
    }

    /// Returns the operation of this request.
    pub fn operation(&self) -> Operation {
        match self {
            Request::Call { .. } => Operation::Call,
            Request::Construct { .. } => Operation::Construct,
            Request::Invoke { .. } => Operation::Invoke,
            Request::Release { .. } => Operation::Release,
        }
    }

    /// Builds the envelope map.
    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            entry("abi", Value::from(PROTOCOL_VERSION)),
            entry("op", Value::from(self.operation().as_str())),
        ];
        match self {
            Request::Call {
                package,
                function,
                args,
            } => {
                entries.push(entry("pkg", Value::from(package.as_str())));
                entries.push(entry("fn", Value::from(function.as_str())));
                entries.push(entry("args", Value::Array(args.clone())));
            }
            Request::Construct {
                package,
                type_name,
                init,
            } => {
                entries.push(entry("pkg", Value::from(package.as_str())));
                entries.push(entry("type", Value::from(type_name.as_str())));
                if let Some(init) = init {
                    entries.push(entry("init", init.clone()));
                }
            }
            Request::Invoke {
                package,
                type_name,
                id,
                method,
                args,
            } => {
                entries.push(entry("pkg", Value::from(package.as_str())));
                entries.push(entry("type", Value::from(type_name.as_str())));
                entries.push(entry("id", Value::from(*id)));
                entries.push(entry("method", Value::from(method.as_str())));
                entries.push(entry("args", Value::Array(args.clone())));
            }
            Request::Release { id } => {
                entries.push(entry("id", Value::from(*id)));
            }
        }
        Value::Map(entries)
    }

    /// Encodes this request into MessagePack bytes.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        codec::to_bytes(&self.to_value())
    }
}

/// Decodes a request on the serving side.
///
/// The protocol version is checked before the operation so that a future
/// envelope with an unknown op still reports the version mismatch.
pub fn decode_request(bytes: &[u8]) -> Result<Request, WireError> {
    let value = codec::from_bytes(bytes)?;
    let entries = match value {
        Value::Map(entries) => entries,
        _ => return Err(WireError::Decode("request envelope is not a map".to_string())),
    };

    let abi = map_get(&entries, "abi")
        .and_then(Value::as_i64)
        .ok_or_else(|| WireError::Decode("missing or non-integer field 'abi'".to_string()))?;
    if abi != i64::from(PROTOCOL_VERSION) {
        return Err(WireError::UnsupportedVersion { found: abi });
    }

    let op = required_str(&entries, "op")?;
    match Operation::parse(&op) {
        Some(Operation::Call) => Ok(Request::Call {
            package: required_str(&entries, "pkg")?,
            function: required_str(&entries, "fn")?,
            args: args_of(&entries)?,
        }),
        Some(Operation::Construct) => Ok(Request::Construct {
            package: required_str(&entries, "pkg")?,
            type_name: required_str(&entries, "type")?,
            init: match map_get(&entries, "init") {
                None | Some(Value::Nil) => None,
                Some(init) => Some(init.clone()),
            },
        }),
        Some(Operation::Invoke) => Ok(Request::Invoke {
            package: required_str(&entries, "pkg")?,
            type_name: required_str(&entries, "type")?,
            id: required_id(&entries, "id")?,
            method: required_str(&entries, "method")?,
            args: args_of(&entries)?,
        }),
        Some(Operation::Release) => Ok(Request::Release {
            id: required_id(&entries, "id")?,
        }),
        None => Err(WireError::UnsupportedOperation(op)),
    }
}
