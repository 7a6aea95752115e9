//! Low-level MessagePack helpers shared by requests and responses.

use rmpv::Value;
use thiserror::Error;

/// Errors raised at the wire boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WireError {
    /// The payload is not a well-formed envelope
    #[error("Decode error: {0}")]
    Decode(String),

    /// The value cannot be represented on the wire
    #[error("Encode error: {0}")]
    Encode(String),

    /// The request carries a protocol version other than the supported one
    #[error("Unsupported protocol version: {found}")]
    UnsupportedVersion { found: i64 },

    /// The request names an operation the serving side does not know
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

/// Serializes a value into a fresh buffer.
pub fn to_bytes(value: &Value) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    rmpv::encode::write_value(&mut out, value).map_err(|err| WireError::Encode(err.to_string()))?;
    Ok(out)
}

/// Parses exactly one value from `bytes`; trailing bytes are rejected.
pub fn from_bytes(bytes: &[u8]) -> Result<Value, WireError> {
    let mut cursor = bytes;
    let value =
        rmpv::decode::read_value(&mut cursor).map_err(|err| WireError::Decode(err.to_string()))?;
    if !cursor.is_empty() {
        return Err(WireError::Decode(format!(
            "{} trailing bytes after envelope",
            cursor.len()
        )));
    }
    Ok(value)
}

/// Looks up a string key in a MessagePack map.
pub fn map_get<'a>(entries: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    entries
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

pub(crate) fn entry(key: &str, value: Value) -> (Value, Value) {
    (Value::from(key), value)
}

pub(crate) fn required_str(entries: &[(Value, Value)], key: &str) -> Result<String, WireError> {
    map_get(entries, key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| WireError::Decode(format!("missing or non-string field '{}'", key)))
}

pub(crate) fn required_id(entries: &[(Value, Value)], key: &str) -> Result<u64, WireError> {
    map_get(entries, key)
        .and_then(Value::as_u64)
        .ok_or_else(|| WireError::Decode(format!("missing or negative integer field '{}'", key)))
}

pub(crate) fn args_of(entries: &[(Value, Value)]) -> Result<Vec<Value>, WireError> {
    match map_get(entries, "args") {
        None | Some(Value::Nil) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(WireError::Decode("field 'args' must be a sequence".to_string())),
    }
}
