//! Response envelopes and the serving-side dispatch loop.

use crate::codec::{self, entry, map_get, WireError};
use crate::request::{decode_request, Request};
use rmpv::Value;
use std::fmt;

/// Error kind reported by the serving side in `error.type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The foreign function returned a non-nil error
    RemoteError,
    /// The foreign side recovered from a fault mid-call
    RemotePanic,
    /// An argument or result type is not supported by the bridge
    UnsupportedType,
    /// The symbol signature is not supported by the bridge
    UnsupportedSignature,
    /// The request named an unknown operation
    UnsupportedOperation,
    /// The request carried an unsupported protocol version
    UnsupportedVersion,
    /// No dispatch entry for the requested symbol
    SymbolNotFound,
    /// The serving side could not decode the request
    DecodeError,
    /// Any kind this host does not know; the original string is preserved
    Other(String),
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::RemoteError => "RemoteError",
            ErrorKind::RemotePanic => "RemotePanic",
            ErrorKind::UnsupportedType => "UnsupportedType",
            ErrorKind::UnsupportedSignature => "UnsupportedSignature",
            ErrorKind::UnsupportedOperation => "UnsupportedOperation",
            ErrorKind::UnsupportedVersion => "UnsupportedVersion",
            ErrorKind::SymbolNotFound => "SymbolNotFound",
            ErrorKind::DecodeError => "DecodeError",
            ErrorKind::Other(kind) => kind,
        }
    }

    pub fn parse(kind: &str) -> Self {
        match kind {
            "RemoteError" => ErrorKind::RemoteError,
            "RemotePanic" => ErrorKind::RemotePanic,
            "UnsupportedType" => ErrorKind::UnsupportedType,
            "UnsupportedSignature" => ErrorKind::UnsupportedSignature,
            "UnsupportedOperation" => ErrorKind::UnsupportedOperation,
            "UnsupportedVersion" => ErrorKind::UnsupportedVersion,
            "SymbolNotFound" => ErrorKind::SymbolNotFound,
            "DecodeError" => ErrorKind::DecodeError,
            other => ErrorKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `error` object of a failed response.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    /// Extra structured context; only kept when it is a map
    pub detail: Option<Value>,
}

impl ErrorPayload {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    fn to_value(&self) -> Value {
        let mut entries = vec![
            entry("type", Value::from(self.kind.as_str())),
            entry("message", Value::from(self.message.as_str())),
        ];
        if let Some(detail) = &self.detail {
            entries.push(entry("detail", detail.clone()));
        }
        Value::Map(entries)
    }
}

/// A decoded response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// `Ok` carries the result (nil when absent), `Err` the error envelope
    pub result: Result<Value, ErrorPayload>,
}

impl Response {
    pub fn ok(result: Value) -> Self {
        Self { result: Ok(result) }
    }

    pub fn error(payload: ErrorPayload) -> Self {
        Self {
            result: Err(payload),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Encodes this response; a nil result is omitted from the envelope.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let entries = match &self.result {
            Ok(Value::Nil) => vec![entry("ok", Value::from(true))],
            Ok(result) => vec![entry("ok", Value::from(true)), entry("result", result.clone())],
            Err(payload) => vec![entry("ok", Value::from(false)), entry("error", payload.to_value())],
        };
        codec::to_bytes(&Value::Map(entries))
    }
}

/// Decodes a response envelope.
///
/// Boundary failures (not a map, no `ok`, `ok:false` without an `error` map)
/// are [`WireError::Decode`]; an `ok:false` envelope with an error object is a
/// successfully decoded [`Response`] carrying that error.
pub fn decode_response(bytes: &[u8]) -> Result<Response, WireError> {
    let value = codec::from_bytes(bytes)?;
    let entries = match value {
        Value::Map(entries) => entries,
        _ => return Err(WireError::Decode("invalid response envelope".to_string())),
    };

    let ok = match map_get(&entries, "ok") {
        Some(Value::Boolean(ok)) => *ok,
        Some(_) => return Err(WireError::Decode("field 'ok' must be a bool".to_string())),
        None => return Err(WireError::Decode("invalid response envelope".to_string())),
    };

    if ok {
        let result = map_get(&entries, "result").cloned().unwrap_or(Value::Nil);
        return Ok(Response::ok(result));
    }

    let error = match map_get(&entries, "error") {
        Some(Value::Map(error)) => error,
        _ => return Err(WireError::Decode("invalid error envelope".to_string())),
    };
    let kind = map_get(error, "type").and_then(Value::as_str).unwrap_or("");
    let message = map_get(error, "message").and_then(Value::as_str).unwrap_or("");
    let detail = match map_get(error, "detail") {
        Some(detail @ Value::Map(_)) => Some(detail.clone()),
        _ => None,
    };

    Ok(Response::error(ErrorPayload {
        kind: ErrorKind::parse(kind),
        message: message.to_string(),
        detail,
    }))
}

/// Serving-side handler for decoded requests.
pub trait RequestHandler {
    fn handle(&self, request: Request) -> Result<Value, ErrorPayload>;
}

/// Decodes one request, dispatches it, and encodes the response.
///
/// Boundary failures are answered with the matching error kind instead of
/// being surfaced to the handler.
pub fn serve<H: RequestHandler + ?Sized>(handler: &H, bytes: &[u8]) -> Result<Vec<u8>, WireError> {
    let response = match decode_request(bytes) {
        Ok(request) => match handler.handle(request) {
            Ok(result) => Response::ok(result),
            Err(payload) => Response::error(payload),
        },
        Err(WireError::UnsupportedVersion { found }) => Response::error(
            ErrorPayload::new(ErrorKind::UnsupportedVersion, "unsupported abi version")
                .with_detail(Value::Map(vec![entry("abi", Value::from(found))])),
        ),
        Err(WireError::UnsupportedOperation(op)) => Response::error(
            ErrorPayload::new(ErrorKind::UnsupportedOperation, "unsupported op")
                .with_detail(Value::Map(vec![entry("op", Value::from(op.as_str()))])),
        ),
        Err(err) => Response::error(ErrorPayload::new(ErrorKind::DecodeError, err.to_string())),
    };
    response.encode()
}
