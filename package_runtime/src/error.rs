//! Host error taxonomy.

use artifact::ArtifactError;
use bridge_client::BridgeError;
use rmpv::Value;
use schema_index::SchemaError;
use thiserror::Error;
use value_converter::ConvertError;
use wire::{ErrorKind, ErrorPayload, WireError};

/// Every failure a caller of the runtime can observe.
///
/// Remote kinds map one-to-one from the wire error `type`; the rest are
/// raised locally and never involve the native side.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The foreign function returned an error value
    #[error("{message}")]
    Application {
        message: String,
        detail: Option<Value>,
    },

    #[error("remote panic: {0}")]
    Panic(String),

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("unsupported signature: {0}")]
    UnsupportedSignature(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    /// The native side could not decode the request
    #[error("remote decode error: {0}")]
    RemoteDecode(String),

    /// A remote kind this host does not know
    #[error("{kind}: {message}")]
    Remote { kind: String, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("load error: {0}")]
    Load(#[from] BridgeError),

    #[error("module {module} already loaded as {loaded}, cannot load {requested}")]
    VersionConflict {
        module: String,
        loaded: String,
        requested: String,
    },

    #[error("object {type_name}#{id} is closed")]
    ObjectClosed { type_name: String, id: u64 },

    #[error("lookup error: {0}")]
    Lookup(String),

    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ErrorPayload> for RuntimeError {
    fn from(payload: ErrorPayload) -> Self {
        let ErrorPayload {
            kind,
            message,
            detail,
        } = payload;
        match kind {
            ErrorKind::RemoteError => RuntimeError::Application { message, detail },
            ErrorKind::RemotePanic => RuntimeError::Panic(message),
            ErrorKind::UnsupportedType => RuntimeError::UnsupportedType(message),
            ErrorKind::UnsupportedSignature => RuntimeError::UnsupportedSignature(message),
            ErrorKind::UnsupportedOperation => RuntimeError::UnsupportedOperation(message),
            ErrorKind::UnsupportedVersion => RuntimeError::UnsupportedVersion(message),
            ErrorKind::SymbolNotFound => RuntimeError::SymbolNotFound(message),
            ErrorKind::DecodeError => RuntimeError::RemoteDecode(message),
            ErrorKind::Other(kind) => RuntimeError::Remote { kind, message },
        }
    }
}

impl From<WireError> for RuntimeError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Decode(msg) => RuntimeError::Decode(msg),
            WireError::Encode(msg) => RuntimeError::Encode(msg),
            WireError::UnsupportedVersion { found } => {
                RuntimeError::UnsupportedVersion(found.to_string())
            }
            WireError::UnsupportedOperation(op) => RuntimeError::UnsupportedOperation(op),
        }
    }
}

impl From<ConvertError> for RuntimeError {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::Validation(_) | ConvertError::Arity { .. } => {
                RuntimeError::Validation(err.to_string())
            }
            ConvertError::Encode(msg) => RuntimeError::Encode(msg),
            ConvertError::Decode(msg) => RuntimeError::Decode(msg),
        }
    }
}

impl From<SchemaError> for RuntimeError {
    fn from(err: SchemaError) -> Self {
        RuntimeError::Lookup(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_kinds_map_one_to_one() {
        let cases = [
            ("RemoteError", "Application"),
            ("RemotePanic", "Panic"),
            ("UnsupportedType", "UnsupportedType"),
            ("UnsupportedSignature", "UnsupportedSignature"),
            ("UnsupportedOperation", "UnsupportedOperation"),
            ("UnsupportedVersion", "UnsupportedVersion"),
            ("SymbolNotFound", "SymbolNotFound"),
            ("DecodeError", "RemoteDecode"),
        ];
        for (wire_kind, variant) in cases {
            let err = RuntimeError::from(ErrorPayload::new(ErrorKind::parse(wire_kind), "boom"));
            assert!(
                format!("{:?}", err).starts_with(variant),
                "{} mapped to {:?}",
                wire_kind,
                err
            );
        }
    }

    #[test]
    fn test_application_error_keeps_message_verbatim() {
        let err = RuntimeError::from(ErrorPayload::new(ErrorKind::RemoteError, "division by zero"));
        assert_eq!(err.to_string(), "division by zero");
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let err = RuntimeError::from(ErrorPayload::new(ErrorKind::parse("Timeout"), "slow"));
        match err {
            RuntimeError::Remote { kind, message } => {
                assert_eq!(kind, "Timeout");
                assert_eq!(message, "slow");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_convert_errors_map_to_local_kinds() {
        let err = RuntimeError::from(ConvertError::Arity {
            expected: 2,
            found: 1,
        });
        assert!(matches!(err, RuntimeError::Validation(_)));
        let err = RuntimeError::from(ConvertError::Decode("bad".into()));
        assert!(matches!(err, RuntimeError::Decode(_)));
    }
}
