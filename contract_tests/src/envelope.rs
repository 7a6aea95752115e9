//! Envelope contract tests
//!
//! These tests pin the MessagePack map layout both sides of the bridge agree
//! on.

use wire::PROTOCOL_VERSION;

// ===== Envelope Contract Version =====
#[allow(dead_code)]
const ENVELOPE_ABI: u32 = 0;

// ===== Operation Identifiers =====
#[allow(dead_code)]
const OP_CALL: &str = "call";
#[allow(dead_code)]
const OP_CONSTRUCT: &str = "construct";
#[allow(dead_code)]
const OP_INVOKE: &str = "invoke";
#[allow(dead_code)]
const OP_RELEASE: &str = "release";

// ===== Error Kinds =====
#[allow(dead_code)]
const ERROR_KINDS: [&str; 8] = [
    "RemoteError",
    "RemotePanic",
    "UnsupportedType",
    "UnsupportedSignature",
    "UnsupportedOperation",
    "UnsupportedVersion",
    "SymbolNotFound",
    "DecodeError",
];

#[allow(dead_code)]
fn abi_is_pinned() -> bool {
    PROTOCOL_VERSION == ENVELOPE_ABI
}

// ===== Contract Tests =====
