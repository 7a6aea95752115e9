//! # Wire Protocol
//!
//! This crate defines the request/response envelopes exchanged with a native
//! bridge library.
//!
//! ## Philosophy
//!
//! - **One boundary, one format**: every request and response is a single
//!   self-describing MessagePack map
//! - **Versioned from day one**: every request carries the protocol version and
//!   a mismatch is reported as its own condition
//! - **Total decoding**: malformed payloads become [`WireError::Decode`], never a
//!   panic and never an application error
//!
//! ## Architecture
//!
//! The host side encodes a [`Request`] and decodes a [`Response`]. The serving
//! side (the native library, or a test double) does the reverse through
//! [`decode_request`] and [`serve`].

pub mod codec;
pub mod request;
pub mod response;

pub use codec::{map_get, WireError};
pub use request::{decode_request, Operation, Request};
pub use response::{decode_response, serve, ErrorKind, ErrorPayload, RequestHandler, Response};

/// Re-exported so callers share one dynamic value model with the codec.
pub use rmpv::Value;

/// Protocol version carried by every request. Must match exactly.
pub const PROTOCOL_VERSION: u32 = 0;
