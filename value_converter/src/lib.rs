//! # Value Converter
//!
//! Schema-aware validation, encoding, and decoding of dynamic values.
//!
//! ## Philosophy
//!
//! - **One grammar, three walks**: validate, encode, and decode recurse over
//!   the same resolved descriptor and reach a terminal case for every type
//! - **Validate before the wire**: a value that violates its declared type is
//!   rejected locally, before any request is sent
//! - **Fail closed**: unknown types, unknown fields, and duplicate fields are
//!   errors, never passed through
//!
//! Structured values are MessagePack maps. Callers may key them by declared
//! field name, wire key, or alias; encoding rewrites every key to the wire
//! key and decoding rewrites every key back to the declared name.

mod call;
mod transform;
mod validate;

pub use call::pack_variadic;

use rmpv::Value;
use schema_index::{ResolvedType, Schema, SchemaError};
use std::fmt;
use thiserror::Error;

/// Conversion failures. All of them are raised before or after a wire call,
/// never in place of one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConvertError {
    /// The value violates its declared type
    #[error("{0}")]
    Validation(String),

    #[error("wrong arity (expected {expected}, got {found})")]
    Arity { expected: usize, found: usize },

    /// The value cannot be put into wire form
    #[error("{0}")]
    Encode(String),

    /// A returned value does not match its declared type
    #[error("{0}")]
    Decode(String),
}

impl ConvertError {
    /// Prefixes the message with the position it was found at.
    pub(crate) fn within(self, context: impl fmt::Display) -> Self {
        match self {
            ConvertError::Validation(msg) => ConvertError::Validation(format!("{}: {}", context, msg)),
            ConvertError::Encode(msg) => ConvertError::Encode(format!("{}: {}", context, msg)),
            ConvertError::Decode(msg) => ConvertError::Decode(format!("{}: {}", context, msg)),
            arity @ ConvertError::Arity { .. } => arity,
        }
    }
}

fn resolve_error(descriptor: &str, err: SchemaError) -> ConvertError {
    match err {
        SchemaError::UnknownType(_) => {
            ConvertError::Validation(format!("unknown type {}", descriptor.trim()))
        }
        other => ConvertError::Validation(other.to_string()),
    }
}

/// Converter bound to one package of a schema.
#[derive(Clone, Copy)]
pub struct Converter<'a> {
    schema: &'a Schema,
    package: &'a str,
}

impl<'a> Converter<'a> {
    pub fn new(schema: &'a Schema, package: &'a str) -> Self {
        Self { schema, package }
    }

    pub fn package(&self) -> &str {
        self.package
    }

    fn resolve(&self, descriptor: &str) -> Result<ResolvedType, ConvertError> {
        self.schema
            .resolve(self.package, descriptor)
            .map_err(|err| resolve_error(descriptor, err))
    }

    /// Resolves a parameter type; `...T` is admitted only for the last one.
    pub(crate) fn resolve_param(
        &self,
        params: &[String],
        idx: usize,
    ) -> Result<ResolvedType, ConvertError> {
        let descriptor = &params[idx];
        let resolved = if idx + 1 == params.len() {
            self.schema.resolve_param(self.package, descriptor)
        } else {
            self.schema.resolve(self.package, descriptor)
        };
        resolved.map_err(|err| resolve_error(descriptor, err))
    }

    /// Checks `value` against `descriptor`.
    pub fn validate(&self, descriptor: &str, value: &Value) -> Result<(), ConvertError> {
        let ty = self.resolve(descriptor)?;
        self.validate_resolved(&ty, value)
    }

    /// Rewrites a validated value into wire form.
    pub fn encode(&self, descriptor: &str, value: &Value) -> Result<Value, ConvertError> {
        let ty = self.resolve(descriptor).map_err(|e| ConvertError::Encode(e.to_string()))?;
        self.encode_resolved(&ty, value)
    }

    /// Rewrites a wire value into declared-name form.
    pub fn decode(&self, descriptor: &str, value: &Value) -> Result<Value, ConvertError> {
        let ty = self.resolve(descriptor).map_err(|e| ConvertError::Decode(e.to_string()))?;
        self.decode_resolved(&ty, value)
    }
}
