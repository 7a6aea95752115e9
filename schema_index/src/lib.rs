//! # Schema Index
//!
//! Lookup tables derived once from an artifact manifest's `schema` block:
//! structs, function symbols, methods, generic instantiations, and
//! package-level variables, each optionally documented.
//!
//! ## Philosophy
//!
//! - **Authoritative metadata**: the manifest is never re-derived or guessed
//!   at; ambiguous aliases are dropped instead of picked
//! - **Tolerant parsing**: a malformed entry is skipped with a warning and
//!   never poisons the rest of the schema
//! - **Closed type grammar**: every descriptor resolves to a
//!   [`ResolvedType`] or fails; `...T` is only legal as the final parameter

pub mod descriptor;
pub mod resolved;
pub mod schema;

pub use descriptor::{TypeDescriptor, TypeOp};
pub use resolved::{IntWidth, ResolvedType};
pub use schema::{
    FieldSchema, GenericSchema, ResultShape, Schema, Signature, StructSchema, VarSchema,
};

use thiserror::Error;

/// Lookup failures against a schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unknown type {0}")]
    UnknownType(String),

    #[error("unknown method {package}.{receiver}.{name}")]
    UnknownMethod {
        package: String,
        receiver: String,
        name: String,
    },

    #[error("no instantiation of {package}.{name} for [{type_args}]")]
    UnknownGeneric {
        package: String,
        name: String,
        type_args: String,
    },

    /// `...T` outside the final parameter of a signature
    #[error("variadic type {0} is only allowed as the final parameter")]
    MisplacedVariadic(String),
}
