//! Descriptor resolution against a schema.

use crate::descriptor::{TypeDescriptor, TypeOp, BYTES};
use crate::{Schema, SchemaError};

/// Signed integer width of an `intN` type; `int` is 64-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bounds(self) -> (i64, i64) {
        match self {
            IntWidth::W8 => (i8::MIN.into(), i8::MAX.into()),
            IntWidth::W16 => (i16::MIN.into(), i16::MAX.into()),
            IntWidth::W32 => (i32::MIN.into(), i32::MAX.into()),
            IntWidth::W64 => (i64::MIN, i64::MAX),
        }
    }
}

/// A descriptor with every base name bound to its meaning.
///
/// Struct references stay by name so recursive types resolve lazily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedType {
    Any,
    Error,
    Bool,
    String,
    Int(IntWidth),
    Float,
    Bytes,
    Time,
    Duration,
    Uuid,
    Optional(Box<ResolvedType>),
    /// Pointer to a struct with no declared fields, carried as an integer id.
    OpaqueHandle(String),
    Variadic(Box<ResolvedType>),
    Sequence(Box<ResolvedType>),
    StringMap(Box<ResolvedType>),
    Struct(String),
}

fn resolve_base(schema: &Schema, pkg: &str, base: &str) -> Result<ResolvedType, SchemaError> {
    let resolved = match base {
        "any" | "interface{}" => ResolvedType::Any,
        "error" => ResolvedType::Error,
        "bool" => ResolvedType::Bool,
        "string" => ResolvedType::String,
        "int8" => ResolvedType::Int(IntWidth::W8),
        "int16" => ResolvedType::Int(IntWidth::W16),
        "int32" => ResolvedType::Int(IntWidth::W32),
        "int" | "int64" => ResolvedType::Int(IntWidth::W64),
        "float32" | "float64" => ResolvedType::Float,
        BYTES => ResolvedType::Bytes,
        "time.Time" => ResolvedType::Time,
        "time.Duration" => ResolvedType::Duration,
        "uuid.UUID" => ResolvedType::Uuid,
        name if schema.struct_schema(pkg, name).is_some() => ResolvedType::Struct(name.to_string()),
        other => return Err(SchemaError::UnknownType(other.to_string())),
    };
    Ok(resolved)
}

fn resolve_desc(
    schema: &Schema,
    pkg: &str,
    desc: &TypeDescriptor,
    variadic_ok: bool,
) -> Result<ResolvedType, SchemaError> {
    let Some((first, rest)) = desc.peel() else {
        return resolve_base(schema, pkg, &desc.base);
    };
    if first == TypeOp::Variadic && !variadic_ok {
        return Err(SchemaError::MisplacedVariadic(desc.to_string()));
    }
    if first == TypeOp::Optional && rest.ops.is_empty() {
        if let Some(st) = schema.struct_schema(pkg, &rest.base) {
            if st.is_opaque() {
                return Ok(ResolvedType::OpaqueHandle(rest.base));
            }
        }
    }
    let inner = Box::new(resolve_desc(schema, pkg, &rest, false)?);
    Ok(match first {
        TypeOp::Optional => ResolvedType::Optional(inner),
        TypeOp::Variadic => ResolvedType::Variadic(inner),
        TypeOp::Sequence => ResolvedType::Sequence(inner),
        TypeOp::StringMap => ResolvedType::StringMap(inner),
    })
}

impl Schema {
    /// Resolves a descriptor in the scope of `pkg`. `...T` is rejected.
    pub fn resolve(&self, pkg: &str, descriptor: &str) -> Result<ResolvedType, SchemaError> {
        self.resolve_with(pkg, descriptor, false)
    }

    /// Like [`resolve`](Schema::resolve), but admits `...T` as the outermost
    /// operator. Only the final parameter of a signature may use this.
    pub fn resolve_param(&self, pkg: &str, descriptor: &str) -> Result<ResolvedType, SchemaError> {
        self.resolve_with(pkg, descriptor, true)
    }

    fn resolve_with(
        &self,
        pkg: &str,
        descriptor: &str,
        variadic_ok: bool,
    ) -> Result<ResolvedType, SchemaError> {
        let desc = TypeDescriptor::parse(descriptor);
        if desc.base.is_empty() {
            return Err(SchemaError::UnknownType(descriptor.trim().to_string()));
        }
        resolve_desc(self, pkg, &desc, variadic_ok)
    }
}
