use crate::{ConvertError, Converter};
use rmpv::Value;
use schema_index::{IntWidth, ResolvedType};
use std::collections::HashSet;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

fn invalid(msg: impl Into<String>) -> ConvertError {
    ConvertError::Validation(msg.into())
}

fn check_int(value: &Value, width: IntWidth) -> Result<(), ConvertError> {
    let Value::Integer(int) = value else {
        return Err(invalid("expected int"));
    };
    let (lo, hi) = width.bounds();
    match int.as_i64() {
        Some(n) if n >= lo && n <= hi => Ok(()),
        _ => Err(invalid("int out of range")),
    }
}

impl Converter<'_> {
    pub(crate) fn validate_resolved(
        &self,
        ty: &ResolvedType,
        value: &Value,
    ) -> Result<(), ConvertError> {
        match ty {
            ResolvedType::Any => Ok(()),
            ResolvedType::Error => match value {
                Value::Nil => Ok(()),
                _ => Err(invalid("expected nil")),
            },
            ResolvedType::Bool => match value {
                Value::Boolean(_) => Ok(()),
                _ => Err(invalid("expected bool")),
            },
            ResolvedType::String => match value.as_str() {
                Some(_) => Ok(()),
                None => Err(invalid("expected string")),
            },
            ResolvedType::Int(width) => check_int(value, *width),
            ResolvedType::Float => match value {
                Value::Integer(_) | Value::F32(_) | Value::F64(_) => Ok(()),
                _ => Err(invalid("expected float")),
            },
            ResolvedType::Bytes => match value {
                Value::Binary(_) => Ok(()),
                _ => Err(invalid("expected bytes")),
            },
            ResolvedType::Time => {
                let text = value
                    .as_str()
                    .ok_or_else(|| invalid("expected RFC3339 string"))?;
                OffsetDateTime::parse(text, &Rfc3339)
                    .map(|_| ())
                    .map_err(|_| invalid(format!("invalid RFC3339 timestamp {:?}", text)))
            }
            ResolvedType::Duration => check_int(value, IntWidth::W64)
                .map_err(|_| invalid("expected int64 nanoseconds")),
            ResolvedType::Uuid => {
                let text = value.as_str().ok_or_else(|| invalid("expected UUID string"))?;
                uuid::Uuid::parse_str(text)
                    .map(|_| ())
                    .map_err(|_| invalid(format!("invalid UUID {:?}", text)))
            }
            ResolvedType::Optional(inner) => match value {
                Value::Nil => Ok(()),
                _ => self.validate_resolved(inner, value),
            },
            ResolvedType::OpaqueHandle(name) => match value {
                Value::Nil => Ok(()),
                Value::Integer(id) if id.as_u64().is_some() => Ok(()),
                _ => Err(invalid(format!("expected handle id for *{}", name))),
            },
            ResolvedType::Variadic(inner) | ResolvedType::Sequence(inner) => {
                let Value::Array(items) = value else {
                    return Err(invalid("expected sequence"));
                };
                for (idx, item) in items.iter().enumerate() {
                    self.validate_resolved(inner, item)
                        .map_err(|e| e.within(format!("[{}]", idx)))?;
                }
                Ok(())
            }
            ResolvedType::StringMap(inner) => {
                let Value::Map(entries) = value else {
                    return Err(invalid("expected map"));
                };
                for (key, item) in entries {
                    let key = key
                        .as_str()
                        .ok_or_else(|| invalid("expected map with string keys"))?;
                    self.validate_resolved(inner, item)
                        .map_err(|e| e.within(format!("[{:?}]", key)))?;
                }
                Ok(())
            }
            ResolvedType::Struct(name) => self.validate_struct(name, value),
        }
    }

    fn validate_struct(&self, name: &str, value: &Value) -> Result<(), ConvertError> {
        let schema = self
            .schema
            .struct_schema(self.package, name)
            .ok_or_else(|| invalid(format!("unknown type {}", name)))?;
        let Value::Map(entries) = value else {
            return Err(invalid(format!("expected map for {}", name)));
        };

        let mut resolved = Vec::with_capacity(entries.len());
        for (key, item) in entries {
            let key = key.as_str().ok_or_else(|| invalid("expected string keys"))?;
            let field = schema
                .field_for_key(key)
                .ok_or_else(|| invalid(format!("unknown field {}", key)))?;
            resolved.push((key, field, item));
        }

        let mut seen = HashSet::new();
        for (key, field, item) in resolved {
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field {}", field.name)));
            }
            if item.is_nil() && !field.required {
                continue;
            }
            self.validate(&field.type_name, item)
                .map_err(|e| e.within(format!("field {} ({})", key, field.type_name)))?;
        }

        let mut missing: Vec<&str> = schema
            .fields()
            .iter()
            .filter(|f| f.required && !seen.contains(f.name.as_str()))
            .map(|f| f.name.as_str())
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(invalid(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}
