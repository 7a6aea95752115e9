//! JSON rendering of bridge values for the command line.

use rmpv::Value;
use serde_json::{Map, Number, Value as Json};

/// Converts a JSON argument into a bridge value.
///
/// Integers stay integers; other numbers become 64-bit floats.
pub fn to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::from(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                Value::from(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::from(s.as_str()),
        Json::Array(items) => Value::Array(items.iter().map(to_value).collect()),
        Json::Object(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (Value::from(k.as_str()), to_value(v)))
                .collect(),
        ),
    }
}

/// Renders a bridge value as JSON.
///
/// Byte strings become arrays of numbers and non-finite floats become null.
pub fn from_value(value: &Value) -> Json {
    match value {
        Value::Nil => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => match (i.as_i64(), i.as_u64()) {
            (Some(n), _) => Json::from(n),
            (None, Some(n)) => Json::from(n),
            _ => Json::Null,
        },
        Value::F32(f) => float(f64::from(*f)),
        Value::F64(f) => float(*f),
        Value::String(s) => Json::String(match s.as_str() {
            Some(text) => text.to_string(),
            None => String::from_utf8_lossy(s.as_bytes()).into_owned(),
        }),
        Value::Binary(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
        Value::Array(items) => Json::Array(items.iter().map(from_value).collect()),
        Value::Map(entries) => {
            let mut object = Map::new();
            for (k, v) in entries {
                let key = match k {
                    Value::String(s) => s.as_str().map(str::to_string).unwrap_or_else(|| k.to_string()),
                    other => other.to_string(),
                };
                object.insert(key, from_value(v));
            }
            Json::Object(object)
        }
        Value::Ext(kind, data) => {
            let mut object = Map::new();
            object.insert("ext".to_string(), Json::from(*kind));
            object.insert(
                "data".to_string(),
                Json::Array(data.iter().map(|b| Json::from(*b)).collect()),
            );
            Json::Object(object)
        }
    }
}

fn float(f: f64) -> Json {
    Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null)
}
