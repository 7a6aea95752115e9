use crate::{ConvertError, Converter};
use rmpv::Value;
use schema_index::ResolvedType;

impl Converter<'_> {
    pub(crate) fn encode_resolved(
        &self,
        ty: &ResolvedType,
        value: &Value,
    ) -> Result<Value, ConvertError> {
        match (ty, value) {
            (ResolvedType::Optional(_), Value::Nil) => Ok(Value::Nil),
            (ResolvedType::Optional(inner), _) => self.encode_resolved(inner, value),
            (ResolvedType::Variadic(inner) | ResolvedType::Sequence(inner), Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    self.encode_resolved(inner, item)
                        .map_err(|e| e.within(format!("[{}]", idx)))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (ResolvedType::StringMap(inner), Value::Map(entries)) => entries
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.encode_resolved(inner, item)?)))
                .collect::<Result<Vec<_>, ConvertError>>()
                .map(Value::Map),
            (ResolvedType::Struct(name), Value::Map(entries)) => self.encode_struct(name, entries),
            (ResolvedType::Struct(name), _) => {
                Err(ConvertError::Encode(format!("expected map for {}", name)))
            }
            _ => Ok(value.clone()),
        }
    }

    fn encode_struct(&self, name: &str, entries: &[(Value, Value)]) -> Result<Value, ConvertError> {
        let schema = self
            .schema
            .struct_schema(self.package, name)
            .ok_or_else(|| ConvertError::Encode(format!("unknown type {}", name)))?;

        let mut out = Vec::with_capacity(entries.len());
        for (key, item) in entries {
            let field = key
                .as_str()
                .and_then(|k| schema.field_for_key(k))
                .ok_or_else(|| ConvertError::Encode(format!("unknown field {}", key)))?;
            if item.is_nil() && !field.required {
                continue;
            }
            let ty = self
                .schema
                .resolve(self.package, &field.type_name)
                .map_err(|e| ConvertError::Encode(e.to_string()))?;
            let encoded = self
                .encode_resolved(&ty, item)
                .map_err(|e| e.within(format!("field {}", field.name)))?;
            out.push((Value::from(field.wire_key.as_str()), encoded));
        }
        Ok(Value::Map(out))
    }

    pub(crate) fn decode_resolved(
        &self,
        ty: &ResolvedType,
        value: &Value,
    ) -> Result<Value, ConvertError> {
        match (ty, value) {
            (ResolvedType::Optional(_), Value::Nil) => Ok(Value::Nil),
            (ResolvedType::Optional(inner), _) => self.decode_resolved(inner, value),
            (ResolvedType::Variadic(inner) | ResolvedType::Sequence(inner), Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    self.decode_resolved(inner, item)
                        .map_err(|e| e.within(format!("[{}]", idx)))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (ResolvedType::Variadic(_) | ResolvedType::Sequence(_), _) => {
                Err(ConvertError::Decode("expected sequence".to_string()))
            }
            (ResolvedType::StringMap(inner), Value::Map(entries)) => entries
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.decode_resolved(inner, item)?)))
                .collect::<Result<Vec<_>, ConvertError>>()
                .map(Value::Map),
            (ResolvedType::StringMap(_), _) => Err(ConvertError::Decode("expected map".to_string())),
            (ResolvedType::Struct(name), Value::Map(entries)) => self.decode_struct(name, entries),
            (ResolvedType::Struct(name), _) => {
                Err(ConvertError::Decode(format!("expected map for {}", name)))
            }
            _ => Ok(value.clone()),
        }
    }

    /// Output keys follow declaration order, with nil for absent optional fields.
    fn decode_struct(&self, name: &str, entries: &[(Value, Value)]) -> Result<Value, ConvertError> {
        let schema = self
            .schema
            .struct_schema(self.package, name)
            .ok_or_else(|| ConvertError::Decode(format!("unknown type {}", name)))?;

        let mut decoded: Vec<Option<Value>> = vec![None; schema.fields().len()];
        for (key, item) in entries {
            let key = key
                .as_str()
                .ok_or_else(|| ConvertError::Decode(format!("non-string key in {}", name)))?;
            let field = schema
                .field_for_key(key)
                .ok_or_else(|| ConvertError::Decode(format!("unknown field {} in {}", key, name)))?;
            let slot = schema
                .fields()
                .iter()
                .position(|f| f.name == field.name)
                .ok_or_else(|| ConvertError::Decode(format!("unknown field {} in {}", key, name)))?;
            if decoded[slot].is_some() {
                return Err(ConvertError::Decode(format!("duplicate field {}", field.name)));
            }
            let ty = self
                .schema
                .resolve(self.package, &field.type_name)
                .map_err(|e| ConvertError::Decode(e.to_string()))?;
            let value = self
                .decode_resolved(&ty, item)
                .map_err(|e| e.within(format!("field {}", field.name)))?;
            decoded[slot] = Some(value);
        }

        let mut out = Vec::with_capacity(decoded.len());
        for (field, value) in schema.fields().iter().zip(decoded) {
            let value = match value {
                Some(value) => value,
                None if field.required => {
                    return Err(ConvertError::Decode(format!(
                        "missing required field {}",
                        field.name
                    )))
                }
                None => Value::Nil,
            };
            out.push((Value::from(field.name.as_str()), value));
        }
        Ok(Value::Map(out))
    }
}

#[cfg(test)]
mod tests {
    use crate::{ConvertError, Converter};
    use rmpv::Value;
    use schema_index::Schema;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::from_manifest(Some(&json!({
            "structs": {
                "p": {
                    "Person": [
                        {"name": "Name", "type": "string", "key": "name"},
                        {"name": "Age", "type": "int64", "key": "age", "aliases": ["years"]},
                        {"name": "Nick", "type": "*string", "key": "nick"},
                        {"name": "Friends", "type": "[]Person", "key": "friends", "omitempty": true}
                    ]
                }
            }
        })))
    }

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (Value::from(*k), v.clone()))
                .collect(),
        )
    }

    fn person(name: &str, age: i64) -> Value {
        map(&[
            ("Name", Value::from(name)),
            ("Age", Value::from(age)),
            ("Nick", Value::Nil),
            ("Friends", Value::Nil),
        ])
    }

    #[test]
    fn test_encode_rekeys_and_drops_nil_optionals() {
        let schema = schema();
        let conv = Converter::new(&schema, "p");
        let input = map(&[
            ("Name", Value::from("ann")),
            ("years", Value::from(40)),
            ("Nick", Value::Nil),
        ]);
        let encoded = conv.encode("Person", &input).unwrap();
        assert_eq!(
            encoded,
            map(&[("name", Value::from("ann")), ("age", Value::from(40))])
        );
    }

    #[test]
    fn test_decode_fills_absent_optionals() {
        let schema = schema();
        let conv = Converter::new(&schema, "p");
        let wire = map(&[("age", Value::from(40)), ("name", Value::from("ann"))]);
        assert_eq!(conv.decode("Person", &wire).unwrap(), person("ann", 40));
    }

    #[test]
    fn test_decode_missing_required_field() {
        let schema = schema();
        let conv = Converter::new(&schema, "p");
        let err = conv
            .decode("Person", &map(&[("name", Value::from("ann"))]))
            .unwrap_err();
        assert_eq!(err, ConvertError::Decode("missing required field Age".to_string()));
    }

    #[test]
    fn test_decode_rejects_unknown_keys() {
        let schema = schema();
        let conv = Converter::new(&schema, "p");
        let wire = map(&[
            ("name", Value::from("ann")),
            ("age", Value::from(1)),
            ("height", Value::from(2)),
        ]);
        assert!(matches!(
            conv.decode("Person", &wire),
            Err(ConvertError::Decode(_))
        ));
    }

    #[test]
    fn test_nested_round_trip() {
        let schema = schema();
        let conv = Converter::new(&schema, "p");
        let mut root = person("ann", 40);
        if let Value::Map(entries) = &mut root {
            entries[3].1 = Value::Array(vec![person("bob", 41)]);
        }
        let value = Value::Array(vec![root.clone(), Value::Nil]);

        conv.validate("[]*Person", &value).unwrap();
        let encoded = conv.encode("[]*Person", &value).unwrap();
        let decoded = conv.decode("[]*Person", &encoded).unwrap();
        assert_eq!(decoded, value);

        let Value::Array(items) = &encoded else {
            panic!("expected sequence");
        };
        let Value::Map(wire) = &items[0] else {
            panic!("expected map");
        };
        let keys: Vec<_> = wire.iter().filter_map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["name", "age", "friends"]);
    }

    #[test]
    fn test_scalar_round_trip() {
        let schema = schema();
        let conv = Converter::new(&schema, "p");
        let cases = [
            ("int64", Value::from(-5)),
            ("[]byte", Value::Binary(b"raw".to_vec())),
            ("map[string]float64", map(&[("pi", Value::F64(2.5))])),
            ("time.Time", Value::from("2024-01-02T03:04:05Z")),
            ("any", Value::Array(vec![Value::from(1), Value::from("x")])),
        ];
        for (descriptor, value) in cases {
            conv.validate(descriptor, &value).unwrap();
            let encoded = conv.encode(descriptor, &value).unwrap();
            assert_eq!(conv.decode(descriptor, &encoded).unwrap(), value);
        }
    }
}
