//! Signature-level conversion: argument lists and result payloads.

use crate::{ConvertError, Converter};
use rmpv::Value;
use schema_index::{ResultShape, Signature, TypeDescriptor};

/// Packs trailing positional arguments into the variadic slot.
///
/// Applies only when the final parameter is `...T`. A single sequence
/// already sitting in that slot is passed through untouched.
pub fn pack_variadic<S: AsRef<str>>(params: &[S], args: Vec<Value>) -> Vec<Value> {
    let Some(last) = params.last() else {
        return args;
    };
    if !TypeDescriptor::parse(last.as_ref()).is_variadic() {
        return args;
    }
    let fixed = params.len() - 1;
    if args.len() < fixed {
        return args;
    }
    if args.len() == fixed + 1 && matches!(args[fixed], Value::Array(_)) {
        return args;
    }

    let mut args = args;
    let rest = args.split_off(fixed);
    args.push(Value::Array(rest));
    args
}

impl Converter<'_> {
    /// Validates already-packed arguments against `sig`.
    pub fn validate_args(&self, sig: &Signature, args: &[Value]) -> Result<(), ConvertError> {
        if let Some(idx) = sig.misplaced_variadic() {
            return Err(ConvertError::Validation(format!(
                "arg{} ({}): variadic parameter must be last",
                idx, sig.params[idx]
            )));
        }
        if args.len() != sig.params.len() {
            return Err(ConvertError::Arity {
                expected: sig.params.len(),
                found: args.len(),
            });
        }
        for (idx, (param, arg)) in sig.params.iter().zip(args).enumerate() {
            self.resolve_param(&sig.params, idx)
                .and_then(|ty| self.validate_resolved(&ty, arg))
                .map_err(|e| e.within(format!("arg{} ({})", idx, param)))?;
        }
        Ok(())
    }

    pub fn encode_args(&self, sig: &Signature, args: &[Value]) -> Result<Vec<Value>, ConvertError> {
        args.iter()
            .take(sig.params.len())
            .enumerate()
            .map(|(idx, arg)| {
                let ty = self
                    .resolve_param(&sig.params, idx)
                    .map_err(|e| ConvertError::Encode(e.to_string()))?;
                self.encode_resolved(&ty, arg)
                    .map_err(|e| e.within(format!("arg{}", idx)))
            })
            .collect()
    }

    /// Validates a successful wire result against the result shape.
    pub fn validate_result(&self, sig: &Signature, result: &Value) -> Result<(), ConvertError> {
        match sig.result_shape() {
            ResultShape::Unit => match result {
                Value::Nil => Ok(()),
                _ => Err(ConvertError::Validation("expected nil result".to_string())),
            },
            ResultShape::Single(ty) => self
                .validate(&ty, result)
                .map_err(|e| e.within(format!("result ({})", ty))),
            ResultShape::Tuple(types) => {
                let items = tuple_items(&types, result).map_err(ConvertError::Validation)?;
                for (idx, (ty, item)) in types.iter().zip(items).enumerate() {
                    self.validate(ty, item)
                        .map_err(|e| e.within(format!("result{} ({})", idx, ty)))?;
                }
                Ok(())
            }
        }
    }

    pub fn decode_result(&self, sig: &Signature, result: &Value) -> Result<Value, ConvertError> {
        match sig.result_shape() {
            ResultShape::Unit => Ok(Value::Nil),
            ResultShape::Single(ty) => self.decode(&ty, result),
            ResultShape::Tuple(types) => {
                let items = tuple_items(&types, result).map_err(ConvertError::Decode)?;
                types
                    .iter()
                    .zip(items)
                    .enumerate()
                    .map(|(idx, (ty, item))| {
                        self.decode(ty, item)
                            .map_err(|e| e.within(format!("result{}", idx)))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
        }
    }
}

fn tuple_items<'v>(types: &[String], result: &'v Value) -> Result<&'v [Value], String> {
    match result {
        Value::Array(items) if items.len() == types.len() => Ok(items),
        Value::Array(items) => Err(format!(
            "expected {} results, got {}",
            types.len(),
            items.len()
        )),
        _ => Err(format!("expected {} results as a sequence", types.len())),
    }
}
