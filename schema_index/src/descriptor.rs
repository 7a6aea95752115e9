//! Type-descriptor grammar.
//!
//! A descriptor is a base type name preceded by zero or more prefix
//! operators, read outer-to-inner: `*[]map[string]Person` is an optional
//! sequence of string-keyed maps of `Person`. `[]byte` is a terminal base.

use std::fmt;

pub const BYTES: &str = "[]byte";

/// Prefix operator of a type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeOp {
    /// `*T`
    Optional,
    /// `...T`, outermost operator of the final parameter only
    Variadic,
    /// `[]T`
    Sequence,
    /// `map[string]T`
    StringMap,
}

impl TypeOp {
    pub fn prefix(&self) -> &'static str {
        match self {
            TypeOp::Optional => "*",
            TypeOp::Variadic => "...",
            TypeOp::Sequence => "[]",
            TypeOp::StringMap => "map[string]",
        }
    }

    fn split(text: &str) -> Option<(TypeOp, &str)> {
        if text == BYTES {
            return None;
        }
        [
            TypeOp::Optional,
            TypeOp::Variadic,
            TypeOp::Sequence,
            TypeOp::StringMap,
        ]
        .into_iter()
        .find_map(|op| text.strip_prefix(op.prefix()).map(|rest| (op, rest.trim())))
    }
}

/// Parsed type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    pub ops: Vec<TypeOp>,
    pub base: String,
}

impl TypeDescriptor {
    pub fn parse(text: &str) -> Self {
        let mut ops = Vec::new();
        let mut rest = text.trim();
        while let Some((op, inner)) = TypeOp::split(rest) {
            ops.push(op);
            rest = inner;
        }
        Self {
            ops,
            base: rest.to_string(),
        }
    }

    /// Outermost operator and the descriptor it applies to.
    pub fn peel(&self) -> Option<(TypeOp, TypeDescriptor)> {
        let (first, rest) = self.ops.split_first()?;
        Some((
            *first,
            TypeDescriptor {
                ops: rest.to_vec(),
                base: self.base.clone(),
            },
        ))
    }

    pub fn is_variadic(&self) -> bool {
        self.ops.first() == Some(&TypeOp::Variadic)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.ops {
            f.write_str(op.prefix())?;
        }
        f.write_str(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_outer_to_inner() {
        let desc = TypeDescriptor::parse("*[]map[string]Person");
        assert_eq!(
            desc.ops,
            vec![TypeOp::Optional, TypeOp::Sequence, TypeOp::StringMap]
        );
        assert_eq!(desc.base, "Person");
        assert_eq!(desc.to_string(), "*[]map[string]Person");
    }

    #[test]
    fn test_bytes_is_terminal() {
        let desc = TypeDescriptor::parse("[]byte");
        assert!(desc.ops.is_empty());
        assert_eq!(desc.base, BYTES);

        let desc = TypeDescriptor::parse("[][]byte");
        assert_eq!(desc.ops, vec![TypeOp::Sequence]);
        assert_eq!(desc.base, BYTES);
    }

    #[test]
    fn test_whitespace_is_ignored() {
        let desc = TypeDescriptor::parse("  * Person ");
        assert_eq!(desc.ops, vec![TypeOp::Optional]);
        assert_eq!(desc.base, "Person");
    }

    #[test]
    fn test_variadic_and_peel() {
        let desc = TypeDescriptor::parse("...any");
        assert!(desc.is_variadic());
        let (op, inner) = desc.peel().unwrap();
        assert_eq!(op, TypeOp::Variadic);
        assert_eq!(inner.base, "any");
        assert!(inner.peel().is_none());
    }
}
