use itertools::Itertools;
use std::fmt;

/// The Titan type lattice.
///
/// `Integer` and `Float` are distinct types with no implicit coercion; the
/// checker inserts explicit `Cast` nodes where it wants a conversion.
/// `Invalid` is the recovery type assigned where checking already failed; it
/// is compatible with everything so that one mistake does not cascade into a
/// storm of secondary diagnostics.
#[derive(Debug, Clone)]
pub enum Type {
    Nil,
    Boolean,
    Integer,
    Float,
    String,
    Array(Box<Type>),
    Function {
        params: Vec<Type>,
        rets: Vec<Type>,
    },
    Record {
        name: String,
        fields: Vec<(String, Type)>,
    },
    Invalid,
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Integer | Type::Float | Type::Invalid)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Integer | Type::Invalid)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float | Type::Invalid)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Type::String | Type::Invalid)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_) | Type::Invalid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Type::Invalid)
    }

    /// Compatibility for type checks: structural equality, except that the
    /// recovery type matches anything.
    pub fn matches(&self, other: &Type) -> bool {
        self.is_invalid() || other.is_invalid() || self == other
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Nil, Type::Nil)
            | (Type::Boolean, Type::Boolean)
            | (Type::Integer, Type::Integer)
            | (Type::Float, Type::Float)
            | (Type::String, Type::String)
            | (Type::Invalid, Type::Invalid) => true,
            (Type::Array(a), Type::Array(b)) => a == b,
            (
                Type::Function { params: p1, rets: r1 },
                Type::Function { params: p2, rets: r2 },
            ) => p1 == p2 && r1 == r2,
            // Records are nominal: duplicate record names are rejected at
            // declaration, so the name identifies the declaration.
            (Type::Record { name: a, .. }, Type::Record { name: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Nil => write!(f, "nil"),
            Type::Boolean => write!(f, "boolean"),
            Type::Integer => write!(f, "integer"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Array(elem) => write!(f, "{{{elem}}}"),
            Type::Function { params, rets } => write!(
                f,
                "({}) -> ({})",
                params.iter().join(", "),
                rets.iter().join(", ")
            ),
            Type::Record { name, .. } => write!(f, "{name}"),
            Type::Invalid => write!(f, "invalid type"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn integers_and_floats_are_distinct() {
        assert_ne!(Type::Integer, Type::Float);
        assert!(!Type::Integer.matches(&Type::Float));
    }

    #[test]
    fn arrays_compare_structurally() {
        assert_eq!(
            Type::Array(Box::new(Type::Integer)),
            Type::Array(Box::new(Type::Integer))
        );
        assert_ne!(
            Type::Array(Box::new(Type::Integer)),
            Type::Array(Box::new(Type::Float))
        );
    }

    #[test]
    fn records_compare_by_name() {
        let a = Type::Record {
            name: "Point".into(),
            fields: vec![("x".into(), Type::Float)],
        };
        let b = Type::Record {
            name: "Point".into(),
            fields: vec![],
        };
        let c = Type::Record {
            name: "Vec".into(),
            fields: vec![],
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn invalid_matches_everything() {
        assert!(Type::Invalid.matches(&Type::String));
        assert!(Type::Float.matches(&Type::Invalid));
        assert_ne!(Type::Invalid, Type::String);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Type::Integer.to_string(), "integer");
        assert_eq!(Type::Array(Box::new(Type::Float)).to_string(), "{float}");
        assert_eq!(
            Type::Function {
                params: vec![Type::Integer, Type::String],
                rets: vec![Type::Boolean],
            }
            .to_string(),
            "(integer, string) -> (boolean)"
        );
    }
}
