use std::str::FromStr;

use crate::error::SchemaError;

// Primitives are taken from scalars: https://spec.graphql.org/draft/#sec-Scalars
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Named type {0}
    Named(String),
    /// List type {0}
    List(Box<FieldType>),
    /// Non null type {0}
    NonNull(Box<FieldType>),
    /// String
    String,
    /// Int
    Int,
    /// Float
    Float,
    /// Id
    Id,
    /// Boolean
    Boolean,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Named(ty) => write!(f, "{ty}"),
            FieldType::List(ty) => write!(f, "[{ty}]"),
            FieldType::NonNull(ty) => write!(f, "{ty}!"),
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Id => write!(f, "ID"),
            FieldType::Boolean => write!(f, "Boolean"),
        }
    }
}

impl FieldType {
    /// return the name of the type on which selections happen
    ///
    /// Example if we get the field `list: [User!]!`, it will return "User"
    pub fn inner_type_name(&self) -> &str {
        match self {
            FieldType::Named(name) => name.as_str(),
            FieldType::List(inner) | FieldType::NonNull(inner) => inner.inner_type_name(),
            FieldType::String => "String",
            FieldType::Int => "Int",
            FieldType::Float => "Float",
            FieldType::Id => "ID",
            FieldType::Boolean => "Boolean",
        }
    }

    pub fn is_builtin_scalar(&self) -> bool {
        match self {
            FieldType::Named(_) | FieldType::List(_) | FieldType::NonNull(_) => false,
            FieldType::String
            | FieldType::Int
            | FieldType::Float
            | FieldType::Id
            | FieldType::Boolean => true,
        }
    }

    /// Whether a list wrapper appears anywhere in the reference.
    pub fn is_list(&self) -> bool {
        match self {
            FieldType::List(_) => true,
            FieldType::NonNull(inner) => inner.is_list(),
            _ => false,
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, FieldType::NonNull(_))
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    // Spec: https://spec.graphql.org/draft/#sec-Type-References
    fn from_str(reference: &str) -> Result<Self, Self::Err> {
        parse_reference(reference.trim())
            .ok_or_else(|| SchemaError::InvalidTypeReference(reference.to_string()))
    }
}

fn parse_reference(reference: &str) -> Option<FieldType> {
    if let Some(inner) = reference.strip_suffix('!') {
        let inner = parse_reference(inner.trim_end())?;
        // `T!!` is not a valid reference
        if inner.is_non_null() {
            return None;
        }
        return Some(FieldType::NonNull(Box::new(inner)));
    }
    if let Some(rest) = reference.strip_prefix('[') {
        let inner = rest.strip_suffix(']')?;
        return Some(FieldType::List(Box::new(parse_reference(inner.trim())?)));
    }
    if !is_valid_name(reference) {
        return None;
    }
    Some(match reference {
        "String" => FieldType::String,
        "Int" => FieldType::Int,
        "Float" => FieldType::Float,
        "ID" => FieldType::Id,
        "Boolean" => FieldType::Boolean,
        _ => FieldType::Named(reference.to_string()),
    })
}

// Spec: https://spec.graphql.org/draft/#Name
pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_references() {
        let ty: FieldType = "[Person!]!".parse().unwrap();
        assert_eq!(
            ty,
            FieldType::NonNull(Box::new(FieldType::List(Box::new(FieldType::NonNull(
                Box::new(FieldType::Named("Person".to_string()))
            )))))
        );
        assert!(ty.is_list());
        assert!(ty.is_non_null());
        assert_eq!(ty.inner_type_name(), "Person");
        assert_eq!(ty.to_string(), "[Person!]!");
    }

    #[test]
    fn builtin_scalars_are_recognized() {
        let ty: FieldType = "ID!".parse().unwrap();
        assert_eq!(ty, FieldType::NonNull(Box::new(FieldType::Id)));
        assert!(!ty.is_list());
        assert!(FieldType::Boolean.is_builtin_scalar());
        assert!(!FieldType::Named("Url".into()).is_builtin_scalar());
    }

    #[test]
    fn rejects_malformed_references() {
        for reference in ["", "[Person", "Person]", "Person!!", "[]", "9lives", "Per son"] {
            assert_eq!(
                reference.parse::<FieldType>(),
                Err(SchemaError::InvalidTypeReference(reference.to_string())),
                "{reference} should be rejected"
            );
        }
    }
}
