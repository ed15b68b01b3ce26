//! The composite schema model.
//!
//! Built once at startup from a [`SchemaDefinition`] and the known backends, then shared
//! read-only between requests.

mod backend;
mod definition;
mod field_type;
mod key;

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use indexmap::IndexSet;

pub use self::backend::Backend;
pub use self::backend::LocalName;
pub use self::definition::FieldDefinitionSpec;
pub use self::definition::SchemaDefinition;
pub use self::definition::TypeDefinition;
pub use self::field_type::FieldType;
pub use self::key::IdentityKey;
pub use self::key::KeyEvaluationError;
pub use self::key::KeyValue;
use crate::error::SchemaError;

const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

/// Identifies a field of an object type, `Type.field`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldCoordinate {
    pub type_name: String,
    pub field_name: String,
}

impl FieldCoordinate {
    pub fn new(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }
}

impl fmt::Display for FieldCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

/// A field of the composite schema and the backends realizing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    coordinate: FieldCoordinate,
    ty: FieldType,
    object_valued: bool,
    realizations: IndexMap<String, Vec<LocalName>>,
}

impl FieldDefinition {
    pub fn coordinate(&self) -> &FieldCoordinate {
        &self.coordinate
    }

    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    /// Name of the type values of this field belong to.
    pub fn target_type(&self) -> &str {
        self.ty.inner_type_name()
    }

    pub fn is_list_valued(&self) -> bool {
        self.ty.is_list()
    }

    pub fn is_mandatory(&self) -> bool {
        self.ty.is_non_null()
    }

    pub fn is_object_valued(&self) -> bool {
        self.object_valued
    }

    /// Backend names realizing this field, in declaration order.
    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.realizations.keys().map(String::as_str)
    }

    pub fn local_names(&self, backend: &str) -> &[LocalName] {
        self.realizations
            .get(backend)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// An object type of the composite schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectType {
    name: String,
    fields: IndexMap<String, FieldDefinition>,
    key: Option<IdentityKey>,
}

impl ObjectType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    pub fn identity_key(&self) -> Option<&IdentityKey> {
        self.key.as_ref()
    }
}

/// The union of several backend schemas.
#[derive(Debug, Clone)]
pub struct CompositeSchema {
    backends: IndexMap<String, Backend>,
    object_types: IndexMap<String, ObjectType>,
    query_type: String,
    mutation_type: Option<String>,
}

impl CompositeSchema {
    /// Validates `definition` against the known backends and builds the model.
    pub fn build(
        definition: &SchemaDefinition,
        backends: impl IntoIterator<Item = Backend>,
    ) -> Result<Self, SchemaError> {
        let backends: IndexMap<String, Backend> = backends
            .into_iter()
            .map(|backend| (backend.name().to_string(), backend))
            .collect();

        // custom scalars and enums are leaves: values pass through the merge untouched
        let mut leaf_names = HashSet::new();
        let mut object_names = HashSet::new();
        for (name, ty) in &definition.types {
            match ty {
                TypeDefinition::Object { .. } => {
                    object_names.insert(name.as_str());
                }
                TypeDefinition::Scalar | TypeDefinition::Enum { .. } => {
                    leaf_names.insert(name.as_str());
                }
                TypeDefinition::Union { .. } => {
                    return Err(SchemaError::UnsupportedFeature(format!(
                        "Union types such as '{name}'"
                    )));
                }
                TypeDefinition::Interface { .. } => {
                    return Err(SchemaError::UnsupportedFeature(format!(
                        "Interfaces such as '{name}'"
                    )));
                }
            }
        }

        if !object_names.contains(definition.query.as_str()) {
            return Err(SchemaError::InvalidRootType(definition.query.clone()));
        }
        if let Some(mutation) = &definition.mutation {
            if !object_names.contains(mutation.as_str()) {
                return Err(SchemaError::InvalidRootType(mutation.clone()));
            }
        }
        if let Some(subscription) = &definition.subscription {
            match definition.types.get(subscription) {
                Some(TypeDefinition::Object { fields, .. }) if fields.is_empty() => {}
                Some(TypeDefinition::Object { .. }) => {
                    return Err(SchemaError::UnsupportedFeature("Subscriptions".to_string()));
                }
                _ => return Err(SchemaError::InvalidRootType(subscription.clone())),
            }
        }

        let is_known_type = |name: &str| {
            BUILTIN_SCALARS.contains(&name)
                || leaf_names.contains(name)
                || object_names.contains(name)
        };

        let mut object_types = IndexMap::new();
        for (type_name, ty) in &definition.types {
            let TypeDefinition::Object { key, fields } = ty else {
                continue;
            };

            let mut object = ObjectType {
                name: type_name.clone(),
                fields: IndexMap::new(),
                key: None,
            };
            for (field_name, spec) in fields {
                let coordinate = FieldCoordinate::new(type_name, field_name);
                let ty: FieldType = spec.ty.parse()?;
                let target = ty.inner_type_name();
                if !is_known_type(target) {
                    return Err(SchemaError::UnknownType {
                        type_name: target.to_string(),
                        field: coordinate.to_string(),
                    });
                }

                let mut realizations = IndexMap::new();
                for (backend, local_names) in &spec.backends {
                    if !backends.contains_key(backend) {
                        return Err(SchemaError::UnknownBackend {
                            backend: backend.clone(),
                            field: coordinate.to_string(),
                        });
                    }
                    let local_names: IndexSet<LocalName> =
                        local_names.iter().map(LocalName::new).collect();
                    if !local_names.is_empty() {
                        realizations.insert(backend.clone(), local_names.into_iter().collect());
                    }
                }
                if realizations.is_empty() {
                    return Err(SchemaError::UnownedField(coordinate.to_string()));
                }

                object.fields.insert(
                    field_name.clone(),
                    FieldDefinition {
                        object_valued: object_names.contains(target),
                        coordinate,
                        ty,
                        realizations,
                    },
                );
            }
            if let Some(key_fields) = key {
                object.key = Some(validate_key(&object, key_fields)?);
            }
            object_types.insert(type_name.clone(), object);
        }

        tracing::debug!(
            backends = backends.len(),
            object_types = object_types.len(),
            "composite schema built"
        );

        Ok(Self {
            backends,
            object_types,
            query_type: definition.query.clone(),
            mutation_type: definition.mutation.clone(),
        })
    }

    pub fn backends(&self) -> impl Iterator<Item = &Backend> {
        self.backends.values()
    }

    pub fn backend(&self, name: &str) -> Option<&Backend> {
        self.backends.get(name)
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn mutation_type(&self) -> Option<&str> {
        self.mutation_type.as_deref()
    }

    pub fn object_type(&self, name: &str) -> Option<&ObjectType> {
        self.object_types.get(name)
    }

    pub fn field(&self, coordinate: &FieldCoordinate) -> Option<&FieldDefinition> {
        self.object_types
            .get(&coordinate.type_name)?
            .field(&coordinate.field_name)
    }

    /// Backends able to answer `coordinate`.
    pub fn owner_backends<'a>(
        &'a self,
        coordinate: &FieldCoordinate,
    ) -> impl Iterator<Item = &'a Backend> + 'a {
        self.field(coordinate)
            .into_iter()
            .flat_map(|field| field.owners())
            .filter_map(|name| self.backends.get(name))
    }

    /// Local names realizing `coordinate` on `backend`; empty when the backend does not own it.
    pub fn local_names(&self, backend: &str, coordinate: &FieldCoordinate) -> &[LocalName] {
        self.field(coordinate)
            .map(|field| field.local_names(backend))
            .unwrap_or_default()
    }

    pub fn is_list_valued(&self, coordinate: &FieldCoordinate) -> bool {
        self.field(coordinate)
            .map(FieldDefinition::is_list_valued)
            .unwrap_or_default()
    }

    pub fn is_object_valued(&self, coordinate: &FieldCoordinate) -> bool {
        self.field(coordinate)
            .map(FieldDefinition::is_object_valued)
            .unwrap_or_default()
    }

    pub fn identity_key(&self, type_name: &str) -> Option<&IdentityKey> {
        self.object_types.get(type_name)?.identity_key()
    }
}

fn validate_key(object: &ObjectType, key_fields: &[String]) -> Result<IdentityKey, SchemaError> {
    let invalid = |reason: String| SchemaError::InvalidKey {
        type_name: object.name.clone(),
        reason,
    };

    if key_fields.is_empty() {
        return Err(invalid("the key has no fields".to_string()));
    }

    let mut realizing_backends: IndexSet<&str> = IndexSet::new();
    for field in object.fields.values() {
        realizing_backends.extend(field.owners());
    }

    for key_field in key_fields {
        let field = object
            .fields
            .get(key_field)
            .ok_or_else(|| invalid(format!("key field '{key_field}' does not exist")))?;
        if field.is_object_valued() || field.is_list_valued() {
            return Err(invalid(format!("key field '{key_field}' must be a scalar")));
        }
        if let Some(backend) = realizing_backends
            .iter()
            .find(|backend| field.local_names(backend).is_empty())
        {
            return Err(invalid(format!(
                "backend '{backend}' realizes '{}' but not its key field '{key_field}'",
                object.name
            )));
        }
    }

    Ok(IdentityKey::new(&object.name, key_fields.to_vec()))
}

#[cfg(test)]
pub(crate) mod tests {
    use test_log::test;

    use super::*;

    pub(crate) const PEOPLE_SCHEMA: &str = include_str!("testdata/people.yaml");

    pub(crate) fn people_backends() -> Vec<Backend> {
        vec![
            Backend::new("hr", "http://localhost:4001/graphql"),
            Backend::new("crm", "http://localhost:4002/graphql"),
        ]
    }

    pub(crate) fn people_schema() -> CompositeSchema {
        let definition: SchemaDefinition = serde_yaml::from_str(PEOPLE_SCHEMA).unwrap();
        CompositeSchema::build(&definition, people_backends()).unwrap()
    }

    fn build(yaml: &str) -> Result<CompositeSchema, SchemaError> {
        let definition: SchemaDefinition = serde_yaml::from_str(yaml).unwrap();
        CompositeSchema::build(&definition, people_backends())
    }

    #[test]
    fn ownership_lookups() {
        let schema = people_schema();
        let people = FieldCoordinate::new("Query", "people");
        let owners: Vec<&str> = schema.owner_backends(&people).map(Backend::name).collect();
        assert_eq!(owners, vec!["hr", "crm"]);
        assert!(schema.is_list_valued(&people));
        assert!(schema.is_object_valued(&people));

        let emails = FieldCoordinate::new("Person", "emails");
        assert_eq!(
            schema.local_names("crm", &emails),
            &[
                LocalName::new("Customer.email"),
                LocalName::new("Customer.workEmail")
            ]
        );
        assert!(schema.local_names("hr", &emails).is_empty());
        assert!(!schema.is_object_valued(&emails));

        let status = FieldCoordinate::new("Person", "status");
        assert!(!schema.is_object_valued(&status));
        assert!(schema.object_type("Status").is_none());

        assert_eq!(
            schema.identity_key("Person").map(IdentityKey::fields),
            Some(&["id".to_string()][..])
        );
        assert!(schema.identity_key("Office").is_none());
    }

    #[test]
    fn mandatory_and_list_multiplicities() {
        let schema = people_schema();
        let people = schema
            .field(&FieldCoordinate::new("Query", "people"))
            .unwrap();
        assert!(people.is_mandatory());
        assert_eq!(people.target_type(), "Person");

        let person = schema
            .field(&FieldCoordinate::new("Query", "person"))
            .unwrap();
        assert!(!person.is_mandatory());
        assert!(!person.is_list_valued());
    }

    #[test]
    fn unions_are_unsupported() {
        let err = build(
            r#"
types:
  Query:
    kind: object
    fields:
      a: { type: String, backends: { hr: [Query.a] } }
  SearchResult:
    kind: union
    members: [Query]
"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnsupportedFeature("Union types such as 'SearchResult'".to_string())
        );
    }

    #[test]
    fn interfaces_are_unsupported() {
        let err = build(
            r#"
types:
  Query:
    kind: object
    fields:
      a: { type: String, backends: { hr: [Query.a] } }
  Node:
    kind: interface
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedFeature(_)));
    }

    #[test]
    fn subscriptions_with_fields_are_unsupported() {
        let err = build(
            r#"
subscription: Subscription
types:
  Query:
    kind: object
    fields:
      a: { type: String, backends: { hr: [Query.a] } }
  Subscription:
    kind: object
    fields:
      ticks: { type: Int, backends: { hr: [Subscription.ticks] } }
"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnsupportedFeature("Subscriptions".to_string())
        );
    }

    #[test]
    fn unowned_fields_are_rejected() {
        let err = build(
            r#"
types:
  Query:
    kind: object
    fields:
      a: { type: String }
"#,
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::UnownedField("Query.a".to_string()));
    }

    #[test]
    fn unknown_backends_and_types_are_rejected() {
        let err = build(
            r#"
types:
  Query:
    kind: object
    fields:
      a: { type: String, backends: { billing: [Query.a] } }
"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownBackend {
                backend: "billing".to_string(),
                field: "Query.a".to_string()
            }
        );

        let err = build(
            r#"
types:
  Query:
    kind: object
    fields:
      a: { type: "[Widget]", backends: { hr: [Query.a] } }
"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownType {
                type_name: "Widget".to_string(),
                field: "Query.a".to_string()
            }
        );
    }

    #[test]
    fn key_must_be_realized_by_every_backend_of_the_type() {
        let err = build(
            r#"
types:
  Query:
    kind: object
    fields:
      people: { type: "[Person]", backends: { hr: [Query.people], crm: [Query.people] } }
  Person:
    kind: object
    key: [id]
    fields:
      id: { type: ID, backends: { hr: [Person.id] } }
      age: { type: Int, backends: { crm: [Person.age] } }
"#,
        )
        .unwrap_err();
        assert!(
            matches!(&err, SchemaError::InvalidKey { type_name, reason }
                if type_name == "Person" && reason.contains("'crm'")),
            "{err}"
        );
    }

    #[test]
    fn missing_query_root_is_rejected() {
        let err = build(
            r#"
query: Root
types:
  Query:
    kind: object
    fields:
      a: { type: String, backends: { hr: [Query.a] } }
"#,
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::InvalidRootType("Root".to_string()));
    }
}
