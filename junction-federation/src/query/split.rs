//! Partitioning a composite query into one sub-query per backend.

use std::fmt;
use std::fmt::Write as _;

use indexmap::IndexMap;
use serde_json::Value;

use super::OperationKind;
use super::Query;
use super::QueryField;
use crate::schema::Backend;
use crate::schema::CompositeSchema;
use crate::schema::FieldCoordinate;

/// The part of a query one backend answers, spelled with that backend's local names.
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    kind: OperationKind,
    fields: Vec<SubField>,
}

/// A field of a [`SubQuery`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubField {
    alias: Option<String>,
    name: String,
    arguments: IndexMap<String, Value>,
    selections: Vec<SubField>,
}

/// Splits `query` into sub-queries keyed by backend name, in backend declaration order.
///
/// A backend takes part in a node when it realizes the field and, for object-valued fields,
/// when it realizes at least one selected field below it. Backends with nothing to answer get
/// no sub-query.
pub fn split(query: &Query, schema: &CompositeSchema) -> IndexMap<String, SubQuery> {
    let root_type = match query.kind() {
        OperationKind::Query => schema.query_type(),
        OperationKind::Mutation => schema.mutation_type().unwrap_or_default(),
    };

    schema
        .backends()
        .filter_map(|backend| {
            let fields = project(schema, backend, root_type, query.roots());
            if fields.is_empty() {
                return None;
            }
            tracing::trace!(backend = backend.name(), "backend takes part in the query");
            Some((
                backend.name().to_string(),
                SubQuery {
                    kind: query.kind(),
                    fields,
                },
            ))
        })
        .collect()
}

fn project(
    schema: &CompositeSchema,
    backend: &Backend,
    type_name: &str,
    nodes: &[QueryField],
) -> Vec<SubField> {
    let mut fields = Vec::new();
    for node in nodes {
        let local_names = schema.local_names(backend.name(), node.coordinate());
        if local_names.is_empty() {
            continue;
        }

        let selections = if node.is_object_valued() {
            let children = project(schema, backend, node.target_type(), node.selections());
            if children.is_empty() {
                continue;
            }
            children
        } else {
            Vec::new()
        };

        for local_name in local_names {
            let name = backend.display_name(local_name);
            let key = node.backend_key(name);
            insert_field(
                &mut fields,
                SubField {
                    alias: (key != name).then(|| key.into_owned()),
                    name: name.to_string(),
                    arguments: node.arguments().clone(),
                    selections: selections.clone(),
                },
            );
        }
    }

    // fusion needs the key on every fragment, under its bare display name
    if !fields.is_empty() {
        if let Some(key) = schema.identity_key(type_name) {
            for key_field in key.fields() {
                let coordinate = FieldCoordinate::new(type_name, key_field);
                for local_name in schema.local_names(backend.name(), &coordinate) {
                    insert_field(
                        &mut fields,
                        SubField {
                            alias: None,
                            name: backend.display_name(local_name).to_string(),
                            arguments: IndexMap::new(),
                            selections: Vec::new(),
                        },
                    );
                }
            }
        }
    }

    fields
}

/// Adds `field`, folding it into an existing field that asks the backend the same question.
fn insert_field(fields: &mut Vec<SubField>, field: SubField) {
    match fields.iter_mut().find(|existing| {
        existing.response_key() == field.response_key()
            && existing.name == field.name
            && existing.arguments == field.arguments
    }) {
        Some(existing) => {
            for selection in field.selections {
                insert_field(&mut existing.selections, selection);
            }
        }
        None => fields.push(field),
    }
}

impl SubQuery {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn fields(&self) -> &[SubField] {
        &self.fields
    }
}

impl SubField {
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The backend display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of this field in the backend's response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn arguments(&self) -> &IndexMap<String, Value> {
        &self.arguments
    }

    pub fn selections(&self) -> &[SubField] {
        &self.selections
    }
}

impl fmt::Display for SubQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        f.write_char(' ')?;
        write_selection_set(f, &self.fields)
    }
}

fn write_selection_set(f: &mut fmt::Formatter<'_>, fields: &[SubField]) -> fmt::Result {
    f.write_char('{')?;
    for field in fields {
        f.write_char(' ')?;
        if let Some(alias) = &field.alias {
            write!(f, "{alias}: ")?;
        }
        f.write_str(&field.name)?;
        if !field.arguments.is_empty() {
            f.write_char('(')?;
            for (i, (name, value)) in field.arguments.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{name}: ")?;
                write_literal(f, value)?;
            }
            f.write_char(')')?;
        }
        if !field.selections.is_empty() {
            f.write_char(' ')?;
            write_selection_set(f, &field.selections)?;
        }
    }
    f.write_str(" }")
}

// Spec: https://spec.graphql.org/draft/#sec-Input-Values
fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Array(items) => {
            f.write_char('[')?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_literal(f, item)?;
            }
            f.write_char(']')
        }
        Value::Object(object) => {
            f.write_char('{')?;
            for (i, (name, item)) in object.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{name}: ")?;
                write_literal(f, item)?;
            }
            f.write_char('}')
        }
        // JSON scalars, strings included, are valid GraphQL literals
        scalar => write!(f, "{scalar}"),
    }
}
