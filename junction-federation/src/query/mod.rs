//! The composite query tree.
//!
//! Parsing query text is left to callers; they hand over name-based [`Selection`]s which
//! [`Query::resolve`] checks against the [`CompositeSchema`].

pub mod split;

use std::borrow::Cow;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::QueryError;
use crate::schema::CompositeSchema;
use crate::schema::FieldCoordinate;

/// Root operation of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }
}

/// A field selection as written by the client, before it is checked against the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub arguments: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selections: Vec<Selection>,
}

impl Selection {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: IndexMap::new(),
            selections: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn select(mut self, selections: impl IntoIterator<Item = Selection>) -> Self {
        self.selections.extend(selections);
        self
    }
}

/// A query resolved against the composite schema. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    kind: OperationKind,
    roots: Vec<QueryField>,
}

/// A node of the composite query tree.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryField {
    alias: Option<String>,
    coordinate: FieldCoordinate,
    arguments: IndexMap<String, Value>,
    target_type: String,
    list: bool,
    mandatory: bool,
    object_valued: bool,
    selections: Vec<QueryField>,
}

impl Query {
    /// Checks `selections` against the root type of `kind` and builds the query tree.
    pub fn resolve(
        schema: &CompositeSchema,
        kind: OperationKind,
        selections: impl IntoIterator<Item = Selection>,
    ) -> Result<Self, QueryError> {
        let root_type = match kind {
            OperationKind::Query => schema.query_type(),
            OperationKind::Mutation => schema
                .mutation_type()
                .ok_or_else(|| QueryError::UnsupportedOperation(kind.as_str().to_string()))?,
        };

        let roots = resolve_selection_set(schema, root_type, selections)?;

        Ok(Self { kind, roots })
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Root fields; their response keys are the branches of the `data` object.
    pub fn roots(&self) -> &[QueryField] {
        &self.roots
    }
}

fn resolve_selection_set(
    schema: &CompositeSchema,
    type_name: &str,
    selections: impl IntoIterator<Item = Selection>,
) -> Result<Vec<QueryField>, QueryError> {
    let mut fields = Vec::new();
    for selection in selections {
        let field = resolve_field(schema, type_name, selection)?;
        push_field(&mut fields, field)?;
    }
    Ok(fields)
}

/// Adds `field` to a selection set, merging it with a field answering the same response key.
fn push_field(fields: &mut Vec<QueryField>, field: QueryField) -> Result<(), QueryError> {
    let Some(existing) = fields
        .iter_mut()
        .find(|existing| existing.response_key() == field.response_key())
    else {
        fields.push(field);
        return Ok(());
    };

    if existing.coordinate != field.coordinate || existing.arguments != field.arguments {
        return Err(QueryError::ConflictingFields(field.response_key().to_string()));
    }
    for child in field.selections {
        push_field(&mut existing.selections, child)?;
    }
    Ok(())
}

fn resolve_field(
    schema: &CompositeSchema,
    type_name: &str,
    selection: Selection,
) -> Result<QueryField, QueryError> {
    let coordinate = FieldCoordinate::new(type_name, &selection.name);
    let field = schema
        .field(&coordinate)
        .ok_or_else(|| QueryError::InvalidField(selection.name.clone(), type_name.to_string()))?;
    let target_type = field.target_type().to_string();

    let selections = if field.is_object_valued() {
        if selection.selections.is_empty() {
            return Err(QueryError::MissingSelectionSet(selection.name, target_type));
        }
        resolve_selection_set(schema, &target_type, selection.selections)?
    } else if !selection.selections.is_empty() {
        return Err(QueryError::UnexpectedSelectionSet(
            selection.name,
            target_type,
        ));
    } else {
        Vec::new()
    };

    Ok(QueryField {
        alias: selection.alias,
        arguments: selection.arguments,
        list: field.is_list_valued(),
        mandatory: field.is_mandatory(),
        object_valued: field.is_object_valued(),
        coordinate,
        target_type,
        selections,
    })
}

impl QueryField {
    /// Key under which this field appears in the response: the alias, else the field name.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.coordinate.field_name)
    }

    pub fn name(&self) -> &str {
        &self.coordinate.field_name
    }

    /// Key under which a backend answers this field through its local field `display_name`.
    ///
    /// Aliased and parameterized fields are aliased in sub-queries as `<response key>_<display
    /// name>`: two selections of one backend field with different arguments keep apart.
    pub fn backend_key<'a>(&self, display_name: &'a str) -> Cow<'a, str> {
        if self.alias.is_none() && self.arguments.is_empty() {
            Cow::Borrowed(display_name)
        } else {
            Cow::Owned(format!("{}_{display_name}", self.response_key()))
        }
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn coordinate(&self) -> &FieldCoordinate {
        &self.coordinate
    }

    pub fn arguments(&self) -> &IndexMap<String, Value> {
        &self.arguments
    }

    /// Name of the type selections of this field apply to.
    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    pub fn is_list_valued(&self) -> bool {
        self.list
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_object_valued(&self) -> bool {
        self.object_valued
    }

    pub fn selections(&self) -> &[QueryField] {
        &self.selections
    }
}
