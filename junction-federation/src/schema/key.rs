use displaydoc::Display;
use serde_json::Value;
use thiserror::Error;

use super::CompositeSchema;
use super::FieldCoordinate;

/// The identity key declared on an object type.
///
/// Two fragments of the type, possibly coming from different backends, denote the same entity
/// when their key fields evaluate to the same [`KeyValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKey {
    type_name: String,
    fields: Vec<String>,
}

/// Equality token produced by evaluating an [`IdentityKey`]. Never displayed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyValue(String);

/// cannot evaluate the identity key of '{type_name}' on a fragment from '{backend}': {reason}
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub struct KeyEvaluationError {
    /// The keyed type.
    pub type_name: String,
    /// The backend that produced the fragment.
    pub backend: String,
    /// What was wrong with the fragment.
    pub reason: String,
}

impl IdentityKey {
    pub(crate) fn new(type_name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Composite field names making up the key, in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Evaluates the key on a fragment returned by `backend`.
    ///
    /// Key fields are looked up through the backend's local names. Scalar components are
    /// compared by their textual form so that an `ID` serialized as `1` by one backend and as
    /// `"1"` by another still denotes one entity.
    pub fn evaluate(
        &self,
        schema: &CompositeSchema,
        backend: &str,
        fragment: &Value,
    ) -> Result<KeyValue, KeyEvaluationError> {
        let object = fragment.as_object().ok_or_else(|| KeyEvaluationError {
            type_name: self.type_name.clone(),
            backend: backend.to_string(),
            reason: format!("expected an object, got {fragment}"),
        })?;

        let mut components = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let coordinate = FieldCoordinate::new(&self.type_name, field);
            let component = schema
                .local_names(backend, &coordinate)
                .iter()
                .filter_map(|local_name| object.get(local_name.field_name()))
                .find(|value| !value.is_null())
                .ok_or_else(|| KeyEvaluationError {
                    type_name: self.type_name.clone(),
                    backend: backend.to_string(),
                    reason: format!("key field '{field}' is missing or null"),
                })?;
            components.push(match component {
                Value::String(s) => Value::String(s.clone()),
                Value::Number(n) => Value::String(n.to_string()),
                Value::Bool(b) => Value::String(b.to_string()),
                other => other.clone(),
            });
        }

        Ok(KeyValue(Value::Array(components).to_string()))
    }
}
