//! Schema construction and query resolution errors.
use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while building a [`crate::CompositeSchema`].
///
/// These are startup failures: a schema that builds successfully never produces them
/// while serving requests.
#[derive(Error, Debug, Display, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SchemaError {
    /// {0} are currently not supported by the composite schema
    UnsupportedFeature(String),
    /// unknown type '{type_name}' referenced by field '{field}'
    UnknownType {
        /// The missing type.
        type_name: String,
        /// The field referencing it.
        field: String,
    },
    /// unknown backend '{backend}' referenced by field '{field}'
    UnknownBackend {
        /// The missing backend.
        backend: String,
        /// The field referencing it.
        field: String,
    },
    /// field '{0}' is not realized by any backend
    UnownedField(String),
    /// invalid type reference '{0}'
    InvalidTypeReference(String),
    /// the root operation type '{0}' is not an object type
    InvalidRootType(String),
    /// invalid identity key on type '{type_name}': {reason}
    InvalidKey {
        /// The keyed type.
        type_name: String,
        /// Why the key was rejected.
        reason: String,
    },
}

/// Errors raised while resolving selections into a [`crate::Query`].
#[derive(Error, Debug, Display, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum QueryError {
    /// cannot query field '{0}' on type '{1}'
    InvalidField(String, String),
    /// field '{0}' of scalar type '{1}' must not have a selection set
    UnexpectedSelectionSet(String, String),
    /// field '{0}' of object type '{1}' must have a selection set
    MissingSelectionSet(String, String),
    /// the schema does not define a {0} root type
    UnsupportedOperation(String),
    /// fields answering the response key '{0}' differ in name or arguments
    ConflictingFields(String),
}
