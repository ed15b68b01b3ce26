//! Composite schema model and query splitting for the junction gateway.
//!
//! A composite schema is the union of several backend schemas. This crate knows, for every
//! composite field, which backends realize it and under which local names, which object types
//! carry an identity key, and how a composite query is partitioned into one sub-query per backend.
//! Executing those sub-queries and merging their results lives in `junction-router`.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod error;
pub mod query;
pub mod schema;

pub use error::QueryError;
pub use error::SchemaError;
pub use query::split::split;
pub use query::split::SubField;
pub use query::split::SubQuery;
pub use query::OperationKind;
pub use query::Query;
pub use query::QueryField;
pub use query::Selection;
pub use schema::Backend;
pub use schema::CompositeSchema;
pub use schema::FieldCoordinate;
pub use schema::FieldDefinition;
pub use schema::FieldType;
pub use schema::IdentityKey;
pub use schema::KeyEvaluationError;
pub use schema::KeyValue;
pub use schema::LocalName;
pub use schema::ObjectType;
pub use schema::SchemaDefinition;
