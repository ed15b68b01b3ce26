//! Declarative description of a composite schema.
//!
//! ```yaml
//! query: Query
//! types:
//!   Query:
//!     kind: object
//!     fields:
//!       people:
//!         type: "[Person!]!"
//!         backends:
//!           hr: [Query.employees]
//!           crm: [Query.customers]
//!   Person:
//!     kind: object
//!     key: [id]
//!     fields:
//!       id:
//!         type: ID!
//!         backends:
//!           hr: [Employee.id]
//!           crm: [Customer.customerId]
//! ```
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// The composite schema: root operation types and every named type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SchemaDefinition {
    /// Name of the query root type
    #[serde(default = "default_query_type")]
    pub query: String,

    /// Name of the mutation root type, if any
    #[serde(default)]
    pub mutation: Option<String>,

    /// Name of the subscription root type, if any. Subscriptions with fields are rejected.
    #[serde(default)]
    pub subscription: Option<String>,

    /// Named types of the composite schema
    #[serde(default)]
    pub types: IndexMap<String, TypeDefinition>,
}

fn default_query_type() -> String {
    "Query".to_string()
}

/// A named type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDefinition {
    /// An object type whose fields are realized by one or more backends
    Object {
        /// Fields making up the identity key of this type
        #[serde(default)]
        key: Option<Vec<String>>,
        /// Fields of the type
        #[serde(default)]
        fields: IndexMap<String, FieldDefinitionSpec>,
    },
    /// A custom scalar, passed through as-is
    Scalar,
    /// An enum
    Enum {
        /// Enum literals
        #[serde(default)]
        values: Vec<String>,
    },
    /// A union type (unsupported)
    Union {
        /// Member types
        #[serde(default)]
        members: Vec<String>,
    },
    /// An interface type (unsupported)
    Interface {
        /// Fields of the interface
        #[serde(default)]
        fields: IndexMap<String, FieldDefinitionSpec>,
    },
}

/// A field of an object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FieldDefinitionSpec {
    /// GraphQL type reference, e.g. `[Person!]!`
    #[serde(rename = "type")]
    pub ty: String,

    /// Backend name to the backend-local names (`Type.field`) realizing this field
    #[serde(default)]
    pub backends: IndexMap<String, Vec<String>>,
}
