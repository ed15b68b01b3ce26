//! GraphQL wire types exchanged with backends and clients.
use junction_federation::SubQuery;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// A request sent to one backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// The GraphQL document.
    pub query: String,

    /// The operation to execute, when the document holds several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl Request {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
        }
    }
}

impl From<&SubQuery> for Request {
    fn from(sub_query: &SubQuery) -> Self {
        Request::new(sub_query.to_string())
    }
}

/// A response as returned by a backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// The errors reported by the backend.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Error>,

    /// The optional response extensions.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

/// A GraphQL error.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The path of the field the error relates to, as reported by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl Error {
    /// Tags an error reported by `service` so clients can tell backends apart.
    pub(crate) fn with_service(mut self, service: &str) -> Self {
        self.extensions
            .entry("service")
            .or_insert_with(|| service.into());
        // paths are relative to the backend's own response
        self.path = None;
        self
    }
}

/// Trait used to get extension type from an error
pub(crate) trait ErrorExtension
where
    Self: Sized,
{
    fn extension_code(&self) -> String;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn backend_errors_are_tagged_with_their_service() {
        let response: Response = serde_json::from_value(json!({
            "data": { "employees": null },
            "errors": [{ "message": "boom", "path": ["employees"] }]
        }))
        .unwrap();

        let error = response.errors[0].clone().with_service("hr");
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({ "message": "boom", "extensions": { "service": "hr" } })
        );
    }

    #[test]
    fn requests_serialize_like_graphql_over_http() {
        let request = Request::new("query { employees { id } }");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "query": "query { employees { id } }" })
        );
    }
}
