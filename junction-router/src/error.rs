//! Gateway errors.
use displaydoc::Display;
use junction_federation::KeyEvaluationError;
use junction_federation::SchemaError;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;
use crate::graphql::Error;
use crate::graphql::ErrorExtension;

/// Failure to obtain a usable response from one backend.
///
/// Fetch errors never fail a request: the backend is treated as a non-contributor and the
/// error is reported next to the merged data, see [`FetchError::to_graphql_error`].
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(untagged)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum FetchError {
    /// HTTP fetch failed from '{service}': {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    SubrequestHttpError {
        status_code: Option<u16>,

        /// The service failed.
        service: String,

        /// The reason the fetch failed.
        reason: String,
    },

    /// service '{service}' response was malformed: {reason}
    SubrequestMalformedResponse {
        /// The service that responded with the malformed response.
        service: String,

        /// The reason the serialization failed.
        reason: String,
    },

    /// service '{service}' did not respond within {timeout_ms}ms
    SubrequestTimeout {
        /// The service that timed out.
        service: String,

        /// The timeout that applied.
        timeout_ms: u64,
    },

    /// no fetcher is registered for service '{service}'
    UnknownService {
        /// The service without a fetcher.
        service: String,
    },
}

impl FetchError {
    /// The backend this error relates to.
    pub fn service(&self) -> &str {
        match self {
            FetchError::SubrequestHttpError { service, .. }
            | FetchError::SubrequestMalformedResponse { service, .. }
            | FetchError::SubrequestTimeout { service, .. }
            | FetchError::UnknownService { service } => service,
        }
    }

    /// Convert the fetch error to a GraphQL error.
    pub fn to_graphql_error(&self) -> Error {
        let mut extensions = match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        extensions
            .entry("code")
            .or_insert_with(|| self.extension_code().into());
        extensions
            .entry("service")
            .or_insert_with(|| self.service().into());
        if let FetchError::SubrequestHttpError { status_code, .. } = self {
            extensions.remove("status_code");
            if let Some(status_code) = status_code {
                extensions.insert("http".to_string(), serde_json::json!({ "status": status_code }));
            }
        }

        Error {
            message: self.to_string(),
            extensions,
            ..Error::default()
        }
    }
}

impl ErrorExtension for FetchError {
    fn extension_code(&self) -> String {
        match self {
            FetchError::SubrequestHttpError { .. } => "SUBREQUEST_HTTP_ERROR",
            FetchError::SubrequestMalformedResponse { .. } => "SUBREQUEST_MALFORMED_RESPONSE",
            FetchError::SubrequestTimeout { .. } => "SUBREQUEST_TIMEOUT",
            FetchError::UnknownService { .. } => "UNKNOWN_SERVICE",
        }
        .to_string()
    }
}

/// Failure while writing the merged response.
///
/// Merge errors abort the whole response: no partial document is handed out.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum MergeError {
    /// {0}
    KeyEvaluation(#[from] KeyEvaluationError),

    /// could not write the merged response: {0}
    Io(#[from] std::io::Error),

    /// the response consumer went away before the merge completed
    Cancelled,

    /// the merge task failed: {0}
    Task(String),
}

impl MergeError {
    /// Convert the merge error to a GraphQL error, for callers answering with an error response.
    pub fn to_graphql_error(&self) -> Error {
        let mut extensions = Map::new();
        extensions.insert("code".to_string(), self.extension_code().into());
        Error {
            message: self.to_string(),
            extensions,
            ..Error::default()
        }
    }
}

impl ErrorExtension for MergeError {
    fn extension_code(&self) -> String {
        match self {
            MergeError::KeyEvaluation(_) => "KEY_EVALUATION_FAILED",
            MergeError::Io(_) => "RESPONSE_WRITE_FAILED",
            MergeError::Cancelled => "CANCELLED",
            MergeError::Task(_) => "MERGE_TASK_FAILED",
        }
        .to_string()
    }
}

/// Errors raised while assembling a [`crate::Gateway`].
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// {0}
    Configuration(#[from] ConfigurationError),

    /// invalid composite schema: {0}
    Schema(#[from] SchemaError),

    /// could not build the HTTP client for '{service}': {reason}
    HttpClient {
        /// The backend the client was built for.
        service: String,

        /// The reason the client could not be built.
        reason: String,
    },
}
