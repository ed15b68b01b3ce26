//! Sending sub-queries to backends.

mod http;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use indexmap::IndexMap;
use junction_federation::SubQuery;
use serde_json::Value;
use tracing::Instrument;

pub use self::http::HttpBackendFetcher;
use crate::configuration::BackendConfiguration;
use crate::configuration::TrafficShaping;
use crate::error::FetchError;
use crate::graphql;

/// Hides how a backend is reached, so that several transports can be plugged in.
#[async_trait::async_trait]
pub trait BackendFetcher: Send + Sync + Debug {
    /// Sends `request` and returns the raw response body.
    async fn fetch(&self, request: graphql::Request) -> Result<Bytes, FetchError>;
}

/// What one backend answered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendResponse {
    /// The `data` object of the response.
    pub data: Value,

    /// Errors the backend reported next to its data.
    pub errors: Vec<graphql::Error>,
}

/// Outcome of dispatching, one entry per queried backend in dispatch order.
pub type Dispatched = IndexMap<String, Result<BackendResponse, FetchError>>;

/// Fans sub-queries out to the registered backend fetchers.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    fetchers: HashMap<String, Arc<dyn BackendFetcher>>,
    traffic_shaping: BackendConfiguration<TrafficShaping>,
}

impl Dispatcher {
    pub fn new(traffic_shaping: BackendConfiguration<TrafficShaping>) -> Self {
        Self {
            fetchers: HashMap::new(),
            traffic_shaping,
        }
    }

    /// Registers the fetcher used for `backend`, replacing any previous one.
    pub fn register(&mut self, backend: impl Into<String>, fetcher: Arc<dyn BackendFetcher>) {
        self.fetchers.insert(backend.into(), fetcher);
    }

    pub fn timeout(&self, backend: &str) -> Duration {
        self.traffic_shaping.get(backend).timeout
    }

    /// Sends every sub-query concurrently and waits for all of them.
    ///
    /// A backend that fails, times out or answers without data is reported as an error in its
    /// slot; it never affects the other backends.
    pub async fn dispatch(&self, sub_queries: &IndexMap<String, SubQuery>) -> Dispatched {
        let fetches = sub_queries.iter().map(|(backend, sub_query)| {
            let span = tracing::info_span!("fetch", backend = backend.as_str());
            async move {
                let result = self.fetch(backend, sub_query).await;
                if let Err(error) = &result {
                    tracing::warn!(backend = backend.as_str(), %error, "backend failed");
                }
                (backend.clone(), result)
            }
            .instrument(span)
        });

        let mut dispatched = Dispatched::with_capacity(sub_queries.len());
        for (backend, result) in join_all(fetches).await {
            let previous = dispatched.insert(backend, result);
            debug_assert!(previous.is_none(), "a backend slot was written twice");
        }
        dispatched
    }

    async fn fetch(
        &self,
        backend: &str,
        sub_query: &SubQuery,
    ) -> Result<BackendResponse, FetchError> {
        let fetcher = self
            .fetchers
            .get(backend)
            .ok_or_else(|| FetchError::UnknownService {
                service: backend.to_string(),
            })?;

        let request = graphql::Request::from(sub_query);
        tracing::debug!(query = %request.query, "sending sub-query");

        let timeout = self.timeout(backend);
        let body = tokio::time::timeout(timeout, fetcher.fetch(request))
            .await
            .map_err(|_| FetchError::SubrequestTimeout {
                service: backend.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })??;

        parse_response(backend, &body)
    }
}

fn parse_response(backend: &str, body: &[u8]) -> Result<BackendResponse, FetchError> {
    let malformed = |reason: String| FetchError::SubrequestMalformedResponse {
        service: backend.to_string(),
        reason,
    };

    let response: graphql::Response =
        serde_json::from_slice(body).map_err(|err| malformed(err.to_string()))?;
    match response.data {
        Some(data @ Value::Object(_)) => Ok(BackendResponse {
            data,
            errors: response.errors,
        }),
        Some(Value::Null) | None => {
            for error in &response.errors {
                tracing::debug!(backend, message = %error.message, "backend error without data");
            }
            Err(malformed(match response.errors.first() {
                Some(error) => format!("no data in the response: {}", error.message),
                None => "no data in the response".to_string(),
            }))
        }
        Some(other) => Err(malformed(format!("expected a data object, got {other}"))),
    }
}
