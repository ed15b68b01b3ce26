use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use bytes::BytesMut;
use junction_federation::Backend;
use junction_federation::CompositeSchema;
use junction_federation::OperationKind;
use junction_federation::Query;
use junction_federation::QueryError;
use junction_federation::Selection;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

use crate::configuration::Configuration;
use crate::dispatch::Dispatched;
use crate::dispatch::Dispatcher;
use crate::dispatch::HttpBackendFetcher;
use crate::error::GatewayError;
use crate::error::MergeError;
use crate::json_writer::BytesChunkWriter;
use crate::json_writer::JsonWriter;
use crate::json_writer::Sink;
use crate::merge::merge;
use crate::merge::Cursor;

const CHUNK_SIZE: usize = 8 * 1024;
const CHANNEL_CAPACITY: usize = 16;

/// Chunks of a merged response body.
///
/// Chunks are sent as soon as they fill up, before the merge is over. A merge that fails late
/// may already have sent the start of the document: the stream then ends with an `Err` instead
/// of the rest of the body, and the bytes received so far must be discarded. Use
/// [`Gateway::execute`] when a failure must leave no partial output at all.
pub type ResponseStream = ReceiverStream<Result<Bytes, MergeError>>;

/// Answers queries against a composite schema by splitting them per backend, dispatching the
/// sub-queries and merging the responses.
#[derive(Debug, Clone)]
pub struct Gateway {
    schema: Arc<CompositeSchema>,
    dispatcher: Arc<Dispatcher>,
}

impl Gateway {
    pub fn new(schema: CompositeSchema, dispatcher: Dispatcher) -> Self {
        Self {
            schema: Arc::new(schema),
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Builds the composite schema and one HTTP fetcher per configured backend.
    pub fn from_configuration(configuration: &Configuration) -> Result<Self, GatewayError> {
        configuration.validate()?;

        let backends = configuration
            .backends
            .iter()
            .map(|(name, definition)| Backend::new(name, definition.routing_url.as_str()));
        let schema = CompositeSchema::build(&configuration.schema, backends)?;

        let mut dispatcher = Dispatcher::new(configuration.traffic_shaping.clone());
        for (name, definition) in &configuration.backends {
            let fetcher = HttpBackendFetcher::new(name.as_str(), definition.routing_url.clone())
                .map_err(|err| GatewayError::HttpClient {
                    service: name.clone(),
                    reason: err.to_string(),
                })?;
            dispatcher.register(name.as_str(), Arc::new(fetcher));
        }

        tracing::info!(backends = configuration.backends.len(), "gateway ready");
        Ok(Self::new(schema, dispatcher))
    }

    pub fn schema(&self) -> &CompositeSchema {
        &self.schema
    }

    /// Builds the query tree for `selections` against the root type of `kind`.
    pub fn resolve(
        &self,
        kind: OperationKind,
        selections: impl IntoIterator<Item = Selection>,
    ) -> Result<Query, QueryError> {
        Query::resolve(&self.schema, kind, selections)
    }

    /// Runs `query` and returns the whole merged response body.
    ///
    /// Backend failures are reported in the `errors` array of the body. A merge failure returns
    /// an error and no bytes at all.
    pub async fn execute(&self, query: &Query) -> Result<Bytes, MergeError> {
        let dispatched = self.split_and_dispatch(query).await;

        tracing::info_span!("merge").in_scope(|| -> Result<Bytes, MergeError> {
            let started = Instant::now();
            let mut writer = JsonWriter::new(BytesMut::new());
            write_response(&self.schema, query, &dispatched, &mut writer)?;
            let body = writer.into_inner().freeze();

            tracing::debug!(elapsed = ?started.elapsed(), bytes = body.len(), "merged");
            tracing::trace!(body = %String::from_utf8_lossy(&body), "merged response");
            Ok(body)
        })
    }

    /// Runs `query` and streams the merged response body in chunks.
    ///
    /// Merging starts once every backend has answered, on a blocking task. Dropping the stream
    /// cancels the merge. A stream whose last item is an `Err` carries no valid document, see
    /// [`ResponseStream`].
    pub async fn execute_stream(&self, query: Query) -> ResponseStream {
        let dispatched = self.split_and_dispatch(&query).await;

        let (writer, receiver) = BytesChunkWriter::new(CHUNK_SIZE, CHANNEL_CAPACITY);
        let sender = writer.sender();
        let schema = self.schema.clone();
        let span = tracing::info_span!("merge");

        let handle = tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            let started = Instant::now();
            let mut writer = JsonWriter::new(writer);
            match write_response(&schema, &query, &dispatched, &mut writer) {
                Ok(()) => tracing::debug!(elapsed = ?started.elapsed(), "merged"),
                Err(error) => {
                    tracing::warn!(%error, "merge failed");
                    writer.into_inner().fail(error);
                }
            }
        });

        tokio::spawn(async move {
            if let Err(err) = handle.await {
                let error = MergeError::Task(err.to_string());
                if sender.send(Err(error)).await.is_err() {
                    tracing::debug!("response consumer gone before the merge task failed");
                }
            }
        });

        ReceiverStream::new(receiver)
    }

    async fn split_and_dispatch(&self, query: &Query) -> Dispatched {
        let started = Instant::now();
        let sub_queries = tracing::info_span!("split")
            .in_scope(|| junction_federation::split(query, &self.schema));
        tracing::debug!(
            elapsed = ?started.elapsed(),
            backends = sub_queries.len(),
            "split"
        );

        let started = Instant::now();
        let dispatched = self
            .dispatcher
            .dispatch(&sub_queries)
            .instrument(tracing::info_span!("dispatch"))
            .await;
        tracing::debug!(elapsed = ?started.elapsed(), "dispatched");
        dispatched
    }
}

/// Writes `{"data": …, "errors": […]}`; `errors` is omitted when nothing failed.
fn write_response<S: Sink>(
    schema: &CompositeSchema,
    query: &Query,
    dispatched: &Dispatched,
    writer: &mut JsonWriter<S>,
) -> Result<(), MergeError> {
    let mut cursor = Cursor::new();
    let mut errors = Vec::new();
    for (backend, result) in dispatched {
        match result {
            Ok(response) => {
                cursor.insert(backend, &response.data);
                errors.extend(
                    response
                        .errors
                        .iter()
                        .map(|error| error.clone().with_service(backend)),
                );
            }
            Err(error) => errors.push(error.to_graphql_error()),
        }
    }

    writer.begin_object()?;
    writer.key("data")?;
    merge(schema, query.roots(), cursor, writer)?;
    if !errors.is_empty() {
        writer.key("errors")?;
        writer.begin_array()?;
        for error in &errors {
            writer.value(&serde_json::to_value(error).map_err(std::io::Error::from)?)?;
        }
        writer.end_array()?;
    }
    writer.end_object()?;
    debug_assert_eq!(writer.depth(), 0);
    writer.flush()
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;
    use serde_json::Value;
    use test_log::test;

    use super::*;
    use crate::dispatch::BackendFetcher;
    use crate::error::FetchError;
    use crate::graphql;

    #[derive(Debug)]
    struct StaticFetcher(Value);

    #[async_trait::async_trait]
    impl BackendFetcher for StaticFetcher {
        async fn fetch(&self, _request: graphql::Request) -> Result<Bytes, FetchError> {
            Ok(Bytes::from(serde_json::to_vec(&self.0).unwrap()))
        }
    }

    #[derive(Debug)]
    struct FailingFetcher;

    #[async_trait::async_trait]
    impl BackendFetcher for FailingFetcher {
        async fn fetch(&self, _request: graphql::Request) -> Result<Bytes, FetchError> {
            Err(FetchError::SubrequestHttpError {
                status_code: Some(500),
                service: "crm".to_string(),
                reason: "backend answered with 500 Internal Server Error".to_string(),
            })
        }
    }

    fn gateway(hr: Arc<dyn BackendFetcher>, crm: Arc<dyn BackendFetcher>) -> Gateway {
        let configuration =
            Configuration::from_yaml(include_str!("configuration/testdata/gateway.yaml")).unwrap();
        let mut gateway = Gateway::from_configuration(&configuration).unwrap();
        let mut dispatcher = Dispatcher::new(configuration.traffic_shaping.clone());
        dispatcher.register("hr", hr);
        dispatcher.register("crm", crm);
        gateway.dispatcher = Arc::new(dispatcher);
        gateway
    }

    fn people() -> Selection {
        Selection::field("people").select([Selection::field("name"), Selection::field("age")])
    }

    #[test(tokio::test)]
    async fn merges_every_backend_into_one_document() {
        let gateway = gateway(
            Arc::new(StaticFetcher(json!({
                "data": { "employees": [{ "id": 1, "name": "x" }] }
            }))),
            Arc::new(StaticFetcher(json!({
                "data": { "customers": [{ "customerId": 1, "age": 30 }] }
            }))),
        );
        let query = gateway.resolve(OperationKind::Query, [people()]).unwrap();

        let body = gateway.execute(&query).await.unwrap();

        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            r#"{"data":{"people":[{"name":"x","age":30}]}}"#
        );
    }

    #[test(tokio::test)]
    async fn failed_backends_are_reported_next_to_the_data() {
        let gateway = gateway(
            Arc::new(StaticFetcher(json!({
                "data": { "employees": [{ "id": 1, "name": "x" }] },
                "errors": [{ "message": "name is restricted", "path": ["employees", 0, "name"] }]
            }))),
            Arc::new(FailingFetcher),
        );
        let query = gateway.resolve(OperationKind::Query, [people()]).unwrap();

        let body = gateway.execute(&query).await.unwrap();
        let response: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(
            response,
            json!({
                "data": { "people": [{ "name": "x", "age": null }] },
                "errors": [
                    {
                        "message": "name is restricted",
                        "extensions": { "service": "hr" }
                    },
                    {
                        "message": "HTTP fetch failed from 'crm': backend answered with 500 Internal Server Error",
                        "extensions": {
                            "service": "crm",
                            "reason": "backend answered with 500 Internal Server Error",
                            "code": "SUBREQUEST_HTTP_ERROR",
                            "http": { "status": 500 }
                        }
                    }
                ]
            })
        );
    }

    #[test(tokio::test)]
    async fn merge_failures_produce_no_body() {
        let gateway = gateway(
            Arc::new(StaticFetcher(json!({
                "data": { "employees": [{ "id": 1, "name": "x" }] }
            }))),
            Arc::new(StaticFetcher(json!({ "data": { "customers": [{ "age": 30 }] } }))),
        );
        let query = gateway.resolve(OperationKind::Query, [people()]).unwrap();

        let err = gateway.execute(&query).await.unwrap_err();
        assert!(matches!(err, MergeError::KeyEvaluation(_)), "{err}");
    }

    #[test(tokio::test)]
    async fn streamed_chunks_concatenate_to_the_buffered_body() {
        let employees: Vec<Value> = (0..2000)
            .map(|id| json!({ "id": id, "name": format!("employee {id}") }))
            .collect();
        let gateway = gateway(
            Arc::new(StaticFetcher(json!({ "data": { "employees": employees } }))),
            Arc::new(StaticFetcher(json!({ "data": { "customers": [] } }))),
        );
        let query = gateway.resolve(OperationKind::Query, [people()]).unwrap();

        let buffered = gateway.execute(&query).await.unwrap();
        let chunks: Vec<Bytes> = gateway
            .execute_stream(query)
            .await
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| chunk.len() <= CHUNK_SIZE));
        assert_eq!(chunks.concat(), buffered.to_vec());
    }

    #[test(tokio::test)]
    async fn streamed_merge_failures_end_with_an_error() {
        let gateway = gateway(
            Arc::new(StaticFetcher(json!({
                "data": { "employees": [{ "id": 1, "name": "x" }] }
            }))),
            Arc::new(StaticFetcher(json!({ "data": { "customers": [{ "age": 30 }] } }))),
        );
        let query = gateway.resolve(OperationKind::Query, [people()]).unwrap();

        let chunks: Vec<Result<Bytes, MergeError>> =
            gateway.execute_stream(query).await.collect().await;

        assert_eq!(chunks.len(), 1);
        assert!(matches!(chunks[0], Err(MergeError::KeyEvaluation(_))));
    }

    #[test(tokio::test)]
    async fn late_merge_failures_follow_the_chunks_already_sent() {
        let tags: Vec<String> = (0..2000).map(|i| format!("tag {i:04}")).collect();
        let gateway = gateway(
            Arc::new(StaticFetcher(json!({
                "data": { "tags": tags, "employees": [{ "id": 1, "name": "x" }] }
            }))),
            Arc::new(StaticFetcher(json!({
                "data": { "labels": [], "customers": [{ "age": 30 }] }
            }))),
        );
        let query = gateway
            .resolve(OperationKind::Query, [Selection::field("tags"), people()])
            .unwrap();

        let mut chunks: Vec<Result<Bytes, MergeError>> =
            gateway.execute_stream(query).await.collect().await;

        let last = chunks.pop().unwrap();
        assert!(matches!(last, Err(MergeError::KeyEvaluation(_))));
        assert!(!chunks.is_empty());
        let sent: Vec<u8> = chunks
            .into_iter()
            .flat_map(|chunk| chunk.unwrap().to_vec())
            .collect();
        assert!(sent.starts_with(br#"{"data":{"tags":["tag 0000""#));
        assert!(serde_json::from_slice::<Value>(&sent).is_err());
    }
}
