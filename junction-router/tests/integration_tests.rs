use std::time::Duration;

use futures::StreamExt;
use junction_router::Configuration;
use junction_router::Gateway;
use junction_router::OperationKind;
use junction_router::Selection;
use serde_json::json;
use serde_json::Value;
use test_log::test;
use wiremock::matchers::body_json;
use wiremock::matchers::method;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

const GATEWAY_YAML: &str = include_str!("../src/configuration/testdata/gateway.yaml");

struct Backends {
    hr: MockServer,
    crm: MockServer,
}

impl Backends {
    async fn start() -> Self {
        Self {
            hr: MockServer::start().await,
            crm: MockServer::start().await,
        }
    }

    fn gateway(&self, crm_timeout: &str) -> Gateway {
        let yaml = GATEWAY_YAML
            .replace("http://localhost:4001", &self.hr.uri())
            .replace("http://localhost:4002", &self.crm.uri())
            .replace("timeout: 2s", &format!("timeout: {crm_timeout}"));
        let configuration = Configuration::from_yaml(&yaml).unwrap();
        Gateway::from_configuration(&configuration).unwrap()
    }
}

async fn answer(server: &MockServer, query: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(body_json(json!({ "query": query })))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

fn people() -> Selection {
    Selection::field("people").select([
        Selection::field("name"),
        Selection::field("age"),
        Selection::field("emails"),
    ])
}

#[test(tokio::test)]
async fn fuses_entities_across_backends() {
    let backends = Backends::start().await;
    answer(
        &backends.hr,
        "query { employees { name id } tags }",
        ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "employees": [{ "id": 1, "name": "Ada" }, { "id": 2, "name": "Grace" }],
                "tags": ["staff"]
            }
        })),
    )
    .await;
    answer(
        &backends.crm,
        "query { customers { age email workEmail customerId } labels }",
        ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "customers": [
                    { "customerId": "2", "age": 45, "email": ["g@x.io"], "workEmail": null },
                    { "customerId": "3", "age": 19, "email": [], "workEmail": "l@x.io" }
                ],
                "labels": ["vip"]
            }
        })),
    )
    .await;
    let gateway = backends.gateway("2s");

    let query = gateway
        .resolve(OperationKind::Query, [people(), Selection::field("tags")])
        .unwrap();
    let body = gateway.execute(&query).await.unwrap();

    let response: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        response,
        json!({
            "data": {
                "people": [
                    { "name": "Ada", "age": null, "emails": null },
                    { "name": "Grace", "age": 45, "emails": ["g@x.io"] },
                    { "name": null, "age": 19, "emails": ["l@x.io"] }
                ],
                "tags": ["staff", "vip"]
            }
        })
    );
}

#[test(tokio::test)]
async fn failed_backends_degrade_to_null_fields() {
    let backends = Backends::start().await;
    answer(
        &backends.hr,
        "query { employees { name id } }",
        ResponseTemplate::new(200).set_body_json(json!({
            "data": { "employees": [{ "id": 1, "name": "Ada" }] }
        })),
    )
    .await;
    answer(
        &backends.crm,
        "query { customers { age email workEmail customerId } }",
        ResponseTemplate::new(500),
    )
    .await;
    let gateway = backends.gateway("2s");

    let query = gateway.resolve(OperationKind::Query, [people()]).unwrap();
    let body = gateway.execute(&query).await.unwrap();

    let response: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        response["data"],
        json!({ "people": [{ "name": "Ada", "age": null, "emails": null }] })
    );
    assert_eq!(response["errors"].as_array().unwrap().len(), 1);
    assert_eq!(response["errors"][0]["extensions"]["service"], "crm");
    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        "SUBREQUEST_HTTP_ERROR"
    );
    assert_eq!(response["errors"][0]["extensions"]["http"]["status"], 500);
}

#[test(tokio::test)]
async fn slow_backends_time_out_without_blocking_the_others() {
    let backends = Backends::start().await;
    answer(
        &backends.hr,
        "query { tags }",
        ResponseTemplate::new(200).set_body_json(json!({ "data": { "tags": ["staff"] } })),
    )
    .await;
    answer(
        &backends.crm,
        "query { labels }",
        ResponseTemplate::new(200)
            .set_body_json(json!({ "data": { "labels": ["vip"] } }))
            .set_delay(Duration::from_secs(2)),
    )
    .await;
    let gateway = backends.gateway("200ms");

    let query = gateway
        .resolve(OperationKind::Query, [Selection::field("tags")])
        .unwrap();
    let body = gateway.execute(&query).await.unwrap();

    let response: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(response["data"], json!({ "tags": ["staff"] }));
    assert_eq!(
        response["errors"][0]["message"],
        "service 'crm' did not respond within 200ms"
    );
    assert_eq!(response["errors"][0]["extensions"]["code"], "SUBREQUEST_TIMEOUT");
}

#[test(tokio::test)]
async fn streams_the_merged_body() {
    let backends = Backends::start().await;
    answer(
        &backends.hr,
        "query { offices { city } }",
        ResponseTemplate::new(200)
            .set_body_json(json!({ "data": { "offices": [{ "city": "Oslo" }] } })),
    )
    .await;
    answer(
        &backends.crm,
        "query { stores { city } }",
        ResponseTemplate::new(200)
            .set_body_json(json!({ "data": { "stores": [{ "city": "Bergen" }] } })),
    )
    .await;
    let gateway = backends.gateway("2s");

    let query = gateway
        .resolve(
            OperationKind::Query,
            [Selection::field("offices").select([Selection::field("city")])],
        )
        .unwrap();
    let chunks: Vec<_> = gateway.execute_stream(query).await.collect().await;

    let body: Vec<u8> = chunks
        .into_iter()
        .flat_map(|chunk| chunk.unwrap().to_vec())
        .collect();
    assert_eq!(
        String::from_utf8(body).unwrap(),
        r#"{"data":{"offices":[{"city":"Oslo"},{"city":"Bergen"}]}}"#
    );
}

#[test(tokio::test)]
async fn mutations_only_reach_the_owning_backend() {
    let backends = Backends::start().await;
    answer(
        &backends.hr,
        r#"mutation { hire_hire: hire(name: "Ada") { name id } }"#,
        ResponseTemplate::new(200)
            .set_body_json(json!({ "data": { "hire_hire": { "id": 9, "name": "Ada" } } })),
    )
    .await;
    let gateway = backends.gateway("2s");

    let query = gateway
        .resolve(
            OperationKind::Mutation,
            [Selection::field("hire")
                .argument("name", "Ada")
                .select([Selection::field("name")])],
        )
        .unwrap();
    let body = gateway.execute(&query).await.unwrap();

    assert_eq!(
        std::str::from_utf8(&body).unwrap(),
        r#"{"data":{"hire":{"name":"Ada"}}}"#
    );
}
