//! HTTP gateway and full-client flows against a local mock server.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use txguard_client::mocks::fixtures;
use txguard_client::{
    ApiKeyAuth, CallContext, CompletionReport, GatewayOperation, HttpResponse,
    HttpTransactionGateway, RequestDescriptor, ReqwestTransport, TransactionGateway,
    TransactionStatus, TxGuardClient, TxGuardConfig, TxGuardError,
};
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn gateway(server: &MockServer) -> HttpTransactionGateway {
    HttpTransactionGateway::new(
        Arc::new(ReqwestTransport::with_defaults().unwrap()),
        Arc::new(ApiKeyAuth::from_string("tg_test_key")),
        &format!("{}/v1", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn get_fetches_transaction_with_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/transactions/tx_1"))
        .and(header("authorization", "Bearer tg_test_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "tx_1",
            "status": "pending",
            "trace": { "id": "trace_1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tx = gateway(&server).get("tx_1").await.unwrap();

    assert_eq!(tx.id, "tx_1");
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.trace.map(|t| t.id).as_deref(), Some("trace_1"));
}

#[tokio::test]
async fn error_status_maps_to_gateway_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/transactions/tx_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let err = gateway(&server).get("tx_missing").await.unwrap_err();

    match err {
        TxGuardError::GatewayUnavailable {
            operation,
            status_code,
            ..
        } => {
            assert_eq!(operation, GatewayOperation::Get);
            assert_eq!(status_code, Some(404));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn unparseable_body_maps_to_gateway_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/transactions/tx_1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = gateway(&server).get("tx_1").await.unwrap_err();
    assert!(err.is_gateway_failure());
}

#[tokio::test]
async fn complete_posts_report() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/transactions/tx_1/complete"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "outcome": "success",
            "attempts": 1,
            "response": { "status": 200 }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let report = CompletionReport::for_response(
        &HttpResponse::new(200, http::HeaderMap::new(), "ok"),
        Duration::from_millis(12),
        1,
    );
    gateway(&server).complete("tx_1", &report).await.unwrap();
}

#[tokio::test]
async fn unreachable_gateway_is_unavailable() {
    let server = MockServer::start().await;
    let gateway = gateway(&server);
    drop(server);

    let err = gateway.get("tx_1").await.unwrap_err();
    assert!(err.is_gateway_failure());
}

#[tokio::test]
async fn full_flow_with_payment_against_live_server() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/transactions"))
        .and(body_partial_json(json!({
            "request": { "method": "GET", "url": { "path": "/premium" } },
            "actionName": "lookup"
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": "tx_e2e", "status": "authorized" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/transactions/tx_e2e/reauthorize"))
        .and(body_partial_json(json!({
            "paymentRequirement": { "network": "base-sepolia", "scheme": "exact" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "tx_e2e",
            "status": "authorized",
            "payment": { "authorizationPayload": "signed-proof" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/transactions/tx_e2e/complete"))
        .and(body_partial_json(json!({ "outcome": "success", "attempts": 2 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/premium"))
        .and(header("x-payment", "signed-proof"))
        .and(header("x-transaction-id", "tx_e2e"))
        .respond_with(ResponseTemplate::new(200).set_body_string("premium content"))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/premium"))
        .respond_with(
            ResponseTemplate::new(402).set_body_json(fixtures::payment_required_envelope()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = TxGuardConfig::builder()
        .gateway_url(format!("{}/v1/", server.uri()))
        .api_key("tg_test_key")
        .build()
        .unwrap();
    let client = TxGuardClient::builder().config(config).build().unwrap();

    let response = client
        .execute(
            RequestDescriptor::get(format!("{}/premium", server.uri())),
            CallContext::new().action_name("lookup"),
        )
        .await
        .unwrap();
    client.shutdown().await;

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "premium content");

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    let gateway_calls = requests
        .iter()
        .filter(|r| r.url.path().starts_with("/v1/"))
        .count();
    assert_eq!(gateway_calls, 3);
}

#[tokio::test]
async fn gateway_requests_carry_credentials_but_outbound_calls_do_not() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/transactions"))
        .and(header_exists("authorization"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "tx_1", "status": "authorized" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/transactions/tx_1/complete"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let config = TxGuardConfig::builder()
        .gateway_url(format!("{}/v1", server.uri()))
        .api_key("tg_test_key")
        .build()
        .unwrap();
    let client = TxGuardClient::builder().config(config).build().unwrap();

    client
        .execute(
            RequestDescriptor::get(format!("{}/data", server.uri())),
            CallContext::new(),
        )
        .await
        .unwrap();
    client.shutdown().await;

    let requests = server.received_requests().await.unwrap();
    let outbound = requests
        .iter()
        .find(|r| r.url.path() == "/data")
        .unwrap();
    assert!(!outbound.headers.contains_key("authorization"));
    assert_eq!(
        outbound
            .headers
            .get("x-transaction-id")
            .and_then(|v| v.to_str().ok()),
        Some("tx_1")
    );
}
