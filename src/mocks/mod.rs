//! Mock implementations for testing.
//!
//! Provides a scripted transport and gateway for exercising the interception
//! layer without a network or an authorization backend.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::HeaderMap;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::errors::{GatewayOperation, TxGuardError, TxGuardResult};
use crate::gateway::TransactionGateway;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::types::{CompletionReport, CreateTransaction, ReauthorizeWithPayment, Transaction};

/// A mock response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl MockResponse {
    /// Creates an empty response.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a JSON response.
    pub fn json<T: serde::Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        let mut response = Self::new(status);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response.body = Bytes::from(body);
        response
    }

    /// Creates a plain text response.
    pub fn text(status: u16, body: &str) -> Self {
        let mut response = Self::new(status);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        response.body = Bytes::copy_from_slice(body.as_bytes());
        response
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Converts into a transport response.
    pub fn into_response(self) -> HttpResponse {
        HttpResponse::new(self.status, self.headers, self.body)
    }
}

enum Scripted {
    Response(MockResponse),
    Error(TransportError),
}

/// Mock HTTP transport for testing.
///
/// Queued responses are returned in order; once the queue is empty the
/// default response (or a 500) is returned. Every request is recorded.
pub struct MockTransport {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
    default_response: Mutex<Option<MockResponse>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            default_response: Mutex::new(None),
        }
    }

    /// Queues a response.
    pub fn push(&self, response: MockResponse) {
        self.responses.lock().push_back(Scripted::Response(response));
    }

    /// Queues a transport failure.
    pub fn push_error(&self, error: TransportError) {
        self.responses.lock().push_back(Scripted::Error(error));
    }

    /// Sets the response returned once the queue is empty.
    pub fn set_default(&self, response: MockResponse) {
        *self.default_response.lock() = Some(response);
    }

    /// Gets all recorded requests.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Gets the last recorded request.
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }

    /// Returns the number of requests made.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request);

        let next = self.responses.lock().pop_front();
        match next {
            Some(Scripted::Response(response)) => Ok(response.into_response()),
            Some(Scripted::Error(error)) => Err(error),
            None => Ok(self
                .default_response
                .lock()
                .clone()
                .unwrap_or_else(|| MockResponse::text(500, "No mock response configured"))
                .into_response()),
        }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("request_count", &self.request_count())
            .finish()
    }
}

/// Mock transaction gateway.
///
/// Each operation pops from its own script. An empty `create` or
/// `reauthorize` script fails with a gateway error; an empty `get` script
/// returns the default transaction if one is set; an empty `complete` script
/// succeeds.
#[derive(Default)]
pub struct MockGateway {
    creates: Mutex<VecDeque<TxGuardResult<Transaction>>>,
    gets: Mutex<VecDeque<TxGuardResult<Transaction>>>,
    reauthorizations: Mutex<VecDeque<TxGuardResult<Transaction>>>,
    completes: Mutex<VecDeque<TxGuardResult<()>>>,
    get_default: Mutex<Option<Transaction>>,
    create_calls: Mutex<Vec<CreateTransaction>>,
    get_calls: Mutex<Vec<String>>,
    reauthorize_calls: Mutex<Vec<(String, ReauthorizeWithPayment)>>,
    completions: Mutex<Vec<(String, CompletionReport)>>,
}

impl MockGateway {
    /// Creates an unscripted gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a `create` result.
    pub fn push_create(&self, tx: Transaction) {
        self.creates.lock().push_back(Ok(tx));
    }

    /// Scripts a `create` failure.
    pub fn push_create_error(&self, error: TxGuardError) {
        self.creates.lock().push_back(Err(error));
    }

    /// Scripts a `get` result.
    pub fn push_get(&self, tx: Transaction) {
        self.gets.lock().push_back(Ok(tx));
    }

    /// Scripts a `get` failure.
    pub fn push_get_error(&self, error: TxGuardError) {
        self.gets.lock().push_back(Err(error));
    }

    /// Sets the transaction returned by `get` once its script is empty.
    pub fn set_get_default(&self, tx: Transaction) {
        *self.get_default.lock() = Some(tx);
    }

    /// Scripts a `reauthorize_with_payment` result.
    pub fn push_reauthorize(&self, tx: Transaction) {
        self.reauthorizations.lock().push_back(Ok(tx));
    }

    /// Scripts a `reauthorize_with_payment` failure.
    pub fn push_reauthorize_error(&self, error: TxGuardError) {
        self.reauthorizations.lock().push_back(Err(error));
    }

    /// Scripts a `complete` failure.
    pub fn push_complete_error(&self, error: TxGuardError) {
        self.completes.lock().push_back(Err(error));
    }

    /// Recorded `create` requests.
    pub fn create_calls(&self) -> Vec<CreateTransaction> {
        self.create_calls.lock().clone()
    }

    /// Recorded `get` transaction ids.
    pub fn get_calls(&self) -> Vec<String> {
        self.get_calls.lock().clone()
    }

    /// Recorded `reauthorize_with_payment` calls.
    pub fn reauthorize_calls(&self) -> Vec<(String, ReauthorizeWithPayment)> {
        self.reauthorize_calls.lock().clone()
    }

    /// Recorded `complete` calls, including failed ones.
    pub fn completions(&self) -> Vec<(String, CompletionReport)> {
        self.completions.lock().clone()
    }
}

#[async_trait]
impl TransactionGateway for MockGateway {
    async fn create(&self, request: &CreateTransaction) -> TxGuardResult<Transaction> {
        self.create_calls.lock().push(request.clone());
        let next = self.creates.lock().pop_front();
        next.unwrap_or_else(|| {
            Err(TxGuardError::gateway(
                GatewayOperation::Create,
                "no scripted create response",
            ))
        })
    }

    async fn get(&self, transaction_id: &str) -> TxGuardResult<Transaction> {
        self.get_calls.lock().push(transaction_id.to_string());
        let next = self.gets.lock().pop_front();
        match next {
            Some(result) => result,
            None => self.get_default.lock().clone().ok_or_else(|| {
                TxGuardError::gateway(GatewayOperation::Get, "no scripted get response")
            }),
        }
    }

    async fn complete(&self, transaction_id: &str, report: &CompletionReport) -> TxGuardResult<()> {
        self.completions
            .lock()
            .push((transaction_id.to_string(), report.clone()));
        let next = self.completes.lock().pop_front();
        next.unwrap_or(Ok(()))
    }

    async fn reauthorize_with_payment(
        &self,
        transaction_id: &str,
        request: &ReauthorizeWithPayment,
    ) -> TxGuardResult<Transaction> {
        self.reauthorize_calls
            .lock()
            .push((transaction_id.to_string(), request.clone()));
        let next = self.reauthorizations.lock().pop_front();
        next.unwrap_or_else(|| {
            Err(TxGuardError::gateway(
                GatewayOperation::Reauthorize,
                "no scripted reauthorize response",
            ))
        })
    }
}

impl std::fmt::Debug for MockGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockGateway")
            .field("create_calls", &self.create_calls.lock().len())
            .field("get_calls", &self.get_calls.lock().len())
            .field("completions", &self.completions.lock().len())
            .finish()
    }
}

/// Test fixtures for common gateway and destination payloads.
pub mod fixtures {
    use super::MockResponse;
    use crate::transport::HttpResponse;
    use crate::types::{PaymentRequiredEnvelope, PaymentRequirement, Transaction, TransactionStatus};
    use serde_json::Value;

    /// Creates a transaction with the given status.
    pub fn transaction(id: &str, status: TransactionStatus) -> Transaction {
        Transaction::new(id, status)
    }

    /// Creates an authorized transaction carrying a payment payload.
    pub fn authorized_with_payload(id: &str, payload: Value) -> Transaction {
        Transaction::new(id, TransactionStatus::Authorized).with_payment_payload(payload)
    }

    /// Creates a single-method payment envelope on `base-sepolia`.
    pub fn payment_required_envelope() -> PaymentRequiredEnvelope {
        PaymentRequiredEnvelope {
            x402_version: 1,
            error: Some("X-PAYMENT header is required".to_string()),
            accepts: vec![PaymentRequirement {
                scheme: "exact".to_string(),
                network: "base-sepolia".to_string(),
                max_amount_required: "10000".to_string(),
                resource: "https://api.example.com/premium".to_string(),
                pay_to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".to_string(),
                asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_string(),
                description: Some("Premium data".to_string()),
                mime_type: Some("application/json".to_string()),
                max_timeout_seconds: Some(60),
                extra: None,
            }],
        }
    }

    /// Creates a 402 mock response carrying [`payment_required_envelope`].
    pub fn payment_required() -> MockResponse {
        MockResponse::json(402, &payment_required_envelope())
    }

    /// Same as [`payment_required`], as a transport response.
    pub fn payment_required_response() -> HttpResponse {
        payment_required().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionStatus;

    #[tokio::test]
    async fn test_mock_transport_queue_then_default() {
        let transport = MockTransport::new();
        transport.push(MockResponse::json(201, &serde_json::json!({"ok": true})));
        transport.push_error(TransportError::Timeout {
            timeout: std::time::Duration::from_secs(1),
        });

        let first = transport.send(HttpRequest::get("https://a")).await.unwrap();
        assert_eq!(first.status, 201);
        assert!(transport.send(HttpRequest::get("https://b")).await.is_err());
        let third = transport.send(HttpRequest::get("https://c")).await.unwrap();
        assert_eq!(third.status, 500);

        assert_eq!(transport.request_count(), 3);
        assert_eq!(transport.last_request().unwrap().url, "https://c");
    }

    #[tokio::test]
    async fn test_mock_gateway_get_default() {
        let gateway = MockGateway::new();
        assert!(gateway.get("tx").await.is_err());

        gateway.set_get_default(fixtures::transaction("tx", TransactionStatus::Pending));
        assert_eq!(
            gateway.get("tx").await.unwrap().status,
            TransactionStatus::Pending
        );
        assert_eq!(gateway.get_calls().len(), 2);
    }

    #[test]
    fn test_payment_required_fixture_parses() {
        let response = fixtures::payment_required_response();
        assert!(response.is_payment_required());
        assert!(crate::types::PaymentRequiredEnvelope::parse(&response.body).is_some());
    }
}
