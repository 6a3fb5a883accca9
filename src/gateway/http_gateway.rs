//! HTTP implementation of the transaction gateway.

use async_trait::async_trait;
use http::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use super::TransactionGateway;
use crate::auth::AuthProvider;
use crate::errors::{GatewayOperation, TxGuardError, TxGuardResult};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::{CompletionReport, CreateTransaction, ReauthorizeWithPayment, Transaction};

/// Maximum number of body bytes quoted in an error message.
const ERROR_BODY_LIMIT: usize = 512;

/// Gateway client speaking JSON over HTTP.
///
/// Endpoints, relative to the base URL:
///
/// | Operation | Request |
/// |-----------|---------|
/// | create | `POST /transactions` |
/// | get | `GET /transactions/{id}` |
/// | complete | `POST /transactions/{id}/complete` |
/// | reauthorize | `POST /transactions/{id}/reauthorize` |
pub struct HttpTransactionGateway {
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthProvider>,
    base_url: Url,
    timeout: Duration,
}

impl HttpTransactionGateway {
    /// Creates a gateway client.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthProvider>,
        base_url: &str,
        timeout: Duration,
    ) -> TxGuardResult<Self> {
        auth.validate()?;
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(TxGuardError::configuration(format!(
                "Gateway URL cannot be used as a base: {}",
                base_url
            )));
        }

        Ok(Self {
            transport,
            auth,
            base_url,
            timeout,
        })
    }

    /// Returns the gateway base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> TxGuardResult<String> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TxGuardError::configuration("Gateway URL cannot be used as a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.to_string())
    }

    fn headers(&self, with_body: bool) -> TxGuardResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if with_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        self.auth.apply_auth(&mut headers)?;
        Ok(headers)
    }

    fn build_post<B: Serialize>(
        &self,
        operation: GatewayOperation,
        url: String,
        body: &B,
    ) -> TxGuardResult<HttpRequest> {
        let body = serde_json::to_vec(body).map_err(|e| {
            TxGuardError::gateway(operation, format!("failed to encode request: {}", e))
        })?;

        Ok(HttpRequest::post(url)
            .with_headers(self.headers(true)?)
            .with_body(body)
            .with_timeout(self.timeout))
    }

    async fn send(
        &self,
        operation: GatewayOperation,
        request: HttpRequest,
    ) -> TxGuardResult<HttpResponse> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| TxGuardError::gateway(operation, e.to_string()))?;

        if !response.is_success() {
            let mut body = response.text();
            if body.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            tracing::debug!(
                operation = %operation,
                status = response.status,
                "Gateway returned an error status"
            );
            return Err(TxGuardError::gateway_status(
                operation,
                response.status,
                format!("gateway responded with status {}: {}", response.status, body),
            ));
        }

        Ok(response)
    }

    fn parse<T: DeserializeOwned>(
        operation: GatewayOperation,
        response: &HttpResponse,
    ) -> TxGuardResult<T> {
        response.json().map_err(|e| {
            TxGuardError::gateway(operation, format!("invalid gateway response: {}", e))
        })
    }
}

#[async_trait]
impl TransactionGateway for HttpTransactionGateway {
    #[instrument(skip(self, request), fields(method = %request.request.method))]
    async fn create(&self, request: &CreateTransaction) -> TxGuardResult<Transaction> {
        let op = GatewayOperation::Create;
        let http_request = self.build_post(op, self.endpoint(&["transactions"])?, request)?;
        let response = self.send(op, http_request).await?;
        Self::parse(op, &response)
    }

    #[instrument(skip(self))]
    async fn get(&self, transaction_id: &str) -> TxGuardResult<Transaction> {
        let op = GatewayOperation::Get;
        let http_request = HttpRequest::get(self.endpoint(&["transactions", transaction_id])?)
            .with_headers(self.headers(false)?)
            .with_timeout(self.timeout);
        let response = self.send(op, http_request).await?;
        Self::parse(op, &response)
    }

    #[instrument(skip(self, report), fields(outcome = ?report.outcome))]
    async fn complete(&self, transaction_id: &str, report: &CompletionReport) -> TxGuardResult<()> {
        let op = GatewayOperation::Complete;
        let url = self.endpoint(&["transactions", transaction_id, "complete"])?;
        let http_request = self.build_post(op, url, report)?;
        self.send(op, http_request).await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(network = %request.payment_requirement.network))]
    async fn reauthorize_with_payment(
        &self,
        transaction_id: &str,
        request: &ReauthorizeWithPayment,
    ) -> TxGuardResult<Transaction> {
        let op = GatewayOperation::Reauthorize;
        let url = self.endpoint(&["transactions", transaction_id, "reauthorize"])?;
        let http_request = self.build_post(op, url, request)?;
        let response = self.send(op, http_request).await?;
        Self::parse(op, &response)
    }
}

impl std::fmt::Debug for HttpTransactionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransactionGateway")
            .field("base_url", &self.base_url.as_str())
            .field("auth", &self.auth.scheme())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApiKeyAuth;
    use crate::mocks::{MockResponse, MockTransport};
    use crate::types::TransactionStatus;
    use http::Method;

    fn gateway(transport: Arc<MockTransport>, base: &str) -> HttpTransactionGateway {
        HttpTransactionGateway::new(
            transport,
            Arc::new(ApiKeyAuth::from_string("tg_test_key")),
            base,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_builds_request() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockResponse::json(
            200,
            &serde_json::json!({"id": "tx_1", "status": "pending"}),
        ));
        let gateway = gateway(transport.clone(), "https://gateway.example.com/v1/");

        let tx = gateway.get("tx_1").await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].url, "https://gateway.example.com/v1/transactions/tx_1");
        assert_eq!(
            requests[0].headers.get("authorization").unwrap(),
            "Bearer tg_test_key"
        );
        assert_eq!(requests[0].timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_transaction_id_is_path_encoded() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockResponse::json(
            200,
            &serde_json::json!({"id": "a/b", "status": "authorized"}),
        ));
        let gateway = gateway(transport.clone(), "https://gateway.example.com");

        gateway.get("a/b").await.unwrap();
        assert_eq!(
            transport.requests()[0].url,
            "https://gateway.example.com/transactions/a%2Fb"
        );
    }

    #[tokio::test]
    async fn test_error_status_maps_to_gateway_unavailable() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockResponse::text(503, "maintenance"));
        let gateway = gateway(transport, "https://gateway.example.com");

        let err = gateway.get("tx_1").await.unwrap_err();
        match err {
            TxGuardError::GatewayUnavailable {
                operation,
                status_code,
                message,
            } => {
                assert_eq!(operation, GatewayOperation::Get);
                assert_eq!(status_code, Some(503));
                assert!(message.contains("maintenance"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_maps_to_gateway_unavailable() {
        let transport = Arc::new(MockTransport::new());
        transport.push_error(crate::transport::TransportError::Connection {
            message: "connection refused".to_string(),
        });
        let gateway = gateway(transport, "https://gateway.example.com");

        let err = gateway
            .complete(
                "tx_1",
                &CompletionReport::for_response(
                    &HttpResponse::new(200, HeaderMap::new(), ""),
                    Duration::from_millis(1),
                    1,
                ),
            )
            .await
            .unwrap_err();
        assert!(err.is_gateway_failure());
    }

    #[tokio::test]
    async fn test_malformed_body_maps_to_gateway_unavailable() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockResponse::text(200, "not json"));
        let gateway = gateway(transport, "https://gateway.example.com");

        let err = gateway.get("tx_1").await.unwrap_err();
        assert!(err.is_gateway_failure());
    }

    #[test]
    fn test_rejects_empty_api_key() {
        let result = HttpTransactionGateway::new(
            Arc::new(MockTransport::new()),
            Arc::new(ApiKeyAuth::from_string("")),
            "https://gateway.example.com",
            Duration::from_secs(5),
        );
        assert!(result.is_err());
    }
}
