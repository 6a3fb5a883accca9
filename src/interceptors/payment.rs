//! Payment negotiation after a 402 response.

use std::future::Future;
use std::sync::Arc;
use tracing::instrument;

use super::FailurePolicy;
use crate::errors::{GatewayOperation, TxGuardError, TxGuardResult};
use crate::gateway::TransactionGateway;
use crate::headers::{self, PAYMENT_HEADER};
use crate::observability::MetricsCollector;
use crate::polling::{PollConfig, PollResult, TransactionPoller};
use crate::transport::{HttpRequest, HttpResponse, TransportError};
use crate::types::{
    BufferedRequest, PaymentPreference, PaymentRequiredEnvelope, ReauthorizeWithPayment,
    ResolvedContext, Transaction, TransactionStatus,
};

/// Result of a payment negotiation.
#[derive(Debug)]
pub enum PaymentOutcome {
    /// No payment was made; the original 402 response passes through.
    Declined(HttpResponse),
    /// The paid retry was issued; this is its result, unmodified.
    Retried(Result<HttpResponse, TransportError>),
}

impl PaymentOutcome {
    /// Number of HTTP attempts made for the call, including the original.
    pub fn attempts(&self) -> u32 {
        match self {
            PaymentOutcome::Declined(_) => 1,
            PaymentOutcome::Retried(_) => 2,
        }
    }
}

/// Negotiates payment on an authorized transaction and retries the call once.
pub struct PaymentInterceptor {
    gateway: Arc<dyn TransactionGateway>,
    policy: FailurePolicy,
    poll: PollConfig,
    preference: PaymentPreference,
    metrics: Arc<dyn MetricsCollector>,
}

impl PaymentInterceptor {
    /// Creates an interceptor.
    pub fn new(
        gateway: Arc<dyn TransactionGateway>,
        policy: FailurePolicy,
        poll: PollConfig,
        preference: PaymentPreference,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            gateway,
            policy,
            poll,
            preference,
            metrics,
        }
    }

    /// Handles a 402 response to `request`.
    ///
    /// `send` issues the paid retry. It is consumed by the call, so at most
    /// one retry can ever happen; a second 402 on the retry is returned as-is.
    pub async fn negotiate<F, Fut>(
        &self,
        request: &BufferedRequest,
        response: HttpResponse,
        ctx: &ResolvedContext,
        send: F,
    ) -> TxGuardResult<PaymentOutcome>
    where
        F: FnOnce(HttpRequest) -> Fut,
        Fut: Future<Output = Result<HttpResponse, TransportError>>,
    {
        self.negotiate_until(request, response, ctx, std::future::pending::<()>(), send)
            .await
    }

    /// Handles a 402 like [`negotiate`](Self::negotiate), failing with
    /// [`TxGuardError::AuthorizationCancelled`] if `cancel` resolves while the
    /// payment decision is being polled.
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    pub async fn negotiate_until<C, F, Fut>(
        &self,
        request: &BufferedRequest,
        response: HttpResponse,
        ctx: &ResolvedContext,
        cancel: C,
        send: F,
    ) -> TxGuardResult<PaymentOutcome>
    where
        C: Future<Output = ()>,
        F: FnOnce(HttpRequest) -> Fut,
        Fut: Future<Output = Result<HttpResponse, TransportError>>,
    {
        let Some(envelope) = PaymentRequiredEnvelope::parse(&response.body) else {
            tracing::debug!("402 response carries no payment envelope, passing through");
            return Ok(PaymentOutcome::Declined(response));
        };

        let Some(transaction_id) = request.transaction_id().map(str::to_string) else {
            tracing::debug!("402 response on a call without a transaction, passing through");
            return Ok(PaymentOutcome::Declined(response));
        };

        let Some(requirement) = envelope.select(&self.preference) else {
            return Ok(PaymentOutcome::Declined(response));
        };

        tracing::info!(
            transaction_id = %transaction_id,
            scheme = %requirement.scheme,
            network = %requirement.network,
            amount = %requirement.max_amount_required,
            "Payment required, requesting reauthorization"
        );

        let reauthorize = ReauthorizeWithPayment {
            x402_version: envelope.x402_version,
            payment_requirement: requirement.clone(),
        };

        let tx = match self
            .gateway
            .reauthorize_with_payment(&transaction_id, &reauthorize)
            .await
        {
            Ok(tx) => tx,
            Err(err) => {
                self.policy.absorb(GatewayOperation::Reauthorize, err)?;
                return Ok(self.decline(response));
            }
        };

        let tx = match self.await_decision(tx, ctx, cancel).await {
            Ok(Some(tx)) => tx,
            Ok(None) => return Ok(self.decline(response)),
            Err(err) => {
                self.policy.absorb(GatewayOperation::Poll, err)?;
                return Ok(self.decline(response));
            }
        };

        let payload = tx
            .authorization_payload()
            .ok_or_else(|| TxGuardError::MissingPaymentPayload {
                transaction_id: tx.id.clone(),
            })?;
        let header_value = headers::encode_payment_payload(payload)?;

        let mut retry = request.to_http_request();
        headers::set_header(&mut retry.headers, PAYMENT_HEADER, &header_value)?;

        self.metrics.record_payment(true);
        tracing::info!(transaction_id = %transaction_id, "Payment authorized, retrying call");

        Ok(PaymentOutcome::Retried(send(retry).await))
    }

    /// Returns the authorized transaction, or `None` when payment was refused
    /// or not decided in time.
    async fn await_decision<C>(
        &self,
        tx: Transaction,
        ctx: &ResolvedContext,
        cancel: C,
    ) -> TxGuardResult<Option<Transaction>>
    where
        C: Future<Output = ()>,
    {
        match tx.status {
            TransactionStatus::Authorized => Ok(Some(tx)),
            TransactionStatus::Denied | TransactionStatus::Cancelled => {
                tracing::warn!(transaction_id = %tx.id, status = %tx.status, "Payment refused");
                Ok(None)
            }
            TransactionStatus::Pending | TransactionStatus::Preparing => {
                let poller = TransactionPoller::new(
                    Arc::clone(&self.gateway),
                    self.poll.with_overrides(ctx.poll_interval, ctx.poll_timeout)?,
                );
                match poller.poll_until(&tx.id, cancel).await? {
                    PollResult::Authorized(tx) => Ok(Some(tx)),
                    PollResult::Denied(tx) => {
                        tracing::warn!(transaction_id = %tx.id, status = %tx.status, "Payment refused");
                        Ok(None)
                    }
                    PollResult::Timeout { .. } => {
                        self.metrics.record_poll_timeout();
                        Ok(None)
                    }
                    PollResult::Cancelled { transaction_id } => {
                        Err(TxGuardError::AuthorizationCancelled { transaction_id })
                    }
                }
            }
        }
    }

    fn decline(&self, response: HttpResponse) -> PaymentOutcome {
        self.metrics.record_payment(false);
        PaymentOutcome::Declined(response)
    }
}

impl std::fmt::Debug for PaymentInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentInterceptor")
            .field("policy", &self.policy)
            .field("poll", &self.poll)
            .field("preference", &self.preference)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::TRANSACTION_ID_HEADER;
    use crate::interceptors::FailureMode;
    use crate::mocks::{fixtures, MockGateway};
    use crate::observability::DefaultMetricsCollector;
    use crate::types::RequestDescriptor;
    use http::HeaderMap;
    use std::time::Duration;

    fn interceptor(gateway: Arc<MockGateway>, mode: FailureMode) -> PaymentInterceptor {
        let metrics: Arc<dyn MetricsCollector> = Arc::new(DefaultMetricsCollector::new());
        PaymentInterceptor::new(
            gateway,
            FailurePolicy::new(mode, Arc::clone(&metrics)),
            PollConfig::new(Duration::from_millis(100), Duration::from_millis(1000)),
            PaymentPreference::default(),
            metrics,
        )
    }

    async fn authorized_request() -> BufferedRequest {
        BufferedRequest::capture(
            RequestDescriptor::post("https://api.example.com/premium")
                .try_header(TRANSACTION_ID_HEADER, "tx_1")
                .unwrap()
                .with_text("payload"),
        )
        .await
        .unwrap()
    }

    fn ok(body: &'static str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::new(200, HeaderMap::new(), body))
    }

    #[tokio::test]
    async fn test_retry_carries_payment_header_and_body() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_reauthorize(fixtures::authorized_with_payload("tx_1", "P".into()));
        let request = authorized_request().await;

        let mut sent = None;
        let outcome = interceptor(gateway.clone(), FailureMode::Open)
            .negotiate(
                &request,
                fixtures::payment_required_response(),
                &ResolvedContext::default(),
                |retry| {
                    sent = Some(retry);
                    async { ok("paid") }
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.attempts(), 2);
        match outcome {
            PaymentOutcome::Retried(Ok(response)) => assert_eq!(response.text(), "paid"),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let sent = sent.unwrap();
        assert_eq!(sent.headers.get(PAYMENT_HEADER).unwrap(), "P");
        assert_eq!(sent.body.as_deref(), Some(&b"payload"[..]));

        let calls = gateway.reauthorize_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "tx_1");
        assert_eq!(calls[0].1.payment_requirement.network, "base-sepolia");
    }

    #[tokio::test]
    async fn test_unparseable_402_passes_through() {
        let gateway = Arc::new(MockGateway::new());
        let request = authorized_request().await;
        let original = HttpResponse::new(402, HeaderMap::new(), "pay up");

        let outcome = interceptor(gateway.clone(), FailureMode::Closed)
            .negotiate(&request, original, &ResolvedContext::default(), |_| async {
                ok("unreachable")
            })
            .await
            .unwrap();

        match outcome {
            PaymentOutcome::Declined(response) => assert_eq!(response.text(), "pay up"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(gateway.reauthorize_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_transaction_passes_through() {
        let gateway = Arc::new(MockGateway::new());
        let request = BufferedRequest::capture(RequestDescriptor::get("https://api.example.com"))
            .await
            .unwrap();

        let outcome = interceptor(gateway.clone(), FailureMode::Closed)
            .negotiate(
                &request,
                fixtures::payment_required_response(),
                &ResolvedContext::default(),
                |_| async { ok("unreachable") },
            )
            .await
            .unwrap();

        assert!(matches!(outcome, PaymentOutcome::Declined(_)));
        assert!(gateway.reauthorize_calls().is_empty());
    }

    #[tokio::test]
    async fn test_reauthorize_failure_by_mode() {
        let request = authorized_request().await;

        let gateway = Arc::new(MockGateway::new());
        gateway.push_reauthorize_error(TxGuardError::gateway(GatewayOperation::Reauthorize, "down"));
        let outcome = interceptor(gateway, FailureMode::Open)
            .negotiate(
                &request,
                fixtures::payment_required_response(),
                &ResolvedContext::default(),
                |_| async { ok("unreachable") },
            )
            .await
            .unwrap();
        match outcome {
            PaymentOutcome::Declined(response) => assert_eq!(response.status, 402),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let gateway = Arc::new(MockGateway::new());
        gateway.push_reauthorize_error(TxGuardError::gateway(GatewayOperation::Reauthorize, "down"));
        let err = interceptor(gateway, FailureMode::Closed)
            .negotiate(
                &request,
                fixtures::payment_required_response(),
                &ResolvedContext::default(),
                |_| async { ok("unreachable") },
            )
            .await
            .unwrap_err();
        assert!(err.is_gateway_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_denied_passes_through() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_reauthorize(fixtures::transaction("tx_1", TransactionStatus::Pending));
        gateway.push_get(fixtures::transaction("tx_1", TransactionStatus::Denied));
        let request = authorized_request().await;

        let outcome = interceptor(gateway, FailureMode::Closed)
            .negotiate(
                &request,
                fixtures::payment_required_response(),
                &ResolvedContext::default(),
                |_| async { ok("unreachable") },
            )
            .await
            .unwrap();

        assert!(matches!(outcome, PaymentOutcome::Declined(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_payment_wait() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_reauthorize(fixtures::transaction("tx_1", TransactionStatus::Pending));
        gateway.set_get_default(fixtures::transaction("tx_1", TransactionStatus::Pending));
        let request = authorized_request().await;

        let err = interceptor(gateway.clone(), FailureMode::Open)
            .negotiate_until(
                &request,
                fixtures::payment_required_response(),
                &ResolvedContext::default(),
                tokio::time::sleep(Duration::from_millis(250)),
                |_| async { ok("unreachable") },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TxGuardError::AuthorizationCancelled { .. }));
        // fetches at 0, 100 and 200 ms against a 1000 ms timeout
        assert_eq!(gateway.get_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_poll_override_is_rejected() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_reauthorize(fixtures::transaction("tx_1", TransactionStatus::Pending));
        let request = authorized_request().await;
        let ctx = ResolvedContext {
            poll_interval: Some(Duration::ZERO),
            ..ResolvedContext::default()
        };

        let err = interceptor(gateway.clone(), FailureMode::Open)
            .negotiate(&request, fixtures::payment_required_response(), &ctx, |_| async {
                ok("unreachable")
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TxGuardError::Configuration { .. }));
        assert!(gateway.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_payload_is_fatal_in_both_modes() {
        for mode in [FailureMode::Open, FailureMode::Closed] {
            let gateway = Arc::new(MockGateway::new());
            gateway.push_reauthorize(fixtures::transaction("tx_1", TransactionStatus::Authorized));
            let request = authorized_request().await;

            let err = interceptor(gateway, mode)
                .negotiate(
                    &request,
                    fixtures::payment_required_response(),
                    &ResolvedContext::default(),
                    |_| async { ok("unreachable") },
                )
                .await
                .unwrap_err();

            assert!(matches!(err, TxGuardError::MissingPaymentPayload { .. }));
        }
    }

    #[tokio::test]
    async fn test_structured_payload_is_base64_encoded() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_reauthorize(fixtures::authorized_with_payload(
            "tx_1",
            serde_json::json!({"signature": "0xabc"}),
        ));
        let request = authorized_request().await;

        let mut header = None;
        interceptor(gateway, FailureMode::Open)
            .negotiate(
                &request,
                fixtures::payment_required_response(),
                &ResolvedContext::default(),
                |retry| {
                    header = retry
                        .headers
                        .get(PAYMENT_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    async { ok("paid") }
                },
            )
            .await
            .unwrap();

        assert_eq!(header.as_deref(), Some("eyJzaWduYXR1cmUiOiIweGFiYyJ9"));
    }
}
