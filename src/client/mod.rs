//! Guarded HTTP client.
//!
//! Wires the interceptors around a transport: authorize, send, negotiate
//! payment on 402, report completion.

use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::instrument;

use crate::auth::{ApiKeyAuth, AuthProvider, NoAuth};
use crate::config::TxGuardConfig;
use crate::errors::{TxGuardError, TxGuardResult};
use crate::gateway::{HttpTransactionGateway, TransactionGateway};
use crate::interceptors::{AuthorizationInterceptor, FailurePolicy, PaymentInterceptor, PaymentOutcome};
use crate::observability::{DefaultMetricsCollector, MetricsCollector};
use crate::reporting::CompletionReporter;
use crate::transport::{HttpResponse, HttpTransport, ReqwestTransport};
use crate::types::{BufferedRequest, CallContext, CompletionReport, RequestDescriptor, ResolvedContext};

/// HTTP client whose calls are gated by the authorization gateway.
///
/// # Example
///
/// ```rust,no_run
/// use txguard_client::{CallContext, RequestDescriptor, TxGuardClient, TxGuardConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = TxGuardConfig::builder()
///         .gateway_url("https://gateway.example.com/v1")
///         .api_key("tg_live_key")
///         .agent_id("research-agent")
///         .build()?;
///
///     let client = TxGuardClient::builder().config(config).build()?;
///
///     let response = client
///         .execute(
///             RequestDescriptor::get("https://api.example.com/forecast"),
///             CallContext::new().service_name("weather").action_name("forecast"),
///         )
///         .await?;
///
///     println!("{}", response.text());
///     client.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct TxGuardClient {
    config: Arc<TxGuardConfig>,
    transport: Arc<dyn HttpTransport>,
    authorization: AuthorizationInterceptor,
    payment: PaymentInterceptor,
    reporter: CompletionReporter,
    metrics: Arc<dyn MetricsCollector>,
}

impl TxGuardClient {
    /// Creates a new client builder.
    pub fn builder() -> TxGuardClientBuilder {
        TxGuardClientBuilder::new()
    }

    /// Creates a client from environment variables.
    ///
    /// See [`TxGuardConfig::from_env`] for the variables read.
    pub fn from_env() -> TxGuardResult<Self> {
        TxGuardClientBuilder::new()
            .config(TxGuardConfig::from_env()?)
            .build()
    }

    /// Executes a guarded call.
    ///
    /// The caller's source location is recorded as the call site sent to the
    /// gateway.
    #[track_caller]
    pub fn execute<'a>(
        &'a self,
        request: RequestDescriptor,
        ctx: CallContext,
    ) -> impl Future<Output = TxGuardResult<HttpResponse>> + Send + 'a {
        let call_site = caller_location();
        self.run(request, ctx, call_site, std::future::pending::<()>())
    }

    /// Executes a guarded call, giving up once `cancel` resolves while the
    /// client is waiting on a gateway decision.
    ///
    /// Both the authorization wait and the payment wait after a 402 observe
    /// `cancel` and fail with [`TxGuardError::AuthorizationCancelled`]. An
    /// in-flight network call runs to completion.
    #[track_caller]
    pub fn execute_until<'a, C>(
        &'a self,
        request: RequestDescriptor,
        ctx: CallContext,
        cancel: C,
    ) -> impl Future<Output = TxGuardResult<HttpResponse>> + Send + 'a
    where
        C: Future<Output = ()> + Send + 'a,
    {
        let call_site = caller_location();
        self.run(request, ctx, call_site, cancel)
    }

    /// Waits for queued completion reports to be delivered.
    pub async fn flush(&self) {
        self.reporter.flush().await;
    }

    /// Delivers queued completion reports and stops the reporter.
    pub async fn shutdown(&self) {
        self.reporter.shutdown().await;
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TxGuardConfig {
        &self.config
    }

    /// Returns the metrics collector.
    pub fn metrics(&self) -> &Arc<dyn MetricsCollector> {
        &self.metrics
    }

    #[instrument(skip_all, fields(method = %request.method, url = %request.url, call_site = %call_site))]
    async fn run<C>(
        &self,
        request: RequestDescriptor,
        ctx: CallContext,
        call_site: String,
        cancel: C,
    ) -> TxGuardResult<HttpResponse>
    where
        C: Future<Output = ()> + Send,
    {
        let ctx = ctx.resolve(&self.config.metadata).with_call_site(call_site);
        let cancel = cancel.shared();

        let request = BufferedRequest::capture(request).await?;
        let request = self
            .authorization
            .authorize_until(request, &ctx, cancel.clone())
            .await?;
        let transaction_id = request.transaction_id().map(str::to_string);

        let start = Instant::now();
        let (result, attempts) = self.dispatch(&request, &ctx, cancel).await;
        let elapsed = start.elapsed();

        let report = match &result {
            Ok(response) => {
                self.metrics.record_request(response.status < 400, elapsed);
                CompletionReport::for_response(response, elapsed, attempts)
            }
            Err(err) => {
                self.metrics.record_request(false, elapsed);
                CompletionReport::for_error(err, elapsed, attempts)
            }
        };

        match transaction_id {
            Some(id) => self.reporter.report(id, report),
            None => tracing::debug!("No transaction for this call, skipping completion"),
        }

        result
    }

    /// Sends the request and handles a 402. Returns the result and the
    /// number of HTTP attempts made.
    async fn dispatch<C>(
        &self,
        request: &BufferedRequest,
        ctx: &ResolvedContext,
        cancel: C,
    ) -> (TxGuardResult<HttpResponse>, u32)
    where
        C: Future<Output = ()> + Send,
    {
        let response = match self.transport.send(request.to_http_request()).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(error = %err, "Outbound call failed");
                return (Err(err.into()), 1);
            }
        };

        if !response.is_payment_required() {
            return (Ok(response), 1);
        }

        let transport = Arc::clone(&self.transport);
        let negotiated = self
            .payment
            .negotiate_until(request, response, ctx, cancel, move |retry| async move {
                transport.send(retry).await
            })
            .await;

        match negotiated {
            Ok(outcome) => {
                let attempts = outcome.attempts();
                let result = match outcome {
                    PaymentOutcome::Declined(response) => Ok(response),
                    PaymentOutcome::Retried(result) => result.map_err(TxGuardError::from),
                };
                (result, attempts)
            }
            Err(err) => (Err(err), 1),
        }
    }
}

#[track_caller]
fn caller_location() -> String {
    let location = std::panic::Location::caller();
    format!("{}:{}:{}", location.file(), location.line(), location.column())
}

impl std::fmt::Debug for TxGuardClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxGuardClient")
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for the txguard client.
#[derive(Default)]
pub struct TxGuardClientBuilder {
    config: Option<TxGuardConfig>,
    transport: Option<Arc<dyn HttpTransport>>,
    gateway: Option<Arc<dyn TransactionGateway>>,
    auth: Option<Arc<dyn AuthProvider>>,
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl TxGuardClientBuilder {
    /// Creates a new client builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    pub fn config(mut self, config: TxGuardConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the transport used for outbound calls and, unless a custom
    /// gateway is set, for gateway calls.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets a custom gateway, replacing the HTTP gateway.
    pub fn gateway(mut self, gateway: Arc<dyn TransactionGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Sets a custom auth provider for the HTTP gateway.
    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets a custom metrics collector.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the client.
    pub fn build(self) -> TxGuardResult<TxGuardClient> {
        let config = self.config.unwrap_or_default();

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_defaults()?),
        };

        let gateway: Arc<dyn TransactionGateway> = match self.gateway {
            Some(gateway) => gateway,
            None => {
                let url = config.gateway_url.as_deref().ok_or_else(|| {
                    TxGuardError::configuration("A gateway URL or a custom gateway is required")
                })?;
                let auth: Arc<dyn AuthProvider> = match (self.auth, config.api_key()) {
                    (Some(auth), _) => auth,
                    (None, Some(key)) => Arc::new(ApiKeyAuth::from_string(key)),
                    (None, None) => {
                        tracing::warn!("No gateway API key configured, sending unauthenticated gateway requests");
                        Arc::new(NoAuth)
                    }
                };
                Arc::new(HttpTransactionGateway::new(
                    Arc::clone(&transport),
                    auth,
                    url,
                    config.gateway_timeout,
                )?)
            }
        };

        let metrics: Arc<dyn MetricsCollector> = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(DefaultMetricsCollector::new()),
        };
        let policy = FailurePolicy::new(config.failure_mode, Arc::clone(&metrics));

        let authorization = AuthorizationInterceptor::new(
            Arc::clone(&gateway),
            policy.clone(),
            config.poll.clone(),
            Arc::clone(&metrics),
        );
        let payment = PaymentInterceptor::new(
            Arc::clone(&gateway),
            policy,
            config.poll.clone(),
            config.payment_preference.clone(),
            Arc::clone(&metrics),
        );
        let reporter = CompletionReporter::new(
            gateway,
            Arc::clone(&metrics),
            config.completion_queue_capacity,
        );

        tracing::debug!(
            failure_mode = %config.failure_mode,
            poll_interval_ms = config.poll.interval.as_millis() as u64,
            poll_timeout_ms = config.poll.timeout.as_millis() as u64,
            "txguard client initialized"
        );

        Ok(TxGuardClient {
            config: Arc::new(config),
            transport,
            authorization,
            payment,
            reporter,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockGateway, MockTransport};

    #[test]
    fn test_build_requires_gateway() {
        let result = TxGuardClient::builder()
            .transport(Arc::new(MockTransport::new()))
            .build();
        assert!(matches!(result, Err(TxGuardError::Configuration { .. })));
    }

    #[test]
    fn test_build_with_gateway_url() {
        let config = TxGuardConfig::builder()
            .gateway_url("https://gateway.example.com")
            .api_key("tg_key_1234")
            .build()
            .unwrap();

        let client = TxGuardClient::builder()
            .config(config)
            .transport(Arc::new(MockTransport::new()))
            .build()
            .unwrap();

        assert_eq!(
            client.config().gateway_url.as_deref(),
            Some("https://gateway.example.com")
        );
    }

    #[test]
    fn test_build_with_custom_gateway() {
        let client = TxGuardClient::builder()
            .transport(Arc::new(MockTransport::new()))
            .gateway(Arc::new(MockGateway::new()))
            .build();
        assert!(client.is_ok());
    }

    #[test]
    fn test_caller_location_points_here() {
        let site = caller_location();
        assert!(site.starts_with(file!()));
    }
}
