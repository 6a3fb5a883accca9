//! Pre-flight authorization of outbound calls.

use std::future::Future;
use std::sync::Arc;
use tracing::instrument;

use super::FailurePolicy;
use crate::errors::{GatewayOperation, TxGuardError, TxGuardResult};
use crate::gateway::TransactionGateway;
use crate::headers;
use crate::observability::MetricsCollector;
use crate::polling::{PollConfig, PollResult, TransactionPoller};
use crate::types::{
    BufferedRequest, CreateTransaction, RequestFacts, ResolvedContext, Transaction,
    TransactionStatus,
};

/// Creates or reuses a transaction for a request and waits for its decision.
///
/// On success the request carries exactly one transaction id header. When the
/// gateway fails and the policy is fail-open, the request comes back without
/// one.
pub struct AuthorizationInterceptor {
    gateway: Arc<dyn TransactionGateway>,
    policy: FailurePolicy,
    poll: PollConfig,
    metrics: Arc<dyn MetricsCollector>,
}

impl AuthorizationInterceptor {
    /// Creates an interceptor.
    pub fn new(
        gateway: Arc<dyn TransactionGateway>,
        policy: FailurePolicy,
        poll: PollConfig,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            gateway,
            policy,
            poll,
            metrics,
        }
    }

    /// Authorizes a request.
    pub async fn authorize(
        &self,
        request: BufferedRequest,
        ctx: &ResolvedContext,
    ) -> TxGuardResult<BufferedRequest> {
        self.authorize_until(request, ctx, std::future::pending::<()>())
            .await
    }

    /// Authorizes a request, abandoning any wait for a decision once `cancel`
    /// resolves.
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    pub async fn authorize_until<C>(
        &self,
        request: BufferedRequest,
        ctx: &ResolvedContext,
        cancel: C,
    ) -> TxGuardResult<BufferedRequest>
    where
        C: Future<Output = ()>,
    {
        let poller = TransactionPoller::new(
            Arc::clone(&self.gateway),
            self.poll.with_overrides(ctx.poll_interval, ctx.poll_timeout)?,
        );

        if let Some(transaction_id) = request.transaction_id().map(str::to_string) {
            tracing::debug!(transaction_id = %transaction_id, "Reusing transaction from request header");
            let tx = match self.gateway.get(&transaction_id).await {
                Ok(tx) => tx,
                Err(err) => {
                    self.policy.absorb(GatewayOperation::Get, err)?;
                    return Ok(request);
                }
            };
            return self.settle(request, tx, &poller, cancel).await;
        }

        if ctx.skip_authorization {
            tracing::debug!("Authorization skipped for this call");
            return Ok(request);
        }

        let create = CreateTransaction {
            request: RequestFacts::from_request(&request, ctx.call_site.clone()),
            service_name: ctx.service_name.clone(),
            action_name: ctx.action_name.clone(),
            resource_name: ctx.resource_name.clone(),
            trace_id: ctx.trace_id.clone(),
            agent_id: ctx.agent_id.clone(),
            agent_name: ctx.agent_name.clone(),
            qualifiers: ctx.qualifiers.clone(),
        };

        let tx = match self.gateway.create(&create).await {
            Ok(tx) => {
                self.metrics.record_transaction_created();
                tracing::debug!(transaction_id = %tx.id, status = %tx.status, "Transaction created");
                tx
            }
            Err(err) => {
                self.policy.absorb(GatewayOperation::Create, err)?;
                return Ok(request);
            }
        };

        self.settle(request, tx, &poller, cancel).await
    }

    async fn settle<C>(
        &self,
        mut request: BufferedRequest,
        tx: Transaction,
        poller: &TransactionPoller,
        cancel: C,
    ) -> TxGuardResult<BufferedRequest>
    where
        C: Future<Output = ()>,
    {
        let tx = match tx.status {
            TransactionStatus::Authorized => tx,
            TransactionStatus::Denied | TransactionStatus::Cancelled => {
                return Err(self.denied(&tx));
            }
            TransactionStatus::Pending | TransactionStatus::Preparing => {
                match poller.poll_until(&tx.id, cancel).await {
                    Ok(PollResult::Authorized(tx)) => tx,
                    Ok(PollResult::Denied(tx)) => return Err(self.denied(&tx)),
                    Ok(PollResult::Timeout {
                        transaction_id,
                        elapsed,
                    }) => {
                        self.metrics.record_poll_timeout();
                        return Err(TxGuardError::AuthorizationTimeout {
                            transaction_id,
                            elapsed,
                        });
                    }
                    Ok(PollResult::Cancelled { transaction_id }) => {
                        return Err(TxGuardError::AuthorizationCancelled { transaction_id });
                    }
                    Err(err) => {
                        self.policy.absorb(GatewayOperation::Poll, err)?;
                        tracing::warn!(
                            transaction_id = %tx.id,
                            "Transaction abandoned after poll failure, it will not be completed"
                        );
                        return Ok(request);
                    }
                }
            }
        };

        self.metrics.record_authorized();
        headers::set_transaction_id(&mut request.headers, &tx.id)?;
        tracing::info!(transaction_id = %tx.id, "Call authorized");
        Ok(request)
    }

    fn denied(&self, tx: &Transaction) -> TxGuardError {
        self.metrics.record_denied();
        tracing::warn!(transaction_id = %tx.id, status = %tx.status, "Call denied");
        TxGuardError::denied(tx.id.clone(), tx.status)
    }
}

impl std::fmt::Debug for AuthorizationInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationInterceptor")
            .field("policy", &self.policy)
            .field("poll", &self.poll)
            .finish()
    }
}
