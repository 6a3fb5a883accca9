//! Authorization gateway collaborator.
//!
//! The interceptors talk to the authorization backend exclusively through the
//! [`TransactionGateway`] trait. [`HttpTransactionGateway`] is the production
//! implementation; tests substitute [`MockGateway`](crate::mocks::MockGateway).

mod http_gateway;

pub use http_gateway::HttpTransactionGateway;

use async_trait::async_trait;

use crate::errors::TxGuardResult;
use crate::types::{CompletionReport, CreateTransaction, ReauthorizeWithPayment, Transaction};

/// Client of the authorization backend.
///
/// Every failure surfaces as
/// [`TxGuardError::GatewayUnavailable`](crate::errors::TxGuardError::GatewayUnavailable)
/// so the failure policy can decide whether to absorb it.
#[async_trait]
pub trait TransactionGateway: Send + Sync {
    /// Registers a new transaction for an outbound request.
    async fn create(&self, request: &CreateTransaction) -> TxGuardResult<Transaction>;

    /// Fetches the current state of a transaction.
    async fn get(&self, transaction_id: &str) -> TxGuardResult<Transaction>;

    /// Records the outcome of a call.
    async fn complete(&self, transaction_id: &str, report: &CompletionReport) -> TxGuardResult<()>;

    /// Moves a transaction back into review with a payment requirement.
    async fn reauthorize_with_payment(
        &self,
        transaction_id: &str,
        request: &ReauthorizeWithPayment,
    ) -> TxGuardResult<Transaction>;
}
