//! Bounded-time transaction polling.
//!
//! Used by both the authorization wait and the payment wait. The loop
//! fetches immediately, then sleeps between fetches until a terminal status
//! arrives or the deadline passes. A sleep never extends past the deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;

use crate::errors::{GatewayOperation, TxGuardError, TxGuardResult};
use crate::gateway::TransactionGateway;
use crate::types::{Transaction, TransactionStatus};

/// Default interval between fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default polling deadline.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Spacing between successive fetches.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStrategy {
    /// The configured interval between every fetch.
    Fixed,
    /// The interval grows by `multiplier` after each fetch.
    Exponential {
        /// Growth factor per fetch.
        multiplier: f64,
        /// Upper bound on a single sleep.
        max_interval: Duration,
        /// Add up to 25% random variation.
        jitter: bool,
    },
}

impl Default for PollStrategy {
    fn default() -> Self {
        PollStrategy::Fixed
    }
}

impl PollStrategy {
    /// Exponential backoff doubling up to five seconds, with jitter.
    pub fn exponential() -> Self {
        PollStrategy::Exponential {
            multiplier: 2.0,
            max_interval: Duration::from_secs(5),
            jitter: true,
        }
    }

    /// Returns the sleep before fetch number `attempt + 1`.
    pub fn delay(&self, interval: Duration, attempt: u32) -> Duration {
        match self {
            PollStrategy::Fixed => interval,
            PollStrategy::Exponential {
                multiplier,
                max_interval,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let base_ms = interval.as_millis() as f64 * multiplier.powi(exponent);
                let delay_ms = base_ms.min(max_interval.as_millis() as f64);

                let delay_ms = if *jitter {
                    delay_ms * (1.0 + rand::random::<f64>() * 0.25)
                } else {
                    delay_ms
                };

                Duration::from_millis(delay_ms as u64)
            }
        }
    }
}

/// Polling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Base interval between fetches.
    pub interval: Duration,
    /// Deadline measured from the first fetch.
    pub timeout: Duration,
    /// Backoff strategy.
    pub strategy: PollStrategy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
            strategy: PollStrategy::Fixed,
        }
    }
}

impl PollConfig {
    /// Creates a fixed-interval configuration.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            strategy: PollStrategy::Fixed,
        }
    }

    /// Sets the backoff strategy.
    pub fn with_strategy(mut self, strategy: PollStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Applies per-call overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an override is zero.
    pub fn with_overrides(
        &self,
        interval: Option<Duration>,
        timeout: Option<Duration>,
    ) -> TxGuardResult<Self> {
        let merged = Self {
            interval: interval.unwrap_or(self.interval),
            timeout: timeout.unwrap_or(self.timeout),
            strategy: self.strategy.clone(),
        };
        merged.validate()?;
        Ok(merged)
    }

    /// Validates the settings.
    pub fn validate(&self) -> TxGuardResult<()> {
        if self.interval.is_zero() {
            return Err(TxGuardError::configuration(
                "Poll interval must be greater than zero",
            ));
        }
        if self.timeout.is_zero() {
            return Err(TxGuardError::configuration(
                "Poll timeout must be greater than zero",
            ));
        }
        if let PollStrategy::Exponential {
            multiplier,
            max_interval,
            ..
        } = &self.strategy
        {
            if !multiplier.is_finite() || *multiplier < 1.0 {
                return Err(TxGuardError::configuration(
                    "Poll backoff multiplier must be at least 1.0",
                ));
            }
            if max_interval.is_zero() {
                return Err(TxGuardError::configuration(
                    "Poll backoff max interval must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}

/// Outcome of a poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    /// The transaction reached `authorized`.
    Authorized(Transaction),
    /// The transaction reached `denied` or `cancelled`.
    Denied(Transaction),
    /// The deadline passed with the transaction still undecided.
    Timeout {
        /// Transaction being polled.
        transaction_id: String,
        /// Time spent polling.
        elapsed: Duration,
    },
    /// The caller's cancellation future resolved first.
    Cancelled {
        /// Transaction being polled.
        transaction_id: String,
    },
}

impl PollResult {
    /// Converts the outcome into the authorized transaction or the matching
    /// error.
    pub fn into_result(self) -> TxGuardResult<Transaction> {
        match self {
            PollResult::Authorized(tx) => Ok(tx),
            PollResult::Denied(tx) => Err(TxGuardError::denied(tx.id, tx.status)),
            PollResult::Timeout {
                transaction_id,
                elapsed,
            } => Err(TxGuardError::AuthorizationTimeout {
                transaction_id,
                elapsed,
            }),
            PollResult::Cancelled { transaction_id } => {
                Err(TxGuardError::AuthorizationCancelled { transaction_id })
            }
        }
    }

    /// Returns true for `Authorized`.
    pub fn is_authorized(&self) -> bool {
        matches!(self, PollResult::Authorized(_))
    }
}

/// Polls a transaction until it settles.
pub struct TransactionPoller {
    gateway: Arc<dyn TransactionGateway>,
    config: PollConfig,
}

impl TransactionPoller {
    /// Creates a poller.
    pub fn new(gateway: Arc<dyn TransactionGateway>, config: PollConfig) -> Self {
        Self { gateway, config }
    }

    /// Returns the polling settings.
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Polls until a terminal status or the deadline.
    ///
    /// Only a failing fetch produces an error; the three ordinary outcomes are
    /// values.
    pub async fn poll(&self, transaction_id: &str) -> TxGuardResult<PollResult> {
        self.poll_until(transaction_id, std::future::pending::<()>())
            .await
    }

    /// Polls like [`poll`](Self::poll), returning [`PollResult::Cancelled`]
    /// as soon as `cancel` resolves.
    #[instrument(skip(self, cancel), fields(interval_ms = self.config.interval.as_millis() as u64, timeout_ms = self.config.timeout.as_millis() as u64))]
    pub async fn poll_until<C>(&self, transaction_id: &str, cancel: C) -> TxGuardResult<PollResult>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::debug!(transaction_id, "Polling cancelled by caller");
                Ok(PollResult::Cancelled {
                    transaction_id: transaction_id.to_string(),
                })
            }
            result = self.run(transaction_id) => result,
        }
    }

    async fn run(&self, transaction_id: &str) -> TxGuardResult<PollResult> {
        let start = Instant::now();
        let deadline = start + self.config.timeout;
        let mut attempt: u32 = 0;

        loop {
            let tx = self.gateway.get(transaction_id).await.map_err(|err| match err {
                TxGuardError::GatewayUnavailable {
                    message,
                    status_code,
                    ..
                } => TxGuardError::GatewayUnavailable {
                    operation: GatewayOperation::Poll,
                    message,
                    status_code,
                },
                other => other,
            })?;

            match tx.status {
                TransactionStatus::Authorized => {
                    tracing::debug!(transaction_id, attempts = attempt + 1, "Transaction authorized");
                    return Ok(PollResult::Authorized(tx));
                }
                TransactionStatus::Denied | TransactionStatus::Cancelled => {
                    tracing::debug!(transaction_id, status = %tx.status, "Transaction refused");
                    return Ok(PollResult::Denied(tx));
                }
                TransactionStatus::Pending | TransactionStatus::Preparing => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(self.timeout(transaction_id, start));
            }

            let delay = self
                .config
                .strategy
                .delay(self.config.interval, attempt)
                .min(deadline - now);

            tracing::trace!(
                transaction_id,
                status = %tx.status,
                delay_ms = delay.as_millis() as u64,
                "Transaction undecided, waiting"
            );

            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);

            if Instant::now() >= deadline {
                return Ok(self.timeout(transaction_id, start));
            }
        }
    }

    fn timeout(&self, transaction_id: &str, start: Instant) -> PollResult {
        let elapsed = start.elapsed();
        tracing::warn!(
            transaction_id,
            elapsed_ms = elapsed.as_millis() as u64,
            "Authorization polling timed out"
        );
        PollResult::Timeout {
            transaction_id: transaction_id.to_string(),
            elapsed,
        }
    }
}

impl std::fmt::Debug for TransactionPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionPoller")
            .field("config", &self.config)
            .finish()
    }
}
