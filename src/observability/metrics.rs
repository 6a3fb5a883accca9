//! Metrics collection for guarded calls.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::errors::GatewayOperation;

/// Metrics collector interface.
pub trait MetricsCollector: Send + Sync {
    /// Records a settled guarded call.
    fn record_request(&self, success: bool, duration: Duration);

    /// Records a transaction created for an outbound call.
    fn record_transaction_created(&self);

    /// Records a call that reached `authorized`.
    fn record_authorized(&self);

    /// Records a call refused by the gateway.
    fn record_denied(&self);

    /// Records a poll that hit its deadline.
    fn record_poll_timeout(&self);

    /// Records a failed gateway call.
    fn record_gateway_error(&self, operation: GatewayOperation);

    /// Records a gateway failure absorbed by fail-open mode.
    fn record_fail_open(&self, operation: GatewayOperation);

    /// Records a payment negotiation; `retried` is true when the paid retry
    /// was issued.
    fn record_payment(&self, retried: bool);

    /// Records a completion report delivery attempt.
    fn record_completion(&self, delivered: bool);

    /// Records a completion report dropped before delivery.
    fn record_completion_dropped(&self);

    /// Gets current metrics.
    fn get_metrics(&self) -> GuardMetrics;

    /// Resets all metrics.
    fn reset(&self);
}

/// Guard metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuardMetrics {
    /// Total guarded calls.
    pub total_requests: u64,
    /// Guarded calls that produced a non-error response.
    pub successful_requests: u64,
    /// Guarded calls that failed or produced an error response.
    pub failed_requests: u64,
    /// Total latency in milliseconds.
    pub total_latency_ms: u64,
    /// Transactions created.
    pub transactions_created: u64,
    /// Calls authorized.
    pub authorized: u64,
    /// Calls denied.
    pub denied: u64,
    /// Polls that timed out.
    pub poll_timeouts: u64,
    /// Payment negotiations started.
    pub payments_attempted: u64,
    /// Paid retries issued.
    pub payments_retried: u64,
    /// Completion reports delivered.
    pub completions_delivered: u64,
    /// Completion reports that failed.
    pub completions_failed: u64,
    /// Completion reports dropped.
    pub completions_dropped: u64,
    /// Gateway errors by operation.
    pub gateway_errors: HashMap<String, u64>,
    /// Fail-open passthroughs by operation.
    pub fail_open: HashMap<String, u64>,
}

impl GuardMetrics {
    /// Calculates average latency in milliseconds.
    pub fn average_latency_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.total_requests as f64
        }
    }

    /// Total fail-open passthroughs across operations.
    pub fn total_fail_open(&self) -> u64 {
        self.fail_open.values().sum()
    }
}

/// Default metrics collector implementation.
#[derive(Default)]
pub struct DefaultMetricsCollector {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_latency_ms: AtomicU64,
    transactions_created: AtomicU64,
    authorized: AtomicU64,
    denied: AtomicU64,
    poll_timeouts: AtomicU64,
    payments_attempted: AtomicU64,
    payments_retried: AtomicU64,
    completions_delivered: AtomicU64,
    completions_failed: AtomicU64,
    completions_dropped: AtomicU64,
    gateway_errors: RwLock<HashMap<String, u64>>,
    fail_open: RwLock<HashMap<String, u64>>,
}

impl DefaultMetricsCollector {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsCollector for DefaultMetricsCollector {
    fn record_request(&self, success: bool, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms.fetch_add(
            u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    fn record_transaction_created(&self) {
        self.transactions_created.fetch_add(1, Ordering::Relaxed);
    }

    fn record_authorized(&self) {
        self.authorized.fetch_add(1, Ordering::Relaxed);
    }

    fn record_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    fn record_poll_timeout(&self) {
        self.poll_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_gateway_error(&self, operation: GatewayOperation) {
        *self
            .gateway_errors
            .write()
            .entry(operation.as_str().to_string())
            .or_insert(0) += 1;
    }

    fn record_fail_open(&self, operation: GatewayOperation) {
        *self
            .fail_open
            .write()
            .entry(operation.as_str().to_string())
            .or_insert(0) += 1;
    }

    fn record_payment(&self, retried: bool) {
        self.payments_attempted.fetch_add(1, Ordering::Relaxed);
        if retried {
            self.payments_retried.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_completion(&self, delivered: bool) {
        if delivered {
            self.completions_delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.completions_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_completion_dropped(&self) {
        self.completions_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn get_metrics(&self) -> GuardMetrics {
        GuardMetrics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            total_latency_ms: self.total_latency_ms.load(Ordering::Relaxed),
            transactions_created: self.transactions_created.load(Ordering::Relaxed),
            authorized: self.authorized.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
            payments_attempted: self.payments_attempted.load(Ordering::Relaxed),
            payments_retried: self.payments_retried.load(Ordering::Relaxed),
            completions_delivered: self.completions_delivered.load(Ordering::Relaxed),
            completions_failed: self.completions_failed.load(Ordering::Relaxed),
            completions_dropped: self.completions_dropped.load(Ordering::Relaxed),
            gateway_errors: self.gateway_errors.read().clone(),
            fail_open: self.fail_open.read().clone(),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.successful_requests,
            &self.failed_requests,
            &self.total_latency_ms,
            &self.transactions_created,
            &self.authorized,
            &self.denied,
            &self.poll_timeouts,
            &self.payments_attempted,
            &self.payments_retried,
            &self.completions_delivered,
            &self.completions_failed,
            &self.completions_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.gateway_errors.write().clear();
        self.fail_open.write().clear();
    }
}

impl std::fmt::Debug for DefaultMetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultMetricsCollector")
            .field("total_requests", &self.total_requests.load(Ordering::Relaxed))
            .field("authorized", &self.authorized.load(Ordering::Relaxed))
            .field("denied", &self.denied.load(Ordering::Relaxed))
            .finish()
    }
}
