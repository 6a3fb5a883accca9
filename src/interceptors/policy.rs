//! Fail-open / fail-closed handling of gateway malfunctions.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::{GatewayOperation, TxGuardError, TxGuardResult};
use crate::observability::MetricsCollector;

/// Behavior when the authorization gateway itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Let the call proceed unauthorized/unpaid, with a warning.
    #[default]
    Open,
    /// Propagate the gateway failure to the caller.
    Closed,
}

impl FailureMode {
    /// Returns the configuration name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureMode::Open => "open",
            FailureMode::Closed => "closed",
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureMode {
    type Err = TxGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailureMode::Open),
            "closed" => Ok(FailureMode::Closed),
            other => Err(TxGuardError::configuration(format!(
                "Unknown failure mode '{}', expected 'open' or 'closed'",
                other
            ))),
        }
    }
}

/// Decides whether an error may be swallowed.
///
/// Only [`TxGuardError::GatewayUnavailable`] is ever absorbed, and only in
/// [`FailureMode::Open`]. Denials, timeouts and a missing payment payload
/// always propagate.
#[derive(Clone)]
pub struct FailurePolicy {
    mode: FailureMode,
    metrics: Arc<dyn MetricsCollector>,
}

impl FailurePolicy {
    /// Creates a policy.
    pub fn new(mode: FailureMode, metrics: Arc<dyn MetricsCollector>) -> Self {
        Self { mode, metrics }
    }

    /// Returns the configured mode.
    pub fn mode(&self) -> FailureMode {
        self.mode
    }

    /// Returns `Ok(())` when `error` is absorbed and the caller should fall
    /// back to passthrough, or the error itself when it must propagate.
    pub fn absorb(&self, operation: GatewayOperation, error: TxGuardError) -> TxGuardResult<()> {
        if !error.is_gateway_failure() {
            return Err(error);
        }

        self.metrics.record_gateway_error(operation);

        match self.mode {
            FailureMode::Open => {
                tracing::warn!(
                    operation = %operation,
                    error = %error,
                    "Gateway unavailable, continuing without authorization (fail-open)"
                );
                self.metrics.record_fail_open(operation);
                Ok(())
            }
            FailureMode::Closed => {
                tracing::error!(
                    operation = %operation,
                    error = %error,
                    "Gateway unavailable, failing call (fail-closed)"
                );
                Err(error)
            }
        }
    }
}

impl fmt::Debug for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailurePolicy")
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::DefaultMetricsCollector;
    use crate::types::TransactionStatus;
    use test_case::test_case;

    fn policy(mode: FailureMode) -> (FailurePolicy, Arc<DefaultMetricsCollector>) {
        let metrics = Arc::new(DefaultMetricsCollector::new());
        (FailurePolicy::new(mode, metrics.clone()), metrics)
    }

    #[test_case("open", FailureMode::Open; "open")]
    #[test_case("CLOSED", FailureMode::Closed; "closed uppercase")]
    #[test_case(" closed ", FailureMode::Closed; "closed padded")]
    fn test_parse_failure_mode(input: &str, expected: FailureMode) {
        assert_eq!(input.parse::<FailureMode>().unwrap(), expected);
    }

    #[test]
    fn test_parse_rejects_unknown_mode() {
        assert!("half-open".parse::<FailureMode>().is_err());
    }

    #[test]
    fn test_default_is_open() {
        assert_eq!(FailureMode::default(), FailureMode::Open);
    }

    #[test]
    fn test_open_absorbs_gateway_failure() {
        let (policy, metrics) = policy(FailureMode::Open);

        let result = policy.absorb(
            GatewayOperation::Create,
            TxGuardError::gateway(GatewayOperation::Create, "connection refused"),
        );

        assert!(result.is_ok());
        let snapshot = metrics.get_metrics();
        assert_eq!(snapshot.fail_open.get("create"), Some(&1));
        assert_eq!(snapshot.gateway_errors.get("create"), Some(&1));
    }

    #[test]
    fn test_closed_propagates_gateway_failure() {
        let (policy, metrics) = policy(FailureMode::Closed);

        let result = policy.absorb(
            GatewayOperation::Reauthorize,
            TxGuardError::gateway(GatewayOperation::Reauthorize, "boom"),
        );

        assert!(result.unwrap_err().is_gateway_failure());
        assert_eq!(metrics.get_metrics().total_fail_open(), 0);
    }

    #[test_case(FailureMode::Open; "open")]
    #[test_case(FailureMode::Closed; "closed")]
    fn test_denial_never_absorbed(mode: FailureMode) {
        let (policy, _) = policy(mode);

        let result = policy.absorb(
            GatewayOperation::Poll,
            TxGuardError::denied("tx_1", TransactionStatus::Denied),
        );
        assert!(result.unwrap_err().is_denial());

        let result = policy.absorb(
            GatewayOperation::Reauthorize,
            TxGuardError::MissingPaymentPayload {
                transaction_id: "tx_1".to_string(),
            },
        );
        assert!(matches!(
            result,
            Err(TxGuardError::MissingPaymentPayload { .. })
        ));
    }
}
