//! Error types for the txguard client.
//!
//! The taxonomy separates outcomes that always reach the caller (denials,
//! timeouts, a missing payment payload) from gateway malfunctions, which the
//! failure policy may absorb when the client runs fail-open.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::transport::TransportError;
use crate::types::TransactionStatus;

/// Result type alias for txguard operations.
pub type TxGuardResult<T> = Result<T, TxGuardError>;

/// Gateway call that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOperation {
    /// Transaction creation.
    Create,
    /// Single transaction fetch.
    Get,
    /// Fetch issued from inside the polling loop.
    Poll,
    /// Payment reauthorization.
    Reauthorize,
    /// Completion report.
    Complete,
}

impl GatewayOperation {
    /// Returns a stable lowercase name, used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOperation::Create => "create",
            GatewayOperation::Get => "get",
            GatewayOperation::Poll => "poll",
            GatewayOperation::Reauthorize => "reauthorize",
            GatewayOperation::Complete => "complete",
        }
    }
}

impl fmt::Display for GatewayOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for txguard client operations.
#[derive(Debug, Error)]
pub enum TxGuardError {
    /// Configuration error (invalid gateway URL, poll settings, etc.)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue.
        message: String,
    },

    /// The transaction reached `denied` or `cancelled`.
    #[error("Authorization denied for transaction {transaction_id} (status: {status})")]
    AuthorizationDenied {
        /// Transaction that was refused.
        transaction_id: String,
        /// Terminal status reported by the gateway.
        status: TransactionStatus,
    },

    /// Polling ran past its deadline without a terminal status.
    #[error("Authorization timed out for transaction {transaction_id} after {elapsed:?}")]
    AuthorizationTimeout {
        /// Transaction being polled.
        transaction_id: String,
        /// Time spent polling.
        elapsed: Duration,
    },

    /// Polling was aborted by the caller before a terminal status.
    #[error("Authorization polling cancelled for transaction {transaction_id}")]
    AuthorizationCancelled {
        /// Transaction being polled.
        transaction_id: String,
    },

    /// A gateway call itself failed.
    #[error("Gateway unavailable during {operation}: {message}")]
    GatewayUnavailable {
        /// Gateway call that failed.
        operation: GatewayOperation,
        /// Error message.
        message: String,
        /// HTTP status returned by the gateway, if any.
        status_code: Option<u16>,
    },

    /// The transaction was authorized for payment but carries nothing to pay with.
    #[error("Transaction {transaction_id} authorized without a payment payload")]
    MissingPaymentPayload {
        /// Transaction that was authorized.
        transaction_id: String,
    },

    /// The outbound call failed at the transport level.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The request body could not be captured for replay.
    #[error("Request body error: {message}")]
    Body {
        /// Error message.
        message: String,
    },

    /// A header name or value could not be encoded.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Error message.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },
}

impl TxGuardError {
    /// Returns true if this error is a gateway malfunction, the only class the
    /// failure policy may absorb.
    pub fn is_gateway_failure(&self) -> bool {
        matches!(self, TxGuardError::GatewayUnavailable { .. })
    }

    /// Returns true if the caller may reasonably retry the whole call.
    pub fn is_retryable(&self) -> bool {
        match self {
            TxGuardError::GatewayUnavailable { status_code, .. } => {
                matches!(status_code, None | Some(429) | Some(500..=504))
            }
            TxGuardError::AuthorizationTimeout { .. } => true,
            TxGuardError::Transport(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if this error is a refusal from the authorization backend.
    pub fn is_denial(&self) -> bool {
        matches!(self, TxGuardError::AuthorizationDenied { .. })
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        TxGuardError::Configuration {
            message: message.into(),
        }
    }

    /// Creates a gateway failure without an HTTP status.
    pub fn gateway(operation: GatewayOperation, message: impl Into<String>) -> Self {
        TxGuardError::GatewayUnavailable {
            operation,
            message: message.into(),
            status_code: None,
        }
    }

    /// Creates a gateway failure for a non-success HTTP status.
    pub fn gateway_status(
        operation: GatewayOperation,
        status_code: u16,
        message: impl Into<String>,
    ) -> Self {
        TxGuardError::GatewayUnavailable {
            operation,
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Creates a denial error.
    pub fn denied(transaction_id: impl Into<String>, status: TransactionStatus) -> Self {
        TxGuardError::AuthorizationDenied {
            transaction_id: transaction_id.into(),
            status,
        }
    }

    /// Creates a body capture error.
    pub fn body(message: impl Into<String>) -> Self {
        TxGuardError::Body {
            message: message.into(),
        }
    }

    /// Returns a short machine-readable kind, used in completion facts.
    pub fn kind(&self) -> &'static str {
        match self {
            TxGuardError::Configuration { .. } => "configuration",
            TxGuardError::AuthorizationDenied { .. } => "authorization_denied",
            TxGuardError::AuthorizationTimeout { .. } => "authorization_timeout",
            TxGuardError::AuthorizationCancelled { .. } => "authorization_cancelled",
            TxGuardError::GatewayUnavailable { .. } => "gateway_unavailable",
            TxGuardError::MissingPaymentPayload { .. } => "missing_payment_payload",
            TxGuardError::Transport(_) => "transport",
            TxGuardError::Body { .. } => "body",
            TxGuardError::InvalidHeader { .. } => "invalid_header",
            TxGuardError::Serialization { .. } => "serialization",
        }
    }
}

impl From<serde_json::Error> for TxGuardError {
    fn from(err: serde_json::Error) -> Self {
        TxGuardError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for TxGuardError {
    fn from(err: url::ParseError) -> Self {
        TxGuardError::Configuration {
            message: format!("Invalid URL: {}", err),
        }
    }
}

impl From<http::header::InvalidHeaderValue> for TxGuardError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        TxGuardError::InvalidHeader {
            message: err.to_string(),
        }
    }
}

impl From<http::header::InvalidHeaderName> for TxGuardError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        TxGuardError::InvalidHeader {
            message: err.to_string(),
        }
    }
}
