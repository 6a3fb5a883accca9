//! HTTP transport layer.
//!
//! The interception logic never talks to a concrete HTTP client directly; it
//! issues [`HttpRequest`]s through the [`HttpTransport`] trait so any client
//! adapter can sit underneath it.

mod http_transport;

pub use http_transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

use std::time::Duration;

/// Classification of a failed exchange, reported in completion facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection-level failure (DNS, refused, reset).
    Network,
    /// The exchange exceeded its deadline.
    Timeout,
    /// The server answered with an error status.
    Http,
    /// Anything else.
    Other,
}

/// Transport error types.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection error.
    #[error("Connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// Timeout error.
    #[error("Timeout after {timeout:?}")]
    Timeout {
        /// Timeout duration.
        timeout: Duration,
    },

    /// TLS error.
    #[error("TLS error: {message}")]
    Tls {
        /// Error message.
        message: String,
    },

    /// Invalid response.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },
}

impl TransportError {
    /// Returns the network-vs-timeout classification of this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            TransportError::Connection { .. } | TransportError::Tls { .. } => {
                FailureKind::Network
            }
            TransportError::Timeout { .. } => FailureKind::Timeout,
            TransportError::InvalidResponse { .. } => FailureKind::Other,
        }
    }

    /// Returns true if the exchange may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Connection { .. } | TransportError::Timeout { .. }
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout {
                timeout: Duration::ZERO,
            }
        } else if err.is_connect() {
            TransportError::Connection {
                message: err.to_string(),
            }
        } else {
            TransportError::InvalidResponse {
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind() {
        assert_eq!(
            TransportError::Connection {
                message: "refused".to_string()
            }
            .failure_kind(),
            FailureKind::Network
        );
        assert_eq!(
            TransportError::Timeout {
                timeout: Duration::from_secs(5)
            }
            .failure_kind(),
            FailureKind::Timeout
        );
        assert_eq!(
            TransportError::InvalidResponse {
                message: "truncated".to_string()
            }
            .failure_kind(),
            FailureKind::Other
        );
    }
}
