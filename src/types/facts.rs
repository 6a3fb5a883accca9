//! Facts sent to the gateway about a request and its outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::TxGuardError;
use crate::headers::{sanitize_request_headers, sanitize_response_headers};
use crate::transport::{FailureKind, HttpResponse};
use crate::types::request::BufferedRequest;

/// URL broken into components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlFacts {
    /// The full URL.
    pub href: String,
    /// Scheme (`https`).
    pub scheme: String,
    /// Host name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Explicit or default port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Path.
    pub path: String,
    /// Query parameters, in order of appearance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<(String, String)>,
    /// Fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

impl UrlFacts {
    /// Parses a URL into facts; unparseable URLs keep only `href`.
    pub fn parse(raw: &str) -> Self {
        match url::Url::parse(raw) {
            Ok(url) => Self {
                href: url.to_string(),
                scheme: url.scheme().to_string(),
                host: url.host_str().map(str::to_string),
                port: url.port_or_known_default(),
                path: url.path().to_string(),
                query: url
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect(),
                fragment: url.fragment().map(str::to_string),
            },
            Err(_) => Self {
                href: raw.to_string(),
                scheme: String::new(),
                host: None,
                port: None,
                path: String::new(),
                query: Vec::new(),
                fragment: None,
            },
        }
    }
}

/// Sanitized description of an outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFacts {
    /// HTTP method.
    pub method: String,
    /// Parsed URL.
    pub url: UrlFacts,
    /// Headers with credentials removed.
    pub headers: BTreeMap<String, String>,
    /// Whether the request carries a body.
    pub has_body: bool,
    /// Content type of the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Caller source location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_site: Option<String>,
}

impl RequestFacts {
    /// Builds facts from a buffered request.
    pub fn from_request(request: &BufferedRequest, call_site: Option<String>) -> Self {
        Self {
            method: request.method.to_string(),
            url: UrlFacts::parse(&request.url),
            headers: sanitize_request_headers(&request.headers),
            has_body: request.body.is_present(),
            content_type: request.content_type().map(str::to_string),
            call_site,
        }
    }
}

/// Body of a transaction creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransaction {
    /// Request facts.
    pub request: RequestFacts,
    /// Service name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Action name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_name: Option<String>,
    /// Resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    /// Trace identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Agent identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Agent name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Opaque policy context.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub qualifiers: Map<String, Value>,
}

/// Facts about a settled response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFacts {
    /// HTTP status.
    pub status: u16,
    /// Headers with credentials removed.
    pub headers: BTreeMap<String, String>,
    /// Content type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Wall-clock duration of the exchange, including any payment retry.
    pub duration_ms: u64,
}

impl ResponseFacts {
    /// Builds facts from a response.
    pub fn from_response(response: &HttpResponse, duration: Duration) -> Self {
        Self {
            status: response.status,
            headers: sanitize_response_headers(&response.headers),
            content_type: response.content_type().map(str::to_string),
            duration_ms: duration_millis(duration),
        }
    }
}

/// Facts about a failed exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFacts {
    /// Error type.
    pub error_type: String,
    /// Error message.
    pub message: String,
    /// HTTP status, when the failure is an error response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// Network-vs-timeout classification.
    pub kind: FailureKind,
    /// Time elapsed before the failure.
    pub elapsed_ms: u64,
}

impl ErrorFacts {
    /// Builds facts for an error response.
    pub fn from_status(response: &HttpResponse, elapsed: Duration) -> Self {
        Self {
            error_type: "http_error".to_string(),
            message: format!("request failed with status {}", response.status),
            http_status: Some(response.status),
            kind: FailureKind::Http,
            elapsed_ms: duration_millis(elapsed),
        }
    }

    /// Builds facts for an error raised by the client.
    pub fn from_error(error: &TxGuardError, elapsed: Duration) -> Self {
        let (kind, http_status) = match error {
            TxGuardError::Transport(err) => (err.failure_kind(), None),
            TxGuardError::GatewayUnavailable { status_code, .. } => {
                (FailureKind::Other, *status_code)
            }
            _ => (FailureKind::Other, None),
        };

        Self {
            error_type: error.kind().to_string(),
            message: error.to_string(),
            http_status,
            kind,
            elapsed_ms: duration_millis(elapsed),
        }
    }
}

/// Outcome of the call, as reported to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionOutcome {
    /// The call produced a non-error response.
    Success,
    /// The call failed or produced an error response.
    Error,
}

/// Body of a completion report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    /// Outcome.
    pub outcome: CompletionOutcome,
    /// Response facts, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseFacts>,
    /// Error facts, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorFacts>,
    /// Number of HTTP attempts made (2 after a payment retry).
    pub attempts: u32,
    /// When the call settled.
    pub completed_at: DateTime<Utc>,
}

impl CompletionReport {
    /// Builds a report for a settled response. Statuses of 400 and above are
    /// reported as errors.
    pub fn for_response(response: &HttpResponse, elapsed: Duration, attempts: u32) -> Self {
        if response.status >= 400 {
            Self {
                outcome: CompletionOutcome::Error,
                response: None,
                error: Some(ErrorFacts::from_status(response, elapsed)),
                attempts,
                completed_at: Utc::now(),
            }
        } else {
            Self {
                outcome: CompletionOutcome::Success,
                response: Some(ResponseFacts::from_response(response, elapsed)),
                error: None,
                attempts,
                completed_at: Utc::now(),
            }
        }
    }

    /// Builds a report for a failed call.
    pub fn for_error(error: &TxGuardError, elapsed: Duration, attempts: u32) -> Self {
        Self {
            outcome: CompletionOutcome::Error,
            response: None,
            error: Some(ErrorFacts::from_error(error, elapsed)),
            attempts,
            completed_at: Utc::now(),
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use http::HeaderMap;

    #[test]
    fn test_url_facts() {
        let facts = UrlFacts::parse("https://api.example.com/v1/items?limit=10&q=rust#top");

        assert_eq!(facts.scheme, "https");
        assert_eq!(facts.host.as_deref(), Some("api.example.com"));
        assert_eq!(facts.port, Some(443));
        assert_eq!(facts.path, "/v1/items");
        assert_eq!(
            facts.query,
            vec![
                ("limit".to_string(), "10".to_string()),
                ("q".to_string(), "rust".to_string())
            ]
        );
        assert_eq!(facts.fragment.as_deref(), Some("top"));
    }

    #[test]
    fn test_unparseable_url_keeps_href() {
        let facts = UrlFacts::parse("not a url");
        assert_eq!(facts.href, "not a url");
        assert!(facts.host.is_none());
    }

    #[test]
    fn test_report_for_success_response() {
        let response = HttpResponse::new(200, HeaderMap::new(), "ok");
        let report = CompletionReport::for_response(&response, Duration::from_millis(42), 1);

        assert_eq!(report.outcome, CompletionOutcome::Success);
        assert_eq!(report.response.as_ref().map(|r| r.duration_ms), Some(42));
        assert!(report.error.is_none());
    }

    #[test]
    fn test_report_for_error_status() {
        let response = HttpResponse::new(402, HeaderMap::new(), "");
        let report = CompletionReport::for_response(&response, Duration::from_millis(5), 2);

        assert_eq!(report.outcome, CompletionOutcome::Error);
        let error = report.error.unwrap();
        assert_eq!(error.http_status, Some(402));
        assert_eq!(error.kind, FailureKind::Http);
        assert_eq!(report.attempts, 2);
    }

    #[test]
    fn test_report_for_transport_timeout() {
        let error = TxGuardError::Transport(TransportError::Timeout {
            timeout: Duration::from_secs(1),
        });
        let report = CompletionReport::for_error(&error, Duration::from_secs(1), 1);

        let facts = report.error.unwrap();
        assert_eq!(facts.kind, FailureKind::Timeout);
        assert_eq!(facts.error_type, "transport");
        assert_eq!(facts.elapsed_ms, 1000);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let response = HttpResponse::new(201, HeaderMap::new(), "");
        let report = CompletionReport::for_response(&response, Duration::from_millis(7), 1);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["outcome"], "success");
        assert_eq!(json["response"]["durationMs"], 7);
        assert!(json["completedAt"].is_string());
    }
}
