//! Header names and helpers shared by the interceptors.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::TxGuardResult;

/// Header carrying the authorized transaction id.
pub const TRANSACTION_ID_HEADER: &str = "x-transaction-id";

/// Header carrying the payment authorization payload on a payment retry.
pub const PAYMENT_HEADER: &str = "x-payment";

/// Request headers never forwarded to the gateway.
pub const SENSITIVE_REQUEST_HEADERS: &[&str] =
    &["authorization", "cookie", "x-api-key", "x-auth-token"];

/// Response headers never forwarded to the gateway.
pub const SENSITIVE_RESPONSE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "x-api-key",
    "x-auth-token",
    "set-cookie",
    "proxy-authenticate",
];

/// Sets a single header value, replacing every existing value for that name.
///
/// Lookups are case-insensitive because header names are normalized.
pub fn set_header(headers: &mut HeaderMap, name: &str, value: &str) -> TxGuardResult<()> {
    let name = HeaderName::from_bytes(name.as_bytes())?;
    let value = HeaderValue::from_str(value)?;
    headers.insert(name, value);
    Ok(())
}

/// Returns the transaction id header, if present and valid.
pub fn transaction_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(TRANSACTION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Sets the transaction id header.
pub fn set_transaction_id(headers: &mut HeaderMap, transaction_id: &str) -> TxGuardResult<()> {
    set_header(headers, TRANSACTION_ID_HEADER, transaction_id)
}

/// Copies request headers, dropping credentials and non-text values.
pub fn sanitize_request_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    sanitize(headers, SENSITIVE_REQUEST_HEADERS)
}

/// Copies response headers, dropping credentials and non-text values.
pub fn sanitize_response_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    sanitize(headers, SENSITIVE_RESPONSE_HEADERS)
}

fn sanitize(headers: &HeaderMap, deny: &[&str]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for name in headers.keys() {
        if deny.contains(&name.as_str()) {
            continue;
        }
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if !values.is_empty() {
            out.insert(name.as_str().to_string(), values.join(", "));
        }
    }
    out
}

/// Encodes a payment payload as a header value.
///
/// Text payloads pass through unchanged; structured payloads are serialized
/// to JSON and base64-encoded.
pub fn encode_payment_payload(payload: &Value) -> TxGuardResult<String> {
    match payload {
        Value::String(text) => Ok(text.clone()),
        other => {
            let json = serde_json::to_vec(other)?;
            Ok(STANDARD.encode(json))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.append(
            HeaderName::from_bytes(b"X-Transaction-Id").unwrap(),
            HeaderValue::from_static("old-1"),
        );
        headers.append("x-transaction-id", HeaderValue::from_static("old-2"));

        set_transaction_id(&mut headers, "tx_new").unwrap();

        let values: Vec<&str> = headers
            .get_all(TRANSACTION_ID_HEADER)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        assert_eq!(values, vec!["tx_new"]);
        assert_eq!(transaction_id(&headers), Some("tx_new"));
    }

    #[test]
    fn test_blank_transaction_id_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(TRANSACTION_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(transaction_id(&headers), None);
    }

    #[test]
    fn test_sanitize_removes_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("cookie", HeaderValue::from_static("session=abc"));
        headers.insert("x-api-key", HeaderValue::from_static("key"));
        headers.insert("x-auth-token", HeaderValue::from_static("token"));
        headers.insert("accept", HeaderValue::from_static("application/json"));
        headers.append("x-tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));

        let sanitized = sanitize_request_headers(&headers);

        let mut expected = BTreeMap::new();
        expected.insert("accept".to_string(), "application/json".to_string());
        expected.insert("x-tag".to_string(), "a, b".to_string());
        assert_eq!(sanitized, expected);
    }

    #[test]
    fn test_sanitize_response_drops_set_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("set-cookie", HeaderValue::from_static("id=1"));
        headers.insert("content-type", HeaderValue::from_static("text/html"));

        let sanitized = sanitize_response_headers(&headers);
        assert!(!sanitized.contains_key("set-cookie"));
        assert_eq!(sanitized.get("content-type").map(String::as_str), Some("text/html"));
    }

    #[test]
    fn test_encode_payment_payload() {
        assert_eq!(encode_payment_payload(&Value::from("P")).unwrap(), "P");

        let structured = serde_json::json!({"scheme": "exact"});
        let encoded = encode_payment_payload(&structured).unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded, br#"{"scheme":"exact"}"#.to_vec());
    }
}
