//! Outbound request descriptors.

use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method};
use std::time::Duration;

use crate::body::{MultipartForm, ReplayableBody, RequestBody};
use crate::errors::TxGuardResult;
use crate::headers;
use crate::transport::HttpRequest;

/// Snapshot of an outbound call as supplied by the caller.
///
/// Per-call overrides travel separately as a
/// [`CallContext`](crate::types::CallContext); the descriptor only describes
/// the HTTP exchange.
#[derive(Debug)]
pub struct RequestDescriptor {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: RequestBody,
    /// Request timeout override.
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    /// Creates a request without headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Creates a PUT request.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Creates a PATCH request.
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    /// Creates a DELETE request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Sets a header, replacing any existing value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a header from strings, replacing any existing value.
    pub fn try_header(mut self, name: &str, value: &str) -> TxGuardResult<Self> {
        headers::set_header(&mut self.headers, name, value)?;
        Ok(self)
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a text body.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_body(RequestBody::Text(text.into()))
    }

    /// Sets a binary body.
    pub fn with_bytes(self, bytes: impl Into<bytes::Bytes>) -> Self {
        self.with_body(RequestBody::Binary(bytes.into()))
    }

    /// Serializes `value` as a JSON body and sets the content type.
    pub fn with_json<T: serde::Serialize>(self, value: &T) -> TxGuardResult<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(RequestBody::Binary(body.into())))
    }

    /// Sets a multipart form body.
    pub fn with_multipart(self, form: MultipartForm) -> Self {
        self.with_body(RequestBody::Multipart(form))
    }

    /// Sets a streaming body.
    pub fn with_stream<S>(self, stream: S) -> Self
    where
        S: futures::Stream<Item = Result<bytes::Bytes, std::io::Error>> + Send + 'static,
    {
        self.with_body(RequestBody::from_stream(stream))
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A request whose body has been captured for replay.
///
/// Cloning is cheap; the body bytes are shared.
#[derive(Debug, Clone)]
pub struct BufferedRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Captured body.
    pub body: ReplayableBody,
    /// Request timeout override.
    pub timeout: Option<Duration>,
}

impl BufferedRequest {
    /// Captures the descriptor's body.
    pub async fn capture(request: RequestDescriptor) -> TxGuardResult<Self> {
        let body = ReplayableBody::capture(request.body).await?;
        Ok(Self {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body,
            timeout: request.timeout,
        })
    }

    /// Returns the effective content type.
    pub fn content_type(&self) -> Option<&str> {
        if self.body.content_type_is_mandatory() {
            return self.body.content_type();
        }
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.body.content_type())
    }

    /// Returns the transaction id header, if set.
    pub fn transaction_id(&self) -> Option<&str> {
        headers::transaction_id(&self.headers)
    }

    /// Materializes a transport request, replaying the captured body.
    pub fn to_http_request(&self) -> HttpRequest {
        let mut headers = self.headers.clone();

        if let Some(content_type) = self.body.content_type() {
            if self.body.content_type_is_mandatory() || !headers.contains_key(CONTENT_TYPE) {
                if let Ok(value) = HeaderValue::from_str(content_type) {
                    headers.insert(CONTENT_TYPE, value);
                }
            }
        }

        HttpRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers,
            body: self.body.replay(),
            timeout: self.timeout,
        }
    }
}
