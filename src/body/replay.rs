//! Capture-once body buffer.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::debug;

use super::{BodyKind, RequestBody};
use crate::errors::{TxGuardError, TxGuardResult};

/// A request body captured once and replayable any number of times.
///
/// Every representation is reduced to one immutable [`Bytes`] buffer, so the
/// original attempt and a payment retry send the same content.
#[derive(Debug, Clone)]
pub struct ReplayableBody {
    kind: BodyKind,
    bytes: Option<Bytes>,
    content_type: Option<String>,
}

impl ReplayableBody {
    /// Returns a buffer for a request without a body.
    pub fn empty() -> Self {
        Self {
            kind: BodyKind::Empty,
            bytes: None,
            content_type: None,
        }
    }

    /// Captures a body, draining streams and encoding multipart forms.
    pub async fn capture(body: RequestBody) -> TxGuardResult<Self> {
        let kind = body.kind();

        let captured = match body {
            RequestBody::Empty => Self::empty(),
            RequestBody::Text(text) => Self {
                kind,
                bytes: Some(Bytes::from(text)),
                content_type: Some(mime::TEXT_PLAIN_UTF_8.to_string()),
            },
            RequestBody::Binary(bytes) => Self {
                kind,
                bytes: Some(bytes),
                content_type: None,
            },
            RequestBody::Multipart(form) => Self {
                kind,
                bytes: Some(form.encode()),
                content_type: Some(form.content_type()),
            },
            RequestBody::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| {
                        TxGuardError::body(format!("failed to read request stream: {}", e))
                    })?;
                    buf.extend_from_slice(&chunk);
                }
                debug!(bytes = buf.len(), "Buffered streaming request body");
                Self {
                    kind,
                    bytes: Some(buf.freeze()),
                    content_type: None,
                }
            }
        };

        Ok(captured)
    }

    /// Returns the captured content. Each call yields the same bytes.
    pub fn replay(&self) -> Option<Bytes> {
        self.bytes.clone()
    }

    /// Returns the kind of body that was captured.
    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    /// Returns true if the original request carried a body.
    pub fn is_present(&self) -> bool {
        self.kind != BodyKind::Empty
    }

    /// Returns the captured length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.as_ref().map_or(0, Bytes::len)
    }

    /// Returns true if no bytes were captured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the content type implied by the body representation.
    ///
    /// Multipart bodies always need their boundary type; text only supplies a
    /// default when the caller has not set one.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns true if the implied content type must override a caller's value.
    pub(crate) fn content_type_is_mandatory(&self) -> bool {
        self.kind == BodyKind::Multipart
    }
}

impl Default for ReplayableBody {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::MultipartForm;
    use test_case::test_case;

    fn stream_of(chunks: &[&'static str]) -> RequestBody {
        let items: Vec<Result<Bytes, std::io::Error>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        RequestBody::from_stream(futures::stream::iter(items))
    }

    #[test_case(RequestBody::from("hello world"), b"hello world" ; "text")]
    #[test_case(RequestBody::from(vec![0u8, 159, 146, 150]), &[0u8, 159, 146, 150] ; "binary")]
    #[tokio::test]
    async fn test_capture_replays_identical_bytes(body: RequestBody, expected: &[u8]) {
        let captured = ReplayableBody::capture(body).await.unwrap();

        let first = captured.replay().unwrap();
        let second = captured.replay().unwrap();

        assert_eq!(&first[..], expected);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_stream_is_drained_once() {
        let captured = ReplayableBody::capture(stream_of(&["hello", " ", "world"]))
            .await
            .unwrap();

        assert_eq!(captured.kind(), BodyKind::Stream);
        assert_eq!(captured.replay().unwrap(), Bytes::from_static(b"hello world"));
        assert_eq!(captured.replay().unwrap(), Bytes::from_static(b"hello world"));
        assert_eq!(captured.len(), 11);
    }

    #[tokio::test]
    async fn test_stream_error_is_reported() {
        let items: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let result = ReplayableBody::capture(RequestBody::from_stream(futures::stream::iter(items))).await;

        assert!(matches!(result, Err(TxGuardError::Body { .. })));
    }

    #[tokio::test]
    async fn test_multipart_snapshot_matches_encoding() {
        let form = MultipartForm::with_boundary("fixed")
            .text("name", "report")
            .file("file", "r.csv", "text/csv", &b"a,b\n1,2\n"[..]);
        let expected = form.encode();

        let captured = ReplayableBody::capture(RequestBody::Multipart(form)).await.unwrap();

        assert_eq!(captured.replay().unwrap(), expected);
        assert_eq!(
            captured.content_type(),
            Some("multipart/form-data; boundary=fixed")
        );
        assert!(captured.content_type_is_mandatory());
    }

    #[tokio::test]
    async fn test_empty_body() {
        let captured = ReplayableBody::capture(RequestBody::Empty).await.unwrap();

        assert!(!captured.is_present());
        assert!(captured.replay().is_none());
        assert!(captured.is_empty());
    }
}
