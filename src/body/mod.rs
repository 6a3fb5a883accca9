//! Request bodies and their replay buffer.
//!
//! A payment retry must carry exactly the bytes of the original attempt, so
//! every body is captured once into a [`ReplayableBody`] before the first
//! send and both attempts are served from that buffer.

mod multipart;
mod replay;

pub use multipart::{MultipartForm, MultipartPart};
pub use replay::ReplayableBody;

use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::pin::Pin;

/// Single-use byte stream supplied as a request body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Body representation supplied by the caller.
#[derive(Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// UTF-8 text.
    Text(String),
    /// Binary blob.
    Binary(Bytes),
    /// Multipart form.
    Multipart(MultipartForm),
    /// Streaming source, consumable once.
    Stream(BodyStream),
}

/// Discriminant of a [`RequestBody`], kept after capture for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// No body.
    Empty,
    /// UTF-8 text.
    Text,
    /// Binary blob.
    Binary,
    /// Multipart form.
    Multipart,
    /// Streaming source.
    Stream,
}

impl RequestBody {
    /// Creates a body from any stream of byte chunks.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    {
        RequestBody::Stream(Box::pin(stream))
    }

    /// Returns the kind of body.
    pub fn kind(&self) -> BodyKind {
        match self {
            RequestBody::Empty => BodyKind::Empty,
            RequestBody::Text(_) => BodyKind::Text,
            RequestBody::Binary(_) => BodyKind::Binary,
            RequestBody::Multipart(_) => BodyKind::Multipart,
            RequestBody::Stream(_) => BodyKind::Stream,
        }
    }

    /// Returns true unless the body is [`RequestBody::Empty`].
    pub fn is_present(&self) -> bool {
        !matches!(self, RequestBody::Empty)
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            RequestBody::Binary(bytes) => f.debug_tuple("Binary").field(&bytes.len()).finish(),
            RequestBody::Multipart(form) => f.debug_tuple("Multipart").field(form).finish(),
            RequestBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Binary(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Binary(Bytes::from(bytes))
    }
}

impl From<MultipartForm> for RequestBody {
    fn from(form: MultipartForm) -> Self {
        RequestBody::Multipart(form)
    }
}
