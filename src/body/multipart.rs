//! Multipart form bodies with a deterministic encoding.

use bytes::{BufMut, Bytes, BytesMut};

/// A part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartPart {
    /// Text field.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// File field.
    File {
        /// Field name.
        name: String,
        /// File name.
        filename: String,
        /// Content type.
        content_type: String,
        /// File data.
        data: Bytes,
    },
}

/// Ordered multipart form.
///
/// The boundary is chosen once at construction, so [`MultipartForm::encode`]
/// produces identical bytes on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<MultipartPart>,
}

impl MultipartForm {
    /// Creates an empty form with a random boundary.
    pub fn new() -> Self {
        Self::with_boundary(format!("txguard-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Creates an empty form with a fixed boundary.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    /// Appends a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Appends a file field.
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(MultipartPart::File {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        });
        self
    }

    /// Returns the boundary.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Returns the parts in order.
    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    /// Returns the `multipart/form-data` content type including the boundary.
    pub fn content_type(&self) -> String {
        format!("{}; boundary={}", mime::MULTIPART_FORM_DATA, self.boundary)
    }

    /// Encodes the form as a `multipart/form-data` body.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        for part in &self.parts {
            buf.put_slice(b"--");
            buf.put_slice(self.boundary.as_bytes());
            buf.put_slice(b"\r\n");

            match part {
                MultipartPart::Text { name, value } => {
                    buf.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                            escape_quoted(name)
                        )
                        .as_bytes(),
                    );
                    buf.put_slice(value.as_bytes());
                }
                MultipartPart::File {
                    name,
                    filename,
                    content_type,
                    data,
                } => {
                    buf.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            escape_quoted(name),
                            escape_quoted(filename),
                            content_type
                        )
                        .as_bytes(),
                    );
                    buf.put_slice(data);
                }
            }

            buf.put_slice(b"\r\n");
        }

        buf.put_slice(b"--");
        buf.put_slice(self.boundary.as_bytes());
        buf.put_slice(b"--\r\n");

        buf.freeze()
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

/// Percent-encodes the characters that would break a quoted header parameter.
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_layout() {
        let form = MultipartForm::with_boundary("b0undary")
            .text("purpose", "fine-tune")
            .file("file", "data.jsonl", "application/jsonl", &b"{}\n"[..]);

        let encoded = String::from_utf8(form.encode().to_vec()).unwrap();
        let expected = "--b0undary\r\n\
Content-Disposition: form-data; name=\"purpose\"\r\n\r\n\
fine-tune\r\n\
--b0undary\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"data.jsonl\"\r\n\
Content-Type: application/jsonl\r\n\r\n\
{}\n\r\n\
--b0undary--\r\n";

        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_encode_is_stable() {
        let form = MultipartForm::new().text("a", "1").text("b", "2");
        assert_eq!(form.encode(), form.encode());
        assert_eq!(form.encode(), form.clone().encode());
    }

    #[test]
    fn test_content_type_carries_boundary() {
        let form = MultipartForm::with_boundary("xyz");
        assert_eq!(form.content_type(), "multipart/form-data; boundary=xyz");
    }

    #[test]
    fn test_field_names_are_escaped() {
        let form = MultipartForm::with_boundary("b").text("we\"ird", "v");
        let encoded = String::from_utf8(form.encode().to_vec()).unwrap();
        assert!(encoded.contains("name=\"we%22ird\""));
    }
}
