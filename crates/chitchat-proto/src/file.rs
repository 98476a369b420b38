//! Text-safe file payloads.
//!
//! Files travel inline in a [`crate::Message`] as a base64 data URL
//! (`data:<mime>;base64,<bytes>`), which survives both the CBOR wire format
//! and the JSON message log without escaping binary content.

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::errors::{ProtocolError, Result};

/// MIME type used when the source did not report one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// File attached to a `file` message.
///
/// # Invariants
///
/// - `size` is the length of the original bytes, not of the encoded content.
/// - `data_url` decodes back to exactly `size` bytes when produced by
///   [`FilePayload::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    /// Original file name.
    pub filename: String,
    /// MIME type reported by the source.
    pub mime_type: String,
    /// Size of the original content in bytes.
    pub size: u64,
    /// Encoded content (`data:<mime>;base64,<payload>`).
    pub data_url: String,
}

impl FilePayload {
    /// Encode raw file bytes into a text-safe payload.
    pub fn encode(filename: impl Into<String>, mime_type: &str, bytes: &[u8]) -> Self {
        let mime_type = if mime_type.trim().is_empty() { DEFAULT_MIME_TYPE } else { mime_type };
        let data_url = format!("{DATA_URL_PREFIX}{mime_type}{BASE64_MARKER}{}", STANDARD.encode(bytes));

        Self {
            filename: filename.into(),
            mime_type: mime_type.to_owned(),
            size: bytes.len() as u64,
            data_url,
        }
    }

    /// Decode the original bytes from the data URL.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidFileEncoding` if the content is not a base64
    ///   data URL or the base64 body is malformed
    pub fn decode_bytes(&self) -> Result<Vec<u8>> {
        let rest = self.data_url.strip_prefix(DATA_URL_PREFIX).ok_or_else(|| {
            ProtocolError::InvalidFileEncoding("content is not a data URL".to_string())
        })?;

        let (_, encoded) = rest.split_once(BASE64_MARKER).ok_or_else(|| {
            ProtocolError::InvalidFileEncoding("data URL is not base64-encoded".to_string())
        })?;

        STANDARD.decode(encoded).map_err(|e| ProtocolError::InvalidFileEncoding(e.to_string()))
    }
}
