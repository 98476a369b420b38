//! Protocol error types.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding, decoding or validating frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Encoded frame exceeds [`crate::MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Actual size in bytes
        size: usize,
        /// Maximum allowed size in bytes
        max: usize,
    },

    /// CBOR serialization failed.
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed.
    #[error("CBOR decode error: {0}")]
    CborDecode(String),

    /// Frame is not a map with a string `type` field.
    #[error("frame has no type discriminator")]
    MissingType,

    /// Frame carries a `type` this client does not understand.
    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    /// Message fields violate the message invariants.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// File content is not a base64 data URL.
    #[error("invalid file encoding: {0}")]
    InvalidFileEncoding(String),
}

impl ProtocolError {
    /// Returns true if the frame is well-formed but of a type this client
    /// does not handle, as sent by a newer peer.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnknownFrameType(_))
    }
}
