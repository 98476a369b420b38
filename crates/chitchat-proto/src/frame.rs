//! Data channel frames.
//!
//! A [`Frame`] is either a chat [`Message`] or a transient [`ControlFrame`].
//! Both are CBOR maps distinguished by their `type` field, so decoding reads
//! the discriminator from a generic CBOR value before committing to a shape.

use ciborium::Value;
use serde::{Deserialize, Serialize};

use crate::{
    Message, MessageKind,
    errors::{ProtocolError, Result},
    ids::MessageId,
    message::Reaction,
};

/// Largest frame accepted from a peer (8 MiB).
///
/// Leaves room for a maximum-size file after base64 expansion plus metadata.
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Session signalling frames. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// Remote typing indicator.
    Status {
        /// True while the remote user is typing.
        #[serde(default)]
        typing: bool,
    },
    /// Read receipt for a message we sent.
    Read {
        /// Acknowledged message.
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },
    /// Reaction added to a message.
    Reaction {
        /// Target message.
        #[serde(rename = "messageId")]
        message_id: MessageId,
        /// The reaction to append.
        reaction: Reaction,
    },
}

impl ControlFrame {
    /// Wire discriminator for this frame.
    pub const fn type_tag(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Read { .. } => "read",
            Self::Reaction { .. } => "reaction",
        }
    }

    fn is_control_tag(tag: &str) -> bool {
        matches!(tag, "status" | "read" | "reaction")
    }
}

/// Any frame carried by the data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Session signalling.
    Control(ControlFrame),
    /// Chat message.
    Message(Message),
}

impl Frame {
    /// Wire discriminator for this frame.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Control(control) => control.type_tag(),
            Self::Message(message) => message.kind().as_str(),
        }
    }

    /// Encode to CBOR bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    /// - `ProtocolError::FrameTooLarge` if the result exceeds
    ///   [`MAX_FRAME_SIZE`]
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::Control(control) => ciborium::ser::into_writer(control, &mut buf),
            Self::Message(message) => ciborium::ser::into_writer(message, &mut buf),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;

        if buf.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: buf.len(), max: MAX_FRAME_SIZE });
        }

        Ok(buf)
    }

    /// Decode and classify a frame.
    ///
    /// The size check happens before CBOR parsing begins.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooLarge` if `bytes` exceed [`MAX_FRAME_SIZE`]
    /// - `ProtocolError::CborDecode` if the bytes are not valid CBOR or do not
    ///   fit the shape named by `type`
    /// - `ProtocolError::MissingType` if there is no string `type` field
    /// - `ProtocolError::UnknownFrameType` for unrecognized discriminators
    /// - `ProtocolError::InvalidMessage` if message invariants fail
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: bytes.len(), max: MAX_FRAME_SIZE });
        }

        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| ProtocolError::CborDecode(e.to_string()))?;

        let tag = type_tag(&value).ok_or(ProtocolError::MissingType)?;

        if ControlFrame::is_control_tag(tag) {
            let control = value
                .deserialized::<ControlFrame>()
                .map_err(|e| ProtocolError::CborDecode(e.to_string()))?;
            return Ok(Self::Control(control));
        }

        if MessageKind::from_tag(tag).is_some() {
            let raw = value
                .deserialized::<crate::RawMessage>()
                .map_err(|e| ProtocolError::CborDecode(e.to_string()))?;
            return Message::try_from(raw).map(Self::Message);
        }

        Err(ProtocolError::UnknownFrameType(tag.to_owned()))
    }
}

impl From<ControlFrame> for Frame {
    fn from(control: ControlFrame) -> Self {
        Self::Control(control)
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

/// Value of the top-level `type` entry, if the value is a map with one.
fn type_tag(value: &Value) -> Option<&str> {
    value
        .as_map()?
        .iter()
        .find(|(key, _)| key.as_text() == Some("type"))
        .and_then(|(_, tag)| tag.as_text())
}
