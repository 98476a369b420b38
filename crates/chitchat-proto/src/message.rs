//! Chat messages and reactions.
//!
//! [`Message`] is the typed, validated form used throughout the client.
//! [`RawMessage`] is the flat camelCase shape that goes over the wire and into
//! the persisted log; conversion from raw validates the per-kind invariants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    FilePayload,
    errors::ProtocolError,
    ids::{MessageId, PeerId},
};

/// Language tag applied to code messages that arrive without one.
pub const DEFAULT_CODE_LANGUAGE: &str = "javascript";

/// A reaction attached to a message.
///
/// Reactions are not deduplicated: the same user reacting with the same emoji
/// twice produces two entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// Emoji glyph.
    pub emoji: String,
    /// Identity of the reacting user.
    pub user: PeerId,
}

impl Reaction {
    /// Create a reaction.
    pub fn new(emoji: impl Into<String>, user: PeerId) -> Self {
        Self { emoji: emoji.into(), user }
    }
}

/// Message kind discriminator (`type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// Source code with a language tag.
    Code,
    /// Inline file.
    File,
}

impl MessageKind {
    /// Wire discriminator for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::File => "file",
        }
    }

    /// Parse a wire discriminator. `None` for control or unknown types.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "text" => Some(Self::Text),
            "code" => Some(Self::Code),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// Kind-specific message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Plain text.
    Text {
        /// Text content.
        content: String,
    },
    /// Code snippet.
    Code {
        /// Source text.
        content: String,
        /// Language tag for highlighting.
        language: String,
    },
    /// Inline file.
    File(FilePayload),
}

impl MessageBody {
    /// Kind of this body.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Code { .. } => MessageKind::Code,
            Self::File(_) => MessageKind::File,
        }
    }

    /// Textual content (file bodies return the data URL).
    pub fn content(&self) -> &str {
        match self {
            Self::Text { content } | Self::Code { content, .. } => content,
            Self::File(file) => &file.data_url,
        }
    }

    /// True if there is nothing worth sending.
    ///
    /// Text and code are empty when only whitespace; files are empty when
    /// they carry no bytes.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text { content } | Self::Code { content, .. } => content.trim().is_empty(),
            Self::File(file) => file.size == 0,
        }
    }
}

/// A chat message.
///
/// Immutable once created except for the read flag and the reaction list,
/// which are driven by control frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMessage", into = "RawMessage")]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Identity of the author.
    pub sender: PeerId,
    /// Creation time in Unix milliseconds.
    pub timestamp: u64,
    /// Kind-specific content.
    pub body: MessageBody,
    /// Read flag. `None` until a read receipt is seen.
    pub read: Option<bool>,
    /// Reactions in arrival order.
    pub reactions: Vec<Reaction>,
}

impl Message {
    /// Create a message with no reactions and no read flag.
    pub fn new(id: MessageId, sender: PeerId, timestamp: u64, body: MessageBody) -> Self {
        Self { id, sender, timestamp, body, read: None, reactions: Vec::new() }
    }

    /// Kind of this message.
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// True once the recipient acknowledged it.
    pub fn is_read(&self) -> bool {
        self.read == Some(true)
    }

    /// Reaction tallies per emoji, in emoji order.
    pub fn reaction_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for reaction in &self.reactions {
            *counts.entry(reaction.emoji.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Case-insensitive match against content and file name.
    ///
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        match &self.body {
            MessageBody::Text { content } | MessageBody::Code { content, .. } => {
                content.to_lowercase().contains(needle)
            },
            MessageBody::File(file) => file.filename.to_lowercase().contains(needle),
        }
    }
}

/// Flat wire/storage shape of a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Unique identifier.
    pub id: String,
    /// Kind discriminator.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Text, code, or data URL.
    pub content: String,
    /// Author identity.
    pub sender: String,
    /// Creation time in Unix milliseconds.
    pub timestamp: u64,
    /// Code language (code only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// File name (file only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// File MIME type (file only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    /// File size in bytes (file only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Reactions in arrival order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
    /// Read flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
}

impl TryFrom<RawMessage> for Message {
    type Error = ProtocolError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        if raw.id.is_empty() {
            return Err(ProtocolError::InvalidMessage("empty message id".to_string()));
        }
        if raw.sender.is_empty() {
            return Err(ProtocolError::InvalidMessage("empty sender".to_string()));
        }

        let body = match raw.kind {
            MessageKind::Text => MessageBody::Text { content: raw.content },
            MessageKind::Code => MessageBody::Code {
                content: raw.content,
                language: raw
                    .language
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| DEFAULT_CODE_LANGUAGE.to_string()),
            },
            MessageKind::File => {
                let (Some(filename), Some(mime_type), Some(size)) =
                    (raw.filename, raw.file_type, raw.file_size)
                else {
                    return Err(ProtocolError::InvalidMessage(
                        "file message requires filename, fileType and fileSize".to_string(),
                    ));
                };
                MessageBody::File(FilePayload { filename, mime_type, size, data_url: raw.content })
            },
        };

        Ok(Self {
            id: MessageId::new(raw.id),
            sender: PeerId::new(raw.sender),
            timestamp: raw.timestamp,
            body,
            read: raw.read,
            reactions: raw.reactions,
        })
    }
}

impl From<Message> for RawMessage {
    fn from(message: Message) -> Self {
        let kind = message.kind();
        let (content, language, filename, file_type, file_size) = match message.body {
            MessageBody::Text { content } => (content, None, None, None, None),
            MessageBody::Code { content, language } => (content, Some(language), None, None, None),
            MessageBody::File(file) => (
                file.data_url,
                None,
                Some(file.filename),
                Some(file.mime_type),
                Some(file.size),
            ),
        };

        Self {
            id: message.id.as_str().to_owned(),
            kind,
            content,
            sender: message.sender.into_string(),
            timestamp: message.timestamp,
            language,
            filename,
            file_type,
            file_size,
            reactions: message.reactions,
            read: message.read,
        }
    }
}
