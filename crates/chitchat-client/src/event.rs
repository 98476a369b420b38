//! Session events and actions.

use std::fmt;

use chitchat_core::EndpointConfig;
use chitchat_proto::{MessageId, PeerId};

/// Transport handle for one data channel.
///
/// Assigned by the transport: returned from `connect` for outbound channels
/// and reported with the incoming connection otherwise. Two channels to the
/// same remote always have different handles, so callbacks for a superseded
/// channel can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Wrap a raw handle.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch#{}", self.0)
    }
}

/// Why the transport rejected or lost the local endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointErrorKind {
    /// The requested identity is registered by someone else.
    IdTaken,
    /// The remote identity of an outbound connect does not exist.
    PeerUnavailable {
        /// Identity that could not be reached.
        peer: PeerId,
    },
    /// Broker or network failure.
    Network(String),
}

/// Events the caller feeds into the session manager.
///
/// User intents come from the view layer; the rest are transport callbacks.
/// Generic over `I` (Instant type) so typing deadlines work with both the
/// system clock and a simulated one.
#[derive(Debug, Clone)]
pub enum SessionEvent<I = std::time::Instant> {
    /// Generate a fresh ephemeral identity and bring it up.
    UseEphemeralIdentity,

    /// Bring up a user-chosen durable identity.
    UseDurableIdentity {
        /// Requested identity, trimmed before validation.
        id: String,
    },

    /// Open a channel to a remote identity.
    ConnectTo {
        /// Remote identity as typed by the user.
        remote: String,
    },

    /// Close the current channel.
    Hangup,

    /// Send a text message.
    SendText {
        /// Message text.
        content: String,
    },

    /// Send a code snippet.
    SendCode {
        /// Source text.
        content: String,
        /// Language tag. Configured default when `None`.
        language: Option<String>,
    },

    /// Send a file that has been read into memory.
    SendFile {
        /// File name.
        filename: String,
        /// MIME type as reported by the picker.
        mime_type: String,
        /// File content.
        bytes: Vec<u8>,
    },

    /// The file picker failed to read the selected file.
    FileReadFailed {
        /// Reader error.
        reason: String,
    },

    /// React to a message.
    React {
        /// Target message.
        message_id: MessageId,
        /// Emoji glyph.
        emoji: String,
    },

    /// Explicit typing status from the view layer.
    SendTypingSignal {
        /// Whether the user is typing.
        typing: bool,
    },

    /// The user pressed a key in the composer.
    Keystroke {
        /// Current time from the environment.
        now: I,
    },

    /// Time tick for the typing-stop deadline.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Delete the message history.
    ClearHistory,

    /// Clear the error slot.
    DismissError,

    /// The broker confirmed the local identity.
    EndpointOpen {
        /// Identity that is now live.
        id: PeerId,
    },

    /// The local endpoint reported an error.
    EndpointError {
        /// Error category.
        kind: EndpointErrorKind,
    },

    /// Lost the broker connection. Open channels may survive.
    EndpointDisconnected,

    /// The transport accepted an `OpenChannel` request.
    ChannelRequested {
        /// Remote identity.
        remote: PeerId,
        /// Handle of the new outbound channel.
        channel: ChannelId,
    },

    /// The transport refused an `OpenChannel` request.
    ConnectFailed {
        /// Remote identity.
        remote: PeerId,
        /// Transport error text.
        reason: String,
    },

    /// A remote peer offered a channel.
    IncomingConnection {
        /// Offering identity.
        remote: PeerId,
        /// Handle of the offered channel.
        channel: ChannelId,
    },

    /// A channel finished opening.
    ChannelOpen {
        /// Remote end of the channel.
        remote: PeerId,
        /// Channel handle.
        channel: ChannelId,
    },

    /// Bytes arrived on a channel.
    FrameReceived {
        /// Remote end of the channel.
        remote: PeerId,
        /// Channel handle.
        channel: ChannelId,
        /// Encoded frame.
        bytes: Vec<u8>,
    },

    /// A channel closed.
    ChannelClosed {
        /// Remote end of the channel.
        remote: PeerId,
        /// Channel handle.
        channel: ChannelId,
    },

    /// A channel failed.
    ChannelError {
        /// Remote end of the channel.
        remote: PeerId,
        /// Channel handle.
        channel: ChannelId,
        /// Transport error text.
        reason: String,
    },

    /// Executing a `Send` action failed.
    SendFailed {
        /// Transport error text.
        reason: String,
    },
}

/// Actions the session manager produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Register the local identity with the broker.
    CreateEndpoint {
        /// Identity to register.
        id: PeerId,
        /// Relay endpoints.
        config: EndpointConfig,
    },

    /// Tear down the local endpoint. No-op if none exists.
    DestroyEndpoint,

    /// Ask the transport to re-establish the broker connection.
    ReconnectEndpoint,

    /// Open a channel to a remote peer. The transport answers with
    /// `ChannelRequested` or `ConnectFailed`.
    OpenChannel {
        /// Remote identity.
        remote: PeerId,
    },

    /// Close a channel. No-op if already closed.
    CloseChannel {
        /// Remote identity.
        remote: PeerId,
        /// Channel handle.
        channel: ChannelId,
    },

    /// Send an encoded frame on a channel.
    Send {
        /// Remote identity.
        remote: PeerId,
        /// Channel handle.
        channel: ChannelId,
        /// Encoded frame.
        bytes: Vec<u8>,
    },

    /// Write a value to the key-value store.
    Persist {
        /// Storage key.
        key: &'static str,
        /// Serialized value.
        value: String,
    },

    /// Delete a key from the key-value store.
    Remove {
        /// Storage key.
        key: &'static str,
    },
}
