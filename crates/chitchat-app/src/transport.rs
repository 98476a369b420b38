//! Transport collaborator abstraction.
//!
//! The [`Transport`] trait decouples the runtime from a concrete peer
//! networking stack. A browser build would sit on WebRTC data channels and a
//! signalling server; the simulation harness uses an in-process broker.
//! Callbacks are queued by the transport and drained with
//! [`Transport::poll_event`], so the session manager only ever runs between
//! events and never re-entrantly.

use chitchat_client::{ChannelId, EndpointErrorKind, SessionEvent};
use chitchat_core::EndpointConfig;
use chitchat_proto::PeerId;
use thiserror::Error;

/// Synchronous failures reported directly by transport calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No local endpoint exists.
    #[error("no local endpoint")]
    NoEndpoint,

    /// The channel is not open.
    #[error("channel {0} is closed")]
    ChannelClosed(ChannelId),

    /// Broker or network failure.
    #[error("network failure: {0}")]
    Network(String),
}

/// Events the transport reports asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Broker confirmed our identity.
    EndpointOpen {
        /// Registered identity.
        id: PeerId,
    },
    /// Endpoint-level failure.
    EndpointError(EndpointErrorKind),
    /// Lost the broker connection.
    EndpointDisconnected,
    /// Remote offered a channel.
    IncomingConnection {
        /// Offering identity.
        remote: PeerId,
        /// Handle of the offered channel.
        channel: ChannelId,
    },
    /// Channel open and ready for data.
    ChannelOpen {
        /// Remote end.
        remote: PeerId,
        /// Channel handle.
        channel: ChannelId,
    },
    /// Frame received.
    Data {
        /// Remote end.
        remote: PeerId,
        /// Channel the frame arrived on.
        channel: ChannelId,
        /// Encoded frame.
        bytes: Vec<u8>,
    },
    /// Channel closed by the remote or the network.
    ChannelClosed {
        /// Remote end.
        remote: PeerId,
        /// Channel handle.
        channel: ChannelId,
    },
    /// Channel failed.
    ChannelError {
        /// Remote end.
        remote: PeerId,
        /// Channel handle.
        channel: ChannelId,
        /// Error text.
        reason: String,
    },
}

impl<I> From<TransportEvent> for SessionEvent<I> {
    fn from(event: TransportEvent) -> Self {
        match event {
            TransportEvent::EndpointOpen { id } => Self::EndpointOpen { id },
            TransportEvent::EndpointError(kind) => Self::EndpointError { kind },
            TransportEvent::EndpointDisconnected => Self::EndpointDisconnected,
            TransportEvent::IncomingConnection { remote, channel } => {
                Self::IncomingConnection { remote, channel }
            },
            TransportEvent::ChannelOpen { remote, channel } => {
                Self::ChannelOpen { remote, channel }
            },
            TransportEvent::Data { remote, channel, bytes } => {
                Self::FrameReceived { remote, channel, bytes }
            },
            TransportEvent::ChannelClosed { remote, channel } => {
                Self::ChannelClosed { remote, channel }
            },
            TransportEvent::ChannelError { remote, channel, reason } => {
                Self::ChannelError { remote, channel, reason }
            },
        }
    }
}

/// Peer transport: one local endpoint plus data channels.
///
/// Channels are addressed by a [`ChannelId`] the transport assigns, so two
/// channels to the same remote are never confused.
///
/// # Invariants
///
/// - At most one local endpoint exists; `create_endpoint` replaces it
/// - Tearing down a missing endpoint or channel is a no-op
/// - A handle is never reused while the transport lives
/// - Events for a channel are reported in the order they happened
/// - Closing a channel locally reports nothing back to the closer
pub trait Transport: Send {
    /// Register `id` with the broker. Completion arrives as
    /// [`TransportEvent::EndpointOpen`] or [`TransportEvent::EndpointError`].
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be issued at all.
    fn create_endpoint(&mut self, id: &PeerId, config: &EndpointConfig)
    -> Result<(), TransportError>;

    /// Drop the local endpoint and every channel on it.
    fn destroy_endpoint(&mut self);

    /// Re-establish the broker connection for the current identity.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::NoEndpoint` if there is nothing to reconnect.
    fn reconnect_endpoint(&mut self) -> Result<(), TransportError>;

    /// Start opening a channel to `remote` and return its handle.
    /// Completion arrives as [`TransportEvent::ChannelOpen`] for that handle.
    ///
    /// # Errors
    ///
    /// Returns an error if no endpoint exists.
    fn connect(&mut self, remote: &PeerId) -> Result<ChannelId, TransportError>;

    /// Close `channel`.
    fn close(&mut self, channel: ChannelId);

    /// Send an encoded frame on `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is not open.
    fn send(&mut self, channel: ChannelId, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Next queued event, if any.
    fn poll_event(&mut self) -> Option<TransportEvent>;
}
