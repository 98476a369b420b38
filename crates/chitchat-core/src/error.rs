//! Error types for the session core.
//!
//! [`SessionError`] is what the view layer sees in its error slot. Every kind
//! is recoverable locally; none of them end the process.

use chitchat_proto::PeerId;
use thiserror::Error;

use crate::lifecycle::SessionState;

/// User-facing session errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Requested identity is already registered with the broker.
    #[error("identity {id} is already taken")]
    IdentityCollision {
        /// The identity that collided
        id: PeerId,
    },

    /// Local or remote identity failed validation.
    #[error("invalid identity: {reason}")]
    InvalidIdentity {
        /// Why the identity was rejected
        reason: String,
    },

    /// Transport failed during bring-up or data exchange.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Operation needs a live local endpoint.
    #[error("local endpoint is not ready")]
    EndpointNotReady,

    /// Remote identity could not be reached.
    #[error("peer {peer} is unavailable")]
    PeerUnavailable {
        /// The unreachable peer
        peer: PeerId,
    },

    /// Operation needs a connected peer session.
    #[error("no connected peer")]
    NotConnected,

    /// Message payload is empty.
    #[error("message is empty")]
    EmptyPayload,

    /// Transport rejected an outbound frame.
    #[error("send failed: {0}")]
    SendFailure(String),

    /// File exceeds the configured limit.
    #[error("file too large: {size} bytes (max {max})")]
    FileTooLarge {
        /// File size in bytes
        size: u64,
        /// Maximum allowed size in bytes
        max: u64,
    },

    /// Reading the selected file failed.
    #[error("failed to read file: {0}")]
    FileReadError(String),
}

impl SessionError {
    /// Message suitable for display in the view layer.
    pub fn user_message(&self) -> String {
        match self {
            Self::IdentityCollision { .. } => {
                "This ID is already taken. Please choose another one.".to_string()
            },
            Self::InvalidIdentity { reason } => reason.clone(),
            Self::TransportError(_) => "Connection error. Please try again.".to_string(),
            Self::EndpointNotReady => "Your ID is still being set up. Please wait.".to_string(),
            Self::PeerUnavailable { peer } => {
                format!("Could not reach {peer}. Check the ID and try again.")
            },
            Self::NotConnected => "Connect to a peer before sending.".to_string(),
            Self::EmptyPayload => "Message is empty.".to_string(),
            Self::SendFailure(_) => "Message could not be delivered.".to_string(),
            Self::FileTooLarge { max, .. } => {
                format!("File is too large (max {}).", display_size(*max))
            },
            Self::FileReadError(_) => "Could not read the selected file.".to_string(),
        }
    }

    /// Returns true if repeating the same action later may succeed.
    ///
    /// Validation failures never succeed on retry without user changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportError(_)
                | Self::EndpointNotReady
                | Self::PeerUnavailable { .. }
                | Self::SendFailure(_)
        )
    }
}

/// Illegal lifecycle transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    /// Transition not allowed from the current state.
    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state
        from: SessionState,
        /// Requested state
        to: SessionState,
    },
}

/// Message log (de)serialization errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    /// Stored log could not be parsed.
    #[error("corrupt message log: {0}")]
    Corrupt(String),

    /// Log could not be serialized.
    #[error("failed to encode message log: {0}")]
    Encode(String),
}

/// Human-readable size in binary units, labelled MB/KB as users expect.
///
/// Whole multiples print without decimals, anything else with one.
fn display_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;

    let (unit, label) = match bytes {
        b if b >= MIB => (MIB, "MB"),
        b if b >= KIB => (KIB, "KB"),
        _ => return format!("{bytes} bytes"),
    };

    if bytes % unit == 0 {
        format!("{} {label}", bytes / unit)
    } else {
        format!("{:.1} {label}", bytes as f64 / unit as f64)
    }
}
