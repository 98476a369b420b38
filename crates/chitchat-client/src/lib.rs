//! Session manager
//!
//! Action-based state machine for a single-peer Chit-Chat session. Owns the
//! local identity, at most one peer session, the message log and the error
//! slot.
//!
//! # Architecture
//!
//! The manager follows the Sans-IO pattern of [`chitchat_core`]. It receives
//! events ([`SessionEvent`]) from the view layer and the transport, processes
//! them synchronously, and returns actions ([`SessionAction`]) for the caller
//! to execute against the transport and the key-value store. Failures never
//! escape: they land in the error slot visible through [`SessionSnapshot`].
//!
//! # Components
//!
//! - [`SessionManager`]: lifecycle, routing and outbound operations
//! - [`SessionEvent`]: events fed into the manager
//! - [`SessionAction`]: actions produced by the manager
//! - [`SessionSnapshot`]: read-only view state

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod event;
mod manager;

pub use chitchat_core::{
    SessionConfig, SessionError, SessionState, env::Environment, identity::IdentityMode,
    identity::LocalIdentity,
};
pub use event::{ChannelId, EndpointErrorKind, SessionAction, SessionEvent};
pub use manager::{SessionManager, SessionSnapshot};
