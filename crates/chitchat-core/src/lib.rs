//! Core building blocks for Chit-Chat peer sessions.
//!
//! Everything here is pure: no I/O, no clocks, no randomness except through
//! the [`env::Environment`] trait. The session manager in `chitchat-client`
//! composes these pieces into the full lifecycle state machine.
//!
//! # Components
//!
//! - [`SessionState`] / [`Lifecycle`]: legal lifecycle transitions
//! - [`PeerSession`]: the single remote peer's presence
//! - [`MessageLog`]: ordered chat history with JSON persistence
//! - [`TypingDebouncer`]: restart-on-activity typing stop timer
//! - [`SessionConfig`]: tunables and relay endpoints

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod env;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod log;
pub mod peer;
pub mod typing;

pub use config::{EndpointConfig, IceServer, SessionConfig};
pub use error::{LifecycleError, LogError, SessionError};
pub use identity::{IdentityMode, LocalIdentity};
pub use lifecycle::{Lifecycle, SessionState};
pub use log::MessageLog;
pub use peer::PeerSession;
pub use typing::{TypingDebouncer, TypingSignal};
