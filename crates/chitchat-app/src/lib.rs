//! Application layer for Chit-Chat
//!
//! Generic runtime that connects the pure [`SessionManager`] to its two
//! collaborators: a [`Transport`] (signalling broker plus peer data channels)
//! and a [`KeyValueStore`]. The same runtime drives production and
//! simulation; only the transport, store and environment differ.
//!
//! # Components
//!
//! - [`Transport`]: trait for the peer transport collaborator
//! - [`TransportEvent`]: callbacks reported by the transport
//! - [`Runtime`]: executes session actions and feeds results back
//! - [`SystemEnv`]: production environment (system clock, OS RNG, tokio)
//!
//! [`SessionManager`]: chitchat_client::SessionManager
//! [`KeyValueStore`]: chitchat_store::KeyValueStore

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod runtime;
mod system_env;
mod transport;

pub use runtime::Runtime;
pub use system_env::SystemEnv;
pub use transport::{Transport, TransportError, TransportEvent};
