//! Session lifecycle states and legal transitions.
//!
//! # State Machine
//!
//! ```text
//!  ┌──────┐ identity ┌──────────────┐  endpoint open  ┌───────┐
//!  │ Idle │─────────>│ Initializing │────────────────>│ Ready │
//!  └──────┘          └──────────────┘                 └───────┘
//!                           │ transport error             │ connect / incoming
//!                           ↓                             ↓
//!                      ┌─────────┐   retry connect  ┌────────────┐
//!                      │ Errored │─────────────────>│ Connecting │
//!                      └─────────┘                  └────────────┘
//!                           ↑                             │ channel open
//!                           │ channel error               ↓
//!                           │                       ┌───────────┐
//!                           └───────────────────────│ Connected │
//!                                                   └───────────┘
//!                                                         │ close
//!                                                         ↓
//!                                                    ┌────────┐
//!                                                    │ Closed │──> Connecting
//!                                                    └────────┘
//! ```
//!
//! Any state may move to `Initializing` when the identity changes. Broker
//! disconnection is not a state: it is a recovering flag carried alongside
//! `Ready`/`Connecting`/`Connected` while the transport reconnects.

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No identity acquired yet.
    Idle,
    /// Endpoint requested, waiting for the broker to confirm the identity.
    Initializing,
    /// Identity live, no peer session.
    Ready,
    /// Channel to a remote peer requested or offered, not yet open.
    Connecting,
    /// Channel open, data exchange possible.
    Connected,
    /// Channel closed by either side. Requires a new connect.
    Closed,
    /// Bring-up or channel failure. Requires user action or transport recovery.
    Errored,
}

impl SessionState {
    /// Returns true if `next` is reachable from `self` in one step.
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{Closed, Connected, Connecting, Errored, Initializing, Ready};

        match (self, next) {
            (_, Initializing) => true,
            (Initializing | Errored, Ready) => true,
            (Initializing, Errored) => true,
            (Ready | Connecting | Connected | Closed | Errored, Connecting) => true,
            (Connecting, Connected) => true,
            (Connecting | Connected, Closed | Errored) => true,
            _ => false,
        }
    }

    /// True while a peer channel exists or is being negotiated.
    pub fn has_channel(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// Holder for the current state that only allows legal transitions.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: SessionState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Start in [`SessionState::Idle`].
    pub fn new() -> Self {
        Self { state: SessionState::Idle }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`, returning the previous state.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::InvalidTransition` if `next` is not reachable
    pub fn transition(&mut self, next: SessionState) -> Result<SessionState, LifecycleError> {
        if !self.state.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition { from: self.state, to: next });
        }

        let previous = self.state;
        self.state = next;
        tracing::debug!(from = ?previous, to = ?next, "session state transition");
        Ok(previous)
    }
}
