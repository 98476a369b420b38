//! Local identity acquisition and validation.

use chitchat_proto::PeerId;
use serde::{Deserialize, Serialize};

use crate::{SessionConfig, env::Environment, error::SessionError};

/// How the local identity was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityMode {
    /// Generated per session, never persisted.
    Ephemeral,
    /// User-chosen, persisted and reused across sessions.
    Durable,
}

/// The identity this endpoint registers with the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    /// Identity token.
    pub id: PeerId,
    /// Acquisition mode.
    pub mode: IdentityMode,
}

impl LocalIdentity {
    /// Generate a fresh ephemeral identity.
    pub fn ephemeral<E: Environment>(env: &E, config: &SessionConfig) -> Self {
        Self { id: PeerId::new(env.random_id(config.ephemeral_id_len)), mode: IdentityMode::Ephemeral }
    }

    /// Validate a user-chosen identity.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidIdentity` if the trimmed id is empty or shorter
    ///   than `config.min_durable_id_len`
    pub fn durable(id: &str, config: &SessionConfig) -> Result<Self, SessionError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(SessionError::InvalidIdentity { reason: "Please enter an ID".to_string() });
        }

        if id.chars().count() < config.min_durable_id_len {
            return Err(SessionError::InvalidIdentity {
                reason: format!("ID must be at least {} characters long", config.min_durable_id_len),
            });
        }

        Ok(Self { id: PeerId::from(id), mode: IdentityMode::Durable })
    }

    /// True if this identity should be written to storage once live.
    pub fn is_durable(&self) -> bool {
        self.mode == IdentityMode::Durable
    }
}

/// Validate a remote identity supplied for an outbound connect.
///
/// # Errors
///
/// - `SessionError::InvalidIdentity` if the trimmed id is empty or equals our
///   own identity
pub fn validate_remote(remote: &str, local: Option<&PeerId>) -> Result<PeerId, SessionError> {
    let remote = remote.trim();
    if remote.is_empty() {
        return Err(SessionError::InvalidIdentity { reason: "Please enter a peer ID".to_string() });
    }

    if local.is_some_and(|local| local.as_str() == remote) {
        return Err(SessionError::InvalidIdentity {
            reason: "You cannot connect to yourself".to_string(),
        });
    }

    Ok(PeerId::from(remote))
}
