//! Session configuration.

use std::time::Duration;

use chitchat_proto::DEFAULT_CODE_LANGUAGE;
use serde::{Deserialize, Serialize};

/// Storage key for the serialized message log.
pub const MESSAGES_STORAGE_KEY: &str = "codeshare_messages";

/// Storage key for the durable local identity.
pub const IDENTITY_STORAGE_KEY: &str = "codeshare_peer_id";

/// Idle window after the last keystroke before a typing-stop is sent.
pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_secs(1);

/// Largest file accepted for sending: 5 MiB (5 × 1024 × 1024 bytes).
///
/// User-facing text calls this "5 MB"; sizes are always binary multiples.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Length of generated ephemeral identities.
pub const DEFAULT_EPHEMERAL_ID_LEN: usize = 10;

/// Length of generated message identifiers.
pub const MESSAGE_ID_LEN: usize = 21;

/// Minimum length of a user-chosen durable identity.
pub const DEFAULT_MIN_DURABLE_ID_LEN: usize = 4;

/// Public STUN server used when no relay endpoints are configured.
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// A relay or negotiation endpoint handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// One or more `stun:`/`turn:` URLs.
    pub urls: Vec<String>,
    /// TURN username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// STUN server without credentials.
    pub fn stun(url: impl Into<String>) -> Self {
        Self { urls: vec![url.into()], username: None, credential: None }
    }

    /// TURN relay with credentials.
    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }

    /// Parse `url` or `url|username|credential`.
    ///
    /// Returns `None` for an empty URL or a partial credential pair.
    pub fn parse(spec: &str) -> Option<Self> {
        let mut parts = spec.split('|');
        let url = parts.next().map(str::trim).filter(|u| !u.is_empty())?;

        match (parts.next(), parts.next(), parts.next()) {
            (None, None, None) => Some(Self::stun(url)),
            (Some(user), Some(credential), None) => Some(Self::turn(url, user, credential)),
            _ => None,
        }
    }
}

/// Configuration passed to the transport when creating the local endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Relay/negotiation endpoints.
    pub ice_servers: Vec<IceServer>,
}

/// Session tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Relay/negotiation endpoints for the transport.
    pub ice_servers: Vec<IceServer>,
    /// Idle window before an automatic typing-stop signal.
    pub typing_idle: Duration,
    /// Largest file accepted for sending, in bytes.
    pub max_file_size: u64,
    /// Length of generated ephemeral identities.
    pub ephemeral_id_len: usize,
    /// Minimum length of a durable identity.
    pub min_durable_id_len: usize,
    /// Language tag for code messages sent without one.
    pub default_code_language: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::stun(DEFAULT_STUN_URL)],
            typing_idle: DEFAULT_TYPING_IDLE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            ephemeral_id_len: DEFAULT_EPHEMERAL_ID_LEN,
            min_durable_id_len: DEFAULT_MIN_DURABLE_ID_LEN,
            default_code_language: DEFAULT_CODE_LANGUAGE.to_string(),
        }
    }
}

impl SessionConfig {
    /// Endpoint configuration derived from this session configuration.
    pub fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig { ice_servers: self.ice_servers.clone() }
    }
}
