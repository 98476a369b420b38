//! Remote peer presence.

use chitchat_proto::PeerId;
use serde::{Deserialize, Serialize};

/// The one remote peer this client talks to.
///
/// Outlives its channel: when the channel closes the session is marked
/// offline rather than dropped, so the view can keep showing who we were
/// talking to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSession {
    remote: PeerId,
    online: bool,
    typing: bool,
    /// Unix milliseconds of the last frame or status from the peer.
    last_activity: u64,
}

impl PeerSession {
    /// New online session with the given remote.
    pub fn new(remote: PeerId, now_millis: u64) -> Self {
        Self { remote, online: true, typing: false, last_activity: now_millis }
    }

    /// Remote identity.
    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    /// True while the channel is open.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// True while the remote reports typing.
    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// Unix milliseconds of the last observed activity.
    pub fn last_activity(&self) -> u64 {
        self.last_activity
    }

    /// Record a typing status from the remote.
    pub fn set_typing(&mut self, typing: bool, now_millis: u64) {
        self.typing = typing;
        self.touch(now_millis);
    }

    /// Record activity from the remote.
    pub fn touch(&mut self, now_millis: u64) {
        self.last_activity = self.last_activity.max(now_millis);
    }

    /// Mark the channel as gone.
    pub fn mark_offline(&mut self) {
        self.online = false;
        self.typing = false;
    }
}
