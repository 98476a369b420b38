//! Simulated signalling broker and data channels.
//!
//! One [`SimNetwork`] stands in for the broker plus every peer-to-peer data
//! channel. Each [`SimTransport`] is a handle on it with its own event inbox.
//! Events are queued, never delivered re-entrantly, so the order in which
//! tests pump runtimes decides interleaving.
//!
//! Fault injection covers what the session must survive: broker loss, send
//! failures, and channels failing mid-conversation.

#![allow(clippy::disallowed_types, reason = "Synchronous in-process broker")]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use chitchat_app::{Transport, TransportError, TransportEvent};
use chitchat_client::{ChannelId, EndpointErrorKind};
use chitchat_core::EndpointConfig;
use chitchat_proto::PeerId;

/// Transport handle identifier.
type Handle = u64;

/// A frame that crossed a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// Sending identity.
    pub from: PeerId,
    /// Receiving identity.
    pub to: PeerId,
    /// Encoded frame.
    pub bytes: Vec<u8>,
}

/// One end of a channel.
#[derive(Debug, Clone)]
struct ChannelEnd {
    owner: Handle,
    local: PeerId,
    remote: PeerId,
    /// The other end.
    far: ChannelId,
}

#[derive(Default)]
struct NetworkState {
    next_handle: Handle,
    /// Identity each handle asked for, live or not.
    identities: HashMap<Handle, PeerId>,
    /// Identities currently registered with the broker.
    registry: HashMap<PeerId, Handle>,
    inboxes: HashMap<Handle, VecDeque<TransportEvent>>,
    next_channel: u64,
    /// Open channel ends. Ids are unique across the whole network.
    channels: HashMap<ChannelId, ChannelEnd>,
    broker_down: bool,
    /// Handles waiting for the broker to come back.
    reconnecting: HashSet<Handle>,
    failing_senders: HashSet<Handle>,
    sent: Vec<SentFrame>,
}

impl NetworkState {
    fn push(&mut self, handle: Handle, event: TransportEvent) {
        self.inboxes.entry(handle).or_default().push_back(event);
    }

    fn registered_id(&self, handle: Handle) -> Option<PeerId> {
        self.identities.get(&handle).filter(|id| self.registry.get(*id) == Some(&handle)).cloned()
    }

    fn allocate_channel(&mut self) -> ChannelId {
        self.next_channel += 1;
        ChannelId::new(self.next_channel)
    }

    /// End `channel` if `handle` owns it and notify the far owner.
    fn close_end(&mut self, handle: Handle, channel: ChannelId) {
        if !self.channels.get(&channel).is_some_and(|end| end.owner == handle) {
            return;
        }
        let Some(end) = self.channels.remove(&channel) else {
            return;
        };

        if let Some(far) = self.channels.remove(&end.far) {
            self.push(far.owner, TransportEvent::ChannelClosed {
                remote: far.remote,
                channel: end.far,
            });
        }
    }

    /// Drop every channel of `handle`, notifying the far ends.
    fn close_all(&mut self, handle: Handle) {
        let owned: Vec<ChannelId> = self
            .channels
            .iter()
            .filter(|(_, end)| end.owner == handle)
            .map(|(channel, _)| *channel)
            .collect();

        for channel in owned {
            self.close_end(handle, channel);
        }
    }

    fn ends_between(&self, a: &PeerId, b: &PeerId) -> Vec<ChannelId> {
        self.channels
            .iter()
            .filter(|(_, end)| &end.local == a && &end.remote == b)
            .map(|(channel, _)| *channel)
            .collect()
    }
}

/// In-process broker and channel fabric.
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct SimNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl SimNetwork {
    /// Empty network with a reachable broker.
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().expect("SimNetwork mutex poisoned")
    }

    /// New transport handle with an empty inbox.
    pub fn transport(&self) -> SimTransport {
        let mut state = self.lock();
        let handle = state.next_handle;
        state.next_handle += 1;
        state.inboxes.insert(handle, VecDeque::new());
        SimTransport { network: self.clone(), handle }
    }

    /// True if `id` is registered with the broker.
    pub fn is_registered(&self, id: &PeerId) -> bool {
        self.lock().registry.contains_key(id)
    }

    /// True if `a` holds an open channel end towards `b`.
    pub fn has_channel(&self, a: &PeerId, b: &PeerId) -> bool {
        self.open_channels(a, b) > 0
    }

    /// Number of open channel ends `a` holds towards `b`.
    pub fn open_channels(&self, a: &PeerId, b: &PeerId) -> usize {
        self.lock().ends_between(a, b).len()
    }

    /// Every frame delivered so far, in order.
    pub fn sent_frames(&self) -> Vec<SentFrame> {
        self.lock().sent.clone()
    }

    /// Frames delivered from `from` to `to`, in order.
    pub fn frames_between(&self, from: &PeerId, to: &PeerId) -> Vec<Vec<u8>> {
        self.lock()
            .sent
            .iter()
            .filter(|f| &f.from == from && &f.to == to)
            .map(|f| f.bytes.clone())
            .collect()
    }

    /// Drop the broker connection of every endpoint. Channels stay open.
    pub fn take_broker_down(&self) {
        let mut state = self.lock();
        state.broker_down = true;

        let live: Vec<Handle> = state.registry.values().copied().collect();
        for handle in live {
            state.push(handle, TransportEvent::EndpointDisconnected);
        }
    }

    /// Bring the broker back and complete pending reconnects.
    pub fn restore_broker(&self) {
        let mut state = self.lock();
        state.broker_down = false;

        let waiting: Vec<Handle> = state.reconnecting.drain().collect();
        for handle in waiting {
            if let Some(id) = state.registered_id(handle) {
                state.push(handle, TransportEvent::EndpointOpen { id });
            }
        }
    }

    /// Make every `send` from `id` fail.
    pub fn fail_sends_from(&self, id: &PeerId, failing: bool) {
        let mut state = self.lock();
        let Some(&handle) = state.registry.get(id) else {
            return;
        };

        if failing {
            state.failing_senders.insert(handle);
        } else {
            state.failing_senders.remove(&handle);
        }
    }

    /// Fail every channel between `a` and `b` on both ends.
    pub fn break_channel(&self, a: &PeerId, b: &PeerId, reason: &str) {
        let mut state = self.lock();

        let mut broken = state.ends_between(a, b);
        broken.extend(state.ends_between(b, a));
        broken.sort_unstable();

        for channel in broken {
            if let Some(end) = state.channels.remove(&channel) {
                state.push(end.owner, TransportEvent::ChannelError {
                    remote: end.remote,
                    channel,
                    reason: reason.to_owned(),
                });
            }
        }
    }
}

/// One endpoint's handle on a [`SimNetwork`].
pub struct SimTransport {
    network: SimNetwork,
    handle: Handle,
}

impl SimTransport {
    /// Events waiting in this handle's inbox.
    pub fn pending_events(&self) -> usize {
        self.network.lock().inboxes.get(&self.handle).map_or(0, VecDeque::len)
    }
}

impl Transport for SimTransport {
    fn create_endpoint(
        &mut self,
        id: &PeerId,
        config: &EndpointConfig,
    ) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        if state.broker_down {
            return Err(TransportError::Network("broker unreachable".to_string()));
        }

        state.close_all(self.handle);
        if let Some(old) = state.identities.remove(&self.handle) {
            if state.registry.get(&old) == Some(&self.handle) {
                state.registry.remove(&old);
            }
        }

        tracing::debug!(peer = %id, relays = config.ice_servers.len(), "sim endpoint requested");

        if state.registry.contains_key(id) {
            state.push(self.handle, TransportEvent::EndpointError(EndpointErrorKind::IdTaken));
            return Ok(());
        }

        state.identities.insert(self.handle, id.clone());
        state.registry.insert(id.clone(), self.handle);
        state.push(self.handle, TransportEvent::EndpointOpen { id: id.clone() });
        Ok(())
    }

    fn destroy_endpoint(&mut self) {
        let mut state = self.network.lock();
        state.close_all(self.handle);
        state.reconnecting.remove(&self.handle);

        if let Some(id) = state.identities.remove(&self.handle) {
            if state.registry.get(&id) == Some(&self.handle) {
                state.registry.remove(&id);
            }
        }
    }

    fn reconnect_endpoint(&mut self) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let Some(id) = state.registered_id(self.handle) else {
            return Err(TransportError::NoEndpoint);
        };

        if state.broker_down {
            state.reconnecting.insert(self.handle);
            return Ok(());
        }

        state.push(self.handle, TransportEvent::EndpointOpen { id });
        Ok(())
    }

    fn connect(&mut self, remote: &PeerId) -> Result<ChannelId, TransportError> {
        let mut state = self.network.lock();
        let Some(local) = state.registered_id(self.handle) else {
            return Err(TransportError::NoEndpoint);
        };

        if state.broker_down {
            return Err(TransportError::Network("broker unreachable".to_string()));
        }

        let near = state.allocate_channel();
        let Some(&far_owner) = state.registry.get(remote) else {
            state.push(
                self.handle,
                TransportEvent::EndpointError(EndpointErrorKind::PeerUnavailable {
                    peer: remote.clone(),
                }),
            );
            return Ok(near);
        };
        let far = state.allocate_channel();

        state.channels.insert(near, ChannelEnd {
            owner: self.handle,
            local: local.clone(),
            remote: remote.clone(),
            far,
        });
        state.channels.insert(far, ChannelEnd {
            owner: far_owner,
            local: remote.clone(),
            remote: local.clone(),
            far: near,
        });

        tracing::trace!(peer = %remote, %near, %far, "sim channel opened");
        state.push(far_owner, TransportEvent::IncomingConnection {
            remote: local.clone(),
            channel: far,
        });
        state.push(far_owner, TransportEvent::ChannelOpen { remote: local, channel: far });
        let opened = TransportEvent::ChannelOpen { remote: remote.clone(), channel: near };
        state.push(self.handle, opened);
        Ok(near)
    }

    fn close(&mut self, channel: ChannelId) {
        self.network.lock().close_end(self.handle, channel);
    }

    fn send(&mut self, channel: ChannelId, bytes: Vec<u8>) -> Result<(), TransportError> {
        let mut state = self.network.lock();

        let Some(end) = state.channels.get(&channel).filter(|end| end.owner == self.handle).cloned()
        else {
            return Err(TransportError::ChannelClosed(channel));
        };

        if state.failing_senders.contains(&self.handle) {
            return Err(TransportError::Network("injected send failure".to_string()));
        }

        let Some(far_owner) = state.channels.get(&end.far).map(|far| far.owner) else {
            return Err(TransportError::ChannelClosed(channel));
        };

        state.sent.push(SentFrame {
            from: end.local.clone(),
            to: end.remote.clone(),
            bytes: bytes.clone(),
        });
        state.push(far_owner, TransportEvent::Data { remote: end.local, channel: end.far, bytes });
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.network.lock().inboxes.get_mut(&self.handle).and_then(VecDeque::pop_front)
    }
}
