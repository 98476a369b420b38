//! Session manager state machine.
//!
//! The `SessionManager` owns everything the view layer reads: the local
//! identity, the single peer session, the message log and the error slot. It
//! never performs I/O; every effect is returned as a [`SessionAction`].

use chitchat_core::{
    Lifecycle, LocalIdentity, MessageLog, PeerSession, SessionConfig, SessionError, SessionState,
    TypingDebouncer, TypingSignal,
    config::{IDENTITY_STORAGE_KEY, MESSAGE_ID_LEN, MESSAGES_STORAGE_KEY},
    env::Environment,
    identity::validate_remote,
};
use chitchat_proto::{
    ControlFrame, FilePayload, Frame, Message, MessageBody, MessageId, PeerId, Reaction,
};

use crate::event::{ChannelId, EndpointErrorKind, SessionAction, SessionEvent};

/// A channel that is negotiating.
#[derive(Debug, Clone)]
struct PendingChannel {
    remote: PeerId,
    /// `None` until the transport has answered the `OpenChannel` request.
    channel: Option<ChannelId>,
}

/// Read-only view state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Current local identity, live or still being brought up.
    pub local_identity: Option<LocalIdentity>,
    /// True once the broker confirmed the identity.
    pub endpoint_live: bool,
    /// Lifecycle state.
    pub state: SessionState,
    /// True while the transport is reconnecting to the broker.
    pub recovering: bool,
    /// Current or last peer session.
    pub peer: Option<PeerSession>,
    /// Message history in insertion order.
    pub messages: Vec<Message>,
    /// Latest error, if not dismissed.
    pub last_error: Option<SessionError>,
}

/// Single-peer session state machine.
pub struct SessionManager<E: Environment> {
    /// Environment for ids, timestamps and typing deadlines.
    env: E,

    config: SessionConfig,

    /// Active identity. Exactly one at a time once acquired.
    identity: Option<LocalIdentity>,

    /// Broker confirmed `identity`.
    endpoint_live: bool,

    /// Broker connection lost, reconnect requested.
    recovering: bool,

    lifecycle: Lifecycle,

    /// Channel that is negotiating. Set only while `Connecting`.
    pending: Option<PendingChannel>,

    /// Handle of the open channel. Some iff `peer` is online.
    channel: Option<ChannelId>,

    /// Remote of the open channel, or the last one after close.
    peer: Option<PeerSession>,

    log: MessageLog,

    /// Local typing burst tracking.
    typing: TypingDebouncer<E::Instant>,

    /// Latest error. No queue.
    last_error: Option<SessionError>,
}

impl<E: Environment> SessionManager<E> {
    /// Create an idle manager with an empty log.
    pub fn new(env: E, config: SessionConfig) -> Self {
        let typing = TypingDebouncer::new(config.typing_idle);
        Self {
            env,
            config,
            identity: None,
            endpoint_live: false,
            recovering: false,
            lifecycle: Lifecycle::new(),
            pending: None,
            channel: None,
            peer: None,
            log: MessageLog::new(),
            typing,
            last_error: None,
        }
    }

    /// Replace the log with a persisted one.
    ///
    /// A corrupt log is logged and the current log is kept.
    pub fn restore_log(&mut self, json: &str) {
        match MessageLog::from_json(json) {
            Ok(log) => {
                tracing::debug!(messages = log.len(), "restored message log");
                self.log = log;
            },
            Err(error) => {
                tracing::warn!(%error, "ignoring stored message log");
            },
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Active local identity.
    pub fn local_identity(&self) -> Option<&LocalIdentity> {
        self.identity.as_ref()
    }

    /// Current or last peer session.
    pub fn peer(&self) -> Option<&PeerSession> {
        self.peer.as_ref()
    }

    /// Message history.
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Latest error.
    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    /// True while the broker connection is being re-established.
    pub fn is_recovering(&self) -> bool {
        self.recovering
    }

    /// True if new channels can be negotiated.
    pub fn endpoint_ready(&self) -> bool {
        self.endpoint_live && !self.recovering
    }

    /// When the runtime should next send a `Tick`.
    pub fn typing_deadline(&self) -> Option<E::Instant> {
        self.typing.deadline()
    }

    /// Messages matching `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<&Message> {
        self.log.search(query)
    }

    /// Copy of the state the view layer renders.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            local_identity: self.identity.clone(),
            endpoint_live: self.endpoint_live,
            state: self.lifecycle.state(),
            recovering: self.recovering,
            peer: self.peer.clone(),
            messages: self.log.messages().to_vec(),
            last_error: self.last_error.clone(),
        }
    }

    /// Process an event and return resulting actions.
    ///
    /// Failures are stored in the error slot and produce no actions.
    pub fn handle(&mut self, event: SessionEvent<E::Instant>) -> Vec<SessionAction> {
        let result = match event {
            SessionEvent::UseEphemeralIdentity => {
                let identity = LocalIdentity::ephemeral(&self.env, &self.config);
                Ok(self.bring_up(identity))
            },
            SessionEvent::UseDurableIdentity { id } => {
                LocalIdentity::durable(&id, &self.config).map(|identity| self.bring_up(identity))
            },
            SessionEvent::ConnectTo { remote } => self.handle_connect(&remote),
            SessionEvent::Hangup => Ok(self.handle_hangup()),
            SessionEvent::SendText { content } => self.send_body(MessageBody::Text { content }),
            SessionEvent::SendCode { content, language } => {
                let language = language
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| self.config.default_code_language.clone());
                self.send_body(MessageBody::Code { content, language })
            },
            SessionEvent::SendFile { filename, mime_type, bytes } => {
                self.handle_send_file(filename, &mime_type, &bytes)
            },
            SessionEvent::FileReadFailed { reason } => Err(SessionError::FileReadError(reason)),
            SessionEvent::React { message_id, emoji } => self.handle_react(message_id, emoji),
            SessionEvent::SendTypingSignal { typing } => Ok(self.send_status(typing)),
            SessionEvent::Keystroke { now } => Ok(self.handle_keystroke(now)),
            SessionEvent::Tick { now } => Ok(self.handle_tick(now)),
            SessionEvent::ClearHistory => {
                self.log.clear();
                tracing::info!("message history cleared");
                Ok(vec![SessionAction::Remove { key: MESSAGES_STORAGE_KEY }])
            },
            SessionEvent::DismissError => {
                self.last_error = None;
                Ok(Vec::new())
            },
            SessionEvent::EndpointOpen { id } => Ok(self.handle_endpoint_open(&id)),
            SessionEvent::EndpointError { kind } => Ok(self.handle_endpoint_error(kind)),
            SessionEvent::EndpointDisconnected => Ok(self.handle_endpoint_disconnected()),
            SessionEvent::ChannelRequested { remote, channel } => {
                Ok(self.handle_channel_requested(remote, channel))
            },
            SessionEvent::ConnectFailed { remote, reason } => {
                Ok(self.handle_connect_failed(&remote, reason))
            },
            SessionEvent::IncomingConnection { remote, channel } => {
                Ok(self.handle_incoming(remote, channel))
            },
            SessionEvent::ChannelOpen { remote, channel } => {
                Ok(self.handle_channel_open(remote, channel))
            },
            SessionEvent::FrameReceived { remote, channel, bytes } => {
                Ok(self.handle_frame(&remote, channel, &bytes))
            },
            SessionEvent::ChannelClosed { remote, channel } => {
                Ok(self.handle_channel_closed(&remote, channel))
            },
            SessionEvent::ChannelError { remote, channel, reason } => {
                Ok(self.handle_channel_error(remote, channel, reason))
            },
            SessionEvent::SendFailed { reason } => Err(SessionError::SendFailure(reason)),
        };

        match result {
            Ok(actions) => actions,
            Err(error) => {
                self.set_error(error);
                Vec::new()
            },
        }
    }

    fn set_error(&mut self, error: SessionError) {
        tracing::info!(%error, state = ?self.lifecycle.state(), "session error");
        self.last_error = Some(error);
    }

    fn enter(&mut self, next: SessionState) {
        if let Err(error) = self.lifecycle.transition(next) {
            tracing::warn!(%error, "ignoring illegal transition");
        }
    }

    /// Close the open and the negotiating channel.
    ///
    /// An outbound request the transport has not answered yet has no handle;
    /// its `ChannelRequested` arrives as stale and is closed then.
    fn teardown_channel(&mut self) -> Vec<SessionAction> {
        let mut actions = Vec::new();

        if let Some(PendingChannel { remote, channel: Some(channel) }) = self.pending.take() {
            actions.push(SessionAction::CloseChannel { remote, channel });
        }

        if let Some(channel) = self.channel.take() {
            if let Some(peer) = self.peer.as_mut() {
                let remote = peer.remote().clone();
                actions.push(SessionAction::CloseChannel { remote, channel });
                peer.mark_offline();
            }
        }

        self.typing.reset();
        actions
    }

    /// Forget `channel` if it is the open or negotiating one, without
    /// closing it. Returns false for a superseded channel.
    fn release_channel(&mut self, channel: ChannelId) -> bool {
        if self.pending.as_ref().is_some_and(|p| p.channel == Some(channel)) {
            self.pending = None;
        } else if self.channel == Some(channel) {
            self.channel = None;
            if let Some(peer) = self.peer.as_mut() {
                peer.mark_offline();
            }
        } else {
            return false;
        }

        self.typing.reset();
        true
    }

    fn bring_up(&mut self, identity: LocalIdentity) -> Vec<SessionAction> {
        let mut actions = self.teardown_channel();
        actions.push(SessionAction::DestroyEndpoint);

        tracing::info!(peer = %identity.id, mode = ?identity.mode, "bringing up identity");

        actions.push(SessionAction::CreateEndpoint {
            id: identity.id.clone(),
            config: self.config.endpoint_config(),
        });

        self.identity = Some(identity);
        self.endpoint_live = false;
        self.recovering = false;
        self.enter(SessionState::Initializing);
        actions
    }

    fn handle_connect(&mut self, remote: &str) -> Result<Vec<SessionAction>, SessionError> {
        let remote = validate_remote(remote, self.identity.as_ref().map(|i| &i.id))?;
        if !self.endpoint_ready() {
            return Err(SessionError::EndpointNotReady);
        }

        let mut actions = self.teardown_channel();
        tracing::info!(peer = %remote, "connecting");
        actions.push(SessionAction::OpenChannel { remote: remote.clone() });

        self.pending = Some(PendingChannel { remote, channel: None });
        self.enter(SessionState::Connecting);
        Ok(actions)
    }

    fn handle_hangup(&mut self) -> Vec<SessionAction> {
        if !self.lifecycle.state().has_channel() {
            return Vec::new();
        }

        let actions = self.teardown_channel();
        self.enter(SessionState::Closed);
        tracing::info!("session closed locally");
        actions
    }

    /// Remote and handle of the open channel.
    fn connected_channel(&self) -> Result<(PeerId, ChannelId), SessionError> {
        match (&self.peer, self.channel) {
            (Some(peer), Some(channel))
                if self.lifecycle.state() == SessionState::Connected && peer.is_online() =>
            {
                Ok((peer.remote().clone(), channel))
            },
            _ => Err(SessionError::NotConnected),
        }
    }

    fn local_peer_id(&self) -> Result<PeerId, SessionError> {
        self.identity.as_ref().map(|i| i.id.clone()).ok_or(SessionError::EndpointNotReady)
    }

    fn persist_log(&self) -> Option<SessionAction> {
        match self.log.to_json() {
            Ok(value) => Some(SessionAction::Persist { key: MESSAGES_STORAGE_KEY, value }),
            Err(error) => {
                tracing::warn!(%error, "message log not persisted");
                None
            },
        }
    }

    /// Encode `frame` for the channel, or record a send failure.
    fn send_frame(
        &mut self,
        (remote, channel): (PeerId, ChannelId),
        frame: &Frame,
        actions: &mut Vec<SessionAction>,
    ) {
        match frame.encode() {
            Ok(bytes) => actions.push(SessionAction::Send { remote, channel, bytes }),
            Err(error) => {
                tracing::warn!(%error, frame = frame.type_tag(), "frame not sent");
                self.set_error(SessionError::SendFailure(error.to_string()));
            },
        }
    }

    fn send_body(&mut self, body: MessageBody) -> Result<Vec<SessionAction>, SessionError> {
        let target = self.connected_channel()?;
        if body.is_empty() {
            return Err(SessionError::EmptyPayload);
        }

        let message = Message::new(
            MessageId::new(self.env.random_id(MESSAGE_ID_LEN)),
            self.local_peer_id()?,
            self.env.wall_clock_millis(),
            body,
        );
        let frame = Frame::from(message.clone());

        tracing::debug!(
            peer = %target.0,
            message_id = %message.id,
            kind = message.kind().as_str(),
            "sending message"
        );

        // Local history is authoritative; the append stands even if the send fails.
        let mut actions = Vec::new();
        if self.log.push(message) {
            actions.extend(self.persist_log());
        }
        self.send_frame(target, &frame, &mut actions);
        Ok(actions)
    }

    fn handle_send_file(
        &mut self,
        filename: String,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<Vec<SessionAction>, SessionError> {
        let size = bytes.len() as u64;
        if size > self.config.max_file_size {
            return Err(SessionError::FileTooLarge { size, max: self.config.max_file_size });
        }

        self.send_body(MessageBody::File(FilePayload::encode(filename, mime_type, bytes)))
    }

    fn handle_react(
        &mut self,
        message_id: MessageId,
        emoji: String,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let target = self.connected_channel()?;
        if emoji.trim().is_empty() {
            return Err(SessionError::EmptyPayload);
        }

        let reaction = Reaction::new(emoji, self.local_peer_id()?);
        if !self.log.add_reaction(&message_id, reaction.clone()) {
            tracing::debug!(%message_id, "reaction to unknown message ignored");
            return Ok(Vec::new());
        }

        let mut actions: Vec<_> = self.persist_log().into_iter().collect();
        let frame = Frame::from(ControlFrame::Reaction { message_id, reaction });
        self.send_frame(target, &frame, &mut actions);
        Ok(actions)
    }

    fn send_status(&mut self, typing: bool) -> Vec<SessionAction> {
        let Ok(target) = self.connected_channel() else {
            tracing::trace!(typing, "typing signal suppressed without session");
            return Vec::new();
        };

        let mut actions = Vec::new();
        self.send_frame(target, &Frame::from(ControlFrame::Status { typing }), &mut actions);
        actions
    }

    fn handle_keystroke(&mut self, now: E::Instant) -> Vec<SessionAction> {
        if self.connected_channel().is_err() {
            return Vec::new();
        }

        match self.typing.keystroke(now) {
            Some(signal) => self.send_status(signal.is_typing()),
            None => Vec::new(),
        }
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<SessionAction> {
        match self.typing.poll(now) {
            Some(TypingSignal::Stopped) => self.send_status(false),
            _ => Vec::new(),
        }
    }

    fn handle_endpoint_open(&mut self, id: &PeerId) -> Vec<SessionAction> {
        let Some(identity) = self.identity.as_ref().filter(|i| &i.id == id) else {
            tracing::warn!(peer = %id, "endpoint opened for stale identity");
            return Vec::new();
        };

        let persist = identity.is_durable().then(|| SessionAction::Persist {
            key: IDENTITY_STORAGE_KEY,
            value: id.as_str().to_owned(),
        });

        self.endpoint_live = true;
        self.recovering = false;
        self.last_error = None;

        if matches!(self.lifecycle.state(), SessionState::Initializing | SessionState::Errored) {
            self.enter(SessionState::Ready);
        }

        tracing::info!(peer = %id, state = ?self.lifecycle.state(), "endpoint live");
        persist.into_iter().collect()
    }

    fn handle_endpoint_error(&mut self, kind: EndpointErrorKind) -> Vec<SessionAction> {
        match kind {
            EndpointErrorKind::IdTaken => {
                let Some(identity) = &self.identity else {
                    return Vec::new();
                };
                let id = identity.id.clone();

                // Stay in Initializing so the user can pick another id.
                self.endpoint_live = false;
                self.set_error(SessionError::IdentityCollision { id });
                vec![SessionAction::DestroyEndpoint]
            },
            EndpointErrorKind::PeerUnavailable { peer } => {
                let mut actions = Vec::new();
                if self.pending.as_ref().is_some_and(|p| p.remote == peer) {
                    if let Some(channel) = self.pending.take().and_then(|p| p.channel) {
                        actions.push(SessionAction::CloseChannel { remote: peer.clone(), channel });
                    }
                    self.enter(SessionState::Errored);
                }
                self.set_error(SessionError::PeerUnavailable { peer });
                actions
            },
            EndpointErrorKind::Network(reason) => {
                if self.identity.is_none() {
                    return Vec::new();
                }

                self.endpoint_live = false;
                self.recovering = true;
                if self.lifecycle.state() == SessionState::Initializing {
                    self.enter(SessionState::Errored);
                }
                self.set_error(SessionError::TransportError(reason));
                vec![SessionAction::ReconnectEndpoint]
            },
        }
    }

    fn handle_endpoint_disconnected(&mut self) -> Vec<SessionAction> {
        if self.identity.is_none() {
            return Vec::new();
        }

        tracing::info!(state = ?self.lifecycle.state(), "broker connection lost, reconnecting");
        self.recovering = true;
        self.set_error(SessionError::TransportError("disconnected from broker".to_string()));
        vec![SessionAction::ReconnectEndpoint]
    }

    fn handle_channel_requested(
        &mut self,
        remote: PeerId,
        channel: ChannelId,
    ) -> Vec<SessionAction> {
        match self.pending.as_mut() {
            Some(pending) if pending.remote == remote && pending.channel.is_none() => {
                tracing::debug!(peer = %remote, %channel, "channel requested");
                pending.channel = Some(channel);
                Vec::new()
            },
            _ => {
                tracing::debug!(peer = %remote, %channel, "closing superseded outbound channel");
                vec![SessionAction::CloseChannel { remote, channel }]
            },
        }
    }

    fn handle_connect_failed(&mut self, remote: &PeerId, reason: String) -> Vec<SessionAction> {
        let unanswered =
            self.pending.as_ref().is_some_and(|p| &p.remote == remote && p.channel.is_none());
        if !unanswered {
            return Vec::new();
        }

        self.pending = None;
        self.enter(SessionState::Errored);
        self.set_error(SessionError::TransportError(reason));
        Vec::new()
    }

    fn handle_incoming(&mut self, remote: PeerId, channel: ChannelId) -> Vec<SessionAction> {
        if !self.endpoint_live {
            tracing::warn!(peer = %remote, %channel, "rejecting connection, endpoint not live");
            return vec![SessionAction::CloseChannel { remote, channel }];
        }

        // One channel at a time: whatever was open or negotiating, even to
        // the same remote, is closed before the newcomer is accepted.
        let actions = self.teardown_channel();
        tracing::info!(peer = %remote, %channel, "incoming connection");
        self.pending = Some(PendingChannel { remote, channel: Some(channel) });
        self.enter(SessionState::Connecting);
        actions
    }

    fn handle_channel_open(&mut self, remote: PeerId, channel: ChannelId) -> Vec<SessionAction> {
        let expected = self
            .pending
            .as_ref()
            .is_some_and(|p| p.remote == remote && p.channel == Some(channel));
        if !expected {
            tracing::warn!(peer = %remote, %channel, "unexpected channel open");
            return Vec::new();
        }

        self.pending = None;
        self.channel = Some(channel);
        self.peer = Some(PeerSession::new(remote, self.env.wall_clock_millis()));
        self.typing.reset();
        self.last_error = None;
        self.enter(SessionState::Connected);

        if let Some(peer) = &self.peer {
            tracing::info!(peer = %peer.remote(), %channel, "connected");
        }
        Vec::new()
    }

    fn handle_channel_closed(&mut self, remote: &PeerId, channel: ChannelId) -> Vec<SessionAction> {
        if !self.release_channel(channel) {
            tracing::debug!(peer = %remote, %channel, "close for stale channel ignored");
            return Vec::new();
        }

        self.enter(SessionState::Closed);
        tracing::info!(peer = %remote, %channel, "session closed by peer");
        Vec::new()
    }

    fn handle_channel_error(
        &mut self,
        remote: PeerId,
        channel: ChannelId,
        reason: String,
    ) -> Vec<SessionAction> {
        if !self.release_channel(channel) {
            tracing::debug!(peer = %remote, %channel, "error for stale channel ignored");
            return Vec::new();
        }

        self.enter(SessionState::Errored);
        self.set_error(SessionError::TransportError(reason));
        vec![SessionAction::CloseChannel { remote, channel }]
    }

    fn handle_frame(
        &mut self,
        remote: &PeerId,
        channel: ChannelId,
        bytes: &[u8],
    ) -> Vec<SessionAction> {
        let target = match self.connected_channel() {
            Ok(target) if target.1 == channel && &target.0 == remote => target,
            _ => {
                tracing::warn!(peer = %remote, %channel, "dropping frame from stale channel");
                return Vec::new();
            },
        };

        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(error) if error.is_unsupported() => {
                tracing::debug!(peer = %remote, %error, "ignoring frame of unsupported type");
                return Vec::new();
            },
            Err(error) => {
                tracing::warn!(peer = %remote, %error, "dropping malformed frame");
                return Vec::new();
            },
        };

        let now = self.env.wall_clock_millis();
        match frame {
            Frame::Control(control) => self.apply_control(control, now),
            Frame::Message(message) => self.receive_message(target, message, now),
        }
    }

    fn apply_control(&mut self, control: ControlFrame, now: u64) -> Vec<SessionAction> {
        match control {
            ControlFrame::Status { typing } => {
                if let Some(peer) = self.peer.as_mut() {
                    peer.set_typing(typing, now);
                }
                Vec::new()
            },
            ControlFrame::Read { message_id } => {
                if self.log.mark_read(&message_id) {
                    self.persist_log().into_iter().collect()
                } else {
                    tracing::debug!(%message_id, "read receipt changed nothing");
                    Vec::new()
                }
            },
            ControlFrame::Reaction { message_id, reaction } => {
                if self.log.add_reaction(&message_id, reaction) {
                    self.persist_log().into_iter().collect()
                } else {
                    tracing::debug!(%message_id, "reaction to unknown message ignored");
                    Vec::new()
                }
            },
        }
    }

    fn receive_message(
        &mut self,
        target: (PeerId, ChannelId),
        message: Message,
        now: u64,
    ) -> Vec<SessionAction> {
        if let Some(peer) = self.peer.as_mut() {
            peer.touch(now);
        }

        let message_id = message.id.clone();
        let kind = message.kind().as_str();
        tracing::debug!(peer = %target.0, %message_id, kind, "received message");

        let mut actions = Vec::new();
        if self.log.push(message) {
            actions.extend(self.persist_log());
        }

        self.send_frame(target, &Frame::from(ControlFrame::Read { message_id }), &mut actions);
        actions
    }
}
