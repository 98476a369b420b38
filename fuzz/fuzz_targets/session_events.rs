//! Fuzz target for SessionManager event handling
//!
//! # Strategy
//!
//! Arbitrary interleavings of user intents and transport callbacks, including
//! callbacks for stale identities and channels, and garbage frames.
//!
//! # Invariants
//!
//! - `handle` never panics
//! - Message ids in the log stay unique
//! - The log only grows until history is cleared
//! - Sends are only emitted on the open channel, towards its remote
//! - A message appended locally while not connected is impossible

#![no_main]

use std::{collections::HashSet, time::Duration};

use arbitrary::Arbitrary;
use chitchat_client::{
    ChannelId, EndpointErrorKind, SessionAction, SessionConfig, SessionEvent, SessionManager,
    SessionState,
};
use chitchat_core::env::Environment;
use chitchat_harness::SimEnv;
use chitchat_proto::{ControlFrame, Frame, Message, MessageBody, MessageId, PeerId, Reaction};
use libfuzzer_sys::fuzz_target;

const NAMES: [&str; 4] = ["alice", "bob", "carol", "x"];

#[derive(Debug, Arbitrary)]
struct Scenario {
    seed: u64,
    steps: Vec<Step>,
}

#[derive(Debug, Arbitrary)]
enum Step {
    Ephemeral,
    Durable(u8),
    Connect(u8),
    Hangup,
    Text(String),
    Code(String),
    File { len: u16, too_large: bool },
    React { index: u8, emoji: String },
    Keystroke,
    Advance(u16),
    Clear,
    Dismiss,
    EndpointOpen(u8),
    IdTaken,
    Unavailable(u8),
    Network,
    Disconnected,
    Requested(u8, u8),
    ConnectFailed(u8),
    Incoming(u8, u8),
    ChannelOpen(u8, u8),
    ChannelClosed(u8, u8),
    ChannelError(u8, u8),
    Inbound { from: u8, channel: u8, kind: Inbound },
    SendFailed,
}

#[derive(Debug, Arbitrary)]
enum Inbound {
    Message { id: u8, text: String },
    Read(u8),
    Reaction(u8),
    Status(bool),
    Garbage(Vec<u8>),
}

fn name(index: u8) -> PeerId {
    PeerId::from(NAMES[usize::from(index) % NAMES.len()])
}

fn channel(index: u8) -> ChannelId {
    ChannelId::new(u64::from(index % 4))
}

fn inbound_bytes(remote: &PeerId, inbound: Inbound, log: &[Message]) -> Vec<u8> {
    let pick = |index: u8| {
        log.get(usize::from(index) % log.len().max(1))
            .map_or_else(|| MessageId::from("missing"), |m| m.id.clone())
    };

    let frame = match inbound {
        Inbound::Garbage(bytes) => return bytes,
        Inbound::Message { id, text } => Frame::from(Message::new(
            MessageId::new(format!("in-{id}")),
            remote.clone(),
            0,
            MessageBody::Text { content: text },
        )),
        Inbound::Read(index) => Frame::from(ControlFrame::Read { message_id: pick(index) }),
        Inbound::Reaction(index) => Frame::from(ControlFrame::Reaction {
            message_id: pick(index),
            reaction: Reaction::new("+1", remote.clone()),
        }),
        Inbound::Status(typing) => Frame::from(ControlFrame::Status { typing }),
    };
    frame.encode().unwrap_or_default()
}

fuzz_target!(|scenario: Scenario| {
    let env = SimEnv::with_seed(scenario.seed);
    let mut manager = SessionManager::new(env.clone(), SessionConfig::default());
    let mut previous_len = 0;

    for step in scenario.steps {
        let was_connected = manager.state() == SessionState::Connected;
        let mut clears = false;

        let event = match step {
            Step::Ephemeral => SessionEvent::UseEphemeralIdentity,
            Step::Durable(i) => SessionEvent::UseDurableIdentity { id: name(i).to_string() },
            Step::Connect(i) => SessionEvent::ConnectTo { remote: name(i).to_string() },
            Step::Hangup => SessionEvent::Hangup,
            Step::Text(content) => SessionEvent::SendText { content },
            Step::Code(content) => SessionEvent::SendCode { content, language: None },
            Step::File { len, too_large } => {
                let size = if too_large { 5 * 1024 * 1024 + 1 } else { usize::from(len) };
                SessionEvent::SendFile {
                    filename: "f.bin".to_string(),
                    mime_type: String::new(),
                    bytes: vec![0; size],
                }
            },
            Step::React { index, emoji } => {
                let messages = manager.log().messages();
                let message_id = messages
                    .get(usize::from(index) % messages.len().max(1))
                    .map_or_else(|| MessageId::from("missing"), |m| m.id.clone());
                SessionEvent::React { message_id, emoji }
            },
            Step::Keystroke => SessionEvent::Keystroke { now: env.now() },
            Step::Advance(millis) => {
                env.advance(Duration::from_millis(u64::from(millis)));
                SessionEvent::Tick { now: env.now() }
            },
            Step::Clear => {
                clears = true;
                SessionEvent::ClearHistory
            },
            Step::Dismiss => SessionEvent::DismissError,
            Step::EndpointOpen(i) => SessionEvent::EndpointOpen { id: name(i) },
            Step::IdTaken => SessionEvent::EndpointError { kind: EndpointErrorKind::IdTaken },
            Step::Unavailable(i) => {
                SessionEvent::EndpointError { kind: EndpointErrorKind::PeerUnavailable { peer: name(i) } }
            },
            Step::Network => SessionEvent::EndpointError {
                kind: EndpointErrorKind::Network("fuzz".to_string()),
            },
            Step::Disconnected => SessionEvent::EndpointDisconnected,
            Step::Requested(i, c) => {
                SessionEvent::ChannelRequested { remote: name(i), channel: channel(c) }
            },
            Step::ConnectFailed(i) => {
                SessionEvent::ConnectFailed { remote: name(i), reason: "fuzz".to_string() }
            },
            Step::Incoming(i, c) => {
                SessionEvent::IncomingConnection { remote: name(i), channel: channel(c) }
            },
            Step::ChannelOpen(i, c) => {
                SessionEvent::ChannelOpen { remote: name(i), channel: channel(c) }
            },
            Step::ChannelClosed(i, c) => {
                SessionEvent::ChannelClosed { remote: name(i), channel: channel(c) }
            },
            Step::ChannelError(i, c) => SessionEvent::ChannelError {
                remote: name(i),
                channel: channel(c),
                reason: "fuzz".to_string(),
            },
            Step::Inbound { from, channel: c, kind } => {
                let remote = name(from);
                let bytes = inbound_bytes(&remote, kind, manager.log().messages());
                SessionEvent::FrameReceived { remote, channel: channel(c), bytes }
            },
            Step::SendFailed => SessionEvent::SendFailed { reason: "fuzz".to_string() },
        };

        let actions = manager.handle(event);
        let len = manager.log().len();

        if clears {
            assert_eq!(len, 0);
        } else {
            assert!(len >= previous_len, "log shrank from {previous_len} to {len}");
        }
        if len > previous_len {
            assert!(was_connected, "log grew without a connected session");
        }
        previous_len = len;

        let ids: HashSet<_> = manager.log().iter().map(|m| &m.id).collect();
        assert_eq!(ids.len(), len, "duplicate message id");

        for action in &actions {
            if let SessionAction::Send { remote, .. } = action {
                assert_eq!(manager.state(), SessionState::Connected);
                let peer = manager.peer().expect("send needs a peer");
                assert!(peer.is_online());
                assert_eq!(peer.remote(), remote);
            }
        }
    }
});
