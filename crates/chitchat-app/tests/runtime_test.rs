//! Runtime integration tests.
//!
//! A scripted transport records every call so action execution and failure
//! feedback can be checked without a second peer.

use std::collections::VecDeque;

use chitchat_app::{Runtime, Transport, TransportError, TransportEvent};
use chitchat_client::{ChannelId, EndpointErrorKind, IdentityMode, SessionError, SessionState};
use chitchat_core::{
    EndpointConfig, SessionConfig,
    config::{IDENTITY_STORAGE_KEY, MESSAGES_STORAGE_KEY},
};
use chitchat_harness::SimEnv;
use chitchat_proto::PeerId;
use chitchat_store::{ChaoticStore, KeyValueStore, MemoryStore};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Create(PeerId),
    Destroy,
    Reconnect,
    Connect(PeerId),
    Close(ChannelId),
    Send(ChannelId),
}

/// Transport that accepts everything and echoes scripted events.
#[derive(Default)]
struct ScriptedTransport {
    calls: Vec<Call>,
    events: VecDeque<TransportEvent>,
    next_channel: u64,
    fail_create: bool,
    fail_send: bool,
    refuse_connect: bool,
    auto_open: bool,
}

impl ScriptedTransport {
    fn auto_open() -> Self {
        Self { auto_open: true, ..Self::default() }
    }
}

impl Transport for ScriptedTransport {
    fn create_endpoint(
        &mut self,
        id: &PeerId,
        _config: &EndpointConfig,
    ) -> Result<(), TransportError> {
        self.calls.push(Call::Create(id.clone()));
        if self.fail_create {
            return Err(TransportError::Network("broker refused".to_string()));
        }
        if self.auto_open {
            self.events.push_back(TransportEvent::EndpointOpen { id: id.clone() });
        }
        Ok(())
    }

    fn destroy_endpoint(&mut self) {
        self.calls.push(Call::Destroy);
    }

    fn reconnect_endpoint(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::Reconnect);
        Err(TransportError::NoEndpoint)
    }

    fn connect(&mut self, remote: &PeerId) -> Result<ChannelId, TransportError> {
        self.calls.push(Call::Connect(remote.clone()));
        if self.refuse_connect {
            return Err(TransportError::NoEndpoint);
        }
        self.next_channel += 1;
        let channel = ChannelId::new(self.next_channel);
        self.events.push_back(TransportEvent::ChannelOpen { remote: remote.clone(), channel });
        Ok(channel)
    }

    fn close(&mut self, channel: ChannelId) {
        self.calls.push(Call::Close(channel));
    }

    fn send(&mut self, channel: ChannelId, _bytes: Vec<u8>) -> Result<(), TransportError> {
        self.calls.push(Call::Send(channel));
        if self.fail_send {
            return Err(TransportError::ChannelClosed(channel));
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }
}

type TestRuntime<S = MemoryStore> = Runtime<ScriptedTransport, S, SimEnv>;

fn runtime<S: KeyValueStore>(store: S) -> TestRuntime<S> {
    Runtime::new(ScriptedTransport::auto_open(), store, SimEnv::new(), SessionConfig::default())
}

#[test]
fn start_reuses_stored_durable_identity() {
    let store = MemoryStore::new();
    store.set(IDENTITY_STORAGE_KEY, "alice").unwrap();
    let mut runtime = runtime(store);

    runtime.start();
    runtime.pump();

    let snapshot = runtime.snapshot();
    assert_eq!(snapshot.state, SessionState::Ready);
    let identity = snapshot.local_identity.unwrap();
    assert_eq!(identity.id, PeerId::from("alice"));
    assert_eq!(identity.mode, IdentityMode::Durable);
    assert_eq!(runtime.transport().calls, [Call::Destroy, Call::Create(PeerId::from("alice"))]);
}

#[test]
fn start_falls_back_to_ephemeral_for_invalid_stored_identity() {
    let store = MemoryStore::new();
    store.set(IDENTITY_STORAGE_KEY, "ab").unwrap();
    let mut runtime = runtime(store.clone());

    runtime.start();
    runtime.pump();

    let snapshot = runtime.snapshot();
    assert_eq!(snapshot.state, SessionState::Ready);
    assert_eq!(snapshot.local_identity.unwrap().mode, IdentityMode::Ephemeral);
    // The bad value is left alone; only durable identities are written.
    assert_eq!(store.get(IDENTITY_STORAGE_KEY).unwrap().as_deref(), Some("ab"));
}

#[test]
fn start_restores_log_and_tolerates_corruption() {
    let store = MemoryStore::new();
    store
        .set(
            MESSAGES_STORAGE_KEY,
            r#"[{"id":"m1","type":"text","content":"hi","sender":"bob","timestamp":5,"read":true}]"#,
        )
        .unwrap();
    let mut restored = runtime(store);
    restored.start();
    assert_eq!(restored.snapshot().messages.len(), 1);
    assert!(restored.snapshot().messages[0].is_read());

    let store = MemoryStore::new();
    store.set(MESSAGES_STORAGE_KEY, "{not json").unwrap();
    let mut corrupt = runtime(store);
    corrupt.start();
    corrupt.pump();
    assert!(corrupt.snapshot().messages.is_empty());
    assert_eq!(corrupt.snapshot().state, SessionState::Ready);
}

#[test]
fn unreadable_store_still_starts() {
    let store = ChaoticStore::new(MemoryStore::new(), 1.0);
    let mut runtime = runtime(store.clone());

    runtime.start();
    runtime.pump();

    assert_eq!(runtime.snapshot().state, SessionState::Ready);
    assert!(store.injected_failures() >= 2);
}

#[test]
fn endpoint_request_failure_becomes_session_error() {
    let transport = ScriptedTransport { fail_create: true, ..ScriptedTransport::default() };
    let mut runtime =
        Runtime::new(transport, MemoryStore::new(), SimEnv::new(), SessionConfig::default());

    runtime.use_durable_identity("alice");

    let snapshot = runtime.snapshot();
    assert_eq!(snapshot.state, SessionState::Errored);
    assert_eq!(
        snapshot.last_error,
        Some(SessionError::TransportError("network failure: broker refused".to_string()))
    );
    // Reconnect is refused by this transport; the refusal is only logged.
    assert_eq!(runtime.transport().calls.last(), Some(&Call::Reconnect));
}

#[test]
fn transport_send_failure_is_fed_back() {
    let mut runtime = runtime(MemoryStore::new());
    runtime.use_durable_identity("alice");
    runtime.pump();
    runtime.connect("bob");
    runtime.pump();
    assert_eq!(runtime.snapshot().state, SessionState::Connected);

    runtime.transport_mut().fail_send = true;
    runtime.send_text("hello");

    let snapshot = runtime.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(
        snapshot.last_error,
        Some(SessionError::SendFailure("channel ch#1 is closed".to_string()))
    );
    assert!(runtime.store().get(MESSAGES_STORAGE_KEY).unwrap().is_some());
}

#[test]
fn scripted_events_flow_through_pump() {
    let mut runtime = runtime(MemoryStore::new());
    runtime.use_durable_identity("alice");
    runtime.pump();

    runtime
        .transport_mut()
        .events
        .push_back(TransportEvent::EndpointError(EndpointErrorKind::PeerUnavailable {
            peer: PeerId::from("ghost"),
        }));
    runtime.transport_mut().events.push_back(TransportEvent::EndpointDisconnected);

    assert_eq!(runtime.pump(), 2);
    let snapshot = runtime.snapshot();
    assert!(snapshot.recovering);
    assert_eq!(snapshot.state, SessionState::Ready);
    assert!(matches!(snapshot.last_error, Some(SessionError::TransportError(_))));
}

#[test]
fn hangup_closes_through_transport() {
    let mut runtime = runtime(MemoryStore::new());
    runtime.use_durable_identity("alice");
    runtime.pump();
    runtime.connect("bob");
    runtime.pump();

    runtime.hangup();

    assert_eq!(runtime.transport().calls.last(), Some(&Call::Close(ChannelId::new(1))));
    assert_eq!(runtime.snapshot().state, SessionState::Closed);
}

#[test]
fn redial_closes_previous_channel_handle() {
    let mut runtime = runtime(MemoryStore::new());
    runtime.use_durable_identity("alice");
    runtime.pump();
    runtime.connect("bob");
    runtime.pump();

    runtime.connect("bob");
    runtime.pump();

    let calls = &runtime.transport().calls;
    let close = calls.iter().position(|c| c == &Call::Close(ChannelId::new(1)));
    let redial = calls.iter().rposition(|c| c == &Call::Connect(PeerId::from("bob")));
    assert!(close.is_some_and(|close| Some(close) < redial));
    assert_eq!(runtime.snapshot().state, SessionState::Connected);

    runtime.send_text("on the new channel");
    assert_eq!(runtime.transport().calls.last(), Some(&Call::Send(ChannelId::new(2))));
}

#[test]
fn connect_without_endpoint_is_errored() {
    let transport = ScriptedTransport { refuse_connect: true, ..ScriptedTransport::auto_open() };
    let mut runtime =
        Runtime::new(transport, MemoryStore::new(), SimEnv::new(), SessionConfig::default());
    runtime.use_durable_identity("alice");
    runtime.pump();

    runtime.connect("bob");

    let snapshot = runtime.snapshot();
    assert_eq!(snapshot.state, SessionState::Errored);
    assert_eq!(
        snapshot.last_error,
        Some(SessionError::TransportError("no local endpoint".to_string()))
    );
}

#[test]
fn file_read_failure_surfaces_in_error_slot() {
    let mut runtime = runtime(MemoryStore::new());

    runtime.file_read_failed("permission denied");

    assert_eq!(
        runtime.snapshot().last_error,
        Some(SessionError::FileReadError("permission denied".to_string()))
    );
    runtime.dismiss_error();
    assert_eq!(runtime.snapshot().last_error, None);
}
