//! Two-peer scenarios over the simulated broker.
//!
//! Each test wires two runtimes to one `SimNetwork` and drives them through
//! the public runtime API, checking what each side ends up seeing.

use std::time::Duration;

use chitchat_client::{SessionError, SessionState};
use chitchat_core::{
    IdentityMode, SessionConfig,
    config::{IDENTITY_STORAGE_KEY, MESSAGES_STORAGE_KEY},
};
use chitchat_harness::{SimEnv, SimNetwork, SimRuntime, settle, sim_runtime};
use chitchat_proto::{ControlFrame, Frame, MessageBody, PeerId, Reaction};
use chitchat_store::{ChaoticStore, KeyValueStore, MemoryStore, RedbStore};

fn pair<S: KeyValueStore>(
    network: &SimNetwork,
    env: &SimEnv,
    alice_store: S,
    bob_store: S,
) -> (SimRuntime<S>, SimRuntime<S>) {
    let mut alice = sim_runtime(network, env, alice_store, SessionConfig::default());
    let mut bob = sim_runtime(network, env, bob_store, SessionConfig::default());

    alice.use_durable_identity("alice");
    bob.use_durable_identity("bobby");
    settle(&mut [&mut alice, &mut bob]);

    assert_eq!(alice.snapshot().state, SessionState::Ready);
    assert_eq!(bob.snapshot().state, SessionState::Ready);
    (alice, bob)
}

fn connected_pair(network: &SimNetwork, env: &SimEnv) -> (SimRuntime, SimRuntime) {
    let (mut alice, mut bob) = pair(network, env, MemoryStore::new(), MemoryStore::new());
    alice.connect("bobby");
    settle(&mut [&mut alice, &mut bob]);

    assert_eq!(alice.snapshot().state, SessionState::Connected);
    assert_eq!(bob.snapshot().state, SessionState::Connected);
    (alice, bob)
}

fn status_frames(network: &SimNetwork, from: &str, to: &str) -> Vec<bool> {
    network
        .frames_between(&PeerId::from(from), &PeerId::from(to))
        .iter()
        .filter_map(|bytes| match Frame::decode(bytes) {
            Ok(Frame::Control(ControlFrame::Status { typing })) => Some(typing),
            _ => None,
        })
        .collect()
}

#[test]
fn conversation_with_read_receipts_and_reactions() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = connected_pair(&network, &env);

    alice.send_text("hi bob");
    settle(&mut [&mut alice, &mut bob]);

    let sent = alice.snapshot().messages;
    let received = bob.snapshot().messages;
    assert_eq!(sent.len(), 1);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id, sent[0].id);
    assert_eq!(received[0].sender, PeerId::from("alice"));
    assert!(sent[0].is_read(), "bob's receipt marks alice's copy");

    bob.react(&sent[0].id, "👍");
    bob.send_code("fn main() {}", Some("rust"));
    settle(&mut [&mut alice, &mut bob]);

    let alice_view = alice.snapshot().messages;
    assert_eq!(alice_view.len(), 2);
    assert_eq!(alice_view[0].reactions, [Reaction::new("👍", PeerId::from("bobby"))]);
    assert_eq!(alice_view[1].body, MessageBody::Code {
        content: "fn main() {}".to_string(),
        language: "rust".to_string()
    });
    assert!(bob.snapshot().messages[1].is_read());
}

#[test]
fn lifecycle_trace_of_a_short_session() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let mut alice = sim_runtime(&network, &env, MemoryStore::new(), SessionConfig::default());
    let mut bob = sim_runtime(&network, &env, MemoryStore::new(), SessionConfig::default());
    bob.use_durable_identity("bobby");

    let mut states = Vec::new();
    alice.use_durable_identity("alice");
    states.push(alice.snapshot().state);
    settle(&mut [&mut alice, &mut bob]);
    states.push(alice.snapshot().state);
    alice.connect("bobby");
    states.push(alice.snapshot().state);
    settle(&mut [&mut alice, &mut bob]);
    states.push(alice.snapshot().state);
    bob.hangup();
    settle(&mut [&mut alice, &mut bob]);
    states.push(alice.snapshot().state);

    insta::assert_debug_snapshot!(states, @r"
    [
        Initializing,
        Ready,
        Connecting,
        Connected,
        Closed,
    ]
    ");
}

#[test]
fn identity_switch_ends_the_session_for_both_sides() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = connected_pair(&network, &env);

    alice.use_ephemeral_identity();
    settle(&mut [&mut alice, &mut bob]);

    let snapshot = alice.snapshot();
    let identity = snapshot.local_identity.unwrap();
    assert_eq!(identity.mode, IdentityMode::Ephemeral);
    assert_eq!(snapshot.state, SessionState::Ready);
    assert!(!snapshot.peer.unwrap().is_online());

    assert_eq!(bob.snapshot().state, SessionState::Closed);
    assert!(!network.is_registered(&PeerId::from("alice")));
    assert!(network.is_registered(&identity.id));
    assert!(!network.has_channel(&PeerId::from("bobby"), &PeerId::from("alice")));

    // Nothing sent on the old session reaches the log.
    bob.send_text("hello?");
    settle(&mut [&mut alice, &mut bob]);
    assert!(alice.snapshot().messages.is_empty());
    assert_eq!(bob.snapshot().last_error, Some(SessionError::NotConnected));
}

#[tokio::test]
async fn typing_burst_produces_one_stop_after_idle_window() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = connected_pair(&network, &env);

    for _ in 0..5 {
        alice.keystroke();
        alice.run_for(Duration::from_millis(200), Duration::from_millis(50)).await;
    }
    settle(&mut [&mut alice, &mut bob]);
    assert!(bob.snapshot().peer.unwrap().is_typing());
    assert_eq!(status_frames(&network, "alice", "bobby"), [true]);

    alice.run_for(Duration::from_secs(2), Duration::from_millis(50)).await;
    settle(&mut [&mut alice, &mut bob]);

    assert_eq!(status_frames(&network, "alice", "bobby"), [true, false]);
    assert!(!bob.snapshot().peer.unwrap().is_typing());
}

#[test]
fn oversized_file_never_reaches_the_wire() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = connected_pair(&network, &env);
    let before = network.sent_frames().len();

    alice.send_file("movie.mkv", "video/x-matroska", vec![0u8; 6 * 1024 * 1024]);
    settle(&mut [&mut alice, &mut bob]);

    assert_eq!(network.sent_frames().len(), before);
    assert!(alice.snapshot().messages.is_empty());
    assert!(matches!(alice.snapshot().last_error, Some(SessionError::FileTooLarge { .. })));
}

#[test]
fn small_file_arrives_intact() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = connected_pair(&network, &env);
    let bytes: Vec<u8> = (0..=255).collect();

    alice.send_file("table.bin", "application/octet-stream", bytes.clone());
    settle(&mut [&mut alice, &mut bob]);

    let received = bob.snapshot().messages;
    let MessageBody::File(payload) = &received[0].body else {
        panic!("expected file message, got {:?}", received[0].body);
    };
    assert_eq!(payload.filename, "table.bin");
    assert_eq!(payload.size, 256);
    assert_eq!(payload.decode_bytes().unwrap(), bytes);
}

#[test]
fn history_and_identity_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let alice_path = dir.path().join("alice.redb");
    let bob_path = dir.path().join("bob.redb");

    {
        let network = SimNetwork::new();
        let env = SimEnv::new();
        let (mut alice, mut bob) = pair(
            &network,
            &env,
            RedbStore::open(&alice_path).unwrap(),
            RedbStore::open(&bob_path).unwrap(),
        );
        alice.connect("bobby");
        settle(&mut [&mut alice, &mut bob]);
        alice.send_text("remember me");
        bob.send_text("noted");
        settle(&mut [&mut alice, &mut bob]);

        assert_eq!(
            alice.store().get(IDENTITY_STORAGE_KEY).unwrap().as_deref(),
            Some("alice")
        );
    }

    let network = SimNetwork::new();
    let env = SimEnv::new();
    let mut alice = sim_runtime(
        &network,
        &env,
        RedbStore::open(&alice_path).unwrap(),
        SessionConfig::default(),
    );
    alice.start();
    settle(&mut [&mut alice]);

    let snapshot = alice.snapshot();
    assert_eq!(snapshot.state, SessionState::Ready);
    assert_eq!(snapshot.local_identity.unwrap().id, PeerId::from("alice"));

    let contents: Vec<_> =
        snapshot.messages.iter().map(|m| m.body.content().to_string()).collect();
    assert_eq!(contents, ["remember me", "noted"]);
    assert!(snapshot.messages[0].is_read());
}

#[test]
fn fresh_start_uses_ephemeral_identity() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let mut alice = sim_runtime(&network, &env, MemoryStore::new(), SessionConfig::default());

    alice.start();
    settle(&mut [&mut alice]);

    let snapshot = alice.snapshot();
    assert_eq!(snapshot.state, SessionState::Ready);
    let identity = snapshot.local_identity.unwrap();
    assert_eq!(identity.mode, IdentityMode::Ephemeral);
    assert!(network.is_registered(&identity.id));
    assert_eq!(alice.store().get(IDENTITY_STORAGE_KEY).unwrap(), None);
}

#[test]
fn clear_history_empties_store() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = connected_pair(&network, &env);
    alice.send_text("temporary");
    settle(&mut [&mut alice, &mut bob]);
    assert!(alice.store().get(MESSAGES_STORAGE_KEY).unwrap().is_some());

    alice.clear_history();

    assert!(alice.snapshot().messages.is_empty());
    assert_eq!(alice.store().get(MESSAGES_STORAGE_KEY).unwrap(), None);
    assert_eq!(bob.snapshot().messages.len(), 1);
}

#[test]
fn identity_collision_is_reported_and_recoverable() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = pair(&network, &env, MemoryStore::new(), MemoryStore::new());

    bob.use_durable_identity("alice");
    settle(&mut [&mut alice, &mut bob]);

    let snapshot = bob.snapshot();
    assert_eq!(snapshot.state, SessionState::Initializing);
    assert_eq!(
        snapshot.last_error.map(|e| e.user_message()).as_deref(),
        Some("This ID is already taken. Please choose another one.")
    );
    assert_eq!(alice.snapshot().state, SessionState::Ready);

    bob.use_durable_identity("robert");
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(bob.snapshot().state, SessionState::Ready);
    assert!(network.is_registered(&PeerId::from("robert")));
}

#[test]
fn unknown_remote_is_unavailable() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = pair(&network, &env, MemoryStore::new(), MemoryStore::new());

    alice.connect("nobody");
    settle(&mut [&mut alice, &mut bob]);

    let snapshot = alice.snapshot();
    assert_eq!(snapshot.state, SessionState::Errored);
    assert_eq!(
        snapshot.last_error,
        Some(SessionError::PeerUnavailable { peer: PeerId::from("nobody") })
    );
}

#[test]
fn broker_outage_keeps_channel_and_recovers() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = connected_pair(&network, &env);

    network.take_broker_down();
    settle(&mut [&mut alice, &mut bob]);

    let snapshot = alice.snapshot();
    assert!(snapshot.recovering);
    assert_eq!(snapshot.state, SessionState::Connected);
    assert!(matches!(snapshot.last_error, Some(SessionError::TransportError(_))));

    alice.send_text("during outage");
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(bob.snapshot().messages.len(), 1);

    network.restore_broker();
    settle(&mut [&mut alice, &mut bob]);

    for runtime in [&alice, &bob] {
        let snapshot = runtime.snapshot();
        assert!(!snapshot.recovering);
        assert!(snapshot.endpoint_live);
        assert_eq!(snapshot.last_error, None);
        assert_eq!(snapshot.state, SessionState::Connected);
    }
}

#[test]
fn failed_send_keeps_local_copy() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = connected_pair(&network, &env);

    network.fail_sends_from(&PeerId::from("alice"), true);
    alice.send_text("lost in transit");
    settle(&mut [&mut alice, &mut bob]);

    let snapshot = alice.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert!(!snapshot.messages[0].is_read());
    assert!(matches!(snapshot.last_error, Some(SessionError::SendFailure(_))));
    assert!(bob.snapshot().messages.is_empty());

    network.fail_sends_from(&PeerId::from("alice"), false);
    alice.dismiss_error();
    alice.send_text("second try");
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(bob.snapshot().messages.len(), 1);
    assert_eq!(alice.snapshot().messages.len(), 2);
}

#[test]
fn broken_channel_errors_both_sides() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = connected_pair(&network, &env);

    network.break_channel(&PeerId::from("alice"), &PeerId::from("bobby"), "ice failed");
    settle(&mut [&mut alice, &mut bob]);

    for runtime in [&alice, &bob] {
        let snapshot = runtime.snapshot();
        assert_eq!(snapshot.state, SessionState::Errored);
        assert_eq!(snapshot.last_error, Some(SessionError::TransportError("ice failed".into())));
        assert!(!snapshot.peer.unwrap().is_online());
    }

    // Manual retry from either side works.
    bob.connect("alice");
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(alice.snapshot().state, SessionState::Connected);
    assert_eq!(bob.snapshot().state, SessionState::Connected);
}

#[test]
fn failing_storage_never_disturbs_the_session() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let alice_store = ChaoticStore::new(MemoryStore::new(), 1.0);
    let (mut alice, mut bob) =
        pair(&network, &env, alice_store.clone(), ChaoticStore::new(MemoryStore::new(), 1.0));

    alice.connect("bobby");
    settle(&mut [&mut alice, &mut bob]);
    alice.send_text("nothing persists");
    bob.send_text("but we still talk");
    settle(&mut [&mut alice, &mut bob]);

    assert_eq!(alice.snapshot().messages.len(), 2);
    assert_eq!(bob.snapshot().messages.len(), 2);
    assert_eq!(alice.snapshot().last_error, None);
    assert!(alice_store.injected_failures() > 0);
    assert!(alice_store.inner().is_empty());
}

#[test]
fn incoming_connection_replaces_current_session() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = connected_pair(&network, &env);
    let mut carol = sim_runtime(&network, &env, MemoryStore::new(), SessionConfig::default());
    carol.use_durable_identity("carol");
    settle(&mut [&mut alice, &mut bob, &mut carol]);

    carol.connect("alice");
    settle(&mut [&mut alice, &mut bob, &mut carol]);

    assert_eq!(alice.snapshot().peer.unwrap().remote(), &PeerId::from("carol"));
    assert_eq!(alice.snapshot().state, SessionState::Connected);
    assert_eq!(carol.snapshot().state, SessionState::Connected);
    assert_eq!(bob.snapshot().state, SessionState::Closed);
}

#[test]
fn redial_to_same_remote_leaves_one_channel() {
    let network = SimNetwork::new();
    let env = SimEnv::new();
    let (mut alice, mut bob) = connected_pair(&network, &env);

    // Each side dials the peer it is already connected to.
    bob.connect("alice");
    settle(&mut [&mut alice, &mut bob]);
    assert_one_session(&network, &alice, &bob);

    alice.connect("bobby");
    settle(&mut [&mut alice, &mut bob]);
    assert_one_session(&network, &alice, &bob);

    alice.send_text("still one session");
    bob.send_text("agreed");
    settle(&mut [&mut alice, &mut bob]);

    assert_eq!(alice.snapshot().messages.len(), 2);
    assert_eq!(bob.snapshot().messages.len(), 2);
    assert_eq!(alice.snapshot().last_error, None);
    assert_eq!(bob.snapshot().last_error, None);
}

fn assert_one_session(network: &SimNetwork, alice: &SimRuntime, bob: &SimRuntime) {
    let (alice_id, bob_id) = (PeerId::from("alice"), PeerId::from("bobby"));
    assert_eq!(alice.snapshot().state, SessionState::Connected);
    assert_eq!(bob.snapshot().state, SessionState::Connected);
    assert_eq!(network.open_channels(&alice_id, &bob_id), 1);
    assert_eq!(network.open_channels(&bob_id, &alice_id), 1);
}
