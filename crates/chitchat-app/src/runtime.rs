//! Generic runtime for session orchestration.
//!
//! The Runtime drives one peer session, coordinating between:
//! - [`SessionManager`]: the pure session state machine
//! - [`Transport`]: broker and data channels
//! - [`KeyValueStore`]: message log and identity persistence
//!
//! Actions that fail synchronously are turned back into session events, so
//! every failure ends up in the session's error slot or in the log, never as
//! a returned error.

use std::{collections::VecDeque, time::Duration};

use chitchat_client::{
    EndpointErrorKind, SessionAction, SessionEvent, SessionManager, SessionSnapshot,
};
use chitchat_core::{
    SessionConfig, SessionState,
    config::{IDENTITY_STORAGE_KEY, MESSAGES_STORAGE_KEY},
    env::Environment,
};
use chitchat_proto::MessageId;
use chitchat_store::KeyValueStore;

use crate::Transport;

/// Generic runtime that orchestrates the session manager and collaborators.
///
/// # Type Parameters
///
/// - `T`: Peer transport
/// - `S`: Key-value store
/// - `E`: Environment for time and randomness
pub struct Runtime<T, S, E>
where
    T: Transport,
    S: KeyValueStore,
    E: Environment,
{
    env: E,
    transport: T,
    store: S,
    manager: SessionManager<E>,
}

impl<T, S, E> Runtime<T, S, E>
where
    T: Transport,
    S: KeyValueStore,
    E: Environment,
{
    /// Create a runtime. Nothing happens until [`Runtime::start`].
    pub fn new(transport: T, store: S, env: E, config: SessionConfig) -> Self {
        let manager = SessionManager::new(env.clone(), config);
        Self { env, transport, store, manager }
    }

    /// Reload persisted state and bring up an identity.
    ///
    /// A durable identity found in storage is reused; otherwise (or if the
    /// stored value no longer validates) an ephemeral one is generated.
    pub fn start(&mut self) {
        match self.store.get(MESSAGES_STORAGE_KEY) {
            Ok(Some(json)) => self.manager.restore_log(&json),
            Ok(None) => {},
            Err(error) => tracing::warn!(%error, "failed to load message log"),
        }

        let stored_id = match self.store.get(IDENTITY_STORAGE_KEY) {
            Ok(id) => id,
            Err(error) => {
                tracing::warn!(%error, "failed to load stored identity");
                None
            },
        };

        if let Some(id) = stored_id {
            self.dispatch(SessionEvent::UseDurableIdentity { id });
        }

        if self.manager.state() == SessionState::Idle {
            self.dispatch(SessionEvent::UseEphemeralIdentity);
        }
    }

    /// Switch to a fresh ephemeral identity.
    pub fn use_ephemeral_identity(&mut self) {
        self.dispatch(SessionEvent::UseEphemeralIdentity);
    }

    /// Switch to a user-chosen durable identity.
    pub fn use_durable_identity(&mut self, id: &str) {
        self.dispatch(SessionEvent::UseDurableIdentity { id: id.to_owned() });
    }

    /// Connect to a remote identity.
    pub fn connect(&mut self, remote: &str) {
        self.dispatch(SessionEvent::ConnectTo { remote: remote.to_owned() });
    }

    /// Close the current channel.
    pub fn hangup(&mut self) {
        self.dispatch(SessionEvent::Hangup);
    }

    /// Send a text message.
    pub fn send_text(&mut self, content: &str) {
        self.dispatch(SessionEvent::SendText { content: content.to_owned() });
    }

    /// Send a code snippet.
    pub fn send_code(&mut self, content: &str, language: Option<&str>) {
        self.dispatch(SessionEvent::SendCode {
            content: content.to_owned(),
            language: language.map(str::to_owned),
        });
    }

    /// Send a file that has already been read.
    pub fn send_file(&mut self, filename: &str, mime_type: &str, bytes: Vec<u8>) {
        self.dispatch(SessionEvent::SendFile {
            filename: filename.to_owned(),
            mime_type: mime_type.to_owned(),
            bytes,
        });
    }

    /// Report that reading a file failed.
    pub fn file_read_failed(&mut self, reason: &str) {
        self.dispatch(SessionEvent::FileReadFailed { reason: reason.to_owned() });
    }

    /// React to a message.
    pub fn react(&mut self, message_id: &MessageId, emoji: &str) {
        self.dispatch(SessionEvent::React {
            message_id: message_id.clone(),
            emoji: emoji.to_owned(),
        });
    }

    /// Record a keystroke in the composer.
    pub fn keystroke(&mut self) {
        let now = self.env.now();
        self.dispatch(SessionEvent::Keystroke { now });
    }

    /// Delete the message history.
    pub fn clear_history(&mut self) {
        self.dispatch(SessionEvent::ClearHistory);
    }

    /// Clear the error slot.
    pub fn dismiss_error(&mut self) {
        self.dispatch(SessionEvent::DismissError);
    }

    /// Drain queued transport events. Returns how many were processed.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Some(event) = self.transport.poll_event() {
            self.dispatch(event.into());
            processed += 1;
        }
        processed
    }

    /// Fire the typing-stop deadline if it has passed.
    pub fn tick(&mut self) {
        let now = self.env.now();
        self.dispatch(SessionEvent::Tick { now });
    }

    /// Pump events and fire deadlines until `duration` has elapsed.
    pub async fn run_for(&mut self, duration: Duration, poll_interval: Duration) {
        let env = self.env.clone();
        let deadline = env.now() + duration;

        loop {
            self.pump();
            self.tick();

            let now = env.now();
            if now >= deadline {
                break;
            }

            let wake = self.manager.typing_deadline().map_or(deadline, |d| d.min(deadline));
            let nap = if wake > now { (wake - now).min(poll_interval) } else { Duration::ZERO };
            env.sleep(nap.max(Duration::from_millis(1))).await;
        }
    }

    /// Copy of the view state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.manager.snapshot()
    }

    /// Session manager (read-only).
    pub fn manager(&self) -> &SessionManager<E> {
        &self.manager
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport (mutable, for fault injection in tests).
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Feed an event to the session manager and execute the resulting
    /// actions, including any follow-up events they produce.
    pub fn dispatch(&mut self, event: SessionEvent<E::Instant>) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            for action in self.manager.handle(event) {
                if let Some(feedback) = self.execute(action) {
                    pending.push_back(feedback);
                }
            }
        }
    }

    /// Execute one action. Returns an event when the session must learn the
    /// outcome: a channel handle, or a failure.
    fn execute(&mut self, action: SessionAction) -> Option<SessionEvent<E::Instant>> {
        match action {
            SessionAction::CreateEndpoint { id, config } => {
                match self.transport.create_endpoint(&id, &config) {
                    Ok(()) => None,
                    Err(error) => Some(SessionEvent::EndpointError {
                        kind: EndpointErrorKind::Network(error.to_string()),
                    }),
                }
            },
            SessionAction::DestroyEndpoint => {
                self.transport.destroy_endpoint();
                None
            },
            SessionAction::ReconnectEndpoint => {
                // The transport owns the retry policy; a refused request is only logged.
                if let Err(error) = self.transport.reconnect_endpoint() {
                    tracing::warn!(%error, "reconnect request refused");
                }
                None
            },
            SessionAction::OpenChannel { remote } => match self.transport.connect(&remote) {
                Ok(channel) => Some(SessionEvent::ChannelRequested { remote, channel }),
                Err(error) => {
                    tracing::warn!(peer = %remote, %error, "connect failed");
                    Some(SessionEvent::ConnectFailed { remote, reason: error.to_string() })
                },
            },
            SessionAction::CloseChannel { remote, channel } => {
                tracing::debug!(peer = %remote, %channel, "closing channel");
                self.transport.close(channel);
                None
            },
            SessionAction::Send { remote, channel, bytes } => {
                match self.transport.send(channel, bytes) {
                    Ok(()) => None,
                    Err(error) => {
                        tracing::warn!(peer = %remote, %channel, %error, "send failed");
                        Some(SessionEvent::SendFailed { reason: error.to_string() })
                    },
                }
            },
            SessionAction::Persist { key, value } => {
                if let Err(error) = self.store.set(key, &value) {
                    tracing::warn!(key, %error, "failed to persist");
                }
                None
            },
            SessionAction::Remove { key } => {
                if let Err(error) = self.store.remove(key) {
                    tracing::warn!(key, %error, "failed to remove");
                }
                None
            },
        }
    }
}
