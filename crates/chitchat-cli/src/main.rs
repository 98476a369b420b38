//! Chit-Chat two-peer session runner.
//!
//! Brings up two peers on the in-process broker with the real clock and OS
//! randomness, connects them, and plays a short scripted conversation.
//!
//! # Usage
//!
//! ```bash
//! # Ephemeral identities, in-memory history
//! chitchat --message "hello" --message "how are you?"
//!
//! # Durable identity for alice, history kept across runs
//! chitchat --alice alice-desk --db alice.redb --message "back again"
//! ```

use std::time::Duration;

use chitchat_app::{Runtime, SystemEnv};
use chitchat_core::{IceServer, SessionConfig};
use chitchat_harness::{SimNetwork, SimTransport};
use chitchat_proto::Message;
use chitchat_store::{KeyValueStore, MemoryStore, RedbStore};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type PeerRuntime<S> = Runtime<SimTransport, S, SystemEnv>;

/// Chit-Chat session runner
#[derive(Parser, Debug)]
#[command(name = "chitchat")]
#[command(about = "Run a scripted two-peer Chit-Chat session")]
#[command(version)]
struct Args {
    /// Durable identity for the first peer (ephemeral if omitted)
    #[arg(long)]
    alice: Option<String>,

    /// Durable identity for the second peer (ephemeral if omitted)
    #[arg(long)]
    bob: Option<String>,

    /// Message the first peer sends (repeatable)
    #[arg(short, long = "message")]
    messages: Vec<String>,

    /// Relay endpoint as `url` or `url|username|credential` (repeatable)
    #[arg(long = "ice-server", value_parser = parse_ice_server)]
    ice_servers: Vec<IceServer>,

    /// redb file holding the first peer's history and identity
    #[arg(long)]
    db: Option<String>,

    /// Idle window before a typing-stop is sent, in milliseconds
    #[arg(long, default_value = "1000")]
    typing_idle_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_ice_server(spec: &str) -> Result<IceServer, String> {
    IceServer::parse(spec).ok_or_else(|| format!("invalid ICE server: {spec}"))
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig {
            typing_idle: Duration::from_millis(self.typing_idle_ms),
            ..SessionConfig::default()
        };
        if !self.ice_servers.is_empty() {
            config.ice_servers.clone_from(&self.ice_servers);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Chit-Chat session starting");

    match &args.db {
        Some(path) => {
            tracing::info!("Using durable history at {path}");
            run(&args, RedbStore::open(path)?).await;
        },
        None => run(&args, MemoryStore::new()).await,
    }

    Ok(())
}

async fn run<S: KeyValueStore>(args: &Args, store: S) {
    let config = args.session_config();
    let network = SimNetwork::new();
    let env = SystemEnv::new();

    let mut alice = Runtime::new(network.transport(), store, env.clone(), config.clone());
    let mut bob = Runtime::new(network.transport(), MemoryStore::new(), env, config.clone());

    alice.start();
    if let Some(id) = &args.alice {
        alice.use_durable_identity(id);
    }
    match &args.bob {
        Some(id) => bob.use_durable_identity(id),
        None => bob.start(),
    }
    settle(&mut alice, &mut bob);

    let (Some(alice_id), Some(bob_id)) = (
        alice.snapshot().local_identity.map(|i| i.id),
        bob.snapshot().local_identity.map(|i| i.id),
    ) else {
        report_errors(&alice, &bob);
        return;
    };
    tracing::info!(alice = %alice_id, bob = %bob_id, "identities live");

    alice.connect(bob_id.as_str());
    settle(&mut alice, &mut bob);

    for text in &args.messages {
        alice.keystroke();
        alice.send_text(text);
        settle(&mut alice, &mut bob);

        if let Some(received) = bob.snapshot().messages.last() {
            bob.react(&received.id, "👍");
        }
        settle(&mut alice, &mut bob);
    }

    // Let the typing-stop fire.
    alice.run_for(config.typing_idle + Duration::from_millis(100), Duration::from_millis(50)).await;
    settle(&mut alice, &mut bob);

    alice.hangup();
    settle(&mut alice, &mut bob);

    for message in &alice.snapshot().messages {
        log_message(message);
    }
    report_errors(&alice, &bob);

    tracing::info!(
        alice_state = ?alice.snapshot().state,
        bob_state = ?bob.snapshot().state,
        "session finished"
    );
}

fn settle<S: KeyValueStore>(alice: &mut PeerRuntime<S>, bob: &mut PeerRuntime<MemoryStore>) {
    while alice.pump() + bob.pump() > 0 {}
}

fn log_message(message: &Message) {
    let reactions: Vec<String> = message
        .reaction_counts()
        .into_iter()
        .map(|(emoji, count)| format!("{emoji}x{count}"))
        .collect();

    tracing::info!(
        sender = %message.sender,
        kind = message.kind().as_str(),
        read = message.is_read(),
        reactions = %reactions.join(" "),
        "{}",
        message.body.content()
    );
}

fn report_errors<S: KeyValueStore>(alice: &PeerRuntime<S>, bob: &PeerRuntime<MemoryStore>) {
    for (name, error) in [("alice", alice.snapshot().last_error), ("bob", bob.snapshot().last_error)] {
        if let Some(error) = error {
            tracing::warn!(peer = name, %error, "{}", error.user_message());
        }
    }
}
