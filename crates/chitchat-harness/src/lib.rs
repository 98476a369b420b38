//! Deterministic simulation harness for Chit-Chat.
//!
//! In-process implementations of the Environment and Transport traits so
//! whole sessions (two runtimes, a broker, and the channels between them)
//! run reproducibly inside a single test.
//!
//! - [`SimEnv`]: virtual clock and seeded ChaCha RNG
//! - [`SimNetwork`]: signalling broker and data channels with fault injection
//! - [`SimTransport`]: one endpoint's view of the network

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_env;
pub mod sim_network;

use chitchat_app::Runtime;
use chitchat_core::SessionConfig;
use chitchat_store::{KeyValueStore, MemoryStore};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_network::{SimNetwork, SimTransport};

/// Runtime wired to the simulated network.
pub type SimRuntime<S = MemoryStore> = Runtime<SimTransport, S, SimEnv>;

/// Attach a new runtime to `network`, sharing the clock of `env`.
pub fn sim_runtime<S: KeyValueStore>(
    network: &SimNetwork,
    env: &SimEnv,
    store: S,
    config: SessionConfig,
) -> SimRuntime<S> {
    Runtime::new(network.transport(), store, env.clone(), config)
}

/// Pump every runtime until no transport events remain.
///
/// Events from one runtime can enqueue events for another, so a single pass
/// is not enough.
pub fn settle<S: KeyValueStore>(runtimes: &mut [&mut SimRuntime<S>]) {
    loop {
        let processed: usize = runtimes.iter_mut().map(|r| r.pump()).sum();
        if processed == 0 {
            break;
        }
    }
}
