//! Simulated environment: virtual clock and seeded RNG.

#![allow(clippy::disallowed_types, reason = "Shared clock and RNG state")]

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex},
    time::Duration,
};

use chitchat_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall-clock time at simulation start (2023-11-14T22:13:20Z).
const SIM_EPOCH_MILLIS: u64 = 1_700_000_000_000;

/// Virtual instant: time elapsed since simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since simulation start.
    pub fn elapsed_since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

struct SimState {
    elapsed: Duration,
    rng: ChaCha8Rng,
}

/// Deterministic environment.
///
/// Clones share one clock and one RNG, so several runtimes in the same test
/// observe consistent time. Time only moves through [`SimEnv::advance`] or
/// [`Environment::sleep`].
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Environment with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with an explicit RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                elapsed: Duration::ZERO,
                rng: ChaCha8Rng::seed_from_u64(seed),
            })),
        }
    }

    /// Move the virtual clock forward.
    #[allow(clippy::expect_used)]
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().expect("SimEnv mutex poisoned");
        state.elapsed += duration;
    }

    #[allow(clippy::expect_used)]
    fn elapsed(&self) -> Duration {
        self.state.lock().expect("SimEnv mutex poisoned").elapsed
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.elapsed())
    }

    fn wall_clock_millis(&self) -> u64 {
        SIM_EPOCH_MILLIS + self.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.state.lock().expect("SimEnv mutex poisoned").rng.fill_bytes(buffer);
    }
}
