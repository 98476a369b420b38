//! Production environment using system time and the OS RNG.
//!
//! - Real monotonic time (`std::time::Instant`) for typing deadlines
//! - Wall-clock Unix milliseconds for message timestamps
//! - getrandom for message ids and ephemeral identities
//! - Tokio async sleep for the runtime's poll loop

use std::time::Duration;

use chitchat_core::env::Environment;

/// Production environment.
///
/// # Panics
///
/// Panics if the OS RNG fails. Identifiers drawn from a broken RNG would
/// collide, so there is no sensible fallback.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    fn wall_clock_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_millis() as u64
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::disallowed_methods)]
    fn time_advances() {
        let env = SystemEnv::new();

        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = env.now();

        assert!(t2 > t1, "Time should advance");
    }

    #[test]
    fn wall_clock_is_after_2020() {
        assert!(SystemEnv::new().wall_clock_millis() > 1_577_836_800_000);
    }

    #[test]
    fn random_ids_use_alphabet_and_differ() {
        let env = SystemEnv::new();

        let a = env.random_id(21);
        let b = env.random_id(21);

        assert_eq!(a.len(), 21);
        assert!(a.bytes().all(|c| chitchat_proto::ID_ALPHABET.contains(&c)));
        assert_ne!(a, b, "Random ids should differ");
    }

    #[tokio::test]
    async fn sleep_works() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_millis(50)).await;
        let elapsed = env.now() - start;

        assert!(elapsed >= Duration::from_millis(50), "Sleep should wait at least 50ms");
    }
}
