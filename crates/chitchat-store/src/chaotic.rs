//! Chaotic store wrapper for fault injection testing.
//!
//! Randomly fails operations so tests can check that persistence failures
//! never disturb the session itself.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use super::{KeyValueStore, StoreError};

/// Store wrapper that randomly injects failures.
///
/// Delegates to an inner store but fails operations with probability
/// `failure_rate`. RNG state lives behind `Arc<Mutex<>>` so clones share one
/// failure sequence.
#[derive(Clone)]
pub struct ChaoticStore<S: KeyValueStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    rng: Arc<Mutex<ChaoticRng>>,
    /// Number of injected failures so far.
    failures: Arc<Mutex<usize>>,
}

/// Linear congruential generator for reproducible chaos.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0).
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: KeyValueStore> ChaoticStore<S> {
    /// Wrap `inner` with a fixed seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            failures: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of operations that were failed on purpose.
    #[allow(clippy::expect_used)]
    pub fn injected_failures(&self) -> usize {
        *self.failures.lock().expect("failure counter mutex poisoned")
    }

    fn inject(&self) -> Result<(), StoreError> {
        #[allow(clippy::expect_used)]
        let roll = self.rng.lock().expect("ChaoticRng mutex poisoned").next();
        if roll < self.failure_rate {
            #[allow(clippy::expect_used)]
            let mut failures = self.failures.lock().expect("failure counter mutex poisoned");
            *failures += 1;
            return Err(StoreError::Injected);
        }
        Ok(())
    }
}

impl<S: KeyValueStore> KeyValueStore for ChaoticStore<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inject()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inject()?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inject()?;
        self.inner.remove(key)
    }
}
