#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{KeyValueStore, StoreError};

/// In-memory store for tests and simulation.
///
/// Entries live behind `Arc<Mutex<>>` so clones share them. Uses
/// `lock().expect()`, which panics if the mutex is poisoned.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("Mutex poisoned").len()
    }

    /// True if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        #[allow(clippy::expect_used)]
        let entries = self.entries.lock().expect("Mutex poisoned");
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        #[allow(clippy::expect_used)]
        let mut entries = self.entries.lock().expect("Mutex poisoned");
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        #[allow(clippy::expect_used)]
        let mut entries = self.entries.lock().expect("Mutex poisoned");
        entries.remove(key);
        Ok(())
    }
}
