//! Persistence collaborator for Chit-Chat.
//!
//! A string key-value surface with three operations. The session manager
//! mirrors its message log and durable identity through it; nothing else is
//! stored. The trait is synchronous: writes are small and happen between
//! event handling steps.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticStore;
pub use error::StoreError;
pub use memory::MemoryStore;

pub use self::redb::RedbStore;

/// Durable string key-value store.
///
/// Must be Clone (the runtime and tests hold handles to the same data),
/// Send + Sync, and synchronous. Implementations share state via Arc so
/// clones see the same entries.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned.
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    /// Value stored under `key`. `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}
