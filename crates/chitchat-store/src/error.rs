//! Store errors.

use thiserror::Error;

/// Errors from a [`crate::KeyValueStore`] backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend I/O or transaction failure.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Injected failure from [`crate::ChaoticStore`].
    #[error("injected storage failure")]
    Injected,
}
