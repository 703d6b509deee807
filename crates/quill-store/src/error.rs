//! Backing store error types.

use thiserror::Error;

/// Errors surfaced by a backing store.
///
/// These are environmental failures (I/O, corruption), as opposed to the
/// caller-contract violations reported by the transaction layer. They are
/// propagated unmodified and never retried inside the ledger-state layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store has no ledger header; it was never initialized.
    #[error("store is not initialized: missing ledger header")]
    MissingHeader,

    /// Stored data failed an integrity check.
    #[error("integrity error: {0}")]
    Integrity(String),
}
