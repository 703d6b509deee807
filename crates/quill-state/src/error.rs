//! Transaction-layer error types.

use quill_store::StoreError;
use quill_types::LedgerKey;
use thiserror::Error;

/// Errors surfaced by the transaction layer.
///
/// Everything except [`StateError::Store`] is a caller-contract violation:
/// the call sequence itself is wrong, and retrying without restructuring it
/// cannot succeed. Store errors are environmental and are propagated
/// unmodified from the backing store.
#[derive(Debug, Error)]
pub enum StateError {
    /// Operation not permitted in the frame's (or handle's) current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// `create` for a key that already resolves to a live entry.
    #[error("duplicate key: {0}")]
    DuplicateKey(LedgerKey),

    /// `erase` for a key with no live entry.
    #[error("key not found: {0}")]
    KeyNotFound(LedgerKey),

    /// `load` for a key that already has an outstanding handle.
    #[error("handle already active for key: {0}")]
    AlreadyActive(LedgerKey),

    /// Backing store failure, propagated unmodified.
    #[error(transparent)]
    Store(#[from] StoreError),
}
