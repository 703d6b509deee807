//! Nested copy-on-write transactions over ledger state.
//!
//! This crate is the transaction layer of a quill node: arbitrarily deep
//! parent-child frame chains over the keyed ledger entries and the
//! singleton header, sitting above a [`quill_store::BackingStore`].
//!
//! The pieces:
//!
//! - [`LedgerTxnRoot`]: terminal parent of every chain; owns the store
//!   connection and the optional entry and order-book caches.
//! - [`LedgerTxn`]: one frame. Writes stage locally; reads miss downward
//!   through the chain; commit merges into the parent (or storage) and
//!   rollback discards. Extracting a [`LedgerDelta`] seals the frame.
//! - [`EntryHandle`] / [`ConstEntryHandle`] / [`HeaderHandle`]: scoped,
//!   move-only claims on one staged entry or the header; at most one
//!   handle per key is active at a time.
//!
//! The canonical usage pattern is "try, then discard": open a child frame
//! for a validation pass and always roll it back, then open a second child
//! for the apply path and commit it.
//!
//! ```no_run
//! use quill_state::{LedgerTxnRoot, LedgerTxnRootConfig, TxnParent};
//! use quill_store::MemoryStore;
//!
//! # fn main() -> quill_state::Result<()> {
//! let root = LedgerTxnRoot::new(
//!     Box::<MemoryStore>::default(),
//!     LedgerTxnRootConfig::default(),
//! )?;
//!
//! let txn = root.begin()?;
//! {
//!     let probe = txn.begin()?;
//!     // validation-only loads and mutations...
//!     probe.rollback();
//! }
//! // ...apply for real, then:
//! txn.commit()?;
//! # Ok(())
//! # }
//! ```

mod delta;
mod error;
mod handle;
mod root;
mod stage;
mod txn;

pub use delta::{EntryDelta, HeaderDelta, LedgerDelta};
pub use error::StateError;
pub use handle::{ConstEntryHandle, EntryHandle, HeaderHandle};
pub use root::{LedgerTxnRoot, LedgerTxnRootConfig};
pub use txn::{LedgerTxn, TxnParent};

/// Result type for transaction-layer operations.
pub type Result<T> = std::result::Result<T, StateError>;
