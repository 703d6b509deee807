//! Ledger data model for quill.
//!
//! This crate defines the value types shared by the transaction layer and
//! the backing store:
//!
//! - [`LedgerKey`]: unique, totally ordered identifier for one ledger entry
//! - [`LedgerEntry`]: versioned, kind-tagged ledger record
//! - [`LedgerHeader`]: the singleton per-ledger header
//! - [`AccountId`], [`Asset`], [`Price`]: building blocks of the payloads
//!
//! All types are plain immutable values: cloning is cheap enough for the
//! copy-on-write staging the transaction layer performs, and equality is
//! full structural equality. Keys are `Ord + Hash` so that stages and
//! deltas iterate deterministically.

mod asset;
mod entry;
mod header;
mod key;

pub use asset::{AccountId, Asset, Price};
pub use entry::{
    AccountEntry, DataEntry, LedgerEntry, LedgerEntryData, OfferEntry, TrustLineEntry,
};
pub use header::LedgerHeader;
pub use key::{LedgerEntryKind, LedgerKey};

use serde::{Deserialize, Serialize};

/// One row of a vote-tally query result: the total balance voted toward a
/// single inflation destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InflationWinner {
    /// The account named as inflation destination by the voters.
    pub destination: AccountId,
    /// Sum of the balances of all qualifying accounts voting for it.
    pub votes: i64,
}
