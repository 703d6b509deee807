//! Backing store abstraction for quill ledger state.
//!
//! The transaction layer treats durable storage as an opaque keyed service:
//! point lookups by [`LedgerKey`], atomic batched writes, and the handful of
//! secondary-index queries needed to reconstruct the order book and the
//! inflation vote tally. This crate defines that contract —
//! [`BackingStore`] — and two implementations:
//!
//! - [`MemoryStore`]: a plain in-memory map, used by tests and as a
//!   reference for the SQL implementation's query semantics.
//! - [`SqliteStore`]: SQLite-backed persistence with dedicated index
//!   tables for offers and accounts.
//!
//! Only the root of a transaction-frame chain ever talks to a store;
//! nested frames resolve reads through their parents.

mod error;
mod memory;
mod sqlite;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use quill_types::{
    AccountId, Asset, InflationWinner, LedgerEntry, LedgerHeader, LedgerKey, OfferEntry,
};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// One element of an atomic write batch.
#[derive(Debug, Clone)]
pub enum StoreChange {
    /// Insert or replace the entry at its own key.
    Upsert(LedgerEntry),
    /// Remove the entry at this key, if present.
    Delete(LedgerKey),
}

impl StoreChange {
    /// The key this change touches.
    pub fn key(&self) -> LedgerKey {
        match self {
            StoreChange::Upsert(entry) => entry.key(),
            StoreChange::Delete(key) => key.clone(),
        }
    }
}

/// The durable storage contract consumed by the root of a frame chain.
///
/// Implementations must keep the secondary-index queries consistent with
/// the point-lookup view: an offer visible through [`load_entry`] must be
/// visible through every offer query it matches, and vice versa.
///
/// [`load_entry`]: BackingStore::load_entry
pub trait BackingStore {
    /// Load the ledger header.
    fn load_header(&self) -> Result<LedgerHeader>;

    /// Point lookup by key.
    fn load_entry(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>>;

    /// All live offers, in unspecified order.
    fn load_all_offers(&self) -> Result<Vec<LedgerEntry>>;

    /// All live offers on the (buying, selling) book, sorted best-first:
    /// descending price, ascending offer id on ties.
    fn load_best_offers(&self, buying: &Asset, selling: &Asset) -> Result<Vec<LedgerEntry>>;

    /// All live offers whose seller is `account` and whose buying or
    /// selling asset is `asset`.
    fn load_offers_by_account_and_asset(
        &self,
        account: &AccountId,
        asset: &Asset,
    ) -> Result<Vec<LedgerEntry>>;

    /// Vote tally over all accounts with an inflation destination set and
    /// balance at least `min_balance`, sorted by (votes desc, destination
    /// desc). The caller truncates; the store returns every destination
    /// with a nonzero tally.
    fn inflation_winners(&self, min_balance: i64) -> Result<Vec<InflationWinner>>;

    /// Apply a batch of changes, and optionally a new header, atomically.
    /// Either everything lands or nothing does.
    fn write_batch(&mut self, header: Option<&LedgerHeader>, changes: &[StoreChange])
        -> Result<()>;
}

/// Shared by both implementations: order offer entries best-first with
/// the exact rational price comparison.
///
/// Entries that are not offers are dropped; callers only pass offer rows.
pub(crate) fn sort_offers_best_first(offers: Vec<LedgerEntry>) -> Vec<LedgerEntry> {
    let mut keyed: Vec<(OfferEntry, LedgerEntry)> = offers
        .into_iter()
        .filter_map(|entry| entry.as_offer().cloned().map(|offer| (offer, entry)))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| a.cmp_order_book(b));
    keyed.into_iter().map(|(_, entry)| entry).collect()
}

/// Shared by both implementations: tally qualifying account entries.
///
/// Sorting is (votes desc, destination desc), matching the SQL `ORDER BY`
/// in [`SqliteStore`] so the two stores are observationally identical.
pub(crate) fn tally_inflation_votes<'a>(
    accounts: impl Iterator<Item = &'a LedgerEntry>,
    min_balance: i64,
) -> Vec<InflationWinner> {
    use std::collections::HashMap;

    let mut votes: HashMap<AccountId, i64> = HashMap::new();
    for entry in accounts {
        if let Some(account) = entry.as_account() {
            if account.balance >= min_balance {
                if let Some(dest) = account.inflation_dest {
                    *votes.entry(dest).or_insert(0) += account.balance;
                }
            }
        }
    }

    let mut winners: Vec<InflationWinner> = votes
        .into_iter()
        .map(|(destination, votes)| InflationWinner { destination, votes })
        .collect();
    winners.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then(b.destination.cmp(&a.destination))
    });
    winners
}
