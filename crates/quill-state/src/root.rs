//! The root layer: terminal parent of every frame chain.
//!
//! The root is the only component that touches durable storage. It fronts
//! the store with two independently sized caches:
//!
//! - an entry cache, memoizing point lookups including absence;
//! - a best-offers cache, memoizing the sorted order book per
//!   (buying, selling) asset pair.
//!
//! Either cache can be disabled by configuring its size to 0; cached and
//! uncached configurations are observationally identical. A child commit
//! writes to the store atomically, then updates the entry cache for
//! exactly the keys written and drops the cached book for exactly the
//! asset pairs whose offers changed.

use crate::txn::{LedgerTxn, TxnParent};
use crate::{Result, StateError};
use lru::LruCache;
use quill_store::{BackingStore, StoreChange};
use quill_types::{
    AccountId, Asset, InflationWinner, LedgerEntry, LedgerEntryKind, LedgerHeader, LedgerKey,
};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::rc::Rc;
use tracing::debug;

/// Cache sizing for a [`LedgerTxnRoot`]. A size of 0 disables that cache.
#[derive(Debug, Clone, Copy)]
pub struct LedgerTxnRootConfig {
    /// Capacity of the point-lookup cache, in keys.
    pub entry_cache_size: usize,
    /// Capacity of the order-book cache, in asset pairs.
    pub best_offers_cache_size: usize,
}

impl Default for LedgerTxnRootConfig {
    fn default() -> Self {
        LedgerTxnRootConfig {
            entry_cache_size: 4096,
            best_offers_cache_size: 64,
        }
    }
}

impl LedgerTxnRootConfig {
    /// A configuration with both caches disabled.
    pub fn uncached() -> Self {
        LedgerTxnRootConfig {
            entry_cache_size: 0,
            best_offers_cache_size: 0,
        }
    }
}

pub(crate) struct RootInner {
    store: Box<dyn BackingStore>,
    pub(crate) header: LedgerHeader,
    /// `None` caches nothing; `Some(None)` in a slot caches absence.
    entry_cache: Option<LruCache<LedgerKey, Option<LedgerEntry>>>,
    /// Sorted best-first book per (buying, selling) pair.
    best_offers_cache: Option<LruCache<(Asset, Asset), Vec<LedgerEntry>>>,
    pub(crate) has_child: bool,
}

impl RootInner {
    pub(crate) fn load_entry(&mut self, key: &LedgerKey) -> Result<Option<LedgerEntry>> {
        if let Some(cache) = &mut self.entry_cache {
            if let Some(cached) = cache.get(key) {
                return Ok(cached.clone());
            }
        }
        let loaded = self.store.load_entry(key)?;
        if let Some(cache) = &mut self.entry_cache {
            cache.put(key.clone(), loaded.clone());
        }
        Ok(loaded)
    }

    pub(crate) fn all_offers(&mut self) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.load_all_offers()?)
    }

    pub(crate) fn best_offers(&mut self, buying: &Asset, selling: &Asset) -> Result<Vec<LedgerEntry>> {
        let pair = (buying.clone(), selling.clone());
        if let Some(cache) = &mut self.best_offers_cache {
            if let Some(cached) = cache.get(&pair) {
                return Ok(cached.clone());
            }
        }
        let offers = self.store.load_best_offers(buying, selling)?;
        if let Some(cache) = &mut self.best_offers_cache {
            cache.put(pair, offers.clone());
        }
        Ok(offers)
    }

    pub(crate) fn offers_by_account_and_asset(
        &mut self,
        account: &AccountId,
        asset: &Asset,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.load_offers_by_account_and_asset(account, asset)?)
    }

    pub(crate) fn inflation_winners(&mut self, min_balance: i64) -> Result<Vec<InflationWinner>> {
        Ok(self.store.inflation_winners(min_balance)?)
    }

    /// Apply a committing child's net changes.
    ///
    /// The store write is atomic; only after it succeeds are the caches
    /// touched, so a failed write leaves them consistent with storage.
    pub(crate) fn commit_child(
        &mut self,
        header: Option<LedgerHeader>,
        changes: Vec<StoreChange>,
    ) -> Result<()> {
        // The asset pairs whose books change: the pair each written offer
        // lands on, plus the pair its stored predecessor sat on (an update
        // can move an offer between books).
        let mut stale_pairs: BTreeSet<(Asset, Asset)> = BTreeSet::new();
        if self.best_offers_cache.is_some() {
            for change in &changes {
                let key = change.key();
                if key.kind() != LedgerEntryKind::Offer {
                    continue;
                }
                if let Some(previous) = self.load_entry(&key)? {
                    if let Some(offer) = previous.as_offer() {
                        stale_pairs.insert((offer.buying.clone(), offer.selling.clone()));
                    }
                }
                if let StoreChange::Upsert(entry) = change {
                    if let Some(offer) = entry.as_offer() {
                        stale_pairs.insert((offer.buying.clone(), offer.selling.clone()));
                    }
                }
            }
        }

        debug!(changes = changes.len(), "committing frame to backing store");
        self.store.write_batch(header.as_ref(), &changes)?;
        if let Some(header) = header {
            self.header = header;
        }

        if let Some(cache) = &mut self.entry_cache {
            for change in &changes {
                match change {
                    StoreChange::Upsert(entry) => {
                        cache.put(entry.key(), Some(entry.clone()));
                    }
                    StoreChange::Delete(key) => {
                        cache.put(key.clone(), None);
                    }
                }
            }
        }
        if let Some(cache) = &mut self.best_offers_cache {
            for pair in stale_pairs {
                cache.pop(&pair);
            }
        }
        Ok(())
    }
}

/// The terminal parent of a frame chain, fronting durable storage.
///
/// Open frames over it with [`TxnParent::begin`]; at most one child may be
/// attached at a time.
pub struct LedgerTxnRoot {
    pub(crate) inner: Rc<RefCell<RootInner>>,
}

impl LedgerTxnRoot {
    /// Create a root over a backing store.
    ///
    /// Reads the current header from the store up front; fails if the
    /// store was never initialized.
    pub fn new(store: Box<dyn BackingStore>, config: LedgerTxnRootConfig) -> Result<Self> {
        let header = store.load_header()?;
        debug!(
            entry_cache = config.entry_cache_size,
            best_offers_cache = config.best_offers_cache_size,
            "opening ledger-state root"
        );
        Ok(LedgerTxnRoot {
            inner: Rc::new(RefCell::new(RootInner {
                store,
                header,
                entry_cache: NonZeroUsize::new(config.entry_cache_size).map(LruCache::new),
                best_offers_cache: NonZeroUsize::new(config.best_offers_cache_size)
                    .map(LruCache::new),
                has_child: false,
            })),
        })
    }

    /// The current committed ledger header.
    pub fn header(&self) -> LedgerHeader {
        self.inner.borrow().header.clone()
    }
}

impl TxnParent for LedgerTxnRoot {
    fn begin(&self) -> Result<LedgerTxn> {
        let mut inner = self.inner.borrow_mut();
        if inner.has_child {
            return Err(StateError::InvalidState("root already has an active child"));
        }
        inner.has_child = true;
        drop(inner);
        Ok(LedgerTxn::over_root(self.inner.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_store::MemoryStore;
    use quill_types::{LedgerEntryData, OfferEntry, Price};

    fn offer_entry(seed: u8, id: i64, price: Price) -> LedgerEntry {
        LedgerEntry {
            last_modified_ledger_seq: 1,
            data: LedgerEntryData::Offer(OfferEntry {
                seller_id: AccountId::from_seed(seed),
                offer_id: id,
                selling: Asset::Native,
                buying: Asset::credit("USD", AccountId::from_seed(100)),
                amount: 10,
                price,
                flags: 0,
            }),
        }
    }

    fn usd() -> Asset {
        Asset::credit("USD", AccountId::from_seed(100))
    }

    fn cached_root() -> LedgerTxnRoot {
        LedgerTxnRoot::new(
            Box::<MemoryStore>::default(),
            LedgerTxnRootConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_root_allows_one_child_at_a_time() {
        let root = cached_root();
        let txn = root.begin().unwrap();
        assert!(matches!(root.begin(), Err(StateError::InvalidState(_))));
        txn.rollback();
        assert!(root.begin().is_ok());
    }

    #[test]
    fn test_entry_cache_tracks_commits() {
        let root = cached_root();
        let entry = offer_entry(1, 1, Price::new(1, 1));
        let key = entry.key();

        // Prime the cache with absence, then commit the entry.
        let txn = root.begin().unwrap();
        assert!(txn.load(&key).unwrap().is_none());
        txn.create(entry.clone()).unwrap();
        txn.commit().unwrap();

        let txn = root.begin().unwrap();
        let handle = txn.load(&key).unwrap().unwrap();
        assert_eq!(handle.current().unwrap(), entry);
    }

    #[test]
    fn test_best_offers_cache_invalidated_by_commit() {
        let root = cached_root();

        let txn = root.begin().unwrap();
        txn.create(offer_entry(1, 1, Price::new(1, 1))).unwrap();
        txn.create(offer_entry(1, 2, Price::new(5, 1))).unwrap();
        txn.commit().unwrap();

        // Prime the order-book cache.
        let txn = root.begin().unwrap();
        let best = txn.load_best_offer(&usd(), &Asset::Native).unwrap().unwrap();
        assert_eq!(best.current().unwrap().as_offer().unwrap().offer_id, 2);

        // Erase the cached best and commit; the next query must not serve
        // the stale book.
        drop(best);
        txn.erase(&LedgerKey::offer(AccountId::from_seed(1), 2))
            .unwrap();
        txn.commit().unwrap();

        let txn = root.begin().unwrap();
        let best = txn.load_best_offer(&usd(), &Asset::Native).unwrap().unwrap();
        assert_eq!(best.current().unwrap().as_offer().unwrap().offer_id, 1);
    }

    #[test]
    fn test_zero_sized_caches_are_disabled() {
        let root = LedgerTxnRoot::new(
            Box::<MemoryStore>::default(),
            LedgerTxnRootConfig::uncached(),
        )
        .unwrap();

        let txn = root.begin().unwrap();
        txn.create(offer_entry(1, 1, Price::new(2, 1))).unwrap();
        txn.commit().unwrap();

        let txn = root.begin().unwrap();
        let best = txn.load_best_offer(&usd(), &Asset::Native).unwrap().unwrap();
        assert_eq!(best.current().unwrap().as_offer().unwrap().offer_id, 1);
    }
}
