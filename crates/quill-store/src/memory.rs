//! In-memory backing store.

use crate::{BackingStore, Result, StoreChange};
use quill_types::{
    AccountId, Asset, InflationWinner, LedgerEntry, LedgerEntryKind, LedgerHeader, LedgerKey,
};
use std::collections::BTreeMap;

/// A backing store that keeps everything in a sorted map.
///
/// Used by tests and as the semantic reference for [`crate::SqliteStore`]:
/// every query here is a straightforward scan over the map, so its results
/// define what the indexed SQL queries must return.
#[derive(Debug)]
pub struct MemoryStore {
    header: LedgerHeader,
    entries: BTreeMap<LedgerKey, LedgerEntry>,
}

impl MemoryStore {
    /// Create an empty store with the given header.
    pub fn new(header: LedgerHeader) -> Self {
        MemoryStore {
            header,
            entries: BTreeMap::new(),
        }
    }

    /// Number of live entries, for tests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn offers(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries
            .values()
            .filter(|entry| entry.key().kind() == LedgerEntryKind::Offer)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new(LedgerHeader::genesis())
    }
}

impl BackingStore for MemoryStore {
    fn load_header(&self) -> Result<LedgerHeader> {
        Ok(self.header.clone())
    }

    fn load_entry(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>> {
        Ok(self.entries.get(key).cloned())
    }

    fn load_all_offers(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.offers().cloned().collect())
    }

    fn load_best_offers(&self, buying: &Asset, selling: &Asset) -> Result<Vec<LedgerEntry>> {
        let offers: Vec<LedgerEntry> = self
            .offers()
            .filter(|entry| {
                entry
                    .as_offer()
                    .is_some_and(|offer| offer.matches_pair(buying, selling))
            })
            .cloned()
            .collect();
        Ok(crate::sort_offers_best_first(offers))
    }

    fn load_offers_by_account_and_asset(
        &self,
        account: &AccountId,
        asset: &Asset,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .offers()
            .filter(|entry| {
                entry.as_offer().is_some_and(|offer| {
                    offer.seller_id == *account
                        && (offer.buying == *asset || offer.selling == *asset)
                })
            })
            .cloned()
            .collect())
    }

    fn inflation_winners(&self, min_balance: i64) -> Result<Vec<InflationWinner>> {
        Ok(crate::tally_inflation_votes(
            self.entries.values(),
            min_balance,
        ))
    }

    fn write_batch(
        &mut self,
        header: Option<&LedgerHeader>,
        changes: &[StoreChange],
    ) -> Result<()> {
        if let Some(header) = header {
            self.header = header.clone();
        }
        for change in changes {
            match change {
                StoreChange::Upsert(entry) => {
                    self.entries.insert(entry.key(), entry.clone());
                }
                StoreChange::Delete(key) => {
                    self.entries.remove(key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::{AccountEntry, LedgerEntryData, OfferEntry, Price};

    fn account(seed: u8, balance: i64, dest: Option<u8>) -> LedgerEntry {
        LedgerEntry {
            last_modified_ledger_seq: 1,
            data: LedgerEntryData::Account(AccountEntry {
                account_id: AccountId::from_seed(seed),
                balance,
                seq_num: 1,
                num_sub_entries: 0,
                inflation_dest: dest.map(AccountId::from_seed),
                flags: 0,
                home_domain: String::new(),
            }),
        }
    }

    fn offer(seed: u8, id: i64, price: Price) -> LedgerEntry {
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

    #[test]
    fn test_write_batch_and_point_lookup() {
        let mut store = MemoryStore::default();
        let entry = account(1, 500, None);
        let key = entry.key();

        store
            .write_batch(None, &[StoreChange::Upsert(entry.clone())])
            .unwrap();
        assert_eq!(store.load_entry(&key).unwrap(), Some(entry));

        store
            .write_batch(None, &[StoreChange::Delete(key.clone())])
            .unwrap();
        assert_eq!(store.load_entry(&key).unwrap(), None);
    }

    #[test]
    fn test_best_offers_sorted_price_desc_then_id_asc() {
        let mut store = MemoryStore::default();
        store
            .write_batch(
                None,
                &[
                    StoreChange::Upsert(offer(1, 3, Price::new(1, 1))),
                    StoreChange::Upsert(offer(1, 1, Price::new(1, 1))),
                    StoreChange::Upsert(offer(1, 2, Price::new(3, 1))),
                ],
            )
            .unwrap();

        let buying = Asset::credit("USD", AccountId::from_seed(100));
        let best = store.load_best_offers(&buying, &Asset::Native).unwrap();
        let ids: Vec<i64> = best
            .iter()
            .map(|e| e.as_offer().unwrap().offer_id)
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_inflation_winners_filters_and_sorts() {
        let mut store = MemoryStore::default();
        store
            .write_batch(
                None,
                &[
                    StoreChange::Upsert(account(1, 1000, Some(10))),
                    StoreChange::Upsert(account(2, 999, Some(10))),
                    StoreChange::Upsert(account(3, 1000, Some(11))),
                    StoreChange::Upsert(account(4, 5000, None)),
                ],
            )
            .unwrap();

        let winners = store.inflation_winners(1000).unwrap();
        assert_eq!(winners.len(), 2);
        // Equal votes: higher destination key first.
        assert_eq!(winners[0].destination, AccountId::from_seed(11));
        assert_eq!(winners[0].votes, 1000);
        assert_eq!(winners[1].destination, AccountId::from_seed(10));
        assert_eq!(winners[1].votes, 1000);
    }
}
