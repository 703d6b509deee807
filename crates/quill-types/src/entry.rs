//! Ledger entries: the versioned records making up ledger state.

use crate::{AccountId, Asset, LedgerEntryKind, LedgerKey, Price};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// An account record: balance, sequence number, and inflation vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub account_id: AccountId,
    /// Balance in the smallest native unit.
    pub balance: i64,
    pub seq_num: i64,
    pub num_sub_entries: u32,
    /// The account this account votes for in inflation tallies, if any.
    pub inflation_dest: Option<AccountId>,
    pub flags: u32,
    pub home_domain: String,
}

/// A trust line: a non-native asset balance held by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLineEntry {
    pub account_id: AccountId,
    pub asset: Asset,
    pub balance: i64,
    pub limit: i64,
    pub flags: u32,
}

/// An order-book offer to exchange `selling` for `buying`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferEntry {
    pub seller_id: AccountId,
    pub offer_id: i64,
    pub selling: Asset,
    pub buying: Asset,
    /// Amount of `selling` remaining on the offer.
    pub amount: i64,
    /// Price of `selling` in terms of `buying`.
    pub price: Price,
    pub flags: u32,
}

impl OfferEntry {
    /// Order-book ordering, best offer first: higher price is better,
    /// ties broken by ascending offer id.
    pub fn cmp_order_book(&self, other: &OfferEntry) -> Ordering {
        other
            .price
            .cmp_value(&self.price)
            .then(self.offer_id.cmp(&other.offer_id))
    }

    /// Whether this offer is on the given order book.
    pub fn matches_pair(&self, buying: &Asset, selling: &Asset) -> bool {
        &self.buying == buying && &self.selling == selling
    }
}

/// An arbitrary named data record attached to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntry {
    pub account_id: AccountId,
    pub data_name: String,
    pub data_value: Vec<u8>,
}

/// Kind-tagged payload of a [`LedgerEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntryData {
    Account(AccountEntry),
    TrustLine(TrustLineEntry),
    Offer(OfferEntry),
    Data(DataEntry),
}

impl LedgerEntryData {
    pub fn kind(&self) -> LedgerEntryKind {
        match self {
            LedgerEntryData::Account(_) => LedgerEntryKind::Account,
            LedgerEntryData::TrustLine(_) => LedgerEntryKind::TrustLine,
            LedgerEntryData::Offer(_) => LedgerEntryKind::Offer,
            LedgerEntryData::Data(_) => LedgerEntryKind::Data,
        }
    }
}

/// One versioned record of ledger state.
///
/// Entries are immutable values compared by full structural equality; the
/// transaction layer stages copies and never mutates an entry in place
/// outside its own stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Sequence number of the ledger that last modified this entry.
    /// Maintained by the caller; this layer never bumps it implicitly.
    pub last_modified_ledger_seq: u32,
    pub data: LedgerEntryData,
}

impl LedgerEntry {
    /// Extract the key addressing this entry.
    ///
    /// Each payload kind carries its own key fields; this is the single
    /// place that mapping is defined.
    pub fn key(&self) -> LedgerKey {
        match &self.data {
            LedgerEntryData::Account(account) => LedgerKey::Account {
                account_id: account.account_id,
            },
            LedgerEntryData::TrustLine(trust_line) => LedgerKey::TrustLine {
                account_id: trust_line.account_id,
                asset: trust_line.asset.clone(),
            },
            LedgerEntryData::Offer(offer) => LedgerKey::Offer {
                seller_id: offer.seller_id,
                offer_id: offer.offer_id,
            },
            LedgerEntryData::Data(data) => LedgerKey::Data {
                account_id: data.account_id,
                data_name: data.data_name.clone(),
            },
        }
    }

    /// The account payload, if this is an account entry.
    pub fn as_account(&self) -> Option<&AccountEntry> {
        match &self.data {
            LedgerEntryData::Account(account) => Some(account),
            _ => None,
        }
    }

    /// The offer payload, if this is an offer entry.
    pub fn as_offer(&self) -> Option<&OfferEntry> {
        match &self.data {
            LedgerEntryData::Offer(offer) => Some(offer),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(id: i64, price: Price) -> OfferEntry {
        OfferEntry {
            seller_id: AccountId::from_seed(1),
            offer_id: id,
            selling: Asset::Native,
            buying: Asset::credit("USD", AccountId::from_seed(2)),
            amount: 100,
            price,
            flags: 0,
        }
    }

    #[test]
    fn test_order_book_prefers_higher_price() {
        let cheap = offer(1, Price::new(1, 2));
        let rich = offer(2, Price::new(2, 1));
        assert_eq!(rich.cmp_order_book(&cheap), Ordering::Less);
    }

    #[test]
    fn test_order_book_breaks_price_ties_by_lower_id() {
        let first = offer(1, Price::new(1, 1));
        let second = offer(2, Price::new(2, 2));
        assert_eq!(first.cmp_order_book(&second), Ordering::Less);
        assert_eq!(second.cmp_order_book(&first), Ordering::Greater);
    }

    #[test]
    fn test_entry_key_extraction() {
        let entry = LedgerEntry {
            last_modified_ledger_seq: 1,
            data: LedgerEntryData::Offer(offer(7, Price::new(1, 1))),
        };
        assert_eq!(
            entry.key(),
            LedgerKey::offer(AccountId::from_seed(1), 7)
        );
    }
}
