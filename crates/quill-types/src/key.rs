//! Ledger keys: the unique address of one ledger entry.

use crate::{AccountId, Asset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of a [`LedgerKey`] / ledger entry payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LedgerEntryKind {
    Account,
    TrustLine,
    Offer,
    Data,
}

/// Uniquely addresses one ledger entry.
///
/// Keys are immutable, hashable, and totally ordered; every stage and
/// delta in the transaction layer iterates in key order so results are
/// deterministic regardless of insertion history.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LedgerKey {
    /// An account, addressed by its id.
    Account { account_id: AccountId },
    /// A trust line, addressed by holder and asset.
    TrustLine { account_id: AccountId, asset: Asset },
    /// An offer, addressed by seller and offer id.
    Offer { seller_id: AccountId, offer_id: i64 },
    /// A data record, addressed by owner and name.
    Data {
        account_id: AccountId,
        data_name: String,
    },
}

impl LedgerKey {
    /// Shorthand for an account key.
    pub fn account(account_id: AccountId) -> Self {
        LedgerKey::Account { account_id }
    }

    /// Shorthand for an offer key.
    pub fn offer(seller_id: AccountId, offer_id: i64) -> Self {
        LedgerKey::Offer {
            seller_id,
            offer_id,
        }
    }

    /// The kind of entry this key addresses.
    pub fn kind(&self) -> LedgerEntryKind {
        match self {
            LedgerKey::Account { .. } => LedgerEntryKind::Account,
            LedgerKey::TrustLine { .. } => LedgerEntryKind::TrustLine,
            LedgerKey::Offer { .. } => LedgerEntryKind::Offer,
            LedgerKey::Data { .. } => LedgerEntryKind::Data,
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKey::Account { account_id } => write!(f, "account:{}", account_id),
            LedgerKey::TrustLine { account_id, asset } => {
                write!(f, "trustline:{}:{}", account_id, asset)
            }
            LedgerKey::Offer {
                seller_id,
                offer_id,
            } => write!(f, "offer:{}:{}", seller_id, offer_id),
            LedgerKey::Data {
                account_id,
                data_name,
            } => write!(f, "data:{}:{}", account_id, data_name),
        }
    }
}
