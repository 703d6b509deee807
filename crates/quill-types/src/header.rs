//! The ledger header: the singleton record describing one closed ledger.

use serde::{Deserialize, Serialize};

/// The singleton ledger header.
///
/// There is exactly one header slot in ledger state; the transaction layer
/// exposes it through a dedicated header handle rather than a [`crate::LedgerKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeader {
    /// Protocol version governing this ledger's behavior.
    pub ledger_version: u32,
    /// Hash of the previous ledger header.
    pub previous_ledger_hash: [u8; 32],
    /// Ledger sequence number, monotonically increasing from genesis.
    pub ledger_seq: u32,
    /// Close time as a Unix timestamp in seconds.
    pub close_time: u64,
    /// Total native tokens in circulation.
    pub total_coins: i64,
    /// Fees collected and not yet redistributed.
    pub fee_pool: i64,
    /// Number of inflation rounds that have run.
    pub inflation_seq: u32,
    /// Last id assigned from the global id pool (offer ids and the like).
    pub id_pool: u64,
    /// Base fee per operation.
    pub base_fee: u32,
    /// Base reserve per ledger entry.
    pub base_reserve: u32,
    /// Maximum transaction set size per ledger.
    pub max_tx_set_size: u32,
}

impl LedgerHeader {
    /// A genesis header suitable for initializing a fresh store.
    pub fn genesis() -> Self {
        LedgerHeader {
            ledger_version: 0,
            previous_ledger_hash: [0u8; 32],
            ledger_seq: 1,
            close_time: 0,
            total_coins: 100_000_000_000_000_000,
            fee_pool: 0,
            inflation_seq: 0,
            id_pool: 0,
            base_fee: 100,
            base_reserve: 5_000_000,
            max_tx_set_size: 1000,
        }
    }
}
