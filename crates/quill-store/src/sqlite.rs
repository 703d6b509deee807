//! SQLite-backed store.
//!
//! Layout:
//!
//! - `storestate`: single-row operational state, including the ledger
//!   header (JSON).
//! - `entries`: every live entry, keyed by the JSON encoding of its
//!   [`LedgerKey`]. This is the point-lookup table.
//! - `offers`: one row per live offer, with asset and price columns so the
//!   order-book queries run off an index instead of scanning `entries`.
//! - `accounts`: balance and inflation destination per account, feeding
//!   the vote-tally aggregate.
//!
//! The `price` column is a precomputed float used only to let the
//! best-offer index return rows in near-final order; distinct rationals
//! closer than f64 resolution collapse to the same float, so the decoded
//! rows are re-ranked with the exact rational comparison before being
//! returned.

use crate::{BackingStore, Result, StoreChange, StoreError};
use quill_types::{
    AccountId, Asset, InflationWinner, LedgerEntry, LedgerEntryData, LedgerEntryKind,
    LedgerHeader, LedgerKey,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS storestate (
    statename  TEXT NOT NULL PRIMARY KEY,
    state      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entries (
    key        TEXT NOT NULL PRIMARY KEY,
    kind       INTEGER NOT NULL,
    entry      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS offers (
    sellerid     TEXT NOT NULL,
    offerid      INTEGER NOT NULL,
    sellingasset TEXT NOT NULL,
    buyingasset  TEXT NOT NULL,
    price        REAL NOT NULL,
    entry        TEXT NOT NULL,
    PRIMARY KEY (sellerid, offerid)
);

CREATE INDEX IF NOT EXISTS bestofferindex
    ON offers (buyingasset, sellingasset, price, offerid);
CREATE INDEX IF NOT EXISTS offerbyseller ON offers (sellerid);

CREATE TABLE IF NOT EXISTS accounts (
    accountid     TEXT NOT NULL PRIMARY KEY,
    balance       INTEGER NOT NULL,
    inflationdest TEXT
);

CREATE INDEX IF NOT EXISTS accountbalances
    ON accounts (inflationdest, balance) WHERE inflationdest IS NOT NULL;
"#;

const HEADER_STATE_NAME: &str = "ledgerheader";

/// A [`BackingStore`] persisted in a SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    ///
    /// A fresh database is seeded with [`LedgerHeader::genesis`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!(path = %path.display(), "opening sqlite store");
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store, primarily for testing.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL for concurrent readers, NORMAL sync as the safety/speed balance.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;
        conn.execute_batch(SCHEMA)?;

        let store = SqliteStore { conn };
        if store.read_header()?.is_none() {
            debug!("seeding fresh store with genesis header");
            store.put_header(&store.conn, &LedgerHeader::genesis())?;
        }
        Ok(store)
    }

    fn read_header(&self) -> Result<Option<LedgerHeader>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT state FROM storestate WHERE statename = ?1")?;
        let encoded: Option<String> = stmt
            .query_row(params![HEADER_STATE_NAME], |row| row.get(0))
            .optional()?;
        match encoded {
            Some(encoded) => Ok(Some(serde_json::from_str(&encoded)?)),
            None => Ok(None),
        }
    }

    fn put_header(&self, conn: &Connection, header: &LedgerHeader) -> Result<()> {
        let encoded = serde_json::to_string(header)?;
        conn.execute(
            "INSERT INTO storestate (statename, state) VALUES (?1, ?2) \
             ON CONFLICT(statename) DO UPDATE SET state = excluded.state",
            params![HEADER_STATE_NAME, encoded],
        )?;
        Ok(())
    }

    fn apply_change(conn: &Connection, change: &StoreChange) -> Result<()> {
        match change {
            StoreChange::Upsert(entry) => {
                let key = entry.key();
                conn.execute(
                    "INSERT INTO entries (key, kind, entry) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(key) DO UPDATE SET kind = excluded.kind, entry = excluded.entry",
                    params![
                        encode_key(&key)?,
                        kind_tag(key.kind()),
                        serde_json::to_string(entry)?
                    ],
                )?;
                match &entry.data {
                    LedgerEntryData::Offer(offer) => {
                        conn.execute(
                            "INSERT INTO offers \
                             (sellerid, offerid, sellingasset, buyingasset, price, entry) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                             ON CONFLICT(sellerid, offerid) DO UPDATE SET \
                             sellingasset = excluded.sellingasset, \
                             buyingasset = excluded.buyingasset, \
                             price = excluded.price, \
                             entry = excluded.entry",
                            params![
                                offer.seller_id.to_string(),
                                offer.offer_id,
                                encode_asset(&offer.selling)?,
                                encode_asset(&offer.buying)?,
                                offer.price.as_f64(),
                                serde_json::to_string(entry)?
                            ],
                        )?;
                    }
                    LedgerEntryData::Account(account) => {
                        conn.execute(
                            "INSERT INTO accounts (accountid, balance, inflationdest) \
                             VALUES (?1, ?2, ?3) \
                             ON CONFLICT(accountid) DO UPDATE SET \
                             balance = excluded.balance, \
                             inflationdest = excluded.inflationdest",
                            params![
                                account.account_id.to_string(),
                                account.balance,
                                account.inflation_dest.map(|d| d.to_string())
                            ],
                        )?;
                    }
                    LedgerEntryData::TrustLine(_) | LedgerEntryData::Data(_) => {}
                }
            }
            StoreChange::Delete(key) => {
                conn.execute(
                    "DELETE FROM entries WHERE key = ?1",
                    params![encode_key(key)?],
                )?;
                match key {
                    LedgerKey::Offer {
                        seller_id,
                        offer_id,
                    } => {
                        conn.execute(
                            "DELETE FROM offers WHERE sellerid = ?1 AND offerid = ?2",
                            params![seller_id.to_string(), offer_id],
                        )?;
                    }
                    LedgerKey::Account { account_id } => {
                        conn.execute(
                            "DELETE FROM accounts WHERE accountid = ?1",
                            params![account_id.to_string()],
                        )?;
                    }
                    LedgerKey::TrustLine { .. } | LedgerKey::Data { .. } => {}
                }
            }
        }
        Ok(())
    }
}

impl BackingStore for SqliteStore {
    fn load_header(&self) -> Result<LedgerHeader> {
        self.read_header()?.ok_or(StoreError::MissingHeader)
    }

    fn load_entry(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT entry FROM entries WHERE key = ?1")?;
        let encoded: Option<String> = stmt
            .query_row(params![encode_key(key)?], |row| row.get(0))
            .optional()?;
        match encoded {
            Some(encoded) => Ok(Some(serde_json::from_str(&encoded)?)),
            None => Ok(None),
        }
    }

    fn load_all_offers(&self) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare_cached("SELECT entry FROM offers")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        decode_entries(rows)
    }

    fn load_best_offers(&self, buying: &Asset, selling: &Asset) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT entry FROM offers \
             WHERE buyingasset = ?1 AND sellingasset = ?2 \
             ORDER BY price DESC, offerid ASC",
        )?;
        let rows = stmt.query_map(
            params![encode_asset(buying)?, encode_asset(selling)?],
            |row| row.get::<_, String>(0),
        )?;
        // The float sort column can collapse near-equal rationals; the
        // exact re-rank is a near-no-op on the already-ordered rows.
        Ok(crate::sort_offers_best_first(decode_entries(rows)?))
    }

    fn load_offers_by_account_and_asset(
        &self,
        account: &AccountId,
        asset: &Asset,
    ) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT entry FROM offers \
             WHERE sellerid = ?1 AND (buyingasset = ?2 OR sellingasset = ?2)",
        )?;
        let rows = stmt.query_map(params![account.to_string(), encode_asset(asset)?], |row| {
            row.get::<_, String>(0)
        })?;
        decode_entries(rows)
    }

    fn inflation_winners(&self, min_balance: i64) -> Result<Vec<InflationWinner>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT inflationdest, SUM(balance) AS votes FROM accounts \
             WHERE inflationdest IS NOT NULL AND balance >= ?1 \
             GROUP BY inflationdest \
             ORDER BY votes DESC, inflationdest DESC",
        )?;
        let rows = stmt.query_map(params![min_balance], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut winners = Vec::new();
        for row in rows {
            let (dest, votes) = row?;
            let destination = AccountId::from_hex(&dest).ok_or_else(|| {
                StoreError::Integrity(format!("malformed inflation destination: {dest}"))
            })?;
            winners.push(InflationWinner { destination, votes });
        }
        Ok(winners)
    }

    fn write_batch(
        &mut self,
        header: Option<&LedgerHeader>,
        changes: &[StoreChange],
    ) -> Result<()> {
        debug!(changes = changes.len(), "applying write batch");
        let tx = self.conn.transaction()?;
        if let Some(header) = header {
            let encoded = serde_json::to_string(header)?;
            tx.execute(
                "INSERT INTO storestate (statename, state) VALUES (?1, ?2) \
                 ON CONFLICT(statename) DO UPDATE SET state = excluded.state",
                params![HEADER_STATE_NAME, encoded],
            )?;
        }
        for change in changes {
            Self::apply_change(&tx, change)?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Canonical TEXT encoding of a ledger key.
fn encode_key(key: &LedgerKey) -> Result<String> {
    Ok(serde_json::to_string(key)?)
}

/// Canonical TEXT encoding of an asset.
fn encode_asset(asset: &Asset) -> Result<String> {
    Ok(serde_json::to_string(asset)?)
}

fn kind_tag(kind: LedgerEntryKind) -> i64 {
    match kind {
        LedgerEntryKind::Account => 0,
        LedgerEntryKind::TrustLine => 1,
        LedgerEntryKind::Offer => 2,
        LedgerEntryKind::Data => 3,
    }
}

fn decode_entries(
    rows: impl Iterator<Item = rusqlite::Result<String>>,
) -> Result<Vec<LedgerEntry>> {
    let mut entries = Vec::new();
    for row in rows {
        entries.push(serde_json::from_str(&row?)?);
    }
    Ok(entries)
}
