//! Scoped handles over staged entries and the ledger header.
//!
//! A handle is a move-only claim on one key (or the header slot) in one
//! frame: at most one handle per key is active at a time, and every access
//! revalidates the claim. Handles go inert when their frame commits, rolls
//! back, seals, or opens a child, when the entry is erased, or when the
//! handle is dropped; using an inert handle fails with
//! [`StateError::InvalidState`](crate::StateError::InvalidState).
//!
//! Validity is tracked by generation: the frame records the generation of
//! the currently active handle per key, so a stale handle dropped after a
//! successor was issued cannot deactivate the successor.

use crate::txn::TxnInner;
use crate::Result;
use crate::StateError;
use quill_types::{LedgerEntry, LedgerHeader, LedgerKey};
use std::cell::RefCell;
use std::rc::Weak;

fn with_frame<T>(
    frame: &Weak<RefCell<TxnInner>>,
    f: impl FnOnce(&mut TxnInner) -> Result<T>,
) -> Result<T> {
    match frame.upgrade() {
        Some(frame) => {
            let mut inner = frame.borrow_mut();
            f(&mut *inner)
        }
        None => Err(StateError::InvalidState("handle outlived its frame")),
    }
}

/// Exclusive mutable access to one staged entry.
#[derive(Debug)]
pub struct EntryHandle {
    frame: Weak<RefCell<TxnInner>>,
    key: LedgerKey,
    gen: u64,
}

impl EntryHandle {
    pub(crate) fn new(frame: Weak<RefCell<TxnInner>>, key: LedgerKey, gen: u64) -> Self {
        EntryHandle { frame, key, gen }
    }

    /// The key this handle claims.
    pub fn key(&self) -> &LedgerKey {
        &self.key
    }

    /// The entry's current staged value.
    pub fn current(&self) -> Result<LedgerEntry> {
        with_frame(&self.frame, |inner| inner.entry_value(&self.key, self.gen))
    }

    /// Replace the staged value. The new value must keep the same key.
    pub fn update(&self, entry: LedgerEntry) -> Result<()> {
        with_frame(&self.frame, |inner| {
            inner.entry_update(&self.key, self.gen, entry)
        })
    }

    /// Read-modify-write the staged value in one step.
    pub fn modify(&self, f: impl FnOnce(&mut LedgerEntry)) -> Result<()> {
        let mut entry = self.current()?;
        f(&mut entry);
        self.update(entry)
    }

    /// Stage erasure of the entry in the owning frame.
    ///
    /// Consumes the handle; it is inert afterwards by construction.
    pub fn erase(self) -> Result<()> {
        with_frame(&self.frame, |inner| inner.entry_erase(&self.key, self.gen))
    }
}

impl Drop for EntryHandle {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.upgrade() {
            if let Ok(mut inner) = frame.try_borrow_mut() {
                inner.release_entry(&self.key, self.gen);
            }
        }
    }
}

/// Read-only access to one staged entry.
///
/// Just as exclusive as [`EntryHandle`] — holding one blocks any other
/// handle for the key — but exposes no mutation.
#[derive(Debug)]
pub struct ConstEntryHandle {
    frame: Weak<RefCell<TxnInner>>,
    key: LedgerKey,
    gen: u64,
}

impl ConstEntryHandle {
    pub(crate) fn new(frame: Weak<RefCell<TxnInner>>, key: LedgerKey, gen: u64) -> Self {
        ConstEntryHandle { frame, key, gen }
    }

    /// The key this handle claims.
    pub fn key(&self) -> &LedgerKey {
        &self.key
    }

    /// The entry's staged value.
    pub fn current(&self) -> Result<LedgerEntry> {
        with_frame(&self.frame, |inner| inner.entry_value(&self.key, self.gen))
    }
}

impl Drop for ConstEntryHandle {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.upgrade() {
            if let Ok(mut inner) = frame.try_borrow_mut() {
                inner.release_entry(&self.key, self.gen);
            }
        }
    }
}

/// Exclusive access to the staged ledger header; one per frame at a time.
#[derive(Debug)]
pub struct HeaderHandle {
    frame: Weak<RefCell<TxnInner>>,
    gen: u64,
}

impl HeaderHandle {
    pub(crate) fn new(frame: Weak<RefCell<TxnInner>>, gen: u64) -> Self {
        HeaderHandle { frame, gen }
    }

    /// The header's current staged value.
    pub fn current(&self) -> Result<LedgerHeader> {
        with_frame(&self.frame, |inner| inner.header_value(self.gen))
    }

    /// Replace the staged header.
    pub fn update(&self, header: LedgerHeader) -> Result<()> {
        with_frame(&self.frame, |inner| inner.header_update(self.gen, header))
    }

    /// Read-modify-write the staged header in one step.
    pub fn modify(&self, f: impl FnOnce(&mut LedgerHeader)) -> Result<()> {
        let mut header = self.current()?;
        f(&mut header);
        self.update(header)
    }
}

impl Drop for HeaderHandle {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.upgrade() {
            if let Ok(mut inner) = frame.try_borrow_mut() {
                inner.release_header(self.gen);
            }
        }
    }
}
