//! Deltas: the net changes a frame represents relative to its parent.

use quill_types::{LedgerEntry, LedgerHeader, LedgerKey};
use std::collections::BTreeMap;

/// Net change to one entry: the value visible through the frame and the
/// value visible through its parent when the delta was taken.
///
/// `current` is `None` iff the net effect is erasure; `previous` is `None`
/// iff the key did not resolve through the parent chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDelta {
    pub current: Option<LedgerEntry>,
    pub previous: Option<LedgerEntry>,
}

impl EntryDelta {
    /// The entry did not exist before and does now.
    pub fn is_created(&self) -> bool {
        self.current.is_some() && self.previous.is_none()
    }

    /// The entry existed before and has a (possibly identical) value now.
    pub fn is_updated(&self) -> bool {
        self.current.is_some() && self.previous.is_some()
    }

    /// The entry existed before and does not now.
    pub fn is_erased(&self) -> bool {
        self.current.is_none() && self.previous.is_some()
    }
}

/// Net change to the singleton ledger header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDelta {
    pub current: LedgerHeader,
    pub previous: LedgerHeader,
}

impl HeaderDelta {
    /// Whether the frame changed the header at all.
    pub fn is_modified(&self) -> bool {
        self.current != self.previous
    }
}

/// The complete set of net changes of one frame, keyed for deterministic
/// iteration. Consumed by downstream apply logic; extracting it seals the
/// frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerDelta {
    pub entries: BTreeMap<LedgerKey, EntryDelta>,
    pub header: HeaderDelta,
}

impl LedgerDelta {
    /// Whether the frame changed nothing: no entry deltas and an
    /// untouched header.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && !self.header.is_modified()
    }
}
