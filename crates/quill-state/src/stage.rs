//! Per-frame staging records and the commit-time merge rules.

use quill_types::LedgerEntry;

/// One staged record in a frame: the frame's view of a single key
/// relative to its parent.
///
/// `Loaded` is a repeatable-read copy only; it is not a net change and is
/// excluded from deltas. The other three variants describe the net effect
/// of the frame on the key: created here, updated relative to the parent,
/// or erased relative to the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StageEntry {
    /// The key did not resolve through the parent; this frame created it.
    Created(LedgerEntry),
    /// The key resolved through the parent; this frame replaced its value.
    Updated(LedgerEntry),
    /// The key resolved through the parent; this frame deleted it.
    Erased,
    /// Copy of the parent's value, staged for repeatable reads.
    Loaded(LedgerEntry),
}

impl StageEntry {
    /// The live value this record presents, if any.
    pub(crate) fn live(&self) -> Option<&LedgerEntry> {
        match self {
            StageEntry::Created(entry)
            | StageEntry::Updated(entry)
            | StageEntry::Loaded(entry) => Some(entry),
            StageEntry::Erased => None,
        }
    }

    /// Whether this record is a net change relative to the parent.
    pub(crate) fn is_net(&self) -> bool {
        !matches!(self, StageEntry::Loaded(_))
    }

    /// Merge this record (from a committing child) onto the parent's
    /// existing record for the same key.
    ///
    /// Returns the parent's new record, or `None` when the two annihilate
    /// (the parent created the key and the child erased it). The
    /// classification rules keep the parent's record meaningful relative
    /// to *its* parent:
    ///
    /// - a key created in the parent stays `Created` through child
    ///   updates, and vanishes entirely on child erase;
    /// - a key erased in the parent and re-created in the child nets to
    ///   `Updated`, since the grandparent still holds the original;
    /// - a child `Loaded` copy never overrides a parent net change.
    pub(crate) fn merge_onto(self, parent: Option<StageEntry>) -> Option<StageEntry> {
        match (parent, self) {
            (None, child) => Some(child),

            // Child only observed the key; the parent's record (net change
            // or an equally fresh copy) stands.
            (Some(parent), StageEntry::Loaded(_)) => Some(parent),

            // Child erased the key.
            (Some(StageEntry::Created(_)), StageEntry::Erased) => None,
            (Some(_), StageEntry::Erased) => Some(StageEntry::Erased),

            // Child wrote a value. Relative to the grandparent, the key is
            // new iff the parent created it; an erase-then-create across
            // the two frames nets to an update of the grandparent's entry.
            (Some(StageEntry::Created(_)), StageEntry::Created(entry))
            | (Some(StageEntry::Created(_)), StageEntry::Updated(entry)) => {
                Some(StageEntry::Created(entry))
            }
            (Some(_), StageEntry::Created(entry)) | (Some(_), StageEntry::Updated(entry)) => {
                Some(StageEntry::Updated(entry))
            }
        }
    }
}
