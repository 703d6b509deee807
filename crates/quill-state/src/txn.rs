//! Nested transaction frames over ledger state.
//!
//! A [`LedgerTxn`] is one level of copy-on-write transaction. Frames form
//! a singly linked chain ending at a [`LedgerTxnRoot`](crate::LedgerTxnRoot):
//! writes land in the innermost frame's stage, reads miss downward through
//! the parent chain, and commit merges the stage into the parent (or into
//! durable storage when the parent is the root).
//!
//! Frame lifecycle is a small state machine:
//!
//! ```text
//! Open ──begin()──▶ Open (has child) ──child terminates──▶ Open
//! Open ──get_delta()──▶ Sealed ──commit()/rollback()──▶ Terminated
//! Open ──commit()/rollback()──▶ Terminated
//! ```
//!
//! All mutating operations and queries require `Open` with no child;
//! `commit` additionally allows `Sealed`; `rollback` is allowed from any
//! non-terminated state and cascades to live descendants. Dropping a frame
//! without committing is an implicit rollback.

use crate::delta::{EntryDelta, HeaderDelta, LedgerDelta};
use crate::handle::{ConstEntryHandle, EntryHandle, HeaderHandle};
use crate::root::RootInner;
use crate::stage::StageEntry;
use crate::{Result, StateError};
use quill_store::StoreChange;
use quill_types::{
    AccountId, Asset, InflationWinner, LedgerEntry, LedgerEntryKind, LedgerHeader, LedgerKey,
    OfferEntry,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::{Rc, Weak};
use tracing::trace;

/// Anything a transaction frame can be opened over: another frame or the
/// root. Both enforce at most one active child at a time.
pub trait TxnParent {
    /// Open a child frame over this parent.
    ///
    /// Fails with [`StateError::InvalidState`] if a child is already
    /// attached, or (for a frame parent) if the frame is sealed or
    /// terminated. Opening a child deactivates every handle the parent
    /// frame has issued; only the innermost frame of a chain may hold
    /// active handles.
    fn begin(&self) -> Result<LedgerTxn>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameState {
    Open,
    Sealed,
    Terminated,
}

/// Operations gated by the frame state machine. `check_op` is the single
/// permission table; no operation does its own ad hoc state checks.
#[derive(Debug, Clone, Copy)]
enum FrameOp {
    /// create / erase / load / load_without_record / load_header, and the
    /// merged-view queries.
    Mutate,
    GetDelta,
    Commit,
    UnsealHeader,
}

/// The parent of a frame: either another frame or the root layer.
#[derive(Clone)]
pub(crate) enum ParentLink {
    Frame(Rc<RefCell<TxnInner>>),
    Root(Rc<RefCell<RootInner>>),
}

pub(crate) struct TxnInner {
    state: FrameState,
    parent: ParentLink,
    /// Weak so a leaked child cannot keep this frame alive; cleared when
    /// the child terminates.
    child: Option<Weak<RefCell<TxnInner>>>,
    stage: BTreeMap<LedgerKey, StageEntry>,
    /// Staged copy of the header, present once loaded in this frame.
    header: Option<LedgerHeader>,
    /// Active handle generation per key. A handle is valid only while its
    /// generation is the one recorded here, so a stale handle dropped late
    /// cannot deactivate a successor.
    active: HashMap<LedgerKey, u64>,
    active_header: Option<u64>,
    next_gen: u64,
}

impl TxnInner {
    fn check_op(&self, op: FrameOp) -> Result<()> {
        if self.state == FrameState::Terminated {
            return Err(StateError::InvalidState("frame is terminated"));
        }
        match op {
            FrameOp::Mutate | FrameOp::GetDelta => {
                if self.state == FrameState::Sealed {
                    Err(StateError::InvalidState("frame is sealed"))
                } else if self.child.is_some() {
                    Err(StateError::InvalidState("frame has an active child"))
                } else {
                    Ok(())
                }
            }
            FrameOp::Commit => {
                if self.child.is_some() {
                    Err(StateError::InvalidState("frame has an active child"))
                } else {
                    Ok(())
                }
            }
            FrameOp::UnsealHeader => {
                if self.state != FrameState::Sealed {
                    Err(StateError::InvalidState("frame is not sealed"))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn activate(&mut self, key: LedgerKey) -> u64 {
        self.next_gen += 1;
        self.active.insert(key, self.next_gen);
        self.next_gen
    }

    /// Terminate this frame in place: the stage is dropped and every
    /// handle it issued becomes inert. Detaching from the parent is the
    /// caller's job.
    fn terminate(&mut self) {
        self.state = FrameState::Terminated;
        self.stage.clear();
        self.header = None;
        self.active.clear();
        self.active_header = None;
    }

    // Handle-facing operations. Handles hold a weak frame pointer plus the
    // generation they were issued under; every call revalidates both.

    fn check_handle(&self, key: &LedgerKey, gen: u64) -> Result<()> {
        if self.active.get(key) == Some(&gen) {
            Ok(())
        } else {
            Err(StateError::InvalidState("handle is no longer active"))
        }
    }

    pub(crate) fn entry_value(&self, key: &LedgerKey, gen: u64) -> Result<LedgerEntry> {
        self.check_handle(key, gen)?;
        self.stage
            .get(key)
            .and_then(StageEntry::live)
            .cloned()
            .ok_or(StateError::InvalidState("handle has no staged value"))
    }

    pub(crate) fn entry_update(
        &mut self,
        key: &LedgerKey,
        gen: u64,
        entry: LedgerEntry,
    ) -> Result<()> {
        self.check_handle(key, gen)?;
        if entry.key() != *key {
            return Err(StateError::InvalidState("updated entry changes its key"));
        }
        let record = match self.stage.get(key) {
            // A value created here stays a create no matter how often it
            // is rewritten; observed or updated values become updates.
            Some(StageEntry::Created(_)) => StageEntry::Created(entry),
            Some(StageEntry::Updated(_)) | Some(StageEntry::Loaded(_)) => {
                StageEntry::Updated(entry)
            }
            Some(StageEntry::Erased) | None => {
                return Err(StateError::InvalidState("handle has no staged value"))
            }
        };
        self.stage.insert(key.clone(), record);
        Ok(())
    }

    pub(crate) fn entry_erase(&mut self, key: &LedgerKey, gen: u64) -> Result<()> {
        self.check_handle(key, gen)?;
        match self.stage.get(key) {
            Some(StageEntry::Created(_)) => {
                self.stage.remove(key);
            }
            _ => {
                self.stage.insert(key.clone(), StageEntry::Erased);
            }
        }
        self.active.remove(key);
        Ok(())
    }

    pub(crate) fn release_entry(&mut self, key: &LedgerKey, gen: u64) {
        if self.active.get(key) == Some(&gen) {
            self.active.remove(key);
        }
    }

    fn check_header_handle(&self, gen: u64) -> Result<()> {
        if self.active_header == Some(gen) {
            Ok(())
        } else {
            Err(StateError::InvalidState("header handle is no longer active"))
        }
    }

    pub(crate) fn header_value(&self, gen: u64) -> Result<LedgerHeader> {
        self.check_header_handle(gen)?;
        self.header
            .clone()
            .ok_or(StateError::InvalidState("header handle has no staged value"))
    }

    pub(crate) fn header_update(&mut self, gen: u64, header: LedgerHeader) -> Result<()> {
        self.check_header_handle(gen)?;
        self.header = Some(header);
        Ok(())
    }

    pub(crate) fn release_header(&mut self, gen: u64) {
        if self.active_header == Some(gen) {
            self.active_header = None;
        }
    }
}

/// Resolve a key through a parent chain, iteratively.
///
/// Returns the live value visible at `link`, missing downward through
/// ancestor stages until the root answers from its cache or the store.
fn resolve_through(link: &ParentLink, key: &LedgerKey) -> Result<Option<LedgerEntry>> {
    let mut link = link.clone();
    loop {
        match link {
            ParentLink::Frame(frame) => {
                let frame = frame.borrow();
                if let Some(record) = frame.stage.get(key) {
                    return Ok(record.live().cloned());
                }
                link = frame.parent.clone();
            }
            ParentLink::Root(root) => return root.borrow_mut().load_entry(key),
        }
    }
}

/// Resolve the header visible through a parent chain.
fn header_through(link: &ParentLink) -> Result<LedgerHeader> {
    let mut link = link.clone();
    loop {
        match link {
            ParentLink::Frame(frame) => {
                let frame = frame.borrow();
                if let Some(header) = &frame.header {
                    return Ok(header.clone());
                }
                link = frame.parent.clone();
            }
            ParentLink::Root(root) => return Ok(root.borrow().header.clone()),
        }
    }
}

/// The root at the end of a frame's parent chain.
fn root_of(inner: &TxnInner) -> Rc<RefCell<RootInner>> {
    let mut link = inner.parent.clone();
    loop {
        match link {
            ParentLink::Frame(frame) => {
                let next = frame.borrow().parent.clone();
                link = next;
            }
            ParentLink::Root(root) => return root,
        }
    }
}

/// Collect the innermost-wins net view of every staged key matching
/// `pred`, across this frame and all ancestor frames.
///
/// The value is the entry visible at this frame (`None` = erased). Keys
/// absent from the map are untouched by the chain and resolve at the root.
fn overrides_matching(
    inner: &TxnInner,
    pred: impl Fn(&LedgerKey) -> bool,
) -> BTreeMap<LedgerKey, Option<LedgerEntry>> {
    let mut view = BTreeMap::new();
    for (key, record) in &inner.stage {
        if pred(key) {
            view.insert(key.clone(), record.live().cloned());
        }
    }
    let mut link = inner.parent.clone();
    loop {
        match link {
            ParentLink::Frame(frame) => {
                let frame = frame.borrow();
                for (key, record) in &frame.stage {
                    if pred(key) && !view.contains_key(key) {
                        view.insert(key.clone(), record.live().cloned());
                    }
                }
                link = frame.parent.clone();
            }
            ParentLink::Root(_) => return view,
        }
    }
}

fn is_offer_key(key: &LedgerKey) -> bool {
    key.kind() == LedgerEntryKind::Offer
}

/// One level of nested copy-on-write transaction over ledger state.
///
/// Obtained from [`TxnParent::begin`] on a root or another frame. Always
/// terminated by exactly one of [`commit`](LedgerTxn::commit) or
/// [`rollback`](LedgerTxn::rollback); dropping an unterminated frame rolls
/// it back.
pub struct LedgerTxn {
    inner: Rc<RefCell<TxnInner>>,
}

impl LedgerTxn {
    pub(crate) fn over_root(root: Rc<RefCell<RootInner>>) -> LedgerTxn {
        LedgerTxn {
            inner: Rc::new(RefCell::new(TxnInner {
                state: FrameState::Open,
                parent: ParentLink::Root(root),
                child: None,
                stage: BTreeMap::new(),
                header: None,
                active: HashMap::new(),
                active_header: None,
                next_gen: 0,
            })),
        }
    }

    /// Stage a new entry and return a mutable handle over it.
    ///
    /// Fails with [`StateError::DuplicateKey`] if the key resolves to a
    /// live value anywhere in this frame or its ancestors.
    pub fn create(&self, entry: LedgerEntry) -> Result<EntryHandle> {
        let key = entry.key();
        let mut inner = self.inner.borrow_mut();
        inner.check_op(FrameOp::Mutate)?;

        let live = match inner.stage.get(&key) {
            Some(record) => record.live().is_some(),
            None => resolve_through(&inner.parent, &key)?.is_some(),
        };
        if live {
            return Err(StateError::DuplicateKey(key));
        }

        // Re-creating a key erased in this same frame nets to an update of
        // the ancestor value, not a create.
        let record = if matches!(inner.stage.get(&key), Some(StageEntry::Erased)) {
            StageEntry::Updated(entry)
        } else {
            StageEntry::Created(entry)
        };
        inner.stage.insert(key.clone(), record);
        let gen = inner.activate(key.clone());
        Ok(EntryHandle::new(Rc::downgrade(&self.inner), key, gen))
    }

    /// Stage erasure of a live entry. Any handle outstanding for the key
    /// is deactivated.
    ///
    /// Fails with [`StateError::KeyNotFound`] if the key does not resolve
    /// to a live value.
    pub fn erase(&self, key: &LedgerKey) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.check_op(FrameOp::Mutate)?;

        let local = inner.stage.get(key);
        let live = match local {
            Some(record) => record.live().is_some(),
            None => resolve_through(&inner.parent, key)?.is_some(),
        };
        if !live {
            return Err(StateError::KeyNotFound(key.clone()));
        }

        if matches!(inner.stage.get(key), Some(StageEntry::Created(_))) {
            // Created and erased in the same frame: no net change remains.
            inner.stage.remove(key);
        } else {
            inner.stage.insert(key.clone(), StageEntry::Erased);
        }
        inner.active.remove(key);
        Ok(())
    }

    /// Load a live entry into this frame and return a mutable handle, or
    /// `None` if the key has no live value.
    ///
    /// The entry is copied into this frame's stage, so reads repeat and
    /// writes stay local until commit. Fails with
    /// [`StateError::AlreadyActive`] if a handle for the key is already
    /// outstanding.
    pub fn load(&self, key: &LedgerKey) -> Result<Option<EntryHandle>> {
        let mut inner = self.inner.borrow_mut();
        inner.check_op(FrameOp::Mutate)?;
        if inner.active.contains_key(key) {
            return Err(StateError::AlreadyActive(key.clone()));
        }

        let present = match inner.stage.get(key) {
            Some(record) => record.live().is_some(),
            None => match resolve_through(&inner.parent, key)? {
                Some(entry) => {
                    inner.stage.insert(key.clone(), StageEntry::Loaded(entry));
                    true
                }
                None => false,
            },
        };
        if !present {
            return Ok(None);
        }
        let gen = inner.activate(key.clone());
        Ok(Some(EntryHandle::new(
            Rc::downgrade(&self.inner),
            key.clone(),
            gen,
        )))
    }

    /// Like [`load`](LedgerTxn::load), but returns a read-only handle.
    ///
    /// Observation only: the staged copy is never classified as a net
    /// change. The handle is just as exclusive as a mutable one — a
    /// second handle for the key still fails with
    /// [`StateError::AlreadyActive`].
    pub fn load_without_record(&self, key: &LedgerKey) -> Result<Option<ConstEntryHandle>> {
        let mut inner = self.inner.borrow_mut();
        inner.check_op(FrameOp::Mutate)?;
        if inner.active.contains_key(key) {
            return Err(StateError::AlreadyActive(key.clone()));
        }

        let present = match inner.stage.get(key) {
            Some(record) => record.live().is_some(),
            None => match resolve_through(&inner.parent, key)? {
                Some(entry) => {
                    inner.stage.insert(key.clone(), StageEntry::Loaded(entry));
                    true
                }
                None => false,
            },
        };
        if !present {
            return Ok(None);
        }
        let gen = inner.activate(key.clone());
        Ok(Some(ConstEntryHandle::new(
            Rc::downgrade(&self.inner),
            key.clone(),
            gen,
        )))
    }

    /// Load the singleton ledger header and return its handle.
    ///
    /// Fails with [`StateError::InvalidState`] if a header handle is
    /// already active in this frame.
    pub fn load_header(&self) -> Result<HeaderHandle> {
        let mut inner = self.inner.borrow_mut();
        inner.check_op(FrameOp::Mutate)?;
        if inner.active_header.is_some() {
            return Err(StateError::InvalidState("header handle already active"));
        }
        if inner.header.is_none() {
            let header = header_through(&inner.parent)?;
            inner.header = Some(header);
        }
        inner.next_gen += 1;
        let gen = inner.next_gen;
        inner.active_header = Some(gen);
        Ok(HeaderHandle::new(Rc::downgrade(&self.inner), gen))
    }

    /// Mutate the header of a sealed frame.
    ///
    /// Sealing freezes entry state but fee accounting still has to land in
    /// the header after the delta is taken; this is the only mutation a
    /// sealed frame permits. Fails with [`StateError::InvalidState`] if
    /// the header is already claimed — in particular, a reentrant call
    /// from inside the closure.
    pub fn unseal_header<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut LedgerHeader),
    {
        // Claim the header slot and take the staged copy out before
        // running the closure, so the closure executes with the frame
        // unborrowed and a reentrant call sees the claim.
        let (mut header, gen) = {
            let mut inner = self.inner.borrow_mut();
            inner.check_op(FrameOp::UnsealHeader)?;
            if inner.active_header.is_some() {
                return Err(StateError::InvalidState("header handle already active"));
            }
            let header = match inner.header.take() {
                Some(header) => header,
                None => header_through(&inner.parent)?,
            };
            inner.next_gen += 1;
            let gen = inner.next_gen;
            inner.active_header = Some(gen);
            (header, gen)
        };

        f(&mut header);

        let mut inner = self.inner.borrow_mut();
        inner.header = Some(header);
        inner.release_header(gen);
        Ok(())
    }

    /// Compute this frame's net changes against its parent and seal it.
    ///
    /// Sealing permanently disables create/erase/load on this frame and
    /// deactivates every handle it issued; only
    /// [`commit`](LedgerTxn::commit), [`rollback`](LedgerTxn::rollback)
    /// and [`unseal_header`](LedgerTxn::unseal_header) remain. A second
    /// call fails with [`StateError::InvalidState`].
    pub fn get_delta(&self) -> Result<LedgerDelta> {
        let mut inner = self.inner.borrow_mut();
        inner.check_op(FrameOp::GetDelta)?;

        let mut entries = BTreeMap::new();
        for (key, record) in &inner.stage {
            if !record.is_net() {
                continue;
            }
            let previous = resolve_through(&inner.parent, key)?;
            entries.insert(
                key.clone(),
                EntryDelta {
                    current: record.live().cloned(),
                    previous,
                },
            );
        }
        let previous = header_through(&inner.parent)?;
        let current = inner.header.clone().unwrap_or_else(|| previous.clone());

        inner.state = FrameState::Sealed;
        inner.active.clear();
        inner.active_header = None;
        trace!(changes = entries.len(), "sealed frame");

        Ok(LedgerDelta {
            entries,
            header: HeaderDelta { current, previous },
        })
    }

    /// Commit this frame: merge every net change into the parent's stage,
    /// or apply it atomically to storage when the parent is the root.
    ///
    /// Allowed while open with no child, or sealed. All handles issued by
    /// this frame are deactivated and the frame terminates either way; a
    /// storage failure surfaces as [`StateError::Store`] after the frame
    /// has already detached.
    pub fn commit(self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.check_op(FrameOp::Commit)?;

        let stage = std::mem::take(&mut inner.stage);
        let header = inner.header.take();
        let parent = inner.parent.clone();
        inner.terminate();
        drop(inner);

        match parent {
            ParentLink::Frame(parent) => {
                let mut parent = parent.borrow_mut();
                for (key, record) in stage {
                    let existing = parent.stage.remove(&key);
                    if let Some(merged) = record.merge_onto(existing) {
                        parent.stage.insert(key, merged);
                    }
                }
                if header.is_some() {
                    parent.header = header;
                }
                parent.child = None;
                Ok(())
            }
            ParentLink::Root(root) => {
                let mut changes = Vec::new();
                for (key, record) in stage {
                    match record {
                        StageEntry::Created(entry) | StageEntry::Updated(entry) => {
                            changes.push(StoreChange::Upsert(entry));
                        }
                        StageEntry::Erased => changes.push(StoreChange::Delete(key)),
                        StageEntry::Loaded(_) => {}
                    }
                }
                let mut root = root.borrow_mut();
                root.has_child = false;
                root.commit_child(header, changes)
            }
        }
    }

    /// Discard this frame's stage and terminate it.
    ///
    /// Live descendant frames are terminated as well. Dropping an
    /// uncommitted frame behaves identically.
    pub fn rollback(self) {
        self.rollback_in_place();
    }

    fn rollback_in_place(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.state == FrameState::Terminated {
            return;
        }
        let mut descendant = inner.child.take();
        let parent = inner.parent.clone();
        inner.terminate();
        drop(inner);

        // Terminate descendants iteratively; their wrappers may still be
        // alive in caller scopes and will see a terminated frame.
        while let Some(weak) = descendant {
            match weak.upgrade() {
                Some(frame) => {
                    let mut frame = frame.borrow_mut();
                    descendant = frame.child.take();
                    frame.terminate();
                }
                None => descendant = None,
            }
        }

        match parent {
            ParentLink::Frame(parent) => parent.borrow_mut().child = None,
            ParentLink::Root(root) => root.borrow_mut().has_child = false,
        }
    }

    /// Tally inflation votes over the merged view and return the top
    /// `max_winners` destinations.
    ///
    /// An account votes its full balance toward its inflation destination
    /// when that balance is at least `min_balance`. Results are sorted by
    /// (votes descending, destination descending) and never include a
    /// destination without qualifying votes. The answer is independent of
    /// how changes are distributed across the frame chain and of the
    /// root's cache configuration.
    pub fn query_inflation_winners(
        &self,
        max_winners: usize,
        min_balance: i64,
    ) -> Result<Vec<InflationWinner>> {
        let inner = self.inner.borrow();
        inner.check_op(FrameOp::Mutate)?;

        let changed = overrides_matching(&inner, |key| key.kind() == LedgerEntryKind::Account);
        let root = root_of(&inner);
        let mut root = root.borrow_mut();

        // Start from the store-level tally, then correct it for every
        // account the chain has touched: back out the stored version's
        // contribution and add the staged version's.
        let mut votes: BTreeMap<AccountId, i64> = root
            .inflation_winners(min_balance)?
            .into_iter()
            .map(|winner| (winner.destination, winner.votes))
            .collect();
        for (key, current) in &changed {
            let stored = root.load_entry(key)?;
            if let Some(account) = stored.as_ref().and_then(LedgerEntry::as_account) {
                if account.balance >= min_balance {
                    if let Some(dest) = account.inflation_dest {
                        *votes.entry(dest).or_insert(0) -= account.balance;
                    }
                }
            }
            if let Some(account) = current.as_ref().and_then(LedgerEntry::as_account) {
                if account.balance >= min_balance {
                    if let Some(dest) = account.inflation_dest {
                        *votes.entry(dest).or_insert(0) += account.balance;
                    }
                }
            }
        }

        let mut winners: Vec<InflationWinner> = votes
            .into_iter()
            .filter(|(_, votes)| *votes > 0)
            .map(|(destination, votes)| InflationWinner { destination, votes })
            .collect();
        winners.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then(b.destination.cmp(&a.destination))
        });
        winners.truncate(max_winners);
        Ok(winners)
    }

    /// Load every live offer in the merged view, grouped by seller.
    ///
    /// Each offer is loaded into this frame, so every returned handle is
    /// active and exclusive for its key.
    pub fn load_all_offers(&self) -> Result<BTreeMap<AccountId, Vec<EntryHandle>>> {
        let keys = {
            let inner = self.inner.borrow();
            inner.check_op(FrameOp::Mutate)?;

            let changed = overrides_matching(&inner, is_offer_key);
            let root = root_of(&inner);
            let base = root.borrow_mut().all_offers()?;

            let mut keys: BTreeSet<LedgerKey> = base
                .iter()
                .map(LedgerEntry::key)
                .filter(|key| !changed.contains_key(key))
                .collect();
            for (key, current) in &changed {
                if current.is_some() {
                    keys.insert(key.clone());
                }
            }
            keys
        };

        let mut offers: BTreeMap<AccountId, Vec<EntryHandle>> = BTreeMap::new();
        for key in keys {
            let seller = match &key {
                LedgerKey::Offer { seller_id, .. } => *seller_id,
                _ => continue,
            };
            if let Some(handle) = self.load(&key)? {
                offers.entry(seller).or_default().push(handle);
            }
        }
        Ok(offers)
    }

    /// Load the best live offer on the (buying, selling) book, if any.
    ///
    /// "Best" is the numerically highest price, ties broken by lowest
    /// offer id; the result is independent of which frame in the chain
    /// holds which offer and of the root's cache sizes.
    pub fn load_best_offer(&self, buying: &Asset, selling: &Asset) -> Result<Option<EntryHandle>> {
        let best_key = {
            let inner = self.inner.borrow();
            inner.check_op(FrameOp::Mutate)?;

            let changed = overrides_matching(&inner, is_offer_key);
            let root = root_of(&inner);
            let mut root = root.borrow_mut();

            let mut best: Option<OfferEntry> = None;
            for current in changed.values().flatten() {
                if let Some(offer) = current.as_offer() {
                    if offer.matches_pair(buying, selling) && is_better(offer, best.as_ref()) {
                        best = Some(offer.clone());
                    }
                }
            }
            // The root's list is sorted best-first, so the first offer the
            // chain has not overridden is the best the root can contribute.
            for entry in root.best_offers(buying, selling)? {
                if changed.contains_key(&entry.key()) {
                    continue;
                }
                if let Some(offer) = entry.as_offer() {
                    if is_better(offer, best.as_ref()) {
                        best = Some(offer.clone());
                    }
                }
                break;
            }
            best.map(|offer| LedgerKey::offer(offer.seller_id, offer.offer_id))
        };

        match best_key {
            Some(key) => self.load(&key),
            None => Ok(None),
        }
    }

    /// Load every live offer in the merged view whose seller is `account`
    /// and whose buying or selling asset is `asset`.
    pub fn load_offers_by_account_and_asset(
        &self,
        account: &AccountId,
        asset: &Asset,
    ) -> Result<Vec<EntryHandle>> {
        let keys = {
            let inner = self.inner.borrow();
            inner.check_op(FrameOp::Mutate)?;

            let changed = overrides_matching(&inner, is_offer_key);
            let root = root_of(&inner);
            let base = root.borrow_mut().offers_by_account_and_asset(account, asset)?;

            let mut keys: BTreeSet<LedgerKey> = base
                .iter()
                .map(LedgerEntry::key)
                .filter(|key| !changed.contains_key(key))
                .collect();
            for (key, current) in &changed {
                if let Some(offer) = current.as_ref().and_then(LedgerEntry::as_offer) {
                    if offer.seller_id == *account
                        && (offer.buying == *asset || offer.selling == *asset)
                    {
                        keys.insert(key.clone());
                    }
                }
            }
            keys
        };

        let mut offers = Vec::new();
        for key in keys {
            if let Some(handle) = self.load(&key)? {
                offers.push(handle);
            }
        }
        Ok(offers)
    }
}

fn is_better(candidate: &OfferEntry, best: Option<&OfferEntry>) -> bool {
    match best {
        Some(best) => candidate.cmp_order_book(best) == std::cmp::Ordering::Less,
        None => true,
    }
}

impl TxnParent for LedgerTxn {
    fn begin(&self) -> Result<LedgerTxn> {
        let mut inner = self.inner.borrow_mut();
        inner.check_op(FrameOp::Mutate)?;

        // Only the innermost frame may hold active handles; everything
        // this frame issued goes inert while the child lives.
        inner.active.clear();
        inner.active_header = None;

        let child = LedgerTxn {
            inner: Rc::new(RefCell::new(TxnInner {
                state: FrameState::Open,
                parent: ParentLink::Frame(self.inner.clone()),
                child: None,
                stage: BTreeMap::new(),
                header: None,
                active: HashMap::new(),
                active_header: None,
                next_gen: 0,
            })),
        };
        inner.child = Some(Rc::downgrade(&child.inner));
        Ok(child)
    }
}

impl Drop for LedgerTxn {
    fn drop(&mut self) {
        self.rollback_in_place();
    }
}
