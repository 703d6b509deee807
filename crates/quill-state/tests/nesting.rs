//! Nesting, commit/rollback, and delta semantics across frame chains.

use quill_state::{LedgerTxnRoot, LedgerTxnRootConfig, StateError, TxnParent};
use quill_store::{BackingStore, MemoryStore, StoreChange};
use quill_types::{
    AccountEntry, AccountId, LedgerEntry, LedgerEntryData, LedgerKey,
};

fn account_entry(seed: u8, balance: i64) -> LedgerEntry {
    LedgerEntry {
        last_modified_ledger_seq: 1,
        data: LedgerEntryData::Account(AccountEntry {
            account_id: AccountId::from_seed(seed),
            balance,
            seq_num: 1,
            num_sub_entries: 0,
            inflation_dest: None,
            flags: 0,
            home_domain: String::new(),
        }),
    }
}

fn set_balance(entry: &mut LedgerEntry, balance: i64) {
    if let LedgerEntryData::Account(account) = &mut entry.data {
        account.balance = balance;
    }
}

fn root_with(entries: &[LedgerEntry]) -> LedgerTxnRoot {
    let mut store = MemoryStore::default();
    let changes: Vec<_> = entries.iter().cloned().map(StoreChange::Upsert).collect();
    store.write_batch(None, &changes).unwrap();
    LedgerTxnRoot::new(Box::new(store), LedgerTxnRootConfig::default()).unwrap()
}

#[test]
fn test_delta_of_fresh_create_has_no_previous() {
    let root = root_with(&[]);
    let txn = root.begin().unwrap();
    let entry = account_entry(1, 100);
    txn.create(entry.clone()).unwrap();

    let delta = txn.get_delta().unwrap();
    let entry_delta = &delta.entries[&entry.key()];
    assert!(entry_delta.is_created());
    assert_eq!(entry_delta.current, Some(entry));
    assert_eq!(entry_delta.previous, None);
}

#[test]
fn test_delta_previous_reflects_frame_creation_view() {
    // A child creates an entry and commits into the outer frame; a second
    // child mutates it and commits. The outer frame's delta must show the
    // final value as a creation: nothing existed below the outer frame.
    let root = root_with(&[]);
    let outer = root.begin().unwrap();
    let key = LedgerKey::account(AccountId::from_seed(1));

    let child = outer.begin().unwrap();
    child.create(account_entry(1, 100)).unwrap();
    child.commit().unwrap();

    let child = outer.begin().unwrap();
    let handle = child.load(&key).unwrap().unwrap();
    handle.modify(|entry| set_balance(entry, 777)).unwrap();
    drop(handle);
    child.commit().unwrap();

    let delta = outer.get_delta().unwrap();
    let entry_delta = &delta.entries[&key];
    assert!(entry_delta.is_created());
    assert_eq!(
        entry_delta.current.as_ref().unwrap().as_account().unwrap().balance,
        777
    );
}

#[test]
fn test_delta_update_keeps_ancestor_previous() {
    let stored = account_entry(1, 100);
    let root = root_with(&[stored.clone()]);
    let txn = root.begin().unwrap();
    let key = stored.key();

    let handle = txn.load(&key).unwrap().unwrap();
    handle.modify(|entry| set_balance(entry, 250)).unwrap();
    drop(handle);

    let delta = txn.get_delta().unwrap();
    let entry_delta = &delta.entries[&key];
    assert!(entry_delta.is_updated());
    assert_eq!(entry_delta.previous, Some(stored));
    assert_eq!(
        entry_delta.current.as_ref().unwrap().as_account().unwrap().balance,
        250
    );
}

#[test]
fn test_delta_excludes_plain_loads() {
    let root = root_with(&[account_entry(1, 100)]);
    let txn = root.begin().unwrap();
    let key = LedgerKey::account(AccountId::from_seed(1));

    let handle = txn.load(&key).unwrap().unwrap();
    drop(handle);
    let observer = txn.load_without_record(&key).unwrap().unwrap();
    drop(observer);

    let delta = txn.get_delta().unwrap();
    assert!(delta.is_empty());
}

#[test]
fn test_resurrection_nets_to_update() {
    let stored = account_entry(1, 100);
    let root = root_with(&[stored.clone()]);
    let txn = root.begin().unwrap();
    let key = stored.key();

    txn.erase(&key).unwrap();
    let replacement = account_entry(1, 999);
    txn.create(replacement.clone()).unwrap();

    let delta = txn.get_delta().unwrap();
    let entry_delta = &delta.entries[&key];
    assert!(entry_delta.is_updated());
    assert_eq!(entry_delta.current, Some(replacement));
    assert_eq!(entry_delta.previous, Some(stored));
}

#[test]
fn test_resurrection_at_depth() {
    // The store holds the entry, the parent erases it, and a child frame
    // re-creates it. After the child commits, the parent's net effect is
    // an update of the stored value, not a create.
    let stored = account_entry(1, 100);
    let root = root_with(&[stored.clone()]);
    let parent = root.begin().unwrap();
    let key = stored.key();

    parent.erase(&key).unwrap();

    let child = parent.begin().unwrap();
    let replacement = account_entry(1, 999);
    child.create(replacement.clone()).unwrap();
    child.commit().unwrap();

    let delta = parent.get_delta().unwrap();
    let entry_delta = &delta.entries[&key];
    assert!(entry_delta.is_updated());
    assert_eq!(entry_delta.current, Some(replacement));
    assert_eq!(entry_delta.previous, Some(stored));
}

#[test]
fn test_erase_fails_at_depth() {
    let stored = account_entry(1, 100);
    let root = root_with(&[stored.clone()]);
    let outer = root.begin().unwrap();
    outer.erase(&stored.key()).unwrap();

    let middle = outer.begin().unwrap();
    let inner = middle.begin().unwrap();

    // Erased two levels up: dead for the whole chain below.
    assert!(matches!(
        inner.erase(&stored.key()),
        Err(StateError::KeyNotFound(_))
    ));
    // Never existed anywhere.
    let missing = LedgerKey::account(AccountId::from_seed(9));
    assert!(matches!(
        inner.erase(&missing),
        Err(StateError::KeyNotFound(_))
    ));
}

#[test]
fn test_create_then_erase_leaves_no_delta() {
    let root = root_with(&[]);
    let txn = root.begin().unwrap();
    let entry = account_entry(1, 100);
    let key = entry.key();

    txn.create(entry).unwrap();
    txn.erase(&key).unwrap();

    let delta = txn.get_delta().unwrap();
    assert!(delta.is_empty());
}

#[test]
fn test_create_duplicate_fails_at_depth() {
    let root = root_with(&[account_entry(1, 100)]);
    let depth1 = root.begin().unwrap();
    let depth2 = depth1.begin().unwrap();
    let depth3 = depth2.begin().unwrap();
    assert!(matches!(
        depth3.create(account_entry(1, 5)),
        Err(StateError::DuplicateKey(_))
    ));
}

#[test]
fn test_commit_round_trip_for_create_modify_erase() {
    let root = root_with(&[account_entry(1, 100), account_entry(2, 200)]);
    let parent = root.begin().unwrap();

    let child = parent.begin().unwrap();
    child.create(account_entry(3, 300)).unwrap();
    let handle = child
        .load(&LedgerKey::account(AccountId::from_seed(1)))
        .unwrap()
        .unwrap();
    handle.modify(|entry| set_balance(entry, 111)).unwrap();
    drop(handle);
    child
        .erase(&LedgerKey::account(AccountId::from_seed(2)))
        .unwrap();
    child.commit().unwrap();

    let created = parent
        .load(&LedgerKey::account(AccountId::from_seed(3)))
        .unwrap()
        .unwrap();
    assert_eq!(created.current().unwrap().as_account().unwrap().balance, 300);
    drop(created);
    let modified = parent
        .load(&LedgerKey::account(AccountId::from_seed(1)))
        .unwrap()
        .unwrap();
    assert_eq!(modified.current().unwrap().as_account().unwrap().balance, 111);
    drop(modified);
    assert!(parent
        .load(&LedgerKey::account(AccountId::from_seed(2)))
        .unwrap()
        .is_none());
}

#[test]
fn test_rollback_round_trip_for_create_modify_erase() {
    let root = root_with(&[account_entry(1, 100), account_entry(2, 200)]);
    let parent = root.begin().unwrap();

    let child = parent.begin().unwrap();
    child.create(account_entry(3, 300)).unwrap();
    let handle = child
        .load(&LedgerKey::account(AccountId::from_seed(1)))
        .unwrap()
        .unwrap();
    handle.modify(|entry| set_balance(entry, 111)).unwrap();
    drop(handle);
    child
        .erase(&LedgerKey::account(AccountId::from_seed(2)))
        .unwrap();
    child.rollback();

    assert!(parent
        .load(&LedgerKey::account(AccountId::from_seed(3)))
        .unwrap()
        .is_none());
    let untouched = parent
        .load(&LedgerKey::account(AccountId::from_seed(1)))
        .unwrap()
        .unwrap();
    assert_eq!(untouched.current().unwrap().as_account().unwrap().balance, 100);
    drop(untouched);
    assert!(parent
        .load(&LedgerKey::account(AccountId::from_seed(2)))
        .unwrap()
        .is_some());
}

#[test]
fn test_commit_chain_lands_in_store() {
    let root = root_with(&[]);

    let depth1 = root.begin().unwrap();
    let depth2 = depth1.begin().unwrap();
    let depth3 = depth2.begin().unwrap();
    depth3.create(account_entry(1, 42)).unwrap();
    depth3.commit().unwrap();
    depth2.commit().unwrap();
    depth1.commit().unwrap();

    let check = root.begin().unwrap();
    let handle = check
        .load(&LedgerKey::account(AccountId::from_seed(1)))
        .unwrap()
        .unwrap();
    assert_eq!(handle.current().unwrap().as_account().unwrap().balance, 42);
}

#[test]
fn test_repeatable_read_survives_root_side_changes() {
    // Once a frame has loaded an entry, it keeps seeing its own staged
    // copy even if a sibling chain committed a different value earlier.
    let root = root_with(&[account_entry(1, 100)]);

    let txn = root.begin().unwrap();
    let key = LedgerKey::account(AccountId::from_seed(1));
    let handle = txn.load(&key).unwrap().unwrap();
    assert_eq!(handle.current().unwrap().as_account().unwrap().balance, 100);
    drop(handle);
    txn.rollback();

    let txn = root.begin().unwrap();
    let handle = txn.load(&key).unwrap().unwrap();
    handle.modify(|entry| set_balance(entry, 500)).unwrap();
    drop(handle);
    let again = txn.load(&key).unwrap().unwrap();
    assert_eq!(again.current().unwrap().as_account().unwrap().balance, 500);
}

#[test]
fn test_header_change_propagates_through_chain() {
    let root = root_with(&[]);
    let outer = root.begin().unwrap();

    let inner = outer.begin().unwrap();
    let header = inner.load_header().unwrap();
    header
        .modify(|h| {
            h.ledger_seq += 1;
            h.fee_pool += 500;
        })
        .unwrap();
    drop(header);
    inner.commit().unwrap();

    let delta = outer.get_delta().unwrap();
    assert!(delta.header.is_modified());
    assert_eq!(delta.header.current.ledger_seq, 2);
    assert_eq!(delta.header.previous.ledger_seq, 1);
    outer.commit().unwrap();

    assert_eq!(root.header().fee_pool, 500);
}
