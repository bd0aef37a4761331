//! `flush_commit` visibility-checkpoint tests.

use tessera_common::error::ErrorKind;
use tessera_index_core::model::{EntryKey, Resource, ShardName, ShardScope};
use tessera_testkit::TestPolicy;

use crate::tests::{memory_fixture, scripted_fixture};
use crate::txn::TxnState;

#[test]
fn test_flush_commit_scoped_to_one_shard() {
    let fixture = memory_fixture(&[("user", "a"), ("order", "b")], TestPolicy::sequential());
    let txn = fixture.begin_txn();

    txn.create(&Resource::new("user", "1").with_field("name", "ada"))
        .unwrap();
    txn.create(&Resource::new("order", "2").with_field("item", "loom"))
        .unwrap();

    txn.flush_commit(&ShardScope::shards(["a"])).unwrap();

    // Only "a" became visible; "b" is still staged, and both stay dirty.
    assert!(txn.find(&EntryKey::new("user", "1")).unwrap().is_some());
    assert!(txn.find(&EntryKey::new("order", "2")).unwrap().is_none());
    assert_eq!(
        txn.dirty_shards(),
        vec![ShardName::new("a"), ShardName::new("b")]
    );
    assert_eq!(txn.state(), TxnState::Active);

    // The rest of the unit-of-work proceeds normally.
    txn.commit(true).unwrap();
    assert!(txn.find(&EntryKey::new("order", "2")).unwrap().is_some());
}

#[test]
fn test_flush_commit_empty_scope_flushes_full_dirty_set() {
    let fixture = memory_fixture(&[("user", "a"), ("order", "b")], TestPolicy::sequential());
    let txn = fixture.begin_txn();

    txn.create(&Resource::new("user", "1")).unwrap();
    txn.create(&Resource::new("order", "2")).unwrap();
    txn.flush_commit(&ShardScope::all()).unwrap();

    assert!(txn.find(&EntryKey::new("user", "1")).unwrap().is_some());
    assert!(txn.find(&EntryKey::new("order", "2")).unwrap().is_some());
    assert_eq!(txn.dirty_shards().len(), 2);
    assert_eq!(txn.state(), TxnState::Active);
}

#[test]
fn test_flush_commit_by_alias_scope() {
    let fixture = memory_fixture(&[("user", "a"), ("order", "b")], TestPolicy::sequential());
    let txn = fixture.begin_txn();

    txn.create(&Resource::new("user", "1")).unwrap();
    txn.create(&Resource::new("order", "2")).unwrap();
    txn.flush_commit(&ShardScope::aliases(["order"])).unwrap();

    assert!(txn.find(&EntryKey::new("user", "1")).unwrap().is_none());
    assert!(txn.find(&EntryKey::new("order", "2")).unwrap().is_some());
}

#[test]
fn test_commit_after_flush_commit_is_idempotent() {
    let fixture = memory_fixture(&[("user", "a")], TestPolicy::sequential());
    let txn = fixture.begin_txn();

    txn.create(&Resource::new("user", "1").with_field("name", "ada"))
        .unwrap();
    txn.flush_commit(&ShardScope::all()).unwrap();

    // Nothing further is staged; the final commit must succeed as a no-op
    // without duplicating or disturbing the flushed entry.
    txn.commit(true).unwrap();
    assert_eq!(txn.state(), TxnState::Committed);
    assert_eq!(
        fixture
            .directory
            .entry_count(&ShardName::new("a"))
            .unwrap(),
        1
    );
}

#[test]
fn test_operations_after_flush_commit_land_in_final_commit() {
    let fixture = memory_fixture(&[("user", "a")], TestPolicy::sequential());
    let txn = fixture.begin_txn();

    txn.create(&Resource::new("user", "1")).unwrap();
    txn.flush_commit(&ShardScope::all()).unwrap();
    txn.create(&Resource::new("user", "2")).unwrap();

    // The checkpointed handle keeps accepting work.
    assert!(txn.find(&EntryKey::new("user", "2")).unwrap().is_none());
    txn.commit(true).unwrap();
    assert!(txn.find(&EntryKey::new("user", "2")).unwrap().is_some());
    assert_eq!(
        fixture
            .directory
            .entry_count(&ShardName::new("a"))
            .unwrap(),
        2
    );
}

#[test]
fn test_flush_commit_touches_only_dirty_intersection() {
    let fixture = scripted_fixture(&[("user", "a"), ("order", "b")], TestPolicy::sequential());
    let txn = &fixture.txn;

    txn.create(&Resource::new("user", "1")).unwrap();
    txn.create(&Resource::new("order", "2")).unwrap();
    txn.flush_commit(&ShardScope::shards(["a"])).unwrap();

    assert_eq!(fixture.directory.calls("a").commits, 1);
    assert_eq!(fixture.directory.calls("b").commits, 0);
    // No prepare phase and no handle closing happened.
    assert_eq!(fixture.directory.calls("a").prepares, 0);
    assert_eq!(txn.dirty_shards().len(), 2);
}

#[test]
fn test_flush_commit_ignores_undirty_scope_shards() {
    let fixture = scripted_fixture(&[("user", "a"), ("order", "b")], TestPolicy::sequential());
    let txn = &fixture.txn;

    txn.create(&Resource::new("user", "1")).unwrap();
    // "b" is in scope but was never touched; flushing must not open it.
    txn.flush_commit(&ShardScope::shards(["a", "b"])).unwrap();

    assert_eq!(fixture.directory.calls("a").commits, 1);
    assert_eq!(fixture.directory.calls("b").opens, 0);
    assert_eq!(fixture.directory.calls("b").commits, 0);
}

#[test]
fn test_flush_commit_rejected_after_finalization() {
    let fixture = scripted_fixture(&[("user", "a")], TestPolicy::sequential());
    fixture.txn.create(&Resource::new("user", "1")).unwrap();
    fixture.txn.commit(true).unwrap();

    let err = fixture.txn.flush_commit(&ShardScope::all()).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
}
