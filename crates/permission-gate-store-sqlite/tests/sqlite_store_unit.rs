// crates/permission-gate-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Permission Store Unit Tests
// Description: Targeted integrity tests for the SQLite permission store.
// Purpose: Validate path safety, schema versioning, transactions, append-only
//          audit rows, and corruption detection.
// ============================================================================

//! ## Overview
//! Unit-level tests for `SQLite` store invariants:
//! - Path safety checks (directory rejection)
//! - Schema version validation
//! - Rollback on dropped transactions and durability across reopen
//! - Append-only enforcement on the audit table
//! - Payload/row identifier mismatches surface as corruption

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use permission_gate_core::ActionKind;
use permission_gate_core::AuditActionType;
use permission_gate_core::AuditQuery;
use permission_gate_core::AuditRecord;
use permission_gate_core::AuditTable;
use permission_gate_core::ClientMetadata;
use permission_gate_core::Enforcement;
use permission_gate_core::Grantee;
use permission_gate_core::GranteeFilter;
use permission_gate_core::InstrumentFilter;
use permission_gate_core::NewPermissionRule;
use permission_gate_core::NewRestriction;
use permission_gate_core::PermissionKind;
use permission_gate_core::PermissionLevel;
use permission_gate_core::PermissionStore;
use permission_gate_core::ResourceKind;
use permission_gate_core::RestrictionKind;
use permission_gate_core::RestrictionQuery;
use permission_gate_core::RuleId;
use permission_gate_core::RuleQuery;
use permission_gate_core::RuleScope;
use permission_gate_core::StoreError;
use permission_gate_core::Timestamp;
use permission_gate_core::UserId;
use permission_gate_core::verify_audit_chain;
use permission_gate_store_sqlite::SqlitePermissionStore;
use permission_gate_store_sqlite::SqliteStoreConfig;
use permission_gate_store_sqlite::SqliteStoreError;
use permission_gate_store_sqlite::SqliteStoreMode;
use permission_gate_store_sqlite::SqliteSyncMode;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const NOW_MS: i64 = 1_767_225_600_000;

fn user(raw: u64) -> UserId {
    UserId::from_raw(raw).expect("nonzero user id")
}

fn now() -> Timestamp {
    Timestamp::from_unix_millis(NOW_MS)
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("permissions.sqlite")
}

fn open(path: &Path) -> SqlitePermissionStore {
    SqlitePermissionStore::new(SqliteStoreConfig {
        path: path.to_path_buf(),
        busy_timeout_ms: 1_000,
        journal_mode: SqliteStoreMode::Delete,
        sync_mode: SqliteSyncMode::Normal,
        read_pool_size: 2,
    })
    .expect("open sqlite store")
}

fn rule(grantor: u64, grantee: Grantee, level: PermissionLevel) -> NewPermissionRule {
    NewPermissionRule {
        grantor: user(grantor),
        grantee,
        permission_kind: PermissionKind::DataSharing,
        resource: ResourceKind::Positions,
        action: Some(ActionKind::View),
        level,
        scope: match grantee {
            Grantee::Everyone => RuleScope::All,
            Grantee::User(_) => RuleScope::Specific,
        },
        instrument_filter: InstrumentFilter::Unfiltered,
        priority: None,
        granted_by: user(grantor),
        expires_at: None,
        notes: Some("desk share".to_string()),
    }
}

fn restriction(target: u64) -> NewRestriction {
    NewRestriction {
        restricted_user: user(target),
        imposed_by: user(1),
        kind: RestrictionKind::ActionLimit,
        resource: None,
        action: ActionKind::Create,
        instrument_keys: BTreeSet::new(),
        priority: 5,
        enforcement: Enforcement::Hard,
        expires_at: None,
        notes: None,
    }
}

fn audit(actor: u64, target: Grantee, offset_ms: i64) -> AuditRecord {
    AuditRecord {
        actor: user(actor),
        target,
        action_type: AuditActionType::Grant,
        table: AuditTable::UserPermissions,
        record_id: Some(1),
        old_values: None,
        new_values: None,
        reason: None,
        recorded_at: now().plus_millis(offset_ms),
        client: ClientMetadata::default(),
    }
}

fn page(subject: Option<UserId>, offset: usize, limit: usize) -> AuditQuery {
    AuditQuery {
        subject,
        offset,
        limit,
    }
}

// ============================================================================
// SECTION: Path and Schema
// ============================================================================

#[test]
fn directory_path_is_rejected() {
    let dir = TempDir::new().unwrap();
    let result = SqlitePermissionStore::new(SqliteStoreConfig::new(dir.path()));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn missing_parent_directories_are_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("permissions.sqlite");
    let store = SqlitePermissionStore::new(SqliteStoreConfig::new(&path)).unwrap();
    assert_eq!(store.config().busy_timeout_ms, 5_000);
    assert!(path.exists());
}

#[test]
fn unknown_schema_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    drop(open(&path));
    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = ?1", params![99_i64]).unwrap();
    drop(connection);

    let result = SqlitePermissionStore::new(SqliteStoreConfig::new(&path));
    assert!(matches!(result, Err(SqliteStoreError::VersionMismatch(_))));
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

#[test]
fn dropped_transaction_rolls_back() {
    let dir = TempDir::new().unwrap();
    let store = open(&db_path(&dir));
    {
        let mut txn = store.begin().unwrap();
        txn.insert_rule(&rule(10, Grantee::Everyone, PermissionLevel::Allow), now()).unwrap();
        txn.append_audit(audit(10, Grantee::Everyone, 0)).unwrap();
    }
    assert!(store.find_rules(&RuleQuery::default()).unwrap().is_empty());
    assert!(store.audit_chain().unwrap().is_empty());

    let mut txn = store.begin().unwrap();
    let stored =
        txn.insert_rule(&rule(10, Grantee::Everyone, PermissionLevel::Allow), now()).unwrap();
    txn.commit().unwrap();
    assert_eq!(stored.id.get(), 1);
}

#[test]
fn zero_read_pool_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = SqliteStoreConfig {
        read_pool_size: 0,
        ..SqliteStoreConfig::new(db_path(&dir))
    };
    let result = SqlitePermissionStore::new(config);
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn reads_proceed_while_a_write_transaction_is_open() {
    let dir = TempDir::new().unwrap();
    let store = SqlitePermissionStore::new(SqliteStoreConfig::new(db_path(&dir))).unwrap();
    let mut txn = store.begin().unwrap();
    txn.insert_rule(&rule(10, Grantee::Everyone, PermissionLevel::Allow), now()).unwrap();
    txn.commit().unwrap();

    let mut open_txn = store.begin().unwrap();
    open_txn
        .insert_rule(&rule(10, Grantee::User(user(11)), PermissionLevel::Deny), now())
        .unwrap();

    let reader = store.clone();
    let (sender, receiver) = mpsc::channel();
    let handle = thread::spawn(move || {
        let rules = reader.find_rules(&RuleQuery::default()).map(|rules| rules.len());
        let restrictions =
            reader.find_restrictions(&RestrictionQuery::default()).map(|rows| rows.len());
        let _ = sender.send((rules, restrictions));
    });
    let (rules, restrictions) =
        receiver.recv_timeout(Duration::from_secs(5)).expect("read blocked by open write");
    assert_eq!(rules.unwrap(), 1);
    assert_eq!(restrictions.unwrap(), 0);
    handle.join().unwrap();

    open_txn.commit().unwrap();
    assert_eq!(store.find_rules(&RuleQuery::default()).unwrap().len(), 2);
}

#[test]
fn committed_rows_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    {
        let store = open(&path);
        let mut txn = store.begin().unwrap();
        txn.insert_rule(&rule(10, Grantee::Everyone, PermissionLevel::Allow), now()).unwrap();
        txn.insert_rule(&rule(10, Grantee::User(user(11)), PermissionLevel::Deny), now())
            .unwrap();
        txn.insert_restriction(&restriction(11), now()).unwrap();
        txn.append_audit(audit(10, Grantee::Everyone, 0)).unwrap();
        txn.append_audit(audit(10, Grantee::User(user(11)), 1)).unwrap();
        txn.commit().unwrap();
    }

    let store = open(&path);
    let rules = store.find_rules(&RuleQuery::default()).unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[1].grantee, Grantee::User(user(11)));
    assert_eq!(rules[1].notes.as_deref(), Some("desk share"));
    let restrictions = store
        .find_restrictions(&RestrictionQuery {
            restricted_user: Some(user(11)),
            ..RestrictionQuery::default()
        })
        .unwrap();
    assert_eq!(restrictions.len(), 1);
    let chain = store.audit_chain().unwrap();
    assert_eq!(chain.len(), 2);
    verify_audit_chain(&chain).unwrap();
}

#[test]
fn revocation_hides_rules_from_active_queries() {
    let dir = TempDir::new().unwrap();
    let store = open(&db_path(&dir));
    let mut txn = store.begin().unwrap();
    let stored = txn
        .insert_rule(&rule(10, Grantee::User(user(11)), PermissionLevel::Allow), now())
        .unwrap();
    txn.commit().unwrap();

    let mut txn = store.begin().unwrap();
    let revoked = txn.revoke_rule(stored.id, user(10), now().plus_seconds(5)).unwrap();
    txn.commit().unwrap();
    assert_eq!(revoked.revoked_by, Some(user(10)));

    let active = RuleQuery {
        active_at: Some(now().plus_seconds(10)),
        ..RuleQuery::default()
    };
    assert!(store.find_rules(&active).unwrap().is_empty());
    let all = store.find_rules(&RuleQuery::default()).unwrap();
    assert_eq!(all[0].revoked_at, Some(now().plus_seconds(5)));

    let mut txn = store.begin().unwrap();
    let missing = txn.revoke_rule(RuleId::from_raw(99).unwrap(), user(10), now());
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

#[test]
fn grantee_filter_includes_everyone_rows() {
    let dir = TempDir::new().unwrap();
    let store = open(&db_path(&dir));
    let mut txn = store.begin().unwrap();
    txn.insert_rule(&rule(10, Grantee::Everyone, PermissionLevel::Allow), now()).unwrap();
    txn.insert_rule(&rule(10, Grantee::User(user(11)), PermissionLevel::Deny), now()).unwrap();
    txn.insert_rule(&rule(10, Grantee::User(user(12)), PermissionLevel::Deny), now()).unwrap();
    txn.commit().unwrap();

    let for_actor = store
        .find_rules(&RuleQuery {
            grantee: Some(GranteeFilter::ActorOrEveryone(user(11))),
            ..RuleQuery::default()
        })
        .unwrap();
    assert_eq!(for_actor.len(), 2);

    let everyone_only = store
        .find_rules(&RuleQuery {
            grantee: Some(GranteeFilter::Exactly(Grantee::Everyone)),
            ..RuleQuery::default()
        })
        .unwrap();
    assert_eq!(everyone_only.len(), 1);
    assert_eq!(everyone_only[0].level, PermissionLevel::Allow);
}

// ============================================================================
// SECTION: Audit Table
// ============================================================================

#[test]
fn audit_pages_are_newest_first_and_subject_filtered() {
    let dir = TempDir::new().unwrap();
    let store = open(&db_path(&dir));
    let mut txn = store.begin().unwrap();
    for offset in 0 .. 5 {
        txn.append_audit(audit(10, Grantee::User(user(11)), offset)).unwrap();
    }
    txn.append_audit(audit(20, Grantee::Everyone, 10)).unwrap();
    txn.commit().unwrap();

    let newest = store.list_audit(&page(None, 0, 2)).unwrap();
    assert_eq!(newest.iter().map(|entry| entry.id.get()).collect::<Vec<_>>(), vec![6, 5]);
    let second = store.list_audit(&page(None, 2, 2)).unwrap();
    assert_eq!(second.iter().map(|entry| entry.id.get()).collect::<Vec<_>>(), vec![4, 3]);
    assert_eq!(store.list_audit(&page(Some(user(11)), 0, 100)).unwrap().len(), 5);
    assert_eq!(store.list_audit(&page(Some(user(20)), 0, 100)).unwrap().len(), 1);
    assert!(store.list_audit(&page(None, 10, 100)).unwrap().is_empty());
}

#[test]
fn audit_rows_reject_update_and_delete() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let store = open(&path);
    let mut txn = store.begin().unwrap();
    txn.append_audit(audit(10, Grantee::Everyone, 0)).unwrap();
    txn.commit().unwrap();
    drop(store);

    let connection = Connection::open(&path).unwrap();
    let update = connection.execute("UPDATE permission_audit_log SET actor = 99", params![]);
    assert!(update.is_err());
    let delete = connection.execute("DELETE FROM permission_audit_log", params![]);
    assert!(delete.is_err());
}

#[test]
fn payload_id_mismatch_is_reported_as_corruption() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    {
        let store = open(&path);
        let mut txn = store.begin().unwrap();
        txn.insert_rule(&rule(10, Grantee::Everyone, PermissionLevel::Allow), now()).unwrap();
        txn.commit().unwrap();
    }
    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE user_permissions SET id = 7 WHERE id = 1", params![]).unwrap();
    drop(connection);

    let store = open(&path);
    let result = store.find_rules(&RuleQuery::default());
    assert!(matches!(result, Err(StoreError::Corrupt(_))));
}

#[test]
fn garbled_payload_is_reported_as_corruption() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    {
        let store = open(&path);
        let mut txn = store.begin().unwrap();
        txn.insert_restriction(&restriction(11), now()).unwrap();
        txn.commit().unwrap();
    }
    let connection = Connection::open(&path).unwrap();
    connection
        .execute("UPDATE trading_restrictions SET restriction_json = '{not json'", params![])
        .unwrap();
    drop(connection);

    let store = open(&path);
    let result = store.find_restrictions(&RestrictionQuery::default());
    assert!(matches!(result, Err(StoreError::Corrupt(_))));
}
