// crates/permission-gate-core/tests/memory_store.rs
// ============================================================================
// Module: In-Memory Store Tests
// Description: Transaction staging, rollback, and audit chaining.
// Purpose: Pin commit and drop behavior of the in-memory store.
// ============================================================================
//! ## Overview
//! Drives [`InMemoryPermissionStore`] through committed and abandoned
//! transactions and checks what readers see afterwards.

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

use permission_gate_core::ActionKind;
use permission_gate_core::AuditActionType;
use permission_gate_core::AuditRecord;
use permission_gate_core::AuditTable;
use permission_gate_core::ClientMetadata;
use permission_gate_core::Grantee;
use permission_gate_core::InMemoryPermissionStore;
use permission_gate_core::InstrumentFilter;
use permission_gate_core::NewPermissionRule;
use permission_gate_core::PermissionKind;
use permission_gate_core::PermissionLevel;
use permission_gate_core::PermissionStore;
use permission_gate_core::ResourceKind;
use permission_gate_core::RuleId;
use permission_gate_core::RuleQuery;
use permission_gate_core::RuleScope;
use permission_gate_core::Timestamp;
use permission_gate_core::UserId;
use permission_gate_core::verify_audit_chain;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn user(raw: u64) -> UserId {
    UserId::from_raw(raw).expect("nonzero user id")
}

fn now() -> Timestamp {
    Timestamp::from_unix_millis(1_767_225_600_000)
}

fn rule(grantee: Grantee) -> NewPermissionRule {
    NewPermissionRule {
        grantor: user(10),
        grantee,
        permission_kind: PermissionKind::DataSharing,
        resource: ResourceKind::Positions,
        action: Some(ActionKind::View),
        level: PermissionLevel::Allow,
        scope: RuleScope::Specific,
        instrument_filter: InstrumentFilter::Unfiltered,
        priority: None,
        granted_by: user(10),
        expires_at: None,
        notes: None,
    }
}

fn record(record_id: u64) -> AuditRecord {
    AuditRecord {
        actor: user(10),
        target: Grantee::User(user(11)),
        action_type: AuditActionType::Grant,
        table: AuditTable::UserPermissions,
        record_id: Some(record_id),
        old_values: None,
        new_values: None,
        reason: None,
        recorded_at: now(),
        client: ClientMetadata::default(),
    }
}

fn committed_rule(store: &InMemoryPermissionStore) -> RuleId {
    let mut txn = store.begin().unwrap();
    let stored = txn.insert_rule(&rule(Grantee::User(user(11))), now()).unwrap();
    txn.append_audit(record(stored.id.get())).unwrap();
    txn.commit().unwrap();
    stored.id
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn dropped_transaction_leaves_committed_rows_untouched() {
    let store = InMemoryPermissionStore::new();
    let id = committed_rule(&store);

    let mut txn = store.begin().unwrap();
    txn.revoke_rule(id, user(10), now()).unwrap();
    assert!(txn.rule(id).unwrap().unwrap().revoked_at.is_some());
    txn.insert_rule(&rule(Grantee::Everyone), now()).unwrap();
    txn.append_audit(record(2)).unwrap();
    drop(txn);

    let rules = store.find_rules(&RuleQuery::default()).unwrap();
    assert_eq!(rules.len(), 1);
    assert!(rules[0].revoked_at.is_none());
    assert_eq!(store.audit_chain().unwrap().len(), 1);
}

#[test]
fn committed_delta_extends_tables_and_chain() {
    let store = InMemoryPermissionStore::new();
    let first = committed_rule(&store);

    let mut txn = store.begin().unwrap();
    txn.revoke_rule(first, user(10), now()).unwrap();
    let second = txn.insert_rule(&rule(Grantee::Everyone), now()).unwrap();
    txn.append_audit(record(second.id.get())).unwrap();
    txn.commit().unwrap();

    assert_eq!(second.id.get(), first.get() + 1);
    let rules = store.find_rules(&RuleQuery::default()).unwrap();
    assert_eq!(rules.len(), 2);
    assert!(rules.iter().find(|rule| rule.id == first).unwrap().revoked_at.is_some());

    let chain = store.audit_chain().unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1].prev_hash, chain[0].hash);
    verify_audit_chain(&chain).unwrap();
}

#[test]
fn rolled_back_identifiers_are_released() {
    let store = InMemoryPermissionStore::new();
    let mut txn = store.begin().unwrap();
    txn.insert_rule(&rule(Grantee::Everyone), now()).unwrap();
    drop(txn);

    let id = committed_rule(&store);
    assert_eq!(id.get(), 1);
}
