// crates/permission-gate-store-sqlite/tests/sqlite_service.rs
// ============================================================================
// Module: SQLite-Backed Service Tests
// Description: End-to-end permission flows running on the SQLite store.
// Purpose: Ensure evaluation, revocation, and audit behave the same on disk.
// ============================================================================

//! ## Overview
//! Drives [`PermissionService`] against a file-backed store, reopening the
//! database between steps to prove decisions come from persisted rows.

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
use std::sync::Arc;

use permission_gate_core::ActionKind;
use permission_gate_core::DataSharingIntent;
use permission_gate_core::DecisionReason;
use permission_gate_core::EvaluationRequest;
use permission_gate_core::FixedClock;
use permission_gate_core::IdentityProfile;
use permission_gate_core::MutationContext;
use permission_gate_core::PermissionService;
use permission_gate_core::PermissionServiceConfig;
use permission_gate_core::ResourceKind;
use permission_gate_core::RevokeOutcome;
use permission_gate_core::Role;
use permission_gate_core::SharingScope;
use permission_gate_core::StaticIdentityDirectory;
use permission_gate_core::Timestamp;
use permission_gate_core::UserId;
use permission_gate_store_sqlite::SqlitePermissionStore;
use permission_gate_store_sqlite::SqliteStoreConfig;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const NOW_MS: i64 = 1_767_225_600_000;

fn user(raw: u64) -> UserId {
    UserId::from_raw(raw).expect("nonzero user id")
}

fn profile(id: u64, role: Role) -> IdentityProfile {
    IdentityProfile {
        user_id: user(id),
        role: Some(role),
        organization: None,
        owned_organizations: BTreeSet::new(),
    }
}

fn service(path: &Path) -> PermissionService {
    let store = SqlitePermissionStore::new(SqliteStoreConfig::new(path)).unwrap();
    PermissionService::new(
        Arc::new(store),
        Arc::new(StaticIdentityDirectory::new(vec![
            profile(10, Role::Editor),
            profile(11, Role::Viewer),
            profile(12, Role::Viewer),
        ])),
        Arc::new(FixedClock::new(Timestamp::from_unix_millis(NOW_MS))),
        PermissionServiceConfig::default(),
    )
}

fn view_positions(actor: u64) -> EvaluationRequest {
    EvaluationRequest::new(user(actor), ActionKind::View, ResourceKind::Positions)
        .with_owner(user(10))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn sharing_decisions_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("permissions.sqlite");
    let ids = service(&path)
        .grant_data_sharing(&MutationContext::new(user(10)), &DataSharingIntent {
            grantor: user(10),
            scope: SharingScope::EveryoneExcept(vec![user(12)]),
            resources: vec![ResourceKind::Positions],
            expires_at: None,
            notes: None,
        })
        .unwrap();
    assert_eq!(ids.len(), 2);

    let reopened = service(&path);
    let allowed = reopened.evaluate(&view_positions(11)).unwrap();
    assert!(allowed.allowed);
    assert_eq!(allowed.reason, DecisionReason::ExplicitGrant);
    let denied = reopened.evaluate(&view_positions(12)).unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.reason, DecisionReason::ExplicitDeny);
    assert_eq!(reopened.verify_audit_log().unwrap(), 2);
}

#[test]
fn revocation_persists_and_extends_the_chain() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("permissions.sqlite");
    let ctx = MutationContext::new(user(10));
    let ids = service(&path)
        .grant_data_sharing(&ctx, &DataSharingIntent {
            grantor: user(10),
            scope: SharingScope::Specific(vec![user(11)]),
            resources: vec![ResourceKind::Positions],
            expires_at: None,
            notes: None,
        })
        .unwrap();

    let svc = service(&path);
    assert_eq!(svc.revoke(&ctx, ids[0]).unwrap(), RevokeOutcome::Revoked);
    assert_eq!(service(&path).revoke(&ctx, ids[0]).unwrap(), RevokeOutcome::AlreadyRevoked);

    let reopened = service(&path);
    let decision = reopened.evaluate(&view_positions(11)).unwrap();
    assert_ne!(decision.reason, DecisionReason::ExplicitGrant);
    assert_eq!(reopened.verify_audit_log().unwrap(), 2);
    let page = reopened.list_audit_log(Some(user(11)), 0, None).unwrap();
    assert_eq!(page.len(), 2);
}
