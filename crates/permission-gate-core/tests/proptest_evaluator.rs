// crates/permission-gate-core/tests/proptest_evaluator.rs
// ============================================================================
// Module: Evaluator Property-Based Tests
// Description: Property tests for tier precedence and expansion shape.
// Purpose: Check deny-first and expansion counts across arbitrary inputs.
// ============================================================================

//! Property-based tests for evaluator and expander invariants.

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
use std::sync::Arc;

use permission_gate_core::ActionKind;
use permission_gate_core::DataSharingIntent;
use permission_gate_core::DecisionReason;
use permission_gate_core::EvaluationRequest;
use permission_gate_core::Evaluator;
use permission_gate_core::FixedClock;
use permission_gate_core::Grantee;
use permission_gate_core::InMemoryPermissionStore;
use permission_gate_core::InstrumentFilter;
use permission_gate_core::NewPermissionRule;
use permission_gate_core::PermissionKind;
use permission_gate_core::PermissionLevel;
use permission_gate_core::PermissionStore;
use permission_gate_core::ResourceKind;
use permission_gate_core::RoleDefaults;
use permission_gate_core::RuleScope;
use permission_gate_core::ScopeExpander;
use permission_gate_core::SharingScope;
use permission_gate_core::StaticIdentityDirectory;
use permission_gate_core::Timestamp;
use permission_gate_core::UserId;
use proptest::prelude::*;

const NOW_MS: i64 = 1_767_225_600_000;

fn user(raw: u64) -> UserId {
    UserId::from_raw(raw).expect("nonzero user id")
}

/// Generated rule: (everyone grantee, deny, action covers All, priority).
type RuleSpec = (bool, bool, bool, Option<i32>);

fn rule_strategy() -> impl Strategy<Value = RuleSpec> {
    (any::<bool>(), any::<bool>(), any::<bool>(), prop::option::of(0 .. 20_i32))
}

fn build_rule(spec: RuleSpec) -> NewPermissionRule {
    let (everyone, deny, blanket_action, priority) = spec;
    NewPermissionRule {
        grantor: user(100),
        grantee: if everyone { Grantee::Everyone } else { Grantee::User(user(5)) },
        permission_kind: PermissionKind::TradingAction,
        resource: ResourceKind::Orders,
        action: Some(if blanket_action { ActionKind::All } else { ActionKind::Exit }),
        level: if deny { PermissionLevel::Deny } else { PermissionLevel::Allow },
        scope: if everyone { RuleScope::All } else { RuleScope::Specific },
        instrument_filter: InstrumentFilter::Unfiltered,
        priority,
        granted_by: user(100),
        expires_at: None,
        notes: None,
    }
}

fn evaluate_after_inserting(specs: &[RuleSpec]) -> DecisionReason {
    let store = Arc::new(InMemoryPermissionStore::new());
    let now = Timestamp::from_unix_millis(NOW_MS);
    for (offset, spec) in specs.iter().enumerate() {
        let mut txn = store.begin().unwrap();
        txn.insert_rule(&build_rule(*spec), now.minus_seconds(i64::try_from(offset).unwrap()))
            .unwrap();
        txn.commit().unwrap();
    }
    let evaluator = Evaluator::new(
        store,
        Arc::new(StaticIdentityDirectory::new(Vec::new())),
        RoleDefaults::platform(),
        Arc::new(FixedClock::new(now)),
    );
    evaluator
        .evaluate(&EvaluationRequest::new(user(5), ActionKind::Exit, ResourceKind::Orders))
        .unwrap()
        .reason
}

proptest! {
    #[test]
    fn any_matching_deny_wins_in_every_insertion_order(
        specs in prop::collection::vec(rule_strategy(), 1 .. 8),
    ) {
        let expected = if specs.iter().any(|spec| spec.1) {
            DecisionReason::ExplicitDeny
        } else {
            DecisionReason::ExplicitGrant
        };
        prop_assert_eq!(evaluate_after_inserting(&specs), expected);
        let reversed: Vec<RuleSpec> = specs.iter().rev().copied().collect();
        prop_assert_eq!(evaluate_after_inserting(&reversed), expected);
    }

    #[test]
    fn everyone_except_expands_to_resources_times_excluded_plus_one(
        excluded in prop::collection::btree_set(2 .. 50_u64, 0 .. 6),
        resources in prop::collection::btree_set(0 .. ResourceKind::ALL.len(), 1 .. 5),
    ) {
        let resources: Vec<ResourceKind> =
            resources.into_iter().map(|index| ResourceKind::ALL[index]).collect();
        let excluded: Vec<UserId> = excluded.into_iter().map(user).collect();
        let intent = DataSharingIntent {
            grantor: user(1),
            scope: SharingScope::EveryoneExcept(excluded.clone()),
            resources: resources.clone(),
            expires_at: None,
            notes: None,
        };
        let plan = ScopeExpander::default().expand_data_sharing(&intent, user(1)).unwrap();
        prop_assert_eq!(plan.rules.len(), resources.len() * (excluded.len() + 1));
        let denied: BTreeSet<UserId> = plan
            .rules
            .iter()
            .filter(|rule| rule.level == PermissionLevel::Deny)
            .filter_map(|rule| rule.grantee.user())
            .collect();
        prop_assert_eq!(denied, excluded.into_iter().collect::<BTreeSet<_>>());
    }
}
