// crates/permission-gate-core/tests/expander.rs
// ============================================================================
// Module: Scope Expander Tests
// Description: Row shapes produced by sharing, trading, and restriction intents.
// Purpose: Ensure intents expand deterministically and evaluate as intended.
// Dependencies: permission-gate-core, serde_json
// ============================================================================
//! ## Overview
//! Covers expansion row counts, the evaluation outcome of expanded plans,
//! viewer reconstruction from stored rows, and intent JSON decoding.

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
use std::sync::Mutex;

use permission_gate_core::ActionKind;
use permission_gate_core::DataSharingIntent;
use permission_gate_core::DecisionEvent;
use permission_gate_core::DecisionReason;
use permission_gate_core::Enforcement;
use permission_gate_core::EvaluationRequest;
use permission_gate_core::ExpansionEvent;
use permission_gate_core::FixedClock;
use permission_gate_core::Grantee;
use permission_gate_core::InMemoryPermissionStore;
use permission_gate_core::InstrumentFilter;
use permission_gate_core::InstrumentKey;
use permission_gate_core::InstrumentScope;
use permission_gate_core::IntentKind;
use permission_gate_core::MutationContext;
use permission_gate_core::PermissionError;
use permission_gate_core::PermissionLevel;
use permission_gate_core::PermissionObserver;
use permission_gate_core::PermissionService;
use permission_gate_core::PermissionServiceConfig;
use permission_gate_core::ResourceKind;
use permission_gate_core::RestrictionConfig;
use permission_gate_core::RestrictionIntent;
use permission_gate_core::RestrictionKind;
use permission_gate_core::RuleScope;
use permission_gate_core::ScopeExpander;
use permission_gate_core::SharingScope;
use permission_gate_core::StaticIdentityDirectory;
use permission_gate_core::Timestamp;
use permission_gate_core::TradingActionConfig;
use permission_gate_core::TradingGrantIntent;
use permission_gate_core::UserId;
use permission_gate_core::ValidationError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const NOW_MS: i64 = 1_767_225_600_000;

fn user(raw: u64) -> UserId {
    UserId::from_raw(raw).expect("nonzero user id")
}

fn service() -> PermissionService {
    PermissionService::new(
        Arc::new(InMemoryPermissionStore::new()),
        Arc::new(StaticIdentityDirectory::new(Vec::new())),
        Arc::new(FixedClock::new(Timestamp::from_unix_millis(NOW_MS))),
        PermissionServiceConfig::default(),
    )
}

fn share(grantor: UserId, scope: SharingScope, resources: Vec<ResourceKind>) -> DataSharingIntent {
    DataSharingIntent {
        grantor,
        scope,
        resources,
        expires_at: None,
        notes: None,
    }
}

fn view(actor: UserId, resource: ResourceKind) -> EvaluationRequest {
    EvaluationRequest::new(actor, ActionKind::View, resource)
}

#[derive(Default)]
struct RecordingObserver {
    expansions: Mutex<Vec<ExpansionEvent>>,
}

impl PermissionObserver for RecordingObserver {
    fn on_decision(&self, _event: &DecisionEvent) {}

    fn on_expansion(&self, event: &ExpansionEvent) {
        self.expansions.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Data Sharing
// ============================================================================

#[test]
fn everyone_except_two_over_two_resources_writes_two_allows_and_four_denies() {
    let (a, b, c) = (user(1), user(2), user(3));
    let plan = ScopeExpander::default()
        .expand_data_sharing(
            &share(a, SharingScope::EveryoneExcept(vec![b, c]), vec![
                ResourceKind::Positions,
                ResourceKind::Holdings,
            ]),
            a,
        )
        .unwrap();
    assert_eq!(plan.rules.len(), 6);
    let allows: Vec<_> =
        plan.rules.iter().filter(|rule| rule.level == PermissionLevel::Allow).collect();
    let denies: Vec<_> =
        plan.rules.iter().filter(|rule| rule.level == PermissionLevel::Deny).collect();
    assert_eq!(allows.len(), 2);
    assert_eq!(denies.len(), 4);
    assert!(allows.iter().all(|rule| rule.grantee == Grantee::Everyone && rule.scope == RuleScope::All));
    assert!(denies.iter().all(|rule| rule.scope == RuleScope::Specific));
    assert!(plan.rules.iter().all(|rule| rule.action == Some(ActionKind::View)));
}

#[test]
fn stored_exclusions_reproduce_the_viewer_set() {
    let svc = service();
    let (a, b, c, d) = (user(1), user(2), user(3), user(4));
    let ids = svc
        .grant_data_sharing(
            &MutationContext::new(a),
            &share(a, SharingScope::EveryoneExcept(vec![b, c]), vec![
                ResourceKind::Positions,
                ResourceKind::Holdings,
            ]),
        )
        .unwrap();
    assert_eq!(ids.len(), 6);

    for resource in [ResourceKind::Positions, ResourceKind::Holdings] {
        let viewers = svc.data_viewers(a, resource).unwrap();
        assert!(viewers.everyone);
        assert_eq!(viewers.excluded, BTreeSet::from([b, c]));
        assert_eq!(viewers.resolve([a, b, c, d]), BTreeSet::from([d]));
    }
    let margins = svc.data_viewers(a, ResourceKind::Margins).unwrap();
    assert!(!margins.everyone);
    assert!(margins.resolve([b, c, d]).is_empty());
}

#[test]
fn blanket_allow_with_exclusion_evaluates_per_user() {
    let svc = service();
    let (a, b, c) = (user(1), user(2), user(3));
    svc.grant_data_sharing(
        &MutationContext::new(a),
        &share(a, SharingScope::EveryoneExcept(vec![b]), vec![ResourceKind::Positions]),
    )
    .unwrap();

    let excluded = svc.evaluate(&view(b, ResourceKind::Positions).with_owner(a)).unwrap();
    assert!(!excluded.allowed);
    assert_eq!(excluded.reason, DecisionReason::ExplicitDeny);
    let included = svc.evaluate(&view(c, ResourceKind::Positions).with_owner(a)).unwrap();
    assert!(included.allowed);
    assert_eq!(included.reason, DecisionReason::ExplicitGrant);
}

#[test]
fn specific_sharing_writes_one_row_per_pair_and_dedups() {
    let plan = ScopeExpander::default()
        .expand_data_sharing(
            &share(user(1), SharingScope::Specific(vec![user(2), user(3), user(2)]), vec![
                ResourceKind::Positions,
                ResourceKind::Orders,
                ResourceKind::Orders,
            ]),
            user(1),
        )
        .unwrap();
    assert_eq!(plan.rules.len(), 4);
    assert!(plan.rules.iter().all(|rule| rule.scope == RuleScope::Specific));
}

#[test]
fn empty_audience_or_resources_is_rejected() {
    let expander = ScopeExpander::default();
    let no_users = share(user(1), SharingScope::Specific(Vec::new()), vec![ResourceKind::Positions]);
    assert_eq!(
        expander.expand_data_sharing(&no_users, user(1)),
        Err(ValidationError::EmptyIntent("users"))
    );
    let no_resources = share(user(1), SharingScope::Everyone, Vec::new());
    assert_eq!(
        expander.expand_data_sharing(&no_resources, user(1)),
        Err(ValidationError::EmptyIntent("resources"))
    );
}

#[test]
fn row_limit_rejects_oversized_expansions() {
    let expander = ScopeExpander::new(3);
    let users: Vec<UserId> = (2..=5).map(user).collect();
    let intent = share(user(1), SharingScope::Specific(users), vec![ResourceKind::Positions]);
    assert_eq!(
        expander.expand_data_sharing(&intent, user(1)),
        Err(ValidationError::TooManyRows {
            max: 3,
            actual: 4,
        })
    );
}

// ============================================================================
// SECTION: Trading Grants
// ============================================================================

#[test]
fn blacklist_scope_adds_a_deny_row_per_action() {
    let intent = TradingGrantIntent {
        grantor: user(1),
        grantee: user(2),
        actions: vec![
            TradingActionConfig {
                action: ActionKind::Create,
                instruments: InstrumentScope::All,
                resource: ResourceKind::Positions,
            },
            TradingActionConfig {
                action: ActionKind::Exit,
                instruments: InstrumentScope::Blacklist(vec![InstrumentKey::from("NSE:HDFCBANK")]),
                resource: ResourceKind::Positions,
            },
            TradingActionConfig {
                action: ActionKind::Modify,
                instruments: InstrumentScope::Whitelist(vec![InstrumentKey::from("NSE:INFY")]),
                resource: ResourceKind::Positions,
            },
        ],
        expires_at: None,
        notes: None,
    };
    let plan = ScopeExpander::default().expand_trading_grant(&intent, user(1)).unwrap();
    assert_eq!(plan.rules.len(), 4);
    let deny = plan.rules.iter().find(|rule| rule.level == PermissionLevel::Deny).unwrap();
    assert_eq!(deny.action, Some(ActionKind::Exit));
    assert_eq!(deny.scope, RuleScope::Specific);
    assert!(matches!(deny.instrument_filter, InstrumentFilter::Blacklist(_)));
    let whitelisted = plan
        .rules
        .iter()
        .find(|rule| rule.action == Some(ActionKind::Modify))
        .unwrap();
    assert!(matches!(whitelisted.instrument_filter, InstrumentFilter::Whitelist(_)));
}

#[test]
fn empty_blacklist_is_rejected() {
    let intent = TradingGrantIntent {
        grantor: user(1),
        grantee: user(2),
        actions: vec![TradingActionConfig {
            action: ActionKind::Exit,
            instruments: InstrumentScope::Blacklist(Vec::new()),
            resource: ResourceKind::Positions,
        }],
        expires_at: None,
        notes: None,
    };
    assert_eq!(
        ScopeExpander::default().expand_trading_grant(&intent, user(1)),
        Err(ValidationError::EmptyInstrumentList("instrument blacklist"))
    );
}

#[test]
fn trading_intent_decodes_with_defaults() {
    let intent: TradingGrantIntent = serde_json::from_str(
        r#"{
            "grantor": 1,
            "grantee": 2,
            "actions": [
                {"action": "create"},
                {"action": "exit", "instruments": {"mode": "blacklist", "instruments": ["NSE:HDFCBANK"]}}
            ]
        }"#,
    )
    .unwrap();
    assert_eq!(intent.actions[0].instruments, InstrumentScope::All);
    assert_eq!(intent.actions[0].resource, ResourceKind::Positions);
    assert_eq!(
        intent.actions[1].instruments,
        InstrumentScope::Blacklist(vec![InstrumentKey::from("NSE:HDFCBANK")])
    );
}

// ============================================================================
// SECTION: Restrictions
// ============================================================================

#[test]
fn restriction_writes_one_row_per_distinct_action() {
    let intent = RestrictionIntent {
        target: user(2),
        restrictions: vec![RestrictionConfig {
            kind: RestrictionKind::InstrumentBlacklist,
            actions: vec![ActionKind::Create, ActionKind::Modify, ActionKind::Create],
            instruments: vec![InstrumentKey::from("NSE:YESBANK"), InstrumentKey::from("NSE:IDEA")],
            enforcement: Enforcement::Soft,
            priority: 7,
            resource: None,
        }],
        expires_at: None,
        notes: Some("risk desk".to_string()),
    };
    let plan = ScopeExpander::default().expand_restrictions(&intent, user(1)).unwrap();
    assert_eq!(plan.restrictions.len(), 2);
    for row in &plan.restrictions {
        assert_eq!(row.instrument_keys.len(), 2);
        assert_eq!(row.priority, 7);
        assert_eq!(row.enforcement, Enforcement::Soft);
        assert_eq!(row.imposed_by, user(1));
    }
}

#[test]
fn restriction_intent_decodes_with_defaults() {
    let intent: RestrictionIntent = serde_json::from_str(
        r#"{"target": 2, "restrictions": [{"instruments": ["NSE:YESBANK"]}]}"#,
    )
    .unwrap();
    let config = &intent.restrictions[0];
    assert_eq!(config.kind, RestrictionKind::InstrumentBlacklist);
    assert_eq!(config.actions, vec![ActionKind::All]);
    assert_eq!(config.enforcement, Enforcement::Hard);
    assert_eq!(config.priority, 5);
}

// ============================================================================
// SECTION: Validate Before Write
// ============================================================================

#[test]
fn invalid_row_rejects_the_whole_intent_before_writing() {
    let svc = service();
    let past = Timestamp::from_unix_millis(NOW_MS).minus_seconds(1);
    let intent = DataSharingIntent {
        expires_at: Some(past),
        ..share(user(1), SharingScope::Everyone, vec![ResourceKind::Positions])
    };
    let err = svc.grant_data_sharing(&MutationContext::new(user(1)), &intent).unwrap_err();
    assert!(matches!(err, PermissionError::Validation(ValidationError::ExpiryInPast { .. })));
    assert!(svc.list_audit_log(None, 0, None).unwrap().is_empty());
    assert!(svc.data_viewers(user(1), ResourceKind::Positions).unwrap().resolve([user(2)]).is_empty());
}

#[test]
fn expansions_are_reported_to_the_observer() {
    let observer = Arc::new(RecordingObserver::default());
    let svc = service().with_observer(observer.clone());
    svc.grant_data_sharing(
        &MutationContext::new(user(1)),
        &share(user(1), SharingScope::EveryoneExcept(vec![user(2)]), vec![ResourceKind::Positions]),
    )
    .unwrap();
    let events = observer.expansions.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].intent, IntentKind::DataSharing);
    assert_eq!(events[0].subject, user(1));
    assert_eq!(events[0].rules, 2);
    assert_eq!(events[0].restrictions, 0);
}
