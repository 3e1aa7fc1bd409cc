// crates/permission-gate-core/src/runtime/evaluator.rs
// ============================================================================
// Module: Permission Evaluator
// Description: Tiered precedence resolution over restrictions and rules.
// Purpose: Answer "may this actor do this" deterministically and explainably.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Evaluation walks five tiers and stops at the first that decides:
//!
//! 1. Restriction: the highest-priority active restriction on the actor.
//!    A hard restriction blocks; soft and warning restrictions add a notice.
//! 2. Explicit deny: any matching deny rule.
//! 3. Explicit grant: any matching allow rule.
//! 4. Role default: the actor's role table entry.
//! 5. System default: deny.
//!
//! Within tiers two and three a rule naming the actor outranks an everyone
//! rule, then higher priority wins, then the most recent grant. A deny from
//! any source always outranks a grant from any source.
//!
//! Security posture: identity lookups fail closed to the system default;
//! storage failures surface as errors rather than decisions. Every decision
//! is reported to the injected observer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::core::DecisionReason;
use crate::core::EXPLICIT_DENY_PRIORITY;
use crate::core::EXPLICIT_GRANT_PRIORITY;
use crate::core::EvaluationRequest;
use crate::core::EvaluationResult;
use crate::core::Grantee;
use crate::core::PermissionLevel;
use crate::core::PermissionRule;
use crate::core::ROLE_DEFAULT_PRIORITY;
use crate::core::Restriction;
use crate::core::RestrictionNotice;
use crate::core::RoleDefaults;
use crate::core::SYSTEM_DEFAULT_PRIORITY;
use crate::core::Timestamp;
use crate::core::WinningRecord;
use crate::core::validation::validate_instrument_key;
use crate::interfaces::Clock;
use crate::interfaces::GranteeFilter;
use crate::interfaces::IdentityResolver;
use crate::interfaces::PermissionStore;
use crate::interfaces::RestrictionQuery;
use crate::interfaces::RuleQuery;
use crate::runtime::error::PermissionError;
use crate::runtime::observer::DecisionEvent;
use crate::runtime::observer::NoopObserver;
use crate::runtime::observer::PermissionObserver;

// ============================================================================
// SECTION: Evaluator
// ============================================================================

/// Stateless precedence resolver over a permission store.
pub struct Evaluator {
    /// Rule and restriction source.
    store: Arc<dyn PermissionStore>,
    /// Role lookup for tier four.
    identities: Arc<dyn IdentityResolver>,
    /// Role default table.
    role_defaults: RoleDefaults,
    /// Time source for expiry checks.
    clock: Arc<dyn Clock>,
    /// Decision sink.
    observer: Arc<dyn PermissionObserver>,
}

impl Evaluator {
    /// Creates an evaluator.
    #[must_use]
    pub fn new(
        store: Arc<dyn PermissionStore>,
        identities: Arc<dyn IdentityResolver>,
        role_defaults: RoleDefaults,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            identities,
            role_defaults,
            clock,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replaces the decision observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PermissionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Evaluates one request against current store contents.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::Validation`] for malformed instruments and
    /// [`PermissionError::Storage`] when the store cannot be read.
    pub fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResult, PermissionError> {
        let result = self.resolve(request)?;
        self.observer.on_decision(&DecisionEvent::from_decision(request, &result, false));
        Ok(result)
    }

    /// Walks the tiers for one request.
    fn resolve(&self, request: &EvaluationRequest) -> Result<EvaluationResult, PermissionError> {
        if let Some(instrument) = &request.instrument {
            validate_instrument_key(instrument)?;
        }
        let now = self.clock.now();

        let mut warnings = Vec::new();
        if let Some(restriction) = self.top_restriction(request, now)? {
            if restriction.enforcement.blocks() {
                return Ok(EvaluationResult {
                    allowed: false,
                    reason: DecisionReason::RestrictionBlock,
                    winning_record: Some(WinningRecord::Restriction(restriction.id)),
                    priority: restriction.priority,
                    warnings,
                    evaluated_at: now,
                });
            }
            warnings.push(RestrictionNotice {
                restriction_id: restriction.id,
                kind: restriction.kind,
                enforcement: restriction.enforcement,
                priority: restriction.priority,
                notes: restriction.notes,
            });
        }

        let rules = self.store.find_rules(&RuleQuery {
            grantor: request.owner,
            grantee: Some(GranteeFilter::ActorOrEveryone(request.actor)),
            resource: Some(request.resource),
            action: Some(request.action),
            active_at: Some(now),
            ..RuleQuery::default()
        })?;
        let matching: Vec<&PermissionRule> = rules
            .iter()
            .filter(|rule| {
                rule.applies_to(
                    request.actor,
                    request.resource,
                    request.action,
                    request.instrument.as_ref(),
                    now,
                )
            })
            .collect();

        if let Some(deny) = strongest(&matching, PermissionLevel::Deny) {
            return Ok(EvaluationResult {
                allowed: false,
                reason: DecisionReason::ExplicitDeny,
                winning_record: Some(WinningRecord::Rule(deny.id)),
                priority: deny.priority.unwrap_or(EXPLICIT_DENY_PRIORITY),
                warnings,
                evaluated_at: now,
            });
        }
        if let Some(grant) = strongest(&matching, PermissionLevel::Allow) {
            return Ok(EvaluationResult {
                allowed: true,
                reason: DecisionReason::ExplicitGrant,
                winning_record: Some(WinningRecord::Rule(grant.id)),
                priority: grant.priority.unwrap_or(EXPLICIT_GRANT_PRIORITY),
                warnings,
                evaluated_at: now,
            });
        }

        if let Some(allowed) = self.role_default(request) {
            return Ok(EvaluationResult {
                allowed,
                reason: DecisionReason::RoleDefault,
                winning_record: None,
                priority: ROLE_DEFAULT_PRIORITY,
                warnings,
                evaluated_at: now,
            });
        }

        Ok(EvaluationResult {
            allowed: false,
            reason: DecisionReason::SystemDefault,
            winning_record: None,
            priority: SYSTEM_DEFAULT_PRIORITY,
            warnings,
            evaluated_at: now,
        })
    }

    /// Returns the restriction that decides tier one, if any.
    fn top_restriction(
        &self,
        request: &EvaluationRequest,
        now: Timestamp,
    ) -> Result<Option<Restriction>, PermissionError> {
        let restrictions = self.store.find_restrictions(&RestrictionQuery {
            restricted_user: Some(request.actor),
            imposed_by: None,
            active_at: Some(now),
        })?;
        Ok(restrictions
            .into_iter()
            .filter(|restriction| {
                restriction.is_active(now)
                    && restriction.applies_to(
                        request.resource,
                        request.action,
                        request.instrument.as_ref(),
                    )
            })
            .max_by_key(|restriction| {
                (
                    restriction.priority,
                    restriction.enforcement.severity(),
                    restriction.applied_at,
                    restriction.id,
                )
            }))
    }

    /// Looks up the role default; identity failures yield no default.
    fn role_default(&self, request: &EvaluationRequest) -> Option<bool> {
        let profile = self.identities.profile(request.actor).ok().flatten()?;
        let role = profile.role?;
        self.role_defaults.lookup(role, request.resource, request.action, request.acting_on_own())
    }
}

/// Picks the winning rule at `level`: named grantee, then priority, then recency.
fn strongest<'a>(
    rules: &[&'a PermissionRule],
    level: PermissionLevel,
) -> Option<&'a PermissionRule> {
    rules.iter().copied().filter(|rule| rule.level == level).max_by_key(|rule| {
        (
            matches!(rule.grantee, Grantee::User(_)),
            rule.priority.unwrap_or(0),
            rule.granted_at,
            rule.id,
        )
    })
}
