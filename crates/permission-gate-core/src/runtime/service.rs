// crates/permission-gate-core/src/runtime/service.rs
// ============================================================================
// Module: Permission Service
// Description: Facade wiring evaluation, expansion, audit, cache, and authz.
// Purpose: Provide the single entry point hosts call for reads and writes.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! [`PermissionService`] owns the write path: authorize, expand, validate the
//! whole plan, then write every row and its audit entry in one transaction.
//! Only after commit are cache entries invalidated and observers notified,
//! so a failed write leaves neither data nor audit rows nor cache churn.
//!
//! Reads go through [`PermissionService::evaluate`], which consults the
//! optional [`EvaluationCache`] before the [`Evaluator`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::core::ActionKind;
use crate::core::AuditLogEntry;
use crate::core::DecisionReason;
use crate::core::EvaluationRequest;
use crate::core::EvaluationResult;
use crate::core::Grantee;
use crate::core::NewPermissionRule;
use crate::core::NewRestriction;
use crate::core::PermissionKind;
use crate::core::PermissionRule;
use crate::core::ResourceKind;
use crate::core::Restriction;
use crate::core::RestrictionId;
use crate::core::RoleDefaults;
use crate::core::RuleId;
use crate::core::UserId;
use crate::core::ValidationError;
use crate::core::verify_audit_chain;
use crate::interfaces::AuditQuery;
use crate::interfaces::Clock;
use crate::interfaces::IdentityResolver;
use crate::interfaces::PermissionStore;
use crate::interfaces::RestrictionQuery;
use crate::interfaces::RuleQuery;
use crate::interfaces::StoreError;
use crate::runtime::audit::AuditRecorder;
use crate::runtime::audit::MutationContext;
use crate::runtime::authz::MutationAction;
use crate::runtime::authz::MutationAuthorizer;
use crate::runtime::authz::StandingAuthorizer;
use crate::runtime::cache::CacheSettings;
use crate::runtime::cache::EvaluationCache;
use crate::runtime::error::PermissionError;
use crate::runtime::evaluator::Evaluator;
use crate::runtime::expander::DEFAULT_MAX_EXPANSION_ROWS;
use crate::runtime::expander::DataSharingIntent;
use crate::runtime::expander::ExpansionPlan;
use crate::runtime::expander::RestrictionIntent;
use crate::runtime::expander::ScopeExpander;
use crate::runtime::expander::TradingGrantIntent;
use crate::runtime::observer::DecisionEvent;
use crate::runtime::observer::MutationEvent;
use crate::runtime::observer::MutationKind;
use crate::runtime::observer::NoopObserver;
use crate::runtime::observer::PermissionObserver;
use crate::runtime::sharing::SharingSettings;
use crate::runtime::sharing::ViewerSet;
use crate::runtime::sharing::summarize_sharing;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default audit page size.
pub const DEFAULT_AUDIT_PAGE_LIMIT: usize = 50;
/// Maximum audit page size.
pub const MAX_AUDIT_PAGE_LIMIT: usize = 100;

/// Service tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionServiceConfig {
    /// Role default table for tier four.
    pub role_defaults: RoleDefaults,
    /// Evaluation cache settings; `None` disables caching.
    pub cache: Option<CacheSettings>,
    /// Audit evaluations denied by a restriction or explicit deny.
    pub record_denied_evaluations: bool,
    /// Page size used when the caller does not pass one.
    pub audit_page_limit_default: usize,
    /// Largest page size accepted.
    pub audit_page_limit_max: usize,
    /// Largest row count one intent may expand into.
    pub max_expansion_rows: usize,
}

impl Default for PermissionServiceConfig {
    fn default() -> Self {
        Self {
            role_defaults: RoleDefaults::platform(),
            cache: None,
            record_denied_evaluations: false,
            audit_page_limit_default: DEFAULT_AUDIT_PAGE_LIMIT,
            audit_page_limit_max: MAX_AUDIT_PAGE_LIMIT,
            max_expansion_rows: DEFAULT_MAX_EXPANSION_ROWS,
        }
    }
}

/// Outcome of a revocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeOutcome {
    /// The record was active and is now revoked.
    Revoked,
    /// The record was already revoked; nothing was written.
    AlreadyRevoked,
}

/// Rows committed by one write.
#[derive(Debug, Clone, Default)]
struct Committed {
    /// Rules inserted.
    rules: Vec<PermissionRule>,
    /// Restrictions inserted.
    restrictions: Vec<Restriction>,
    /// Audit rows written.
    audit_entries: usize,
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Permission engine facade.
pub struct PermissionService {
    /// Persistence.
    store: Arc<dyn PermissionStore>,
    /// Tiered resolver.
    evaluator: Evaluator,
    /// Intent expansion.
    expander: ScopeExpander,
    /// Optional decision cache.
    cache: Option<EvaluationCache>,
    /// Write standing checks.
    authorizer: Arc<dyn MutationAuthorizer>,
    /// Decision and mutation sink.
    observer: Arc<dyn PermissionObserver>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Tuning.
    config: PermissionServiceConfig,
}

impl PermissionService {
    /// Creates a service with the standing authorizer and no observer.
    #[must_use]
    pub fn new(
        store: Arc<dyn PermissionStore>,
        identities: Arc<dyn IdentityResolver>,
        clock: Arc<dyn Clock>,
        config: PermissionServiceConfig,
    ) -> Self {
        let evaluator = Evaluator::new(
            Arc::clone(&store),
            Arc::clone(&identities),
            config.role_defaults.clone(),
            Arc::clone(&clock),
        );
        Self {
            store,
            evaluator,
            expander: ScopeExpander::new(config.max_expansion_rows),
            cache: config.cache.map(EvaluationCache::new),
            authorizer: Arc::new(StandingAuthorizer::new(identities)),
            observer: Arc::new(NoopObserver),
            clock,
            config,
        }
    }

    /// Replaces the mutation authorizer.
    #[must_use]
    pub fn with_authorizer(mut self, authorizer: Arc<dyn MutationAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Replaces the observer used by the evaluator, expander, and writes.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PermissionObserver>) -> Self {
        self.evaluator = self.evaluator.with_observer(Arc::clone(&observer));
        self.expander = self.expander.with_observer(Arc::clone(&observer));
        self.observer = observer;
        self
    }

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------

    /// Evaluates a request, serving fresh cache hits when caching is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] for malformed requests or storage failures.
    pub fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResult, PermissionError> {
        let Some(cache) = &self.cache else {
            return self.evaluate_strict(request);
        };
        let now = self.clock.now();
        if let Some(hit) = cache.get(request, now) {
            self.observer.on_decision(&DecisionEvent::from_decision(request, &hit, true));
            self.after_decision(request, &hit)?;
            return Ok(hit);
        }
        let generation = cache.generation(request);
        let result = self.evaluator.evaluate(request)?;
        if let Some(generation) = generation {
            cache.insert(request, result.clone(), now, generation);
        }
        self.after_decision(request, &result)?;
        Ok(result)
    }

    /// Evaluates a request against the store, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] for malformed requests or storage failures.
    pub fn evaluate_strict(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResult, PermissionError> {
        let result = self.evaluator.evaluate(request)?;
        self.after_decision(request, &result)?;
        Ok(result)
    }

    /// Audits decisions denied by a restriction or explicit deny when configured.
    fn after_decision(
        &self,
        request: &EvaluationRequest,
        result: &EvaluationResult,
    ) -> Result<(), PermissionError> {
        let audited = matches!(
            result.reason,
            DecisionReason::ExplicitDeny | DecisionReason::RestrictionBlock
        );
        if !self.config.record_denied_evaluations || !audited {
            return Ok(());
        }
        let context = MutationContext::new(request.actor);
        let recorder = AuditRecorder::new(&context, self.clock.now());
        let mut txn = self.store.begin()?;
        recorder.evaluation_denied(txn.as_mut(), request, result)?;
        txn.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Inserts one rule written by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the caller lacks standing, the rule
    /// is invalid, or storage fails.
    pub fn insert_rule(
        &self,
        context: &MutationContext,
        mut rule: NewPermissionRule,
    ) -> Result<RuleId, PermissionError> {
        self.authorize(context, MutationAction::Grant {
            grantor: rule.grantor,
        })?;
        rule.granted_by = context.caller;
        let plan = ExpansionPlan {
            rules: vec![rule],
            restrictions: Vec::new(),
        };
        let committed = self.commit_plan(context, &plan, MutationKind::InsertRule)?;
        committed.rules.first().map(|rule| rule.id).ok_or_else(|| {
            PermissionError::Storage(StoreError::Store("insert returned no rule".to_string()))
        })
    }

    /// Inserts one restriction imposed by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the caller lacks standing, the
    /// restriction is invalid, or storage fails.
    pub fn insert_restriction(
        &self,
        context: &MutationContext,
        mut restriction: NewRestriction,
    ) -> Result<RestrictionId, PermissionError> {
        self.authorize(context, MutationAction::Restrict {
            target: restriction.restricted_user,
        })?;
        restriction.imposed_by = context.caller;
        let plan = ExpansionPlan {
            rules: Vec::new(),
            restrictions: vec![restriction],
        };
        let committed = self.commit_plan(context, &plan, MutationKind::InsertRestriction)?;
        committed.restrictions.first().map(|restriction| restriction.id).ok_or_else(|| {
            PermissionError::Storage(StoreError::Store("insert returned no restriction".to_string()))
        })
    }

    /// Shares the grantor's data with an audience.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the caller lacks standing, the intent
    /// is invalid, or storage fails. Nothing is written on error.
    pub fn grant_data_sharing(
        &self,
        context: &MutationContext,
        intent: &DataSharingIntent,
    ) -> Result<Vec<RuleId>, PermissionError> {
        self.authorize(context, MutationAction::Grant {
            grantor: intent.grantor,
        })?;
        let plan = self.expander.expand_data_sharing(intent, context.caller)?;
        let committed = self.commit_plan(context, &plan, MutationKind::GrantDataSharing)?;
        Ok(committed.rules.iter().map(|rule| rule.id).collect())
    }

    /// Grants trading authority over the grantor's resources.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the caller lacks standing, the intent
    /// is invalid, or storage fails. Nothing is written on error.
    pub fn grant_trading(
        &self,
        context: &MutationContext,
        intent: &TradingGrantIntent,
    ) -> Result<Vec<RuleId>, PermissionError> {
        self.authorize(context, MutationAction::Grant {
            grantor: intent.grantor,
        })?;
        let plan = self.expander.expand_trading_grant(intent, context.caller)?;
        let committed = self.commit_plan(context, &plan, MutationKind::GrantTrading)?;
        Ok(committed.rules.iter().map(|rule| rule.id).collect())
    }

    /// Imposes restrictions on a user.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the caller lacks standing, the intent
    /// is invalid, or storage fails. Nothing is written on error.
    pub fn restrict_trading(
        &self,
        context: &MutationContext,
        intent: &RestrictionIntent,
    ) -> Result<Vec<RestrictionId>, PermissionError> {
        self.authorize(context, MutationAction::Restrict {
            target: intent.target,
        })?;
        let plan = self.expander.expand_restrictions(intent, context.caller)?;
        let committed = self.commit_plan(context, &plan, MutationKind::RestrictTrading)?;
        Ok(committed.restrictions.iter().map(|restriction| restriction.id).collect())
    }

    /// Revokes a rule. Revoking an already-revoked rule is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::NotFound`] for unknown rules and
    /// [`PermissionError::Unauthorized`] when the caller lacks standing.
    pub fn revoke(
        &self,
        context: &MutationContext,
        rule_id: RuleId,
    ) -> Result<RevokeOutcome, PermissionError> {
        context.validate()?;
        let now = self.clock.now();
        let mut txn = self.store.begin()?;
        let before =
            txn.rule(rule_id)?.ok_or_else(|| PermissionError::NotFound(format!("rule {rule_id}")))?;
        self.authorize(context, MutationAction::RevokeRule {
            grantor: before.grantor,
        })?;
        if before.revoked_at.is_some() {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }
        let after = txn.revoke_rule(rule_id, context.caller, now)?;
        AuditRecorder::new(context, now).rule_revoked(txn.as_mut(), &before, &after)?;
        txn.commit()?;
        self.invalidate(after.grantee);
        self.observer.on_mutation(&MutationEvent {
            event: "permission_mutation",
            timestamp_ms: now.as_unix_millis(),
            caller: context.caller,
            kind: MutationKind::RevokeRule,
            rule_ids: vec![rule_id],
            restriction_ids: Vec::new(),
            audit_entries: 1,
        });
        Ok(RevokeOutcome::Revoked)
    }

    /// Revokes a restriction. Revoking an already-revoked restriction is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::NotFound`] for unknown restrictions and
    /// [`PermissionError::Unauthorized`] when the caller lacks standing.
    pub fn revoke_restriction(
        &self,
        context: &MutationContext,
        restriction_id: RestrictionId,
    ) -> Result<RevokeOutcome, PermissionError> {
        context.validate()?;
        let now = self.clock.now();
        let mut txn = self.store.begin()?;
        let before = txn.restriction(restriction_id)?.ok_or_else(|| {
            PermissionError::NotFound(format!("restriction {restriction_id}"))
        })?;
        self.authorize(context, MutationAction::RevokeRestriction {
            imposed_by: before.imposed_by,
            target: before.restricted_user,
        })?;
        if before.revoked_at.is_some() {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }
        let after = txn.revoke_restriction(restriction_id, context.caller, now)?;
        AuditRecorder::new(context, now).restriction_revoked(txn.as_mut(), &before, &after)?;
        txn.commit()?;
        self.invalidate(Grantee::User(after.restricted_user));
        self.observer.on_mutation(&MutationEvent {
            event: "permission_mutation",
            timestamp_ms: now.as_unix_millis(),
            caller: context.caller,
            kind: MutationKind::RevokeRestriction,
            rule_ids: Vec::new(),
            restriction_ids: vec![restriction_id],
            audit_entries: 1,
        });
        Ok(RevokeOutcome::Revoked)
    }

    /// Checks standing, mapping a denial to [`PermissionError::Unauthorized`].
    fn authorize(
        &self,
        context: &MutationContext,
        action: MutationAction,
    ) -> Result<(), PermissionError> {
        let decision = self.authorizer.authorize(context.caller, action);
        if decision.allowed {
            Ok(())
        } else {
            Err(PermissionError::Unauthorized(decision.reason))
        }
    }

    /// Validates and writes a plan with its audit rows in one transaction.
    fn commit_plan(
        &self,
        context: &MutationContext,
        plan: &ExpansionPlan,
        kind: MutationKind,
    ) -> Result<Committed, PermissionError> {
        context.validate()?;
        if plan.is_empty() {
            return Err(ValidationError::EmptyIntent("expansion").into());
        }
        let now = self.clock.now();
        plan.validate(now)?;

        let recorder = AuditRecorder::new(context, now);
        let mut committed = Committed::default();
        let mut txn = self.store.begin()?;
        for rule in &plan.rules {
            let stored = txn.insert_rule(rule, now)?;
            recorder.rule_written(txn.as_mut(), &stored)?;
            committed.audit_entries += 1;
            committed.rules.push(stored);
        }
        for restriction in &plan.restrictions {
            let stored = txn.insert_restriction(restriction, now)?;
            recorder.restriction_written(txn.as_mut(), &stored)?;
            committed.audit_entries += 1;
            committed.restrictions.push(stored);
        }
        txn.commit()?;

        let mut touched: BTreeSet<Grantee> =
            committed.rules.iter().map(|rule| rule.grantee).collect();
        touched.extend(
            committed
                .restrictions
                .iter()
                .map(|restriction| Grantee::User(restriction.restricted_user)),
        );
        for grantee in touched {
            self.invalidate(grantee);
        }
        self.observer.on_mutation(&MutationEvent {
            event: "permission_mutation",
            timestamp_ms: now.as_unix_millis(),
            caller: context.caller,
            kind,
            rule_ids: committed.rules.iter().map(|rule| rule.id).collect(),
            restriction_ids: committed
                .restrictions
                .iter()
                .map(|restriction| restriction.id)
                .collect(),
            audit_entries: committed.audit_entries,
        });
        Ok(committed)
    }

    /// Drops cached decisions a change to `grantee` could affect.
    fn invalidate(&self, grantee: Grantee) {
        if let Some(cache) = &self.cache {
            cache.invalidate(grantee);
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Returns rules matching `query` that are active now.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::Storage`] when the store cannot be read.
    pub fn active_rules(&self, query: RuleQuery) -> Result<Vec<PermissionRule>, PermissionError> {
        let query = RuleQuery {
            active_at: Some(self.clock.now()),
            ..query
        };
        Ok(self.store.find_rules(&query)?)
    }

    /// Returns the user's active restrictions.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::Storage`] when the store cannot be read.
    pub fn restrictions_for(&self, user: UserId) -> Result<Vec<Restriction>, PermissionError> {
        Ok(self.store.find_restrictions(&RestrictionQuery {
            restricted_user: Some(user),
            imposed_by: None,
            active_at: Some(self.clock.now()),
        })?)
    }

    /// Returns the grantor's data-sharing settings per resource.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::Storage`] when the store cannot be read.
    pub fn sharing_settings(
        &self,
        grantor: UserId,
    ) -> Result<BTreeMap<ResourceKind, SharingSettings>, PermissionError> {
        let rules = self.active_rules(RuleQuery {
            grantor: Some(grantor),
            permission_kind: Some(PermissionKind::DataSharing),
            action: Some(ActionKind::View),
            ..RuleQuery::default()
        })?;
        let unfiltered = rules.iter().filter(|rule| rule.instrument_filter.is_unfiltered());
        Ok(summarize_sharing(unfiltered))
    }

    /// Returns who may view the grantor's data for one resource.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::Storage`] when the store cannot be read.
    pub fn data_viewers(
        &self,
        grantor: UserId,
        resource: ResourceKind,
    ) -> Result<ViewerSet, PermissionError> {
        let settings = self.sharing_settings(grantor)?.remove(&resource).unwrap_or_default();
        Ok(ViewerSet::from_settings(grantor, resource, &settings))
    }

    /// Returns one page of audit entries, newest first.
    ///
    /// `subject` narrows to entries where the user is actor or target.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::Validation`] for out-of-range limits.
    pub fn list_audit_log(
        &self,
        subject: Option<UserId>,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<AuditLogEntry>, PermissionError> {
        let limit = limit.unwrap_or(self.config.audit_page_limit_default);
        if limit == 0 || limit > self.config.audit_page_limit_max {
            return Err(ValidationError::InvalidPage(format!(
                "limit must be between 1 and {}, got {limit}",
                self.config.audit_page_limit_max
            ))
            .into());
        }
        Ok(self.store.list_audit(&AuditQuery {
            subject,
            offset,
            limit,
        })?)
    }

    /// Verifies the audit hash chain and returns the number of entries.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::Storage`] with a corruption error when the
    /// chain is broken.
    pub fn verify_audit_log(&self) -> Result<usize, PermissionError> {
        let chain = self.store.audit_chain()?;
        verify_audit_chain(&chain)
            .map_err(|err| PermissionError::Storage(StoreError::Corrupt(err.to_string())))?;
        Ok(chain.len())
    }
}
