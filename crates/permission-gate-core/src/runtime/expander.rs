// crates/permission-gate-core/src/runtime/expander.rs
// ============================================================================
// Module: Scope Expander
// Description: Turns high-level sharing and restriction intents into rows.
// Purpose: Express "everyone except X" and instrument scopes as atomic plans.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! Expansion touches no storage: each intent becomes an [`ExpansionPlan`] of
//! rule and restriction rows, and the service validates the whole plan before
//! opening a transaction. Row order is deterministic so audit sequences are
//! stable. Each produced plan is reported to the injected observer.
//!
//! - Everyone except `X`: one allow-everyone rule per resource plus one deny
//!   per excluded user per resource.
//! - Trading blacklist: one allow-all rule plus one deny rule carrying the
//!   blacklist, so the listed instruments are denied by tier two.
//! - Trading whitelist: one allow rule narrowed to the whitelist.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::ActionKind;
use crate::core::Enforcement;
use crate::core::Grantee;
use crate::core::InstrumentFilter;
use crate::core::InstrumentKey;
use crate::core::NewPermissionRule;
use crate::core::NewRestriction;
use crate::core::PermissionKind;
use crate::core::PermissionLevel;
use crate::core::ResourceKind;
use crate::core::RestrictionKind;
use crate::core::RuleScope;
use crate::core::Timestamp;
use crate::core::UserId;
use crate::core::ValidationError;
use crate::runtime::observer::ExpansionEvent;
use crate::runtime::observer::IntentKind;
use crate::runtime::observer::NoopObserver;
use crate::runtime::observer::PermissionObserver;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default upper bound on rows a single intent may expand into.
pub const DEFAULT_MAX_EXPANSION_ROWS: usize = 10_000;
/// Priority applied to restrictions that do not specify one.
pub const DEFAULT_RESTRICTION_PRIORITY: i32 = 5;

/// Default restriction kind for restriction configs.
const fn default_restriction_kind() -> RestrictionKind {
    RestrictionKind::InstrumentBlacklist
}

/// Default blocked actions for restriction configs.
fn default_restriction_actions() -> Vec<ActionKind> {
    vec![ActionKind::All]
}

/// Default enforcement for restriction configs.
const fn default_enforcement() -> Enforcement {
    Enforcement::Hard
}

/// Default priority for restriction configs.
const fn default_restriction_priority() -> i32 {
    DEFAULT_RESTRICTION_PRIORITY
}

/// Default resource for trading grants.
const fn default_trading_resource() -> ResourceKind {
    ResourceKind::Positions
}

// ============================================================================
// SECTION: Intents
// ============================================================================

/// Audience of a data-sharing grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "users", rename_all = "snake_case")]
pub enum SharingScope {
    /// Every user.
    Everyone,
    /// Only the listed users.
    Specific(Vec<UserId>),
    /// Every user except the listed ones.
    EveryoneExcept(Vec<UserId>),
}

/// Request to share data with an audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSharingIntent {
    /// Owner of the shared data.
    pub grantor: UserId,
    /// Audience.
    pub scope: SharingScope,
    /// Resource classes shared.
    pub resources: Vec<ResourceKind>,
    /// Optional expiry applied to every row.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
    /// Notes applied to every row.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Instrument narrowing for one trading action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "instruments", rename_all = "snake_case")]
pub enum InstrumentScope {
    /// Every instrument.
    #[default]
    All,
    /// Only the listed instruments.
    Whitelist(Vec<InstrumentKey>),
    /// Every instrument except the listed ones.
    Blacklist(Vec<InstrumentKey>),
}

/// One action within a trading grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingActionConfig {
    /// Granted action.
    pub action: ActionKind,
    /// Instrument narrowing.
    #[serde(default)]
    pub instruments: InstrumentScope,
    /// Resource acted on.
    #[serde(default = "default_trading_resource")]
    pub resource: ResourceKind,
}

/// Request to let one user act on the grantor's resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingGrantIntent {
    /// Owner of the resources.
    pub grantor: UserId,
    /// User receiving the authority.
    pub grantee: UserId,
    /// Actions granted.
    pub actions: Vec<TradingActionConfig>,
    /// Optional expiry applied to every row.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
    /// Notes applied to every row.
    #[serde(default)]
    pub notes: Option<String>,
}

/// One restriction within a restriction intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionConfig {
    /// Descriptive category.
    #[serde(default = "default_restriction_kind")]
    pub kind: RestrictionKind,
    /// Blocked actions.
    #[serde(default = "default_restriction_actions")]
    pub actions: Vec<ActionKind>,
    /// Blocked instruments; empty means every instrument.
    #[serde(default)]
    pub instruments: Vec<InstrumentKey>,
    /// Enforcement strength.
    #[serde(default = "default_enforcement")]
    pub enforcement: Enforcement,
    /// Precedence among overlapping restrictions.
    #[serde(default = "default_restriction_priority")]
    pub priority: i32,
    /// Resource class narrowed to.
    #[serde(default)]
    pub resource: Option<ResourceKind>,
}

/// Request to impose restrictions on a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionIntent {
    /// User being restricted.
    pub target: UserId,
    /// Restrictions to impose.
    pub restrictions: Vec<RestrictionConfig>,
    /// Optional expiry applied to every row.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
    /// Notes applied to every row.
    #[serde(default)]
    pub notes: Option<String>,
}

// ============================================================================
// SECTION: Plans
// ============================================================================

/// Rows an intent expands into, in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionPlan {
    /// Rules to insert.
    pub rules: Vec<NewPermissionRule>,
    /// Restrictions to insert.
    pub restrictions: Vec<NewRestriction>,
}

impl ExpansionPlan {
    /// Returns the number of rows in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len() + self.restrictions.len()
    }

    /// Returns true when the plan writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validates every row against write-time invariants.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self, now: Timestamp) -> Result<(), ValidationError> {
        for rule in &self.rules {
            rule.validate(now)?;
        }
        for restriction in &self.restrictions {
            restriction.validate(now)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Expander
// ============================================================================

/// Intent-to-row expansion.
#[derive(Clone)]
pub struct ScopeExpander {
    /// Maximum rows one intent may produce.
    max_rows: usize,
    /// Expansion sink.
    observer: Arc<dyn PermissionObserver>,
}

impl Default for ScopeExpander {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EXPANSION_ROWS)
    }
}

impl ScopeExpander {
    /// Creates an expander with a row limit.
    #[must_use]
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replaces the expansion observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PermissionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Expands a data-sharing intent written by `granted_by`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for empty audiences or resource lists, or
    /// when the expansion exceeds the row limit.
    pub fn expand_data_sharing(
        &self,
        intent: &DataSharingIntent,
        granted_by: UserId,
    ) -> Result<ExpansionPlan, ValidationError> {
        let resources = dedup_ordered(&intent.resources);
        if resources.is_empty() {
            return Err(ValidationError::EmptyIntent("resources"));
        }
        let template = |grantee, resource, level, scope| NewPermissionRule {
            grantor: intent.grantor,
            grantee,
            permission_kind: PermissionKind::DataSharing,
            resource,
            action: Some(ActionKind::View),
            level,
            scope,
            instrument_filter: InstrumentFilter::Unfiltered,
            priority: None,
            granted_by,
            expires_at: intent.expires_at,
            notes: intent.notes.clone(),
        };

        let mut plan = ExpansionPlan::default();
        match &intent.scope {
            SharingScope::Everyone => {
                for resource in resources {
                    plan.rules.push(template(
                        Grantee::Everyone,
                        resource,
                        PermissionLevel::Allow,
                        RuleScope::All,
                    ));
                }
            }
            SharingScope::Specific(users) => {
                let users = dedup_ordered(users);
                if users.is_empty() {
                    return Err(ValidationError::EmptyIntent("users"));
                }
                self.check_rows(resources.len().saturating_mul(users.len()))?;
                for resource in resources {
                    for user in &users {
                        plan.rules.push(template(
                            Grantee::User(*user),
                            resource,
                            PermissionLevel::Allow,
                            RuleScope::Specific,
                        ));
                    }
                }
            }
            SharingScope::EveryoneExcept(excluded) => {
                let excluded = dedup_ordered(excluded);
                self.check_rows(resources.len().saturating_mul(excluded.len() + 1))?;
                for resource in resources {
                    plan.rules.push(template(
                        Grantee::Everyone,
                        resource,
                        PermissionLevel::Allow,
                        RuleScope::All,
                    ));
                    for user in &excluded {
                        plan.rules.push(template(
                            Grantee::User(*user),
                            resource,
                            PermissionLevel::Deny,
                            RuleScope::Specific,
                        ));
                    }
                }
            }
        }
        self.check_rows(plan.len())?;
        self.report(IntentKind::DataSharing, intent.grantor, granted_by, &plan);
        Ok(plan)
    }

    /// Expands a trading grant written by `granted_by`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for empty action lists or instrument lists,
    /// or when the expansion exceeds the row limit.
    pub fn expand_trading_grant(
        &self,
        intent: &TradingGrantIntent,
        granted_by: UserId,
    ) -> Result<ExpansionPlan, ValidationError> {
        if intent.actions.is_empty() {
            return Err(ValidationError::EmptyIntent("actions"));
        }
        let template = |config: &TradingActionConfig, level, scope, instrument_filter| {
            NewPermissionRule {
                grantor: intent.grantor,
                grantee: Grantee::User(intent.grantee),
                permission_kind: PermissionKind::TradingAction,
                resource: config.resource,
                action: Some(config.action),
                level,
                scope,
                instrument_filter,
                priority: None,
                granted_by,
                expires_at: intent.expires_at,
                notes: intent.notes.clone(),
            }
        };

        let mut plan = ExpansionPlan::default();
        for config in &intent.actions {
            match &config.instruments {
                InstrumentScope::All => plan.rules.push(template(
                    config,
                    PermissionLevel::Allow,
                    RuleScope::All,
                    InstrumentFilter::Unfiltered,
                )),
                InstrumentScope::Whitelist(keys) => plan.rules.push(template(
                    config,
                    PermissionLevel::Allow,
                    RuleScope::Specific,
                    InstrumentFilter::Whitelist(non_empty_set(keys, "instrument whitelist")?),
                )),
                InstrumentScope::Blacklist(keys) => {
                    let blacklist = non_empty_set(keys, "instrument blacklist")?;
                    plan.rules.push(template(
                        config,
                        PermissionLevel::Allow,
                        RuleScope::All,
                        InstrumentFilter::Unfiltered,
                    ));
                    plan.rules.push(template(
                        config,
                        PermissionLevel::Deny,
                        RuleScope::Specific,
                        InstrumentFilter::Blacklist(blacklist),
                    ));
                }
            }
        }
        self.check_rows(plan.len())?;
        self.report(IntentKind::TradingGrant, intent.grantor, granted_by, &plan);
        Ok(plan)
    }

    /// Expands a restriction intent imposed by `imposed_by`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for empty restriction or action lists, or
    /// when the expansion exceeds the row limit.
    pub fn expand_restrictions(
        &self,
        intent: &RestrictionIntent,
        imposed_by: UserId,
    ) -> Result<ExpansionPlan, ValidationError> {
        if intent.restrictions.is_empty() {
            return Err(ValidationError::EmptyIntent("restrictions"));
        }
        let mut plan = ExpansionPlan::default();
        for config in &intent.restrictions {
            let actions = dedup_ordered(&config.actions);
            if actions.is_empty() {
                return Err(ValidationError::EmptyIntent("restriction actions"));
            }
            let instrument_keys: BTreeSet<InstrumentKey> =
                config.instruments.iter().cloned().collect();
            for action in actions {
                plan.restrictions.push(NewRestriction {
                    restricted_user: intent.target,
                    imposed_by,
                    kind: config.kind,
                    resource: config.resource,
                    action,
                    instrument_keys: instrument_keys.clone(),
                    priority: config.priority,
                    enforcement: config.enforcement,
                    expires_at: intent.expires_at,
                    notes: intent.notes.clone(),
                });
            }
        }
        self.check_rows(plan.len())?;
        self.report(IntentKind::Restriction, intent.target, imposed_by, &plan);
        Ok(plan)
    }

    /// Sends the plan shape to the observer.
    fn report(
        &self,
        intent: IntentKind,
        subject: UserId,
        written_by: UserId,
        plan: &ExpansionPlan,
    ) {
        self.observer.on_expansion(&ExpansionEvent {
            event: "permission_expansion",
            intent,
            subject,
            written_by,
            rules: plan.rules.len(),
            restrictions: plan.restrictions.len(),
        });
    }

    /// Rejects expansions above the row limit.
    const fn check_rows(&self, rows: usize) -> Result<(), ValidationError> {
        if rows > self.max_rows {
            return Err(ValidationError::TooManyRows {
                max: self.max_rows,
                actual: rows,
            });
        }
        Ok(())
    }
}

/// Removes duplicates while keeping first-seen order.
fn dedup_ordered<T: Ord + Copy>(values: &[T]) -> Vec<T> {
    let mut seen = BTreeSet::new();
    values.iter().copied().filter(|value| seen.insert(*value)).collect()
}

/// Collects instrument keys, rejecting an empty list.
fn non_empty_set(
    keys: &[InstrumentKey],
    label: &'static str,
) -> Result<BTreeSet<InstrumentKey>, ValidationError> {
    if keys.is_empty() {
        return Err(ValidationError::EmptyInstrumentList(label));
    }
    Ok(keys.iter().cloned().collect())
}
