// crates/permission-gate-core/src/core/evaluation.rs
// ============================================================================
// Module: Evaluation Requests and Results
// Description: Input and output shapes of a permission decision.
// Purpose: Carry the deciding tier, winning rule, and restriction notices.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`EvaluationRequest`] asks whether an actor may perform an action on a
//! resource class, optionally for one instrument and one owner. The
//! [`EvaluationResult`] names the tier that decided and the rule or
//! restriction that won, so every decision is explainable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::InstrumentKey;
use crate::core::identifiers::RestrictionId;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::UserId;
use crate::core::restriction::Enforcement;
use crate::core::restriction::RestrictionKind;
use crate::core::rule::ActionKind;
use crate::core::rule::ResourceKind;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Tier Priorities
// ============================================================================

/// Result priority reported for an explicit deny without its own priority.
pub const EXPLICIT_DENY_PRIORITY: i32 = 10;
/// Result priority reported for an explicit grant without its own priority.
pub const EXPLICIT_GRANT_PRIORITY: i32 = 5;
/// Result priority reported for a role default.
pub const ROLE_DEFAULT_PRIORITY: i32 = 3;
/// Result priority reported for the system default.
pub const SYSTEM_DEFAULT_PRIORITY: i32 = 1;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// A single permission question.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Identity attempting the action.
    pub actor: UserId,
    /// Requested action.
    pub action: ActionKind,
    /// Resource class acted on.
    pub resource: ResourceKind,
    /// Instrument acted on, if any.
    #[serde(default)]
    pub instrument: Option<InstrumentKey>,
    /// Owner of the target resource; narrows rules to this grantor.
    #[serde(default)]
    pub owner: Option<UserId>,
}

impl EvaluationRequest {
    /// Creates a request without instrument or owner.
    #[must_use]
    pub const fn new(actor: UserId, action: ActionKind, resource: ResourceKind) -> Self {
        Self {
            actor,
            action,
            resource,
            instrument: None,
            owner: None,
        }
    }

    /// Narrows the request to one instrument.
    #[must_use]
    pub fn with_instrument(mut self, instrument: impl Into<InstrumentKey>) -> Self {
        self.instrument = Some(instrument.into());
        self
    }

    /// Narrows the request to resources owned by `owner`.
    #[must_use]
    pub const fn with_owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Returns true when the actor is acting on their own resources.
    #[must_use]
    pub fn acting_on_own(&self) -> bool {
        self.owner == Some(self.actor)
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Tier that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    /// Blocked by a hard restriction.
    RestrictionBlock,
    /// Denied by an explicit rule.
    ExplicitDeny,
    /// Allowed by an explicit rule.
    ExplicitGrant,
    /// Decided by the actor's role.
    RoleDefault,
    /// Nothing matched; denied.
    SystemDefault,
}

impl DecisionReason {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RestrictionBlock => "RESTRICTION_BLOCK",
            Self::ExplicitDeny => "EXPLICIT_DENY",
            Self::ExplicitGrant => "EXPLICIT_GRANT",
            Self::RoleDefault => "ROLE_DEFAULT",
            Self::SystemDefault => "SYSTEM_DEFAULT",
        }
    }
}

/// Record that decided an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum WinningRecord {
    /// A permission rule.
    Rule(RuleId),
    /// A restriction.
    Restriction(RestrictionId),
}

/// Notice emitted for a soft or warning restriction that did not block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionNotice {
    /// Restriction that applied.
    pub restriction_id: RestrictionId,
    /// Restriction category.
    pub kind: RestrictionKind,
    /// Enforcement strength.
    pub enforcement: Enforcement,
    /// Restriction priority.
    pub priority: i32,
    /// Notes recorded on the restriction.
    pub notes: Option<String>,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Whether the action is permitted.
    pub allowed: bool,
    /// Deciding tier.
    pub reason: DecisionReason,
    /// Rule or restriction that decided, absent for role and system defaults.
    pub winning_record: Option<WinningRecord>,
    /// Priority of the decision.
    pub priority: i32,
    /// Non-blocking restriction notices.
    #[serde(default)]
    pub warnings: Vec<RestrictionNotice>,
    /// Time the decision was computed.
    pub evaluated_at: Timestamp,
}

impl EvaluationResult {
    /// Returns the winning rule id when an explicit rule decided.
    #[must_use]
    pub const fn winning_rule(&self) -> Option<RuleId> {
        match self.winning_record {
            Some(WinningRecord::Rule(id)) => Some(id),
            _ => None,
        }
    }

    /// Returns the winning restriction id when a restriction decided.
    #[must_use]
    pub const fn winning_restriction(&self) -> Option<RestrictionId> {
        match self.winning_record {
            Some(WinningRecord::Restriction(id)) => Some(id),
            _ => None,
        }
    }
}
