// crates/permission-gate-core/src/core/rule.rs
// ============================================================================
// Module: Permission Rules
// Description: Grant/deny rows keyed by grantor, grantee, resource, and action.
// Purpose: Define the canonical persisted permission rule and its matching.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`PermissionRule`] says that a grantor allows or denies a grantee one
//! action on one resource class, optionally narrowed to a set of instruments.
//! Rules are append-only: revocation sets `revoked_at` and never deletes.
//!
//! Instrument filters are stored as a single [`InstrumentFilter`] so that a
//! rule can never carry both a whitelist and a blacklist.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::Grantee;
use crate::core::identifiers::InstrumentKey;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;
use crate::core::validation::ValidationError;
use crate::core::validation::validate_expiry;
use crate::core::validation::validate_instrument_set;
use crate::core::validation::validate_text;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Generates `as_str`, `Display`, and `FromStr` for a unit-only label enum.
macro_rules! label_enum {
    ($ty:ident, $field:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            /// Returns the stable storage label.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ValidationError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($label => Ok(Self::$variant),)+
                    _ => Err(ValidationError::UnknownValue {
                        field: $field,
                        value: value.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use label_enum;

/// Category of permission a rule expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    /// Read-only visibility of the grantor's data.
    DataSharing,
    /// Authority to act on the grantor's resources.
    TradingAction,
}

label_enum!(PermissionKind, "permission_type", {
    DataSharing => "data_sharing",
    TradingAction => "trading_action",
});

/// Resource class a rule or request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Open positions.
    Positions,
    /// Long-term holdings.
    Holdings,
    /// Order book entries.
    Orders,
    /// Strategy definitions.
    Strategies,
    /// Margin data.
    Margins,
}

label_enum!(ResourceKind, "resource_type", {
    Positions => "positions",
    Holdings => "holdings",
    Orders => "orders",
    Strategies => "strategies",
    Margins => "margins",
});

impl ResourceKind {
    /// Every resource class in declaration order.
    pub const ALL: [Self; 5] =
        [Self::Positions, Self::Holdings, Self::Orders, Self::Strategies, Self::Margins];
}

/// Action a rule governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Read access.
    View,
    /// Create new entries.
    Create,
    /// Modify existing entries.
    Modify,
    /// Exit or close positions.
    Exit,
    /// Every action.
    All,
}

label_enum!(ActionKind, "action_type", {
    View => "view",
    Create => "create",
    Modify => "modify",
    Exit => "exit",
    All => "all",
});

impl ActionKind {
    /// Returns true when a rule carrying `self` governs a `requested` action.
    ///
    /// A rule action of `all` covers every request. A request for `all` is
    /// only covered by a rule whose action is also `all`.
    #[must_use]
    pub fn covers(self, requested: Self) -> bool {
        self == Self::All || self == requested
    }
}

/// Whether a rule grants or denies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Grant access.
    Allow,
    /// Deny access.
    Deny,
}

label_enum!(PermissionLevel, "permission_level", {
    Allow => "allow",
    Deny => "deny",
});

/// Declared audience shape of a rule, retained for display and audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// Applies broadly (everyone or all instruments).
    All,
    /// Applies to an explicit user or instrument list.
    Specific,
    /// Carves a user out of a broader grant.
    Exclude,
}

label_enum!(RuleScope, "scope_type", {
    All => "all",
    Specific => "specific",
    Exclude => "exclude",
});

// ============================================================================
// SECTION: Instrument Filters
// ============================================================================

/// Instrument narrowing attached to a rule.
///
/// # Invariants
/// - Whitelist and blacklist are mutually exclusive.
/// - Populated lists are never empty once validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "instruments", rename_all = "snake_case")]
pub enum InstrumentFilter {
    /// Applies to every instrument and to instrument-less requests.
    #[default]
    Unfiltered,
    /// Applies only to the listed instruments.
    Whitelist(BTreeSet<InstrumentKey>),
    /// Lists instruments carved out of (allow) or targeted by (deny) the rule.
    Blacklist(BTreeSet<InstrumentKey>),
}

impl InstrumentFilter {
    /// Builds a filter from optional whitelist and blacklist inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ConflictingInstrumentFilter`] when both
    /// lists are populated.
    pub fn from_lists(
        whitelist: Option<Vec<InstrumentKey>>,
        blacklist: Option<Vec<InstrumentKey>>,
    ) -> Result<Self, ValidationError> {
        match (whitelist, blacklist) {
            (Some(_), Some(_)) => Err(ValidationError::ConflictingInstrumentFilter),
            (Some(keys), None) => Ok(Self::Whitelist(keys.into_iter().collect())),
            (None, Some(keys)) => Ok(Self::Blacklist(keys.into_iter().collect())),
            (None, None) => Ok(Self::Unfiltered),
        }
    }

    /// Returns true when the filter applies to every instrument.
    #[must_use]
    pub const fn is_unfiltered(&self) -> bool {
        matches!(self, Self::Unfiltered)
    }

    /// Returns the whitelist when present.
    #[must_use]
    pub const fn whitelist(&self) -> Option<&BTreeSet<InstrumentKey>> {
        match self {
            Self::Whitelist(keys) => Some(keys),
            _ => None,
        }
    }

    /// Returns the blacklist when present.
    #[must_use]
    pub const fn blacklist(&self) -> Option<&BTreeSet<InstrumentKey>> {
        match self {
            Self::Blacklist(keys) => Some(keys),
            _ => None,
        }
    }

    /// Returns true when a rule at `level` with this filter applies to `instrument`.
    ///
    /// Requests without an instrument only match unfiltered rules. A
    /// blacklist on a deny rule targets the listed instruments; on an allow
    /// rule it carves them out.
    #[must_use]
    pub fn applies_to(&self, level: PermissionLevel, instrument: Option<&InstrumentKey>) -> bool {
        let Some(instrument) = instrument else {
            return self.is_unfiltered();
        };
        match self {
            Self::Unfiltered => true,
            Self::Whitelist(keys) => keys.contains(instrument),
            Self::Blacklist(keys) => match level {
                PermissionLevel::Deny => keys.contains(instrument),
                PermissionLevel::Allow => !keys.contains(instrument),
            },
        }
    }

    /// Validates list shape and instrument keys.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for empty lists or malformed keys.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Unfiltered => Ok(()),
            Self::Whitelist(keys) if keys.is_empty() => {
                Err(ValidationError::EmptyInstrumentList("instrument whitelist"))
            }
            Self::Blacklist(keys) if keys.is_empty() => {
                Err(ValidationError::EmptyInstrumentList("instrument blacklist"))
            }
            Self::Whitelist(keys) | Self::Blacklist(keys) => validate_instrument_set(keys.iter()),
        }
    }
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Rule content supplied by a writer, before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPermissionRule {
    /// Owner of the data or resource.
    pub grantor: UserId,
    /// Audience of the rule.
    pub grantee: Grantee,
    /// Permission category.
    pub permission_kind: PermissionKind,
    /// Resource class governed by the rule.
    pub resource: ResourceKind,
    /// Governed action; `None` is read as `view`.
    #[serde(default)]
    pub action: Option<ActionKind>,
    /// Allow or deny.
    pub level: PermissionLevel,
    /// Declared audience shape.
    pub scope: RuleScope,
    /// Instrument narrowing.
    #[serde(default)]
    pub instrument_filter: InstrumentFilter,
    /// Tie-break priority among rules of the same tier.
    #[serde(default)]
    pub priority: Option<i32>,
    /// Identity that wrote the rule.
    pub granted_by: UserId,
    /// Optional expiry.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewPermissionRule {
    /// Returns the governed action, defaulting to `view`.
    #[must_use]
    pub fn effective_action(&self) -> ActionKind {
        self.action.unwrap_or(ActionKind::View)
    }

    /// Validates the rule against write-time invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the rule is malformed or already expired.
    pub fn validate(&self, now: Timestamp) -> Result<(), ValidationError> {
        match (self.grantee, self.scope) {
            (Grantee::Everyone, RuleScope::All) => {}
            (Grantee::Everyone, scope) => {
                return Err(ValidationError::EveryoneRequiresScopeAll(scope.as_str()));
            }
            (Grantee::User(_), _) => {}
        }
        if self.scope == RuleScope::Exclude && self.level != PermissionLevel::Deny {
            return Err(ValidationError::ExcludeRequiresDeny);
        }
        if let Some(priority) = self.priority
            && priority < 0
        {
            return Err(ValidationError::NegativePriority(priority));
        }
        self.instrument_filter.validate()?;
        validate_expiry(self.expires_at, now)?;
        validate_text("notes", self.notes.as_deref())
    }
}

/// Persisted permission rule.
///
/// # Invariants
/// - `id` is unique and never reused.
/// - A rule with `revoked_at` set never matches an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Store-assigned identifier.
    pub id: RuleId,
    /// Owner of the data or resource.
    pub grantor: UserId,
    /// Audience of the rule.
    pub grantee: Grantee,
    /// Permission category.
    pub permission_kind: PermissionKind,
    /// Resource class governed by the rule.
    pub resource: ResourceKind,
    /// Governed action; `None` is read as `view`.
    pub action: Option<ActionKind>,
    /// Allow or deny.
    pub level: PermissionLevel,
    /// Declared audience shape.
    pub scope: RuleScope,
    /// Instrument narrowing.
    pub instrument_filter: InstrumentFilter,
    /// Tie-break priority among rules of the same tier.
    pub priority: Option<i32>,
    /// Identity that wrote the rule.
    pub granted_by: UserId,
    /// Time the rule was written.
    pub granted_at: Timestamp,
    /// Optional expiry.
    pub expires_at: Option<Timestamp>,
    /// Time the rule was revoked.
    pub revoked_at: Option<Timestamp>,
    /// Identity that revoked the rule.
    pub revoked_by: Option<UserId>,
    /// Free-form notes.
    pub notes: Option<String>,
}

impl PermissionRule {
    /// Materializes a stored rule from writer input.
    #[must_use]
    pub fn from_new(id: RuleId, rule: &NewPermissionRule, granted_at: Timestamp) -> Self {
        Self {
            id,
            grantor: rule.grantor,
            grantee: rule.grantee,
            permission_kind: rule.permission_kind,
            resource: rule.resource,
            action: rule.action,
            level: rule.level,
            scope: rule.scope,
            instrument_filter: rule.instrument_filter.clone(),
            priority: rule.priority,
            granted_by: rule.granted_by,
            granted_at,
            expires_at: rule.expires_at,
            revoked_at: None,
            revoked_by: None,
            notes: rule.notes.clone(),
        }
    }

    /// Returns the governed action, defaulting to `view`.
    #[must_use]
    pub fn effective_action(&self) -> ActionKind {
        self.action.unwrap_or(ActionKind::View)
    }

    /// Returns true when the rule is neither revoked nor expired at `now`.
    #[must_use]
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }

    /// Returns true when the rule governs the given request shape at `now`.
    #[must_use]
    pub fn applies_to(
        &self,
        actor: UserId,
        resource: ResourceKind,
        action: ActionKind,
        instrument: Option<&InstrumentKey>,
        now: Timestamp,
    ) -> bool {
        self.is_active(now)
            && self.grantee.covers(actor)
            && self.resource == resource
            && self.effective_action().covers(action)
            && self.instrument_filter.applies_to(self.level, instrument)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
