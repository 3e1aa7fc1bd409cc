// crates/permission-gate-core/src/core/restriction.rs
// ============================================================================
// Module: Trading Restrictions
// Description: Administrative blocks that outrank every user-level grant.
// Purpose: Define restriction rows and the matching used by tier one.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Restriction`] is imposed on a user by an administrator or organization
//! owner. Hard restrictions block regardless of any grant; soft and warning
//! restrictions surface a notice and let evaluation continue.
//!
//! Value limits and time windows are recorded with their kind label only.
//! Enforcing numeric or clock-window limits is the job of the order path,
//! which has the quantities this crate never sees.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::InstrumentKey;
use crate::core::identifiers::RestrictionId;
use crate::core::identifiers::UserId;
use crate::core::rule::ActionKind;
use crate::core::rule::ResourceKind;
use crate::core::rule::label_enum;
use crate::core::time::Timestamp;
use crate::core::validation::ValidationError;
use crate::core::validation::validate_expiry;
use crate::core::validation::validate_instrument_set;
use crate::core::validation::validate_text;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Descriptive category of a restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionKind {
    /// Blocks listed instruments.
    InstrumentBlacklist,
    /// Blocks listed actions.
    ActionLimit,
    /// Caps order value (enforced by the order path).
    ValueLimit,
    /// Limits trading hours (enforced by the order path).
    TimeWindow,
}

label_enum!(RestrictionKind, "restriction_type", {
    InstrumentBlacklist => "instrument_blacklist",
    ActionLimit => "action_limit",
    ValueLimit => "value_limit",
    TimeWindow => "time_window",
});

/// How strongly a restriction is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    /// Blocks the request.
    Hard,
    /// Allows evaluation to continue with a notice.
    Soft,
    /// Informational notice only.
    Warning,
}

label_enum!(Enforcement, "enforcement_type", {
    Hard => "hard",
    Soft => "soft",
    Warning => "warning",
});

impl Enforcement {
    /// Returns a rank where higher values are stricter.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::Hard => 2,
            Self::Soft => 1,
            Self::Warning => 0,
        }
    }

    /// Returns true when the restriction blocks outright.
    #[must_use]
    pub const fn blocks(self) -> bool {
        matches!(self, Self::Hard)
    }
}

// ============================================================================
// SECTION: Restrictions
// ============================================================================

/// Restriction content supplied by an administrator before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRestriction {
    /// User the restriction applies to.
    pub restricted_user: UserId,
    /// Identity imposing the restriction.
    pub imposed_by: UserId,
    /// Descriptive category.
    pub kind: RestrictionKind,
    /// Resource class narrowed to, or every resource when absent.
    #[serde(default)]
    pub resource: Option<ResourceKind>,
    /// Blocked action.
    pub action: ActionKind,
    /// Blocked instruments; empty means every instrument.
    #[serde(default)]
    pub instrument_keys: BTreeSet<InstrumentKey>,
    /// Precedence among overlapping restrictions.
    pub priority: i32,
    /// Enforcement strength.
    pub enforcement: Enforcement,
    /// Optional expiry.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewRestriction {
    /// Validates the restriction against write-time invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the restriction is malformed or expired.
    pub fn validate(&self, now: Timestamp) -> Result<(), ValidationError> {
        if self.priority < 0 {
            return Err(ValidationError::NegativePriority(self.priority));
        }
        if self.kind == RestrictionKind::InstrumentBlacklist && self.instrument_keys.is_empty() {
            return Err(ValidationError::EmptyInstrumentList("instrument blacklist restriction"));
        }
        validate_instrument_set(self.instrument_keys.iter())?;
        validate_expiry(self.expires_at, now)?;
        validate_text("notes", self.notes.as_deref())
    }
}

/// Persisted trading restriction.
///
/// # Invariants
/// - Revoked restrictions are retained and never match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    /// Store-assigned identifier.
    pub id: RestrictionId,
    /// User the restriction applies to.
    pub restricted_user: UserId,
    /// Identity imposing the restriction.
    pub imposed_by: UserId,
    /// Descriptive category.
    pub kind: RestrictionKind,
    /// Resource class narrowed to, or every resource when absent.
    pub resource: Option<ResourceKind>,
    /// Blocked action.
    pub action: ActionKind,
    /// Blocked instruments; empty means every instrument.
    pub instrument_keys: BTreeSet<InstrumentKey>,
    /// Precedence among overlapping restrictions.
    pub priority: i32,
    /// Enforcement strength.
    pub enforcement: Enforcement,
    /// Time the restriction was applied.
    pub applied_at: Timestamp,
    /// Optional expiry.
    pub expires_at: Option<Timestamp>,
    /// Time the restriction was revoked.
    pub revoked_at: Option<Timestamp>,
    /// Identity that revoked the restriction.
    pub revoked_by: Option<UserId>,
    /// Free-form notes.
    pub notes: Option<String>,
}

impl Restriction {
    /// Materializes a stored restriction from administrator input.
    #[must_use]
    pub fn from_new(
        id: RestrictionId,
        restriction: &NewRestriction,
        applied_at: Timestamp,
    ) -> Self {
        Self {
            id,
            restricted_user: restriction.restricted_user,
            imposed_by: restriction.imposed_by,
            kind: restriction.kind,
            resource: restriction.resource,
            action: restriction.action,
            instrument_keys: restriction.instrument_keys.clone(),
            priority: restriction.priority,
            enforcement: restriction.enforcement,
            applied_at,
            expires_at: restriction.expires_at,
            revoked_at: None,
            revoked_by: None,
            notes: restriction.notes.clone(),
        }
    }

    /// Returns true when the restriction is neither revoked nor expired at `now`.
    #[must_use]
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }

    /// Returns true when the restriction governs the request shape.
    ///
    /// Requests without an instrument only match restrictions that do not
    /// name instruments.
    #[must_use]
    pub fn applies_to(
        &self,
        resource: ResourceKind,
        action: ActionKind,
        instrument: Option<&InstrumentKey>,
    ) -> bool {
        let resource_matches = self.resource.is_none_or(|narrowed| narrowed == resource);
        let instrument_matches = match instrument {
            None => self.instrument_keys.is_empty(),
            Some(key) => self.instrument_keys.is_empty() || self.instrument_keys.contains(key),
        };
        resource_matches && self.action.covers(action) && instrument_matches
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
