// crates/permission-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Permission Gate Interfaces
// Description: Backend-agnostic traits for storage, identity, and time.
// Purpose: Keep the evaluator independent of databases and identity systems.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The runtime reaches storage, identity, and wall-clock time only through
//! the traits in this module. Stores must keep every mutation and its audit
//! row in one [`StoreTransaction`]; dropping a transaction without calling
//! [`StoreTransaction::commit`] discards every staged write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::ActionKind;
use crate::core::AuditLogEntry;
use crate::core::AuditRecord;
use crate::core::Grantee;
use crate::core::IdentityProfile;
use crate::core::NewPermissionRule;
use crate::core::NewRestriction;
use crate::core::PermissionKind;
use crate::core::PermissionLevel;
use crate::core::PermissionRule;
use crate::core::ResourceKind;
use crate::core::Restriction;
use crate::core::RestrictionId;
use crate::core::RuleId;
use crate::core::Timestamp;
use crate::core::UserId;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Identity resolution errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Identity backend is unavailable.
    #[error("identity backend unavailable: {0}")]
    Unavailable(String),
}

/// Resolves roles and organization membership for users.
pub trait IdentityResolver: Send + Sync {
    /// Returns the profile for `user`, or `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the backend cannot answer.
    fn profile(&self, user: UserId) -> Result<Option<IdentityProfile>, IdentityError>;
}

// ============================================================================
// SECTION: Store Queries
// ============================================================================

/// Grantee narrowing for rule queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GranteeFilter {
    /// Rules whose grantee is exactly this audience.
    Exactly(Grantee),
    /// Rules naming this user plus rules for everyone.
    ActorOrEveryone(UserId),
}

/// Rule lookup filter; unset fields do not narrow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleQuery {
    /// Grantor narrowing.
    pub grantor: Option<UserId>,
    /// Grantee narrowing.
    pub grantee: Option<GranteeFilter>,
    /// Permission category narrowing.
    pub permission_kind: Option<PermissionKind>,
    /// Resource class narrowing.
    pub resource: Option<ResourceKind>,
    /// Rules whose action covers this action (`all` rules included).
    pub action: Option<ActionKind>,
    /// Allow or deny narrowing.
    pub level: Option<PermissionLevel>,
    /// Only rules neither revoked nor expired at this time.
    pub active_at: Option<Timestamp>,
}

impl RuleQuery {
    /// Returns true when `rule` satisfies every set field.
    #[must_use]
    pub fn matches(&self, rule: &PermissionRule) -> bool {
        let grantee_matches = match self.grantee {
            None => true,
            Some(GranteeFilter::Exactly(grantee)) => rule.grantee == grantee,
            Some(GranteeFilter::ActorOrEveryone(actor)) => rule.grantee.covers(actor),
        };
        grantee_matches
            && self.grantor.is_none_or(|grantor| rule.grantor == grantor)
            && self.permission_kind.is_none_or(|kind| rule.permission_kind == kind)
            && self.resource.is_none_or(|resource| rule.resource == resource)
            && self.action.is_none_or(|action| rule.effective_action().covers(action))
            && self.level.is_none_or(|level| rule.level == level)
            && self.active_at.is_none_or(|now| rule.is_active(now))
    }
}

/// Restriction lookup filter; unset fields do not narrow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestrictionQuery {
    /// Restricted user narrowing.
    pub restricted_user: Option<UserId>,
    /// Imposer narrowing.
    pub imposed_by: Option<UserId>,
    /// Only restrictions neither revoked nor expired at this time.
    pub active_at: Option<Timestamp>,
}

impl RestrictionQuery {
    /// Returns true when `restriction` satisfies every set field.
    #[must_use]
    pub fn matches(&self, restriction: &Restriction) -> bool {
        self.restricted_user.is_none_or(|user| restriction.restricted_user == user)
            && self.imposed_by.is_none_or(|user| restriction.imposed_by == user)
            && self.active_at.is_none_or(|now| restriction.is_active(now))
    }
}

/// Audit log page request, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditQuery {
    /// Entries where this user is actor or target; all entries when unset.
    pub subject: Option<UserId>,
    /// Entries to skip.
    pub offset: usize,
    /// Maximum entries to return.
    pub limit: usize,
}

impl AuditQuery {
    /// Returns true when the entry belongs to the query subject.
    #[must_use]
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.subject.is_none_or(|user| entry.record.involves(user))
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Permission store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("permission store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("permission store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("permission store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("permission store invalid data: {0}")]
    Invalid(String),
    /// Referenced record does not exist.
    #[error("permission store record not found: {0}")]
    NotFound(String),
    /// Store reported an error.
    #[error("permission store error: {0}")]
    Store(String),
}

/// Atomic unit of work against a [`PermissionStore`].
///
/// Writes become visible to readers only after [`StoreTransaction::commit`].
pub trait StoreTransaction {
    /// Inserts a rule and returns it with its assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_rule(
        &mut self,
        rule: &NewPermissionRule,
        granted_at: Timestamp,
    ) -> Result<PermissionRule, StoreError>;

    /// Inserts a restriction and returns it with its assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_restriction(
        &mut self,
        restriction: &NewRestriction,
        applied_at: Timestamp,
    ) -> Result<Restriction, StoreError>;

    /// Loads a rule, including revoked rules.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn rule(&mut self, id: RuleId) -> Result<Option<PermissionRule>, StoreError>;

    /// Loads a restriction, including revoked restrictions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn restriction(&mut self, id: RestrictionId) -> Result<Option<Restriction>, StoreError>;

    /// Marks a rule revoked and returns the updated row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown rules.
    fn revoke_rule(
        &mut self,
        id: RuleId,
        revoked_by: UserId,
        revoked_at: Timestamp,
    ) -> Result<PermissionRule, StoreError>;

    /// Marks a restriction revoked and returns the updated row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown restrictions.
    fn revoke_restriction(
        &mut self,
        id: RestrictionId,
        revoked_by: UserId,
        revoked_at: Timestamp,
    ) -> Result<Restriction, StoreError>;

    /// Seals and appends an audit record after the current chain head.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when sealing or the insert fails.
    fn append_audit(&mut self, record: AuditRecord) -> Result<AuditLogEntry, StoreError>;

    /// Commits every staged write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails; nothing is persisted.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Persistence for rules, restrictions, and the audit log.
pub trait PermissionStore: Send + Sync {
    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction cannot start.
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;

    /// Returns rules matching `query` in id order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn find_rules(&self, query: &RuleQuery) -> Result<Vec<PermissionRule>, StoreError>;

    /// Returns restrictions matching `query` in id order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn find_restrictions(&self, query: &RestrictionQuery) -> Result<Vec<Restriction>, StoreError>;

    /// Returns one page of audit entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError>;

    /// Returns the full audit chain in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn audit_chain(&self) -> Result<Vec<AuditLogEntry>, StoreError>;
}
