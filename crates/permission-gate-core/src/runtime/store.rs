// crates/permission-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Permission Gate In-Memory Store
// Description: Simple in-memory permission store for tests and examples.
// Purpose: Provide a transactional store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`PermissionStore`].
//! A transaction holds the table lock and stages only the rows it touches:
//! new or revoked rules and restrictions, appended audit entries, and the
//! advanced identifier counters. Commit merges the delta into the tables;
//! drop discards it. Reads inside a transaction consult the delta first.
//! It is not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::AUDIT_CHAIN_GENESIS;
use crate::core::AuditEntryId;
use crate::core::AuditLogEntry;
use crate::core::AuditRecord;
use crate::core::NewPermissionRule;
use crate::core::NewRestriction;
use crate::core::PermissionRule;
use crate::core::Restriction;
use crate::core::RestrictionId;
use crate::core::RuleId;
use crate::core::Timestamp;
use crate::core::UserId;
use crate::interfaces::AuditQuery;
use crate::interfaces::PermissionStore;
use crate::interfaces::RestrictionQuery;
use crate::interfaces::RuleQuery;
use crate::interfaces::StoreError;
use crate::interfaces::StoreTransaction;

// ============================================================================
// SECTION: Tables
// ============================================================================

/// Table contents guarded by the store mutex.
#[derive(Debug, Default)]
struct MemoryTables {
    /// Rules by identifier.
    rules: BTreeMap<RuleId, PermissionRule>,
    /// Restrictions by identifier.
    restrictions: BTreeMap<RestrictionId, Restriction>,
    /// Audit entries in append order.
    audit: Vec<AuditLogEntry>,
    /// Last assigned rule identifier.
    last_rule_id: u64,
    /// Last assigned restriction identifier.
    last_restriction_id: u64,
    /// Last assigned audit identifier.
    last_audit_id: u64,
}

/// Advances an identifier counter and returns the new raw value.
fn allocate(counter: &mut u64, label: &str) -> Result<u64, StoreError> {
    *counter = counter
        .checked_add(1)
        .ok_or_else(|| StoreError::Store(format!("{label} id space exhausted")))?;
    Ok(*counter)
}

/// Maps a poisoned mutex into a store error.
fn poisoned<T>(_: T) -> StoreError {
    StoreError::Store("permission store mutex poisoned".to_string())
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory permission store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPermissionStore {
    /// Tables protected by a mutex.
    tables: Arc<Mutex<MemoryTables>>,
}

impl InMemoryPermissionStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionStore for InMemoryPermissionStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        let guard = self.tables.lock().map_err(poisoned)?;
        let staged = StagedWrites::starting_from(&guard);
        Ok(Box::new(InMemoryTransaction {
            guard,
            staged,
        }))
    }

    fn find_rules(&self, query: &RuleQuery) -> Result<Vec<PermissionRule>, StoreError> {
        let tables = self.tables.lock().map_err(poisoned)?;
        Ok(tables.rules.values().filter(|rule| query.matches(rule)).cloned().collect())
    }

    fn find_restrictions(&self, query: &RestrictionQuery) -> Result<Vec<Restriction>, StoreError> {
        let tables = self.tables.lock().map_err(poisoned)?;
        Ok(tables
            .restrictions
            .values()
            .filter(|restriction| query.matches(restriction))
            .cloned()
            .collect())
    }

    fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
        let tables = self.tables.lock().map_err(poisoned)?;
        let mut entries: Vec<&AuditLogEntry> =
            tables.audit.iter().filter(|entry| query.matches(entry)).collect();
        entries.sort_by_key(|entry| Reverse((entry.record.recorded_at, entry.id)));
        Ok(entries.into_iter().skip(query.offset).take(query.limit).cloned().collect())
    }

    fn audit_chain(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        let tables = self.tables.lock().map_err(poisoned)?;
        Ok(tables.audit.clone())
    }
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Rows written by an open transaction.
#[derive(Debug, Default)]
struct StagedWrites {
    /// Inserted or revoked rules; shadow committed rows with the same id.
    rules: BTreeMap<RuleId, PermissionRule>,
    /// Inserted or revoked restrictions; shadow committed rows.
    restrictions: BTreeMap<RestrictionId, Restriction>,
    /// Audit entries appended after the committed tail.
    audit: Vec<AuditLogEntry>,
    /// Rule counter as advanced by this transaction.
    last_rule_id: u64,
    /// Restriction counter as advanced by this transaction.
    last_restriction_id: u64,
    /// Audit counter as advanced by this transaction.
    last_audit_id: u64,
}

impl StagedWrites {
    /// Starts an empty delta at the committed counters.
    fn starting_from(tables: &MemoryTables) -> Self {
        Self {
            last_rule_id: tables.last_rule_id,
            last_restriction_id: tables.last_restriction_id,
            last_audit_id: tables.last_audit_id,
            ..Self::default()
        }
    }

    /// Folds the delta into the committed tables.
    fn merge_into(self, tables: &mut MemoryTables) {
        tables.rules.extend(self.rules);
        tables.restrictions.extend(self.restrictions);
        tables.audit.extend(self.audit);
        tables.last_rule_id = self.last_rule_id;
        tables.last_restriction_id = self.last_restriction_id;
        tables.last_audit_id = self.last_audit_id;
    }
}

/// Transaction staging writes as a delta over the locked tables.
struct InMemoryTransaction<'a> {
    /// Held lock; serializes writers and blocks readers until done.
    guard: MutexGuard<'a, MemoryTables>,
    /// Pending writes.
    staged: StagedWrites,
}

impl InMemoryTransaction<'_> {
    /// Returns the rule as this transaction sees it.
    fn visible_rule(&self, id: RuleId) -> Option<&PermissionRule> {
        self.staged.rules.get(&id).or_else(|| self.guard.rules.get(&id))
    }

    /// Returns the restriction as this transaction sees it.
    fn visible_restriction(&self, id: RestrictionId) -> Option<&Restriction> {
        self.staged.restrictions.get(&id).or_else(|| self.guard.restrictions.get(&id))
    }
}

impl StoreTransaction for InMemoryTransaction<'_> {
    fn insert_rule(
        &mut self,
        rule: &NewPermissionRule,
        granted_at: Timestamp,
    ) -> Result<PermissionRule, StoreError> {
        let raw = allocate(&mut self.staged.last_rule_id, "rule")?;
        let id = RuleId::from_raw(raw)
            .ok_or_else(|| StoreError::Store("rule id allocation produced zero".to_string()))?;
        let stored = PermissionRule::from_new(id, rule, granted_at);
        self.staged.rules.insert(id, stored.clone());
        Ok(stored)
    }

    fn insert_restriction(
        &mut self,
        restriction: &NewRestriction,
        applied_at: Timestamp,
    ) -> Result<Restriction, StoreError> {
        let raw = allocate(&mut self.staged.last_restriction_id, "restriction")?;
        let id = RestrictionId::from_raw(raw).ok_or_else(|| {
            StoreError::Store("restriction id allocation produced zero".to_string())
        })?;
        let stored = Restriction::from_new(id, restriction, applied_at);
        self.staged.restrictions.insert(id, stored.clone());
        Ok(stored)
    }

    fn rule(&mut self, id: RuleId) -> Result<Option<PermissionRule>, StoreError> {
        Ok(self.visible_rule(id).cloned())
    }

    fn restriction(&mut self, id: RestrictionId) -> Result<Option<Restriction>, StoreError> {
        Ok(self.visible_restriction(id).cloned())
    }

    fn revoke_rule(
        &mut self,
        id: RuleId,
        revoked_by: UserId,
        revoked_at: Timestamp,
    ) -> Result<PermissionRule, StoreError> {
        let mut rule = self
            .visible_rule(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("rule {id}")))?;
        rule.revoked_at = Some(revoked_at);
        rule.revoked_by = Some(revoked_by);
        self.staged.rules.insert(id, rule.clone());
        Ok(rule)
    }

    fn revoke_restriction(
        &mut self,
        id: RestrictionId,
        revoked_by: UserId,
        revoked_at: Timestamp,
    ) -> Result<Restriction, StoreError> {
        let mut restriction = self
            .visible_restriction(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("restriction {id}")))?;
        restriction.revoked_at = Some(revoked_at);
        restriction.revoked_by = Some(revoked_by);
        self.staged.restrictions.insert(id, restriction.clone());
        Ok(restriction)
    }

    fn append_audit(&mut self, record: AuditRecord) -> Result<AuditLogEntry, StoreError> {
        let raw = allocate(&mut self.staged.last_audit_id, "audit")?;
        let id = AuditEntryId::from_raw(raw)
            .ok_or_else(|| StoreError::Store("audit id allocation produced zero".to_string()))?;
        let prev_hash = self
            .staged
            .audit
            .last()
            .or_else(|| self.guard.audit.last())
            .map_or_else(|| AUDIT_CHAIN_GENESIS.to_string(), |entry| entry.hash.clone());
        let entry = AuditLogEntry::seal(id, record, prev_hash)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        self.staged.audit.push(entry.clone());
        Ok(entry)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let staged = std::mem::take(&mut self.staged);
        staged.merge_into(&mut self.guard);
        Ok(())
    }
}
