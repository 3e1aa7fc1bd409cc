// crates/permission-gate-core/src/runtime/audit.rs
// ============================================================================
// Module: Audit Recorder
// Description: Writes audit rows inside the caller's store transaction.
// Purpose: Guarantee every committed mutation has exactly one audit row.
// Dependencies: crate::core, crate::interfaces, serde_json
// ============================================================================

//! ## Overview
//! [`AuditRecorder`] is bound to one [`MutationContext`] and one instant.
//! Each helper appends a row through the open [`StoreTransaction`]; if the
//! append fails, the caller drops the transaction and the mutation is
//! rolled back with it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::AuditActionType;
use crate::core::AuditLogEntry;
use crate::core::AuditRecord;
use crate::core::AuditTable;
use crate::core::ClientMetadata;
use crate::core::EvaluationRequest;
use crate::core::EvaluationResult;
use crate::core::Grantee;
use crate::core::PermissionLevel;
use crate::core::PermissionRule;
use crate::core::Restriction;
use crate::core::Timestamp;
use crate::core::UserId;
use crate::core::ValidationError;
use crate::core::validation::validate_text;
use crate::interfaces::StoreError;
use crate::interfaces::StoreTransaction;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Who is making a change and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationContext {
    /// Authenticated caller.
    pub caller: UserId,
    /// Operator-supplied reason copied into audit rows.
    pub reason: Option<String>,
    /// Request origin.
    pub client: ClientMetadata,
}

impl MutationContext {
    /// Creates a context with no reason or client metadata.
    #[must_use]
    pub fn new(caller: UserId) -> Self {
        Self {
            caller,
            reason: None,
            client: ClientMetadata::default(),
        }
    }

    /// Attaches a reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches client metadata.
    #[must_use]
    pub fn with_client(mut self, client: ClientMetadata) -> Self {
        self.client = client;
        self
    }

    /// Validates free-form fields.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when a field is too long.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_text("reason", self.reason.as_deref())?;
        validate_text("ip_address", self.client.ip_address.as_deref())?;
        validate_text("user_agent", self.client.user_agent.as_deref())
    }
}

// ============================================================================
// SECTION: Recorder
// ============================================================================

/// One audited change.
#[derive(Debug, Clone)]
pub struct AuditChange {
    /// Identity the change affects.
    pub target: Grantee,
    /// Kind of change.
    pub action_type: AuditActionType,
    /// Logical table changed.
    pub table: AuditTable,
    /// Changed row identifier.
    pub record_id: Option<u64>,
    /// Values before the change.
    pub old_values: Option<Value>,
    /// Values after the change.
    pub new_values: Option<Value>,
}

/// Appends audit rows for one mutation context.
pub struct AuditRecorder<'a> {
    /// Caller context.
    context: &'a MutationContext,
    /// Timestamp stamped on every row.
    recorded_at: Timestamp,
}

impl<'a> AuditRecorder<'a> {
    /// Creates a recorder for `context` at `recorded_at`.
    #[must_use]
    pub const fn new(context: &'a MutationContext, recorded_at: Timestamp) -> Self {
        Self {
            context,
            recorded_at,
        }
    }

    /// Appends one change.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the append fails.
    pub fn record<T: StoreTransaction + ?Sized>(
        &self,
        txn: &mut T,
        change: AuditChange,
    ) -> Result<AuditLogEntry, StoreError> {
        txn.append_audit(AuditRecord {
            actor: self.context.caller,
            target: change.target,
            action_type: change.action_type,
            table: change.table,
            record_id: change.record_id,
            old_values: change.old_values,
            new_values: change.new_values,
            reason: self.context.reason.clone(),
            recorded_at: self.recorded_at,
            client: self.context.client.clone(),
        })
    }

    /// Records a newly written rule as a grant or denial.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when serialization or the append fails.
    pub fn rule_written<T: StoreTransaction + ?Sized>(
        &self,
        txn: &mut T,
        rule: &PermissionRule,
    ) -> Result<AuditLogEntry, StoreError> {
        let action_type = match rule.level {
            PermissionLevel::Allow => AuditActionType::Grant,
            PermissionLevel::Deny => AuditActionType::Deny,
        };
        self.record(txn, AuditChange {
            target: rule.grantee,
            action_type,
            table: AuditTable::UserPermissions,
            record_id: Some(rule.id.get()),
            old_values: None,
            new_values: Some(to_value(rule)?),
        })
    }

    /// Records a rule revocation with before/after values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when serialization or the append fails.
    pub fn rule_revoked<T: StoreTransaction + ?Sized>(
        &self,
        txn: &mut T,
        before: &PermissionRule,
        after: &PermissionRule,
    ) -> Result<AuditLogEntry, StoreError> {
        self.record(txn, AuditChange {
            target: after.grantee,
            action_type: AuditActionType::Revoke,
            table: AuditTable::UserPermissions,
            record_id: Some(after.id.get()),
            old_values: Some(to_value(before)?),
            new_values: Some(to_value(after)?),
        })
    }

    /// Records a newly imposed restriction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when serialization or the append fails.
    pub fn restriction_written<T: StoreTransaction + ?Sized>(
        &self,
        txn: &mut T,
        restriction: &Restriction,
    ) -> Result<AuditLogEntry, StoreError> {
        self.record(txn, AuditChange {
            target: Grantee::User(restriction.restricted_user),
            action_type: AuditActionType::Restrict,
            table: AuditTable::TradingRestrictions,
            record_id: Some(restriction.id.get()),
            old_values: None,
            new_values: Some(to_value(restriction)?),
        })
    }

    /// Records a restriction revocation with before/after values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when serialization or the append fails.
    pub fn restriction_revoked<T: StoreTransaction + ?Sized>(
        &self,
        txn: &mut T,
        before: &Restriction,
        after: &Restriction,
    ) -> Result<AuditLogEntry, StoreError> {
        self.record(txn, AuditChange {
            target: Grantee::User(after.restricted_user),
            action_type: AuditActionType::Revoke,
            table: AuditTable::TradingRestrictions,
            record_id: Some(after.id.get()),
            old_values: Some(to_value(before)?),
            new_values: Some(to_value(after)?),
        })
    }

    /// Records a denied evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when serialization or the append fails.
    pub fn evaluation_denied<T: StoreTransaction + ?Sized>(
        &self,
        txn: &mut T,
        request: &EvaluationRequest,
        result: &EvaluationResult,
    ) -> Result<AuditLogEntry, StoreError> {
        let target = request.owner.map_or(Grantee::User(request.actor), Grantee::User);
        self.record(txn, AuditChange {
            target,
            action_type: AuditActionType::AccessDenied,
            table: AuditTable::Evaluations,
            record_id: None,
            old_values: None,
            new_values: Some(json!({
                "request": to_value(request)?,
                "result": to_value(result)?,
            })),
        })
    }
}

/// Serializes an audited value.
fn to_value<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|err| StoreError::Invalid(err.to_string()))
}
