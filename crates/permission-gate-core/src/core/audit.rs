// crates/permission-gate-core/src/core/audit.rs
// ============================================================================
// Module: Permission Audit Records
// Description: Append-only, hash-chained audit rows for every mutation.
// Purpose: Record who changed what, with before/after values, tamper-evidently.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every grant, denial, restriction, and revocation writes one [`AuditRecord`]
//! inside the same transaction as the change. Stores seal each record into an
//! [`AuditLogEntry`] whose hash covers the previous entry's hash, and
//! [`verify_audit_chain`] replays the chain to detect edits or gaps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::hashing::AUDIT_CHAIN_GENESIS;
use crate::core::hashing::HashError;
use crate::core::hashing::chain_hash;
use crate::core::identifiers::AuditEntryId;
use crate::core::identifiers::Grantee;
use crate::core::identifiers::UserId;
use crate::core::rule::label_enum;
use crate::core::time::Timestamp;
use crate::core::validation::ValidationError;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Kind of change an audit row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditActionType {
    /// An allow rule was written.
    Grant,
    /// A deny rule was written.
    Deny,
    /// A rule or restriction was revoked.
    Revoke,
    /// A rule was modified in place.
    Modify,
    /// A restriction was imposed.
    Restrict,
    /// An evaluation was denied by a restriction or explicit deny.
    AccessDenied,
}

impl AuditActionType {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grant => "GRANT",
            Self::Deny => "DENY",
            Self::Revoke => "REVOKE",
            Self::Modify => "MODIFY",
            Self::Restrict => "RESTRICT",
            Self::AccessDenied => "ACCESS_DENIED",
        }
    }
}

impl fmt::Display for AuditActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditActionType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GRANT" => Ok(Self::Grant),
            "DENY" => Ok(Self::Deny),
            "REVOKE" => Ok(Self::Revoke),
            "MODIFY" => Ok(Self::Modify),
            "RESTRICT" => Ok(Self::Restrict),
            "ACCESS_DENIED" => Ok(Self::AccessDenied),
            _ => Err(ValidationError::UnknownValue {
                field: "action_type",
                value: value.to_string(),
            }),
        }
    }
}

/// Logical table a change applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditTable {
    /// Permission rules.
    UserPermissions,
    /// Trading restrictions.
    TradingRestrictions,
    /// Denied evaluations.
    Evaluations,
}

label_enum!(AuditTable, "table_name", {
    UserPermissions => "user_permissions",
    TradingRestrictions => "trading_restrictions",
    Evaluations => "evaluations",
});

// ============================================================================
// SECTION: Records
// ============================================================================

/// Request origin metadata captured with a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// Client IP address when known.
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Client user agent when known.
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Audit payload written by the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Identity that made the change.
    pub actor: UserId,
    /// Identity the change affects.
    pub target: Grantee,
    /// Kind of change.
    pub action_type: AuditActionType,
    /// Logical table changed.
    pub table: AuditTable,
    /// Identifier of the changed row, when one exists.
    pub record_id: Option<u64>,
    /// Values before the change.
    pub old_values: Option<Value>,
    /// Values after the change.
    pub new_values: Option<Value>,
    /// Operator-supplied reason.
    pub reason: Option<String>,
    /// Time of the change.
    pub recorded_at: Timestamp,
    /// Request origin.
    #[serde(default)]
    pub client: ClientMetadata,
}

impl AuditRecord {
    /// Returns true when `user` is either the actor or the target.
    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.actor == user || self.target == Grantee::User(user)
    }
}

/// Sealed, chained audit entry.
///
/// # Invariants
/// - `hash` is the chain hash of `record` following `prev_hash`.
/// - Entries are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Store-assigned identifier; strictly increasing.
    pub id: AuditEntryId,
    /// Audited payload.
    #[serde(flatten)]
    pub record: AuditRecord,
    /// Hash of the preceding entry, or the genesis marker.
    pub prev_hash: String,
    /// Hash of this entry.
    pub hash: String,
}

impl AuditLogEntry {
    /// Seals a record after `prev_hash`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the record cannot be canonicalized.
    pub fn seal(
        id: AuditEntryId,
        record: AuditRecord,
        prev_hash: impl Into<String>,
    ) -> Result<Self, HashError> {
        let prev_hash = prev_hash.into();
        let digest = chain_hash(&prev_hash, &record)?;
        Ok(Self {
            id,
            record,
            prev_hash,
            hash: digest.value,
        })
    }
}

// ============================================================================
// SECTION: Chain Verification
// ============================================================================

/// Audit chain verification failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuditChainError {
    /// An entry does not point at its predecessor's hash.
    #[error("audit entry {id} breaks the chain: expected prev_hash {expected}")]
    BrokenLink {
        /// Offending entry.
        id: AuditEntryId,
        /// Hash the entry should have referenced.
        expected: String,
    },
    /// An entry's stored hash does not match its content.
    #[error("audit entry {id} hash mismatch")]
    HashMismatch {
        /// Offending entry.
        id: AuditEntryId,
    },
    /// Entry identifiers are not strictly increasing.
    #[error("audit entry {id} is out of order")]
    OutOfOrder {
        /// Offending entry.
        id: AuditEntryId,
    },
    /// An entry could not be hashed.
    #[error("audit entry {id} could not be hashed: {message}")]
    Hash {
        /// Offending entry.
        id: AuditEntryId,
        /// Hash error detail.
        message: String,
    },
}

/// Verifies a full audit chain in ascending id order.
///
/// # Errors
///
/// Returns [`AuditChainError`] at the first entry that breaks the chain.
pub fn verify_audit_chain(entries: &[AuditLogEntry]) -> Result<(), AuditChainError> {
    let mut expected_prev = AUDIT_CHAIN_GENESIS.to_string();
    let mut last_id: Option<AuditEntryId> = None;
    for entry in entries {
        if last_id.is_some_and(|last| entry.id <= last) {
            return Err(AuditChainError::OutOfOrder {
                id: entry.id,
            });
        }
        if entry.prev_hash != expected_prev {
            return Err(AuditChainError::BrokenLink {
                id: entry.id,
                expected: expected_prev,
            });
        }
        let digest = chain_hash(&entry.prev_hash, &entry.record).map_err(|err| {
            AuditChainError::Hash {
                id: entry.id,
                message: err.to_string(),
            }
        })?;
        if digest.value != entry.hash {
            return Err(AuditChainError::HashMismatch {
                id: entry.id,
            });
        }
        expected_prev.clone_from(&entry.hash);
        last_id = Some(entry.id);
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests use unwrap on fixed inputs.")]

    use serde_json::json;

    use super::AuditActionType;
    use super::AuditChainError;
    use super::AuditLogEntry;
    use super::AuditRecord;
    use super::AuditTable;
    use super::ClientMetadata;
    use super::verify_audit_chain;
    use crate::core::hashing::AUDIT_CHAIN_GENESIS;
    use crate::core::identifiers::AuditEntryId;
    use crate::core::identifiers::Grantee;
    use crate::core::identifiers::UserId;
    use crate::core::time::Timestamp;

    fn record(n: u64) -> AuditRecord {
        AuditRecord {
            actor: UserId::from_raw(1).unwrap(),
            target: Grantee::User(UserId::from_raw(2).unwrap()),
            action_type: AuditActionType::Grant,
            table: AuditTable::UserPermissions,
            record_id: Some(n),
            old_values: None,
            new_values: Some(json!({"rule": n})),
            reason: None,
            recorded_at: Timestamp::from_unix_millis(1_000),
            client: ClientMetadata::default(),
        }
    }

    fn chain(len: u64) -> Vec<AuditLogEntry> {
        let mut prev = AUDIT_CHAIN_GENESIS.to_string();
        let mut entries = Vec::new();
        for n in 1..=len {
            let entry = AuditLogEntry::seal(AuditEntryId::from_raw(n).unwrap(), record(n), prev)
                .unwrap();
            prev = entry.hash.clone();
            entries.push(entry);
        }
        entries
    }

    #[test]
    fn intact_chain_verifies() {
        assert_eq!(verify_audit_chain(&chain(4)), Ok(()));
    }

    #[test]
    fn edited_payload_is_detected() {
        let mut entries = chain(3);
        entries[1].record.reason = Some("rewritten".to_string());
        assert_eq!(
            verify_audit_chain(&entries),
            Err(AuditChainError::HashMismatch {
                id: AuditEntryId::from_raw(2).unwrap(),
            })
        );
    }

    #[test]
    fn deleted_entry_is_detected() {
        let mut entries = chain(3);
        entries.remove(1);
        assert!(matches!(
            verify_audit_chain(&entries),
            Err(AuditChainError::BrokenLink { .. })
        ));
    }

    #[test]
    fn action_type_labels_roundtrip() {
        assert_eq!("access_denied".parse::<AuditActionType>().unwrap(), AuditActionType::AccessDenied);
        assert_eq!(AuditTable::TradingRestrictions.as_str(), "trading_restrictions");
    }
}
