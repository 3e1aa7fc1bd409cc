// crates/permission-gate-core/src/core/mod.rs
// ============================================================================
// Module: Permission Gate Core Types
// Description: Canonical rule, restriction, evaluation, and audit structures.
// Purpose: Provide stable, serializable types shared by every store and host.
// Dependencies: serde, serde_json, serde_jcs, sha2, time
// ============================================================================

//! ## Overview
//! Core types describe the persisted permission model: rules, restrictions,
//! role defaults, evaluation results, and the hash-chained audit log. They
//! carry validation and matching logic but perform no I/O.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod evaluation;
pub mod hashing;
pub mod identifiers;
pub mod restriction;
pub mod role;
pub mod rule;
pub mod time;
pub mod validation;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditActionType;
pub use audit::AuditChainError;
pub use audit::AuditLogEntry;
pub use audit::AuditRecord;
pub use audit::AuditTable;
pub use audit::ClientMetadata;
pub use audit::verify_audit_chain;
pub use evaluation::DecisionReason;
pub use evaluation::EXPLICIT_DENY_PRIORITY;
pub use evaluation::EXPLICIT_GRANT_PRIORITY;
pub use evaluation::EvaluationRequest;
pub use evaluation::EvaluationResult;
pub use evaluation::ROLE_DEFAULT_PRIORITY;
pub use evaluation::RestrictionNotice;
pub use evaluation::SYSTEM_DEFAULT_PRIORITY;
pub use evaluation::WinningRecord;
pub use hashing::AUDIT_CHAIN_GENESIS;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::AuditEntryId;
pub use identifiers::Grantee;
pub use identifiers::InstrumentKey;
pub use identifiers::OrganizationId;
pub use identifiers::RestrictionId;
pub use identifiers::RuleId;
pub use identifiers::UserId;
pub use restriction::Enforcement;
pub use restriction::NewRestriction;
pub use restriction::Restriction;
pub use restriction::RestrictionKind;
pub use role::IdentityProfile;
pub use role::Ownership;
pub use role::Role;
pub use role::RoleDefault;
pub use role::RoleDefaults;
pub use rule::ActionKind;
pub use rule::InstrumentFilter;
pub use rule::NewPermissionRule;
pub use rule::PermissionKind;
pub use rule::PermissionLevel;
pub use rule::PermissionRule;
pub use rule::ResourceKind;
pub use rule::RuleScope;
pub use time::Timestamp;
pub use time::TimestampError;
pub use validation::ValidationError;
