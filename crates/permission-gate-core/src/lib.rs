// crates/permission-gate-core/src/lib.rs
// ============================================================================
// Module: Permission Gate Core Library
// Description: Public API surface for the Permission Gate core.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Permission Gate decides whether a user may view or act on another user's
//! trading resources. Decisions follow a fixed precedence: restriction,
//! explicit deny, explicit grant, role default, system default. Every write
//! is audited in the same transaction that makes it, and the audit log is
//! hash-chained.
//!
//! The crate is storage-agnostic: hosts supply a [`PermissionStore`], an
//! [`IdentityResolver`], and a [`Clock`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AuditQuery;
pub use interfaces::Clock;
pub use interfaces::GranteeFilter;
pub use interfaces::IdentityError;
pub use interfaces::IdentityResolver;
pub use interfaces::PermissionStore;
pub use interfaces::RestrictionQuery;
pub use interfaces::RuleQuery;
pub use interfaces::StoreError;
pub use interfaces::StoreTransaction;
pub use runtime::AuthzDecision;
pub use runtime::CacheSettings;
pub use runtime::DataSharingIntent;
pub use runtime::DecisionEvent;
pub use runtime::EvaluationCache;
pub use runtime::Evaluator;
pub use runtime::ExpansionEvent;
pub use runtime::ExpansionPlan;
pub use runtime::FileJsonObserver;
pub use runtime::FixedClock;
pub use runtime::InMemoryPermissionStore;
pub use runtime::InstrumentScope;
pub use runtime::IntentKind;
pub use runtime::MutationAction;
pub use runtime::MutationAuthorizer;
pub use runtime::MutationContext;
pub use runtime::MutationEvent;
pub use runtime::MutationKind;
pub use runtime::NoopMutationAuthorizer;
pub use runtime::NoopObserver;
pub use runtime::PermissionError;
pub use runtime::PermissionObserver;
pub use runtime::PermissionService;
pub use runtime::PermissionServiceConfig;
pub use runtime::RestrictionConfig;
pub use runtime::RestrictionIntent;
pub use runtime::RevokeOutcome;
pub use runtime::ScopeExpander;
pub use runtime::SharingScope;
pub use runtime::SharingSettings;
pub use runtime::StandingAuthorizer;
pub use runtime::StaticIdentityDirectory;
pub use runtime::StderrJsonObserver;
pub use runtime::SystemClock;
pub use runtime::TradingActionConfig;
pub use runtime::TradingGrantIntent;
pub use runtime::ViewerSet;
