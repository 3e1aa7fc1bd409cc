// crates/permission-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Permission Gate Runtime
// Description: Evaluation, expansion, audit, cache, and service facade.
// Purpose: Execute permission decisions and audited writes over the interfaces.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The runtime composes the evaluator, scope expander, audit recorder,
//! evaluation cache, and mutation authorizer behind [`PermissionService`].
//! It also ships the in-memory store, static identity directory, clocks, and
//! JSON-line observers used by tests and the CLI.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod authz;
pub mod cache;
pub mod clock;
pub mod error;
pub mod evaluator;
pub mod expander;
pub mod identity;
pub mod observer;
pub mod service;
pub mod sharing;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditChange;
pub use audit::AuditRecorder;
pub use audit::MutationContext;
pub use authz::AuthzDecision;
pub use authz::MutationAction;
pub use authz::MutationAuthorizer;
pub use authz::NoopMutationAuthorizer;
pub use authz::StandingAuthorizer;
pub use cache::CacheSettings;
pub use cache::EvaluationCache;
pub use clock::FixedClock;
pub use clock::SystemClock;
pub use error::PermissionError;
pub use evaluator::Evaluator;
pub use expander::DataSharingIntent;
pub use expander::ExpansionPlan;
pub use expander::InstrumentScope;
pub use expander::RestrictionConfig;
pub use expander::RestrictionIntent;
pub use expander::ScopeExpander;
pub use expander::SharingScope;
pub use expander::TradingActionConfig;
pub use expander::TradingGrantIntent;
pub use identity::StaticIdentityDirectory;
pub use observer::DecisionEvent;
pub use observer::ExpansionEvent;
pub use observer::FileJsonObserver;
pub use observer::IntentKind;
pub use observer::MutationEvent;
pub use observer::MutationKind;
pub use observer::NoopObserver;
pub use observer::PermissionObserver;
pub use observer::StderrJsonObserver;
pub use service::PermissionService;
pub use service::PermissionServiceConfig;
pub use service::RevokeOutcome;
pub use sharing::SharingSettings;
pub use sharing::ViewerSet;
pub use store::InMemoryPermissionStore;
