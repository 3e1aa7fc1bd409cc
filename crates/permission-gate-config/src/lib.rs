// crates/permission-gate-config/src/lib.rs
// ============================================================================
// Module: Permission Gate Config Library
// Description: Canonical config model, validation, and example payloads.
// Purpose: Single source of truth for permission-gate.toml semantics.
// Dependencies: permission-gate-core, permission-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `permission-gate-config` defines the configuration model for Permission
//! Gate hosts. It provides strict, fail-closed validation and converts the
//! validated model into the runtime settings the core service consumes.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
