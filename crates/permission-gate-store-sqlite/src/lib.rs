// crates/permission-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Permission Gate SQLite Store
// Description: SQLite-backed persistence for rules, restrictions, and audit.
// Purpose: Provide a durable PermissionStore with transactional writes.
// Dependencies: permission-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate implements [`permission_gate_core::PermissionStore`] on top of
//! `SQLite`. A transaction maps to one `BEGIN IMMEDIATE` block, so a rule,
//! restriction, or revocation commits together with its audit row or not at
//! all.

pub mod store;

pub use store::SqlitePermissionStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
