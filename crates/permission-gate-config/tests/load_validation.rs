// crates/permission-gate-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load Validation Tests
// Description: Tests for config loading limits and section validation.
// Purpose: Ensure configuration fails closed on malformed or unsafe input.
// ============================================================================

//! ## Overview
//! Exercises file loading (size, encoding, missing files), per-section
//! validation, and conversion into core service settings.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;

use permission_gate_config::ConfigError;
use permission_gate_config::MAX_CONFIG_FILE_SIZE;
use permission_gate_config::ObservabilitySink;
use permission_gate_config::PermissionGateConfig;
use permission_gate_config::StoreType;
use permission_gate_config::config_toml_example;
use permission_gate_core::ActionKind;
use permission_gate_core::IdentityResolver;
use permission_gate_core::ResourceKind;
use permission_gate_core::Role;
use permission_gate_core::RoleDefaults;
use permission_gate_core::UserId;
use permission_gate_store_sqlite::SqliteStoreMode;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn user(raw: u64) -> UserId {
    UserId::from_raw(raw).expect("nonzero user id")
}

fn assert_invalid(content: &str, needle: &str) {
    match PermissionGateConfig::from_toml_str(content) {
        Err(ConfigError::Invalid(message)) => {
            assert!(message.contains(needle), "message `{message}` lacks `{needle}`");
        }
        other => panic!("expected invalid config, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

#[test]
fn example_config_loads_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("permission-gate.toml");
    fs::write(&path, config_toml_example()).unwrap();

    let config = PermissionGateConfig::load(Some(&path)).unwrap();
    assert_eq!(config.store.store_type, StoreType::Sqlite);
    assert_eq!(config.store.journal_mode, SqliteStoreMode::Wal);
    assert_eq!(config.observability.sink, ObservabilitySink::Stderr);
    assert_eq!(config.identities.len(), 3);
    assert_eq!(config.role_defaults(), RoleDefaults::platform());
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let result = PermissionGateConfig::load(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn oversized_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("large.toml");
    let padding = "#".repeat(MAX_CONFIG_FILE_SIZE + 1);
    fs::write(&path, padding).unwrap();
    let result = PermissionGateConfig::load(Some(&path));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn non_utf8_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("binary.toml");
    fs::write(&path, [0xff_u8, 0xfe, 0xfd]).unwrap();
    let result = PermissionGateConfig::load(Some(&path));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn unknown_fields_fail_parsing() {
    let result = PermissionGateConfig::from_toml_str("[cache]\nenabeld = true\n");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn empty_config_uses_memory_store_and_platform_defaults() {
    let config = PermissionGateConfig::from_toml_str("").unwrap();
    assert_eq!(config.store.store_type, StoreType::Memory);
    assert!(config.store.sqlite_config().is_none());
    let service = config.service_config();
    assert!(service.cache.is_none());
    assert!(!service.record_denied_evaluations);
    assert_eq!(service.audit_page_limit_default, 50);
    assert_eq!(service.audit_page_limit_max, 100);
    assert_eq!(service.role_defaults, RoleDefaults::platform());
}

// ============================================================================
// SECTION: Section Validation
// ============================================================================

#[test]
fn sqlite_store_requires_path() {
    assert_invalid("[store]\ntype = \"sqlite\"\n", "requires path");
}

#[test]
fn memory_store_rejects_path() {
    assert_invalid("[store]\ntype = \"memory\"\npath = \"x.db\"\n", "must not set path");
}

#[test]
fn sqlite_store_converts_to_store_settings() {
    let config = PermissionGateConfig::from_toml_str(
        "[store]\ntype = \"sqlite\"\npath = \"data/pg.db\"\nbusy_timeout_ms = 250\nsync_mode = \
         \"normal\"\n",
    )
    .unwrap();
    let sqlite = config.store.sqlite_config().unwrap();
    assert_eq!(sqlite.path.to_string_lossy(), "data/pg.db");
    assert_eq!(sqlite.busy_timeout_ms, 250);
    assert_eq!(sqlite.read_pool_size, 4);
}

#[test]
fn sqlite_read_pool_size_is_bounded() {
    assert_invalid(
        "[store]\ntype = \"sqlite\"\npath = \"pg.db\"\nread_pool_size = 0\n",
        "store.read_pool_size",
    );
    assert_invalid(
        "[store]\ntype = \"sqlite\"\npath = \"pg.db\"\nread_pool_size = 65\n",
        "store.read_pool_size",
    );
    let config = PermissionGateConfig::from_toml_str(
        "[store]\ntype = \"sqlite\"\npath = \"pg.db\"\nread_pool_size = 8\n",
    )
    .unwrap();
    assert_eq!(config.store.sqlite_config().unwrap().read_pool_size, 8);
}

#[test]
fn enabled_cache_bounds_are_checked() {
    assert_invalid("[cache]\nenabled = true\nttl_ms = 0\n", "cache.ttl_ms");
    assert_invalid("[cache]\nenabled = true\nmax_entries = 0\n", "cache.max_entries");
    let config =
        PermissionGateConfig::from_toml_str("[cache]\nenabled = true\nttl_ms = 500\n").unwrap();
    let settings = config.service_config().cache.unwrap();
    assert_eq!(settings.ttl_ms, 500);
}

#[test]
fn audit_page_limits_must_be_ordered() {
    assert_invalid("[audit]\npage_limit_max = 0\n", "page_limit_max");
    assert_invalid("[audit]\npage_limit_max = 500\n", "page_limit_max");
    assert_invalid("[audit]\npage_limit_default = 80\npage_limit_max = 60\n", "page_limit_default");
}

#[test]
fn expansion_row_limit_must_be_positive() {
    assert_invalid("[expansion]\nmax_rows = 0\n", "expansion.max_rows");
}

#[test]
fn file_sink_requires_path_and_other_sinks_reject_one() {
    assert_invalid("[observability]\nsink = \"file\"\n", "requires path");
    assert_invalid("[observability]\nsink = \"stderr\"\npath = \"events.log\"\n", "only valid");
    let config = PermissionGateConfig::from_toml_str(
        "[observability]\nsink = \"file\"\npath = \"events.log\"\n",
    )
    .unwrap();
    assert_eq!(config.observability.sink, ObservabilitySink::File);
}

#[test]
fn role_default_entries_need_resources_and_actions() {
    assert_invalid(
        "[[role_defaults]]\nrole = \"viewer\"\nresources = []\nactions = [\"view\"]\nallowed = \
         true\nownership = \"any\"\n",
        "resources must be non-empty",
    );
}

#[test]
fn custom_role_defaults_replace_the_platform_table() {
    let config = PermissionGateConfig::from_toml_str(
        "[[role_defaults]]\nrole = \"viewer\"\nresources = [\"orders\"]\nactions = \
         [\"view\"]\nallowed = true\nownership = \"any\"\n",
    )
    .unwrap();
    let table = config.role_defaults();
    assert_eq!(table.entries().len(), 1);
    assert_eq!(
        table.lookup(Role::Viewer, ResourceKind::Orders, ActionKind::View, false),
        Some(true)
    );
}

#[test]
fn duplicate_identities_are_rejected() {
    assert_invalid(
        "[[identities]]\nuser_id = 5\nrole = \"viewer\"\n\n[[identities]]\nuser_id = 5\nrole = \
         \"admin\"\n",
        "more than once",
    );
}

#[test]
fn identities_build_a_directory() {
    let config = PermissionGateConfig::from_toml_str(&config_toml_example()).unwrap();
    let directory = config.identity_directory();
    let profile = directory.profile(user(10)).unwrap().unwrap();
    assert_eq!(profile.role, Some(Role::Editor));
    assert_eq!(profile.owned_organizations.len(), 1);
    assert!(directory.profile(user(99)).unwrap().is_none());
}
