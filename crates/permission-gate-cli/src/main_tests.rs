// crates/permission-gate-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for bounded reads and argument parsing helpers.
// Purpose: Ensure CLI inputs fail closed when oversized or malformed.
// Dependencies: permission-gate-cli main helpers
// ============================================================================

//! ## Overview
//! Validates `read_bytes_with_limit`, intent decoding, and identifier parsing.
//!
//! Security posture: CLI inputs are untrusted; size limits must fail closed.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;

use permission_gate_core::RestrictionIntent;
use tempfile::TempDir;

use super::MAX_INTENT_BYTES;
use super::MutationArgs;
use super::ReadLimitError;
use super::mutation_context;
use super::parse_rule_id;
use super::parse_user_id;
use super::read_bytes_with_limit;
use super::read_intent;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn read_bytes_with_limit_allows_small_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("small.json");
    fs::write(&path, b"{}").unwrap();
    let bytes = read_bytes_with_limit(&path, 16).unwrap();
    assert_eq!(bytes, b"{}");
}

#[test]
fn read_bytes_with_limit_rejects_oversized_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("large.json");
    fs::write(&path, vec![b'a'; 32]).unwrap();
    match read_bytes_with_limit(&path, 16) {
        Err(ReadLimitError::TooLarge {
            size,
            limit,
        }) => {
            assert_eq!(size, 32);
            assert_eq!(limit, 16);
        }
        other => panic!("expected size rejection, got {other:?}"),
    }
}

#[test]
fn read_bytes_with_limit_reports_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = read_bytes_with_limit(&dir.path().join("absent.json"), MAX_INTENT_BYTES);
    assert!(matches!(result, Err(ReadLimitError::Io(_))));
}

#[test]
fn read_intent_names_the_input_kind_on_bad_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("intent.json");
    fs::write(&path, b"{\"target\": 0}").unwrap();
    let err = read_intent::<RestrictionIntent>(&path, "restriction intent").unwrap_err();
    assert!(err.to_string().starts_with("invalid restriction intent"));
}

#[test]
fn identifier_parsers_reject_zero_and_garbage() {
    assert_eq!(parse_user_id(" 42 ").unwrap().get(), 42);
    assert!(parse_user_id("0").unwrap_err().contains("greater than zero"));
    assert!(parse_user_id("abc").unwrap_err().contains("integer"));
    assert!(parse_rule_id("-3").is_err());
}

#[test]
fn mutation_context_carries_audit_metadata() {
    let context = mutation_context(MutationArgs {
        caller: parse_user_id("10").unwrap(),
        reason: Some("quarterly review".to_string()),
        ip_address: Some("10.0.0.8".to_string()),
        user_agent: None,
    });
    assert_eq!(context.caller.get(), 10);
    assert_eq!(context.reason.as_deref(), Some("quarterly review"));
    assert_eq!(context.client.ip_address.as_deref(), Some("10.0.0.8"));
    assert!(context.client.user_agent.is_none());
}
