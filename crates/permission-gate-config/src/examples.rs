// crates/permission-gate-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payloads.
// Purpose: Deterministic examples for docs and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for Permission Gate configuration. The output is
//! deterministic and must always pass validation.

/// Returns a canonical example `permission-gate.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[store]
type = "sqlite"
path = "permission-gate.db"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000
read_pool_size = 4

[cache]
enabled = true
ttl_ms = 30000
max_entries = 10000

[audit]
record_denied_evaluations = true
page_limit_default = 50
page_limit_max = 100

[expansion]
max_rows = 10000

[observability]
sink = "stderr"

[[role_defaults]]
role = "admin"
resources = ["positions", "holdings", "orders", "strategies", "margins"]
actions = ["all"]
allowed = true
ownership = "own"

[[role_defaults]]
role = "editor"
resources = ["positions", "holdings", "orders", "strategies", "margins"]
actions = ["view", "create", "modify"]
allowed = true
ownership = "own"

[[role_defaults]]
role = "viewer"
resources = ["positions", "holdings", "orders", "strategies", "margins"]
actions = ["view"]
allowed = true
ownership = "own"

[[identities]]
user_id = 1
role = "admin"

[[identities]]
user_id = 10
role = "editor"
organization = 7
owned_organizations = [7]

[[identities]]
user_id = 11
role = "viewer"
organization = 7
"#,
    )
}
