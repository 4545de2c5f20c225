// crates/workstream-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and `config example`.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for Workstream Gate configuration. The output is
//! deterministic and validated by the crate's tests.
//!
//! Security posture: examples are static templates; the default workstream is
//! left disabled.

/// Returns a canonical example `workstream-gate.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[server]
bind = "127.0.0.1:8420"
max_body_bytes = 1048576

[server.ops_log]
enabled = true
# path = "/var/log/workstream-gate/ops.jsonl"

[storage]
root = "/var/lib/workstream-gate"
registry_path = "registry.json"

[audit]
retention = 500

[context]
allow_default = false
# default_workstream = "ora"

[[workstreams]]
name = "ora"
display_name = "Ora"
description = "Assistant-led coordination workstream"
owner = "platform"
phase = "delivery"
status = "active"
allowed_operations = ["read", "write", "mutate", "delete", "chat", "admin"]

[[workstreams]]
name = "mecca"
display_name = "Mecca"
description = "Venue programme"
owner = "programmes"
phase = "planning"
status = "planning"
allowed_operations = ["read", "write", "mutate", "chat"]

[[workstreams]]
name = "sales"
display_name = "Sales"
description = "Pipeline and account planning"
owner = "commercial"
phase = "delivery"
status = "active"
allowed_operations = ["read", "write", "mutate", "chat"]
"#,
    )
}
