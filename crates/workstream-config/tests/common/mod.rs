// crates/workstream-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for workstream-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use workstream_config::ConfigError;
use workstream_config::WorkstreamGateConfig;
use workstream_config::WorkstreamSeed;
use workstream_core::Permission;
use workstream_core::WorkstreamStatus;

/// Parses a TOML string into a `WorkstreamGateConfig` without validating it.
pub fn config_from_toml(toml_str: &str) -> Result<WorkstreamGateConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a minimal config with all defaults applied.
pub fn minimal_config() -> Result<WorkstreamGateConfig, toml::de::Error> {
    config_from_toml("")
}

/// Returns a seed entry with the given permissions.
pub fn seed(name: &str, permissions: &[Permission]) -> WorkstreamSeed {
    WorkstreamSeed {
        name: name.to_string(),
        display_name: String::new(),
        description: String::new(),
        owner: String::new(),
        phase: String::new(),
        status: WorkstreamStatus::Active,
        data_path: None,
        allowed_operations: permissions.to_vec(),
    }
}

/// Asserts that validation failed with a message containing `needle`.
pub fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> Result<(), String> {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}
