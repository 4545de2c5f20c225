// crates/workstream-config/src/lib.rs
// ============================================================================
// Module: Workstream Config Library
// Description: Canonical config model, validation, and example output.
// Purpose: Single source of truth for workstream-gate.toml semantics.
// Dependencies: workstream-core, serde, toml
// ============================================================================

//! ## Overview
//! `workstream-config` defines the canonical configuration model for
//! Workstream Gate. It provides strict, fail-closed validation, converts the
//! `[[workstreams]]` seed into registry entries, and renders a canonical
//! example.
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
