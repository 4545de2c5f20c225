// crates/workstream-core/src/lib.rs
// ============================================================================
// Module: Workstream Core Library
// Description: Tenant context, isolation, permissions, and audit primitives.
// Purpose: Gate and scope every operation on tenant-owned storage.
// Dependencies: serde, serde_json, thiserror, time, tempfile, rand
// ============================================================================

//! ## Overview
//! `workstream-core` is the multi-tenant isolation layer. For every operation
//! it resolves the owning workstream ([`ContextExtractor`]), validates it
//! against the [`Registry`], enforces the deny-by-default
//! [`PermissionMatrix`], derives traversal-safe storage paths
//! ([`PathResolver`]), and records an append-only trail ([`AuditLogger`]).
//! Transports compose these primitives; the core never generates content.
//!
//! Security posture: every request channel is untrusted; tenant storage roots
//! come only from the registry.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod context;
pub mod error;
pub mod identifiers;
pub mod model;
pub mod ops;
pub mod paths;
pub mod permissions;
pub mod registry;
pub mod storage;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::Actor;
pub use audit::AuditDetail;
pub use audit::AuditDraft;
pub use audit::AuditError;
pub use audit::AuditExtra;
pub use audit::AuditLogEntry;
pub use audit::AuditLogger;
pub use audit::AuditOutcome;
pub use audit::AuditSource;
pub use context::ContextError;
pub use context::ContextExtractor;
pub use context::DefaultWorkstreamPolicy;
pub use context::DetectionSource;
pub use context::OperationDescriptor;
pub use context::RequestContext;
pub use error::ErrorCategory;
pub use error::GateError;
pub use identifiers::EntryId;
pub use identifiers::NameError;
pub use identifiers::WorkstreamName;
pub use model::OperationKind;
pub use model::Permission;
pub use model::StorageCategory;
pub use model::WorkstreamConfig;
pub use model::WorkstreamStatus;
pub use ops::OpsEvent;
pub use ops::OpsEventKind;
pub use ops::OpsEventSink;
pub use paths::PathError;
pub use paths::PathResolver;
pub use paths::normalize_resource;
pub use paths::tenant_root_for;
pub use permissions::PermissionDenied;
pub use permissions::PermissionMatrix;
pub use registry::Registry;
pub use registry::RegistryError;
pub use registry::WorkstreamDirectory;
