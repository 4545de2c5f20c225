//! End-to-end gate scenarios for workstream-core.
// crates/workstream-core/tests/scenarios.rs
// ============================================================================
// Module: Gate Scenarios
// Description: End-to-end core flows over the ora/mecca/sales tenant set.
// Purpose: Exercise extractor, matrix, resolver, and logger together.
// Dependencies: workstream-core, tempfile
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test fixtures use explicit asserts and unwraps for clarity."
)]

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use workstream_core::Actor;
use workstream_core::AuditDraft;
use workstream_core::AuditLogger;
use workstream_core::AuditSource;
use workstream_core::ContextError;
use workstream_core::ContextExtractor;
use workstream_core::OperationDescriptor;
use workstream_core::OperationKind;
use workstream_core::OpsEventKind;
use workstream_core::PathResolver;
use workstream_core::Permission;
use workstream_core::PermissionMatrix;
use workstream_core::Registry;
use workstream_core::WorkstreamConfig;
use workstream_core::WorkstreamName;
use workstream_core::WorkstreamStatus;
use workstream_core::ops::MemoryOpsSink;
use workstream_core::tenant_root_for;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

struct Gate {
    extractor: ContextExtractor,
    matrix: PermissionMatrix,
    logger: AuditLogger,
    ops: Arc<MemoryOpsSink>,
}

fn tenant(root: &Path, slug: &str, permissions: &[Permission]) -> WorkstreamConfig {
    let name = WorkstreamName::parse(slug).unwrap();
    WorkstreamConfig {
        data_path: tenant_root_for(root, &name),
        name,
        display_name: slug.to_string(),
        description: String::new(),
        owner: String::new(),
        phase: String::new(),
        status: WorkstreamStatus::Active,
        allowed_operations: permissions.iter().copied().collect::<BTreeSet<_>>(),
    }
}

fn gate(root: &Path) -> Gate {
    let registry = Arc::new(
        Registry::from_configs(vec![
            tenant(root, "ora", &Permission::ALL),
            tenant(root, "mecca", &[Permission::Read, Permission::Write, Permission::Mutate, Permission::Chat]),
            tenant(root, "sales", &[Permission::Read, Permission::Write]),
        ])
        .unwrap(),
    );
    let ops = Arc::new(MemoryOpsSink::new());
    Gate {
        extractor: ContextExtractor::new(registry.clone()),
        matrix: PermissionMatrix::new(registry.clone()),
        logger: AuditLogger::new(PathResolver::new(registry), ops.clone()),
        ops,
    }
}

fn delete_with_query(workstream: &str) -> OperationDescriptor {
    OperationDescriptor::new(OperationKind::DeleteArtefact, "/api/artefacts/tasks/1.json")
        .with_query("workstream", workstream)
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

#[test]
fn ora_may_delete() {
    let dir = tempfile::tempdir().unwrap();
    let gate = gate(dir.path());
    let operation = delete_with_query("ora");
    let context = gate.extractor.extract(&operation).unwrap();
    assert!(gate.matrix.check(&context.workstream, operation.kind.required_permission()).is_ok());
}

#[test]
fn mecca_may_not_delete() {
    let dir = tempfile::tempdir().unwrap();
    let gate = gate(dir.path());
    let operation = delete_with_query("mecca");
    let context = gate.extractor.extract(&operation).unwrap();
    let denied = gate.matrix.check(&context.workstream, operation.kind.required_permission()).unwrap_err();
    assert_eq!(denied.required, Permission::Delete);
}

#[test]
fn request_without_workstream_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gate = gate(dir.path());
    let operation = OperationDescriptor::new(OperationKind::ReadArtefact, "/api/artefacts/tasks/1.json");
    assert_eq!(gate.extractor.extract(&operation), Err(ContextError::MissingWorkstream));
}

#[test]
fn traversal_candidate_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let gate = gate(dir.path());
    let operation = OperationDescriptor::new(OperationKind::ReadArtefact, "/")
        .with_header("x-workstream", "../../../etc/passwd");
    assert!(matches!(gate.extractor.extract(&operation), Err(ContextError::InvalidFormat(_))));
}

#[test]
fn corrupt_sales_log_plus_one_append_yields_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    let gate = gate(dir.path());
    let log = dir.path().join("workstreams/sales/logs/audit-log.json");
    std::fs::create_dir_all(log.parent().unwrap()).unwrap();
    std::fs::write(&log, b"not json at all").unwrap();

    let sales = WorkstreamName::parse("sales").unwrap();
    gate.logger.append(&sales, AuditDraft::new(Actor::Ora, AuditSource::Chat, "recovered")).unwrap();

    let entries = gate.logger.read(&sales, None).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor, Actor::Ora);
    assert!(gate.ops.kinds().contains(&OpsEventKind::ReadCorruption));
}
