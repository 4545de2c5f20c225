// crates/workstream-server/src/gate/tests.rs
// ============================================================================
// Module: Context Middleware Tests
// Description: Short-circuit, audit, and failure isolation behavior.
// Purpose: Ensure handlers only run for admitted, permitted operations.
// Dependencies: workstream-core, tokio, tempfile
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test fixtures use explicit asserts and unwraps for clarity."
)]

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use serde_json::json;
use workstream_core::AuditOutcome;
use workstream_core::ContextError;
use workstream_core::OperationKind;
use workstream_core::PathResolver;
use workstream_core::Permission;
use workstream_core::PermissionMatrix;
use workstream_core::Registry;
use workstream_core::WorkstreamConfig;
use workstream_core::WorkstreamStatus;
use workstream_core::ops::MemoryOpsSink;
use workstream_core::tenant_root_for;

use super::*;
use crate::handlers::ArtefactAction;
use crate::handlers::ArtefactHandler;
use crate::handlers::GateServices;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Handler double counting invocations.
struct CountingHandler {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl OperationHandler for CountingHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        _request: &OperationRequest,
    ) -> Result<HandlerOutput, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(HandlerError::from_category(ErrorCategory::NotFound));
        }
        Ok(HandlerOutput::json(
            SuccessStatus::Ok,
            json!({ "workstream": context.workstream }),
            AuditSummary::new("handled"),
        ))
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: std::path::PathBuf,
    registry: Arc<Registry>,
    audit: Arc<AuditLogger>,
    ops: Arc<MemoryOpsSink>,
    middleware: ContextMiddleware,
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

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let registry = Arc::new(
        Registry::from_configs(vec![
            tenant(&root, "ora", &Permission::ALL),
            tenant(&root, "mecca", &[Permission::Read, Permission::Write, Permission::Mutate, Permission::Chat]),
        ])
        .unwrap(),
    );
    let ops = Arc::new(MemoryOpsSink::new());
    let audit = Arc::new(AuditLogger::new(PathResolver::new(registry.clone()), ops.clone()));
    let middleware = ContextMiddleware::new(
        ContextExtractor::new(registry.clone()),
        PermissionMatrix::new(registry.clone()),
        Arc::clone(&audit),
        ops.clone(),
    );
    Fixture {
        _dir: dir,
        root,
        registry,
        audit,
        ops,
        middleware,
    }
}

fn counting(fixture: &Fixture, fail: bool) -> (WrappedHandler, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = fixture.middleware.wrap(CountingHandler {
        calls: Arc::clone(&calls),
        fail,
    });
    (handler, calls)
}

fn request(kind: OperationKind, workstream: Option<&str>) -> OperationRequest {
    let mut descriptor = OperationDescriptor::new(kind, "/api/artefacts/notes.md");
    if let Some(workstream) = workstream {
        descriptor = descriptor.with_query("workstream", workstream);
    }
    OperationRequest::new(descriptor).with_resource("notes.md")
}

fn artefacts(fixture: &Fixture, action: ArtefactAction) -> WrappedHandler {
    let services = Arc::new(GateServices {
        registry: Arc::clone(&fixture.registry),
        resolver: PathResolver::new(fixture.registry.clone()),
        audit: Arc::clone(&fixture.audit),
        ops: fixture.ops.clone(),
        storage_root: fixture.root.clone(),
    });
    fixture.middleware.wrap(ArtefactHandler::new(services, action))
}

fn artefact_request(kind: OperationKind, resource: &str) -> OperationRequest {
    let descriptor = OperationDescriptor::new(kind, "").with_query("workstream", "ora");
    OperationRequest::new(descriptor).with_resource(resource).with_payload(Bytes::from_static(b"plan"))
}

fn name(slug: &str) -> WorkstreamName {
    WorkstreamName::parse(slug).unwrap()
}

// ============================================================================
// SECTION: Short-Circuit
// ============================================================================

#[tokio::test]
async fn missing_workstream_never_reaches_the_handler() {
    let fixture = fixture();
    let (handler, calls) = counting(&fixture, false);
    let err = handler.call(request(OperationKind::ReadArtefact, None)).await.unwrap_err();
    assert_eq!(err, CallError::Gate(GateError::Context(ContextError::MissingWorkstream)));
    assert_eq!(err.category(), ErrorCategory::MissingWorkstream);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_workstream_never_reaches_the_handler() {
    let fixture = fixture();
    let (handler, calls) = counting(&fixture, false);
    let err = handler.call(request(OperationKind::ReadArtefact, Some("../ora"))).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidWorkstreamFormat);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_workstream_never_reaches_the_handler() {
    let fixture = fixture();
    let (handler, calls) = counting(&fixture, false);
    let err = handler.call(request(OperationKind::ReadArtefact, Some("ghost"))).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::UnknownWorkstream);
    assert_eq!(err.client_message(), "unknown workstream");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn denied_operation_is_reported_without_a_tenant_entry() {
    let fixture = fixture();
    let (handler, calls) = counting(&fixture, false);
    let err = handler.call(request(OperationKind::DeleteArtefact, Some("mecca"))).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::PermissionDenied);
    assert_eq!(err.client_message(), "access denied to workstream");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(fixture.audit.read(&name("mecca"), None).unwrap().is_empty());

    let events = fixture.ops.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, OpsEventKind::GateRejected);
    assert_eq!(events[0].category, Some("permission_denied"));
    assert_eq!(events[0].message.as_deref(), Some("artefact.delete"));
}

// ============================================================================
// SECTION: Audit
// ============================================================================

#[tokio::test]
async fn admitted_operation_is_audited_with_detection_source() {
    let fixture = fixture();
    let (handler, calls) = counting(&fixture, false);
    let output = handler.call(request(OperationKind::ReadArtefact, Some("mecca"))).await.unwrap();
    assert_eq!(output.status, SuccessStatus::Ok);
    assert_eq!(output.body, HandlerBody::Json(json!({ "workstream": "mecca" })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let entries = fixture.audit.read(&name("mecca"), None).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "handled");
    assert_eq!(entries[0].context, "notes.md");
    assert_eq!(entries[0].outcome, AuditOutcome::Success);
    assert_eq!(entries[0].tags, vec!["artefact.read".to_string(), "query".to_string()]);
    assert!(fixture.audit.read(&name("ora"), None).unwrap().is_empty());
}

#[tokio::test]
async fn handler_failure_is_audited_and_returned() {
    let fixture = fixture();
    let (handler, calls) = counting(&fixture, true);
    let err = handler.call(request(OperationKind::ReadArtefact, Some("ora"))).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let entries = fixture.audit.read(&name("ora"), None).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Failure);
    assert_eq!(entries[0].message, "artefact.read failed: not_found");
}

#[tokio::test]
async fn rejected_artefact_paths_are_never_recorded() {
    let fixture = fixture();
    let handler = artefacts(&fixture, ArtefactAction::Read);
    let err = handler.call(artefact_request(OperationKind::ReadArtefact, "../../../etc/passwd")).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidResourcePath);

    let entries = fixture.audit.read(&name("ora"), None).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Failure);
    assert_eq!(entries[0].message, "artefact.read failed: invalid_resource_path");
    assert_eq!(entries[0].context, "");
    assert!(entries[0].detail.is_none());
    assert!(!serde_json::to_string(&entries).unwrap().contains("passwd"));
    for event in fixture.ops.events() {
        assert!(!serde_json::to_string(&event).unwrap().contains("passwd"));
    }
}

#[tokio::test]
async fn artefact_entries_record_the_normalized_path() {
    let fixture = fixture();
    let handler = artefacts(&fixture, ArtefactAction::Replace);
    handler.call(artefact_request(OperationKind::ReplaceArtefact, "tasks/./drafts/../board.md")).await.unwrap();

    let entries = fixture.audit.read(&name("ora"), None).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].context, "tasks/board.md");
    assert!(matches!(
        &entries[0].detail,
        Some(AuditDetail::Artefact { path, bytes: Some(4) }) if path == "tasks/board.md"
    ));
}

#[tokio::test]
async fn self_audited_output_skips_the_middleware_entry() {
    struct SelfAudited;

    #[async_trait]
    impl OperationHandler for SelfAudited {
        async fn handle(
            &self,
            _context: &RequestContext,
            _request: &OperationRequest,
        ) -> Result<HandlerOutput, HandlerError> {
            Ok(HandlerOutput {
                status: SuccessStatus::Created,
                body: HandlerBody::Empty,
                audit: None,
            })
        }
    }

    let fixture = fixture();
    let handler = fixture.middleware.wrap(SelfAudited);
    let output = handler.call(request(OperationKind::AppendAuditEntry, Some("ora"))).await.unwrap();
    assert_eq!(output.status, SuccessStatus::Created);
    assert!(fixture.audit.read(&name("ora"), None).unwrap().is_empty());
}

#[tokio::test]
async fn audit_write_failure_does_not_change_the_result() {
    let fixture = fixture();
    let tenant_root = tenant_root_for(&fixture.root, &name("ora"));
    std::fs::create_dir_all(&tenant_root).unwrap();
    std::fs::write(tenant_root.join("logs"), b"not a directory").unwrap();

    let (handler, calls) = counting(&fixture, false);
    let output = handler.call(request(OperationKind::ReadArtefact, Some("ora"))).await.unwrap();
    assert_eq!(output.status, SuccessStatus::Ok);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(fixture.ops.kinds().contains(&OpsEventKind::AuditWriteFailed));
}

#[tokio::test]
async fn storage_failures_use_the_fixed_client_message() {
    let err = CallError::Handler(HandlerError {
        category: ErrorCategory::StorageFailure,
        message: "/srv/ws/ora/artefacts/x: permission denied".to_string(),
    });
    assert_eq!(err.client_message(), "internal storage error");
}
