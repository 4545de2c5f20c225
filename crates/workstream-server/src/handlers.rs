// crates/workstream-server/src/handlers.rs
// ============================================================================
// Module: Gated Operation Handlers
// Description: Artefact, audit, chat, and registry administration handlers.
// Purpose: Implement each gated operation against tenant-scoped storage.
// Dependencies: workstream-core, async-trait, serde, tokio
// ============================================================================

//! ## Overview
//! Handlers run only after [`crate::gate::ContextMiddleware`] admits a
//! request, and receive the resolved [`RequestContext`]. Every filesystem
//! path comes from [`PathResolver`]; artefact bodies are opaque bytes. All
//! blocking I/O runs on the blocking pool so that a cancelled request cannot
//! leave a partially applied write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use workstream_core::AuditDetail;
use workstream_core::AuditDraft;
use workstream_core::AuditError;
use workstream_core::AuditExtra;
use workstream_core::AuditLogger;
use workstream_core::ErrorCategory;
use workstream_core::OpsEvent;
use workstream_core::OpsEventKind;
use workstream_core::OpsEventSink;
use workstream_core::PathError;
use workstream_core::PathResolver;
use workstream_core::Permission;
use workstream_core::Registry;
use workstream_core::RegistryError;
use workstream_core::RequestContext;
use workstream_core::StorageCategory;
use workstream_core::WorkstreamConfig;
use workstream_core::WorkstreamDirectory;
use workstream_core::WorkstreamName;
use workstream_core::WorkstreamStatus;
use workstream_core::audit::MAX_MESSAGE_BYTES;
use workstream_core::normalize_resource;
use workstream_core::storage::write_atomic;
use workstream_core::storage::write_atomic_new;
use workstream_core::tenant_root_for;

use crate::gate::AuditSummary;
use crate::gate::HandlerBody;
use crate::gate::HandlerError;
use crate::gate::HandlerOutput;
use crate::gate::OperationHandler;
use crate::gate::OperationRequest;
use crate::gate::SuccessStatus;

// ============================================================================
// SECTION: Shared Services
// ============================================================================

/// Core services shared by all handlers.
pub struct GateServices {
    /// Workstream registry.
    pub registry: Arc<Registry>,
    /// Tenant path resolver.
    pub resolver: PathResolver,
    /// Tenant audit logger.
    pub audit: Arc<AuditLogger>,
    /// Operational event sink.
    pub ops: Arc<dyn OpsEventSink>,
    /// Service storage root for new tenants.
    pub storage_root: PathBuf,
}

/// Public view of a registry entry; storage roots stay internal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkstreamSummary {
    /// Workstream slug.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Free-form description.
    pub description: String,
    /// Owning person or team.
    pub owner: String,
    /// Delivery phase label.
    pub phase: String,
    /// Lifecycle status.
    pub status: WorkstreamStatus,
    /// Granted permissions.
    pub allowed_operations: Vec<Permission>,
}

impl From<&WorkstreamConfig> for WorkstreamSummary {
    fn from(config: &WorkstreamConfig) -> Self {
        Self {
            name: config.name.to_string(),
            display_name: config.display_name.clone(),
            description: config.description.clone(),
            owner: config.owner.clone(),
            phase: config.phase.clone(),
            status: config.status,
            allowed_operations: config.allowed_operations.iter().copied().collect(),
        }
    }
}

// ============================================================================
// SECTION: Workstream Description
// ============================================================================

/// Describes the resolved workstream.
pub struct DescribeWorkstreamHandler {
    /// Shared services.
    services: Arc<GateServices>,
}

impl DescribeWorkstreamHandler {
    /// Creates the handler.
    #[must_use]
    pub const fn new(services: Arc<GateServices>) -> Self {
        Self {
            services,
        }
    }
}

#[async_trait]
impl OperationHandler for DescribeWorkstreamHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        _request: &OperationRequest,
    ) -> Result<HandlerOutput, HandlerError> {
        let config = self
            .services
            .registry
            .get(&context.workstream)
            .ok_or_else(|| HandlerError::from_category(ErrorCategory::UnknownWorkstream))?;
        let summary = WorkstreamSummary::from(config.as_ref());
        Ok(HandlerOutput::json(
            SuccessStatus::Ok,
            json!(summary),
            AuditSummary::new("workstream described"),
        ))
    }
}

// ============================================================================
// SECTION: Artefacts
// ============================================================================

/// Artefact operation variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtefactAction {
    /// Return the artefact bytes.
    Read,
    /// Create an artefact that must not exist.
    Create,
    /// Create or overwrite an artefact.
    Replace,
    /// Remove an artefact.
    Delete,
}

/// Raw artefact access under the tenant `artefacts` directory.
pub struct ArtefactHandler {
    /// Shared services.
    services: Arc<GateServices>,
    /// Operation variant.
    action: ArtefactAction,
}

impl ArtefactHandler {
    /// Creates the handler for an action.
    #[must_use]
    pub const fn new(services: Arc<GateServices>, action: ArtefactAction) -> Self {
        Self {
            services,
            action,
        }
    }
}

#[async_trait]
impl OperationHandler for ArtefactHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        request: &OperationRequest,
    ) -> Result<HandlerOutput, HandlerError> {
        let resource = request
            .resource
            .clone()
            .filter(|resource| !resource.is_empty())
            .ok_or_else(|| HandlerError::invalid_request("artefact path is required"))?;
        let path = self
            .services
            .resolver
            .resolve(&context.workstream, StorageCategory::Artefacts, &[resource.as_str()])
            .map_err(path_error)?;
        let resource = normalize_resource(&resource).map_err(path_error)?;
        let payload = request.payload.clone();
        let bytes = u64::try_from(payload.len()).ok();
        let summary = |message: &str, bytes: Option<u64>| {
            AuditSummary::new(message).with_context(resource.clone()).with_detail(AuditDetail::Artefact {
                path: resource.clone(),
                bytes,
            })
        };
        match self.action {
            ArtefactAction::Read => {
                let content = blocking(move || {
                    if !path.is_file() {
                        return Err(HandlerError::from_category(ErrorCategory::NotFound));
                    }
                    fs::read(&path).map_err(io_error)
                })
                .await?;
                let size = u64::try_from(content.len()).ok();
                Ok(HandlerOutput {
                    status: SuccessStatus::Ok,
                    body: HandlerBody::Bytes(content.into()),
                    audit: Some(summary("artefact read", size)),
                })
            }
            ArtefactAction::Create => {
                blocking(move || {
                    write_atomic_new(&path, &payload).map_err(|err| {
                        if err.kind() == io::ErrorKind::AlreadyExists {
                            HandlerError::invalid_request("artefact already exists")
                        } else {
                            io_error(err)
                        }
                    })
                })
                .await?;
                Ok(HandlerOutput::json(
                    SuccessStatus::Created,
                    json!({ "path": resource, "bytes": bytes }),
                    summary("artefact created", bytes),
                ))
            }
            ArtefactAction::Replace => {
                blocking(move || write_atomic(&path, &payload).map_err(io_error)).await?;
                Ok(HandlerOutput::json(
                    SuccessStatus::Ok,
                    json!({ "path": resource, "bytes": bytes }),
                    summary("artefact replaced", bytes),
                ))
            }
            ArtefactAction::Delete => {
                blocking(move || {
                    if !path.is_file() {
                        return Err(HandlerError::from_category(ErrorCategory::NotFound));
                    }
                    fs::remove_file(&path).map_err(io_error)
                })
                .await?;
                Ok(HandlerOutput {
                    status: SuccessStatus::NoContent,
                    body: HandlerBody::Empty,
                    audit: Some(summary("artefact deleted", None)),
                })
            }
        }
    }
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

/// Returns the tenant audit log, most-recent-first.
pub struct ReadAuditLogHandler {
    /// Shared services.
    services: Arc<GateServices>,
}

impl ReadAuditLogHandler {
    /// Creates the handler.
    #[must_use]
    pub const fn new(services: Arc<GateServices>) -> Self {
        Self {
            services,
        }
    }
}

#[async_trait]
impl OperationHandler for ReadAuditLogHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        request: &OperationRequest,
    ) -> Result<HandlerOutput, HandlerError> {
        let limit = match request.descriptor.query.get("limit") {
            Some(raw) => Some(
                raw.parse::<usize>()
                    .map_err(|_| HandlerError::invalid_request("limit must be a non-negative integer"))?,
            ),
            None => None,
        };
        let audit = Arc::clone(&self.services.audit);
        let name = context.workstream.clone();
        let entries = blocking(move || audit.read(&name, limit).map_err(audit_error)).await?;
        Ok(HandlerOutput::json(
            SuccessStatus::Ok,
            json!({ "workstream": context.workstream, "entries": entries }),
            AuditSummary::new("audit log read"),
        ))
    }
}

/// Caller-supplied audit entry.
#[derive(Debug, Deserialize)]
struct AppendAuditBody {
    /// Human-readable summary.
    message: String,
    /// Free-form resource identifier.
    #[serde(default)]
    context: String,
    /// Ordered tags.
    #[serde(default)]
    tags: Vec<String>,
    /// Typed detail.
    #[serde(default)]
    detail: Option<AuditDetail>,
    /// Bounded open-ended attributes.
    #[serde(default)]
    extra: AuditExtra,
}

/// Appends a caller-supplied entry; the entry is the operation's own record.
pub struct AppendAuditEntryHandler {
    /// Shared services.
    services: Arc<GateServices>,
}

impl AppendAuditEntryHandler {
    /// Creates the handler.
    #[must_use]
    pub const fn new(services: Arc<GateServices>) -> Self {
        Self {
            services,
        }
    }
}

#[async_trait]
impl OperationHandler for AppendAuditEntryHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        request: &OperationRequest,
    ) -> Result<HandlerOutput, HandlerError> {
        let body: AppendAuditBody = parse_json(&request.payload)?;
        let mut draft = AuditDraft::new(request.actor, request.source, body.message).with_context(body.context);
        draft.tags = body.tags;
        draft.detail = body.detail;
        draft.extra = body.extra;
        let audit = Arc::clone(&self.services.audit);
        let name = context.workstream.clone();
        let id = blocking(move || audit.append(&name, draft).map_err(audit_error)).await?;
        Ok(HandlerOutput {
            status: SuccessStatus::Created,
            body: HandlerBody::Json(json!({ "id": id })),
            audit: None,
        })
    }
}

// ============================================================================
// SECTION: Chat
// ============================================================================

/// Chat record request.
#[derive(Debug, Deserialize)]
struct ChatBody {
    /// Chat message text.
    message: String,
}

/// Records a chat interaction in the tenant audit log.
pub struct RecordChatHandler;

#[async_trait]
impl OperationHandler for RecordChatHandler {
    async fn handle(
        &self,
        _context: &RequestContext,
        request: &OperationRequest,
    ) -> Result<HandlerOutput, HandlerError> {
        let body: ChatBody = parse_json(&request.payload)?;
        if body.message.trim().is_empty() {
            return Err(HandlerError::invalid_request("chat message must be non-empty"));
        }
        if body.message.len() > MAX_MESSAGE_BYTES {
            return Err(HandlerError::invalid_request("chat message too long"));
        }
        Ok(HandlerOutput::json(
            SuccessStatus::Created,
            json!({ "recorded": true }),
            AuditSummary::new("chat recorded").with_detail(AuditDetail::Note {
                text: body.message,
            }),
        ))
    }
}

// ============================================================================
// SECTION: Registry Administration
// ============================================================================

/// Administrative create request.
#[derive(Debug, Deserialize)]
struct CreateWorkstreamBody {
    /// New workstream slug.
    name: String,
    /// Human-readable name.
    #[serde(default)]
    display_name: String,
    /// Free-form description.
    #[serde(default)]
    description: String,
    /// Owning person or team.
    #[serde(default)]
    owner: String,
    /// Delivery phase label.
    #[serde(default)]
    phase: String,
    /// Initial status.
    #[serde(default)]
    status: WorkstreamStatus,
    /// Granted permission labels.
    #[serde(default)]
    allowed_operations: Vec<String>,
}

/// Registers a new workstream under the service storage root.
pub struct CreateWorkstreamHandler {
    /// Shared services.
    services: Arc<GateServices>,
}

impl CreateWorkstreamHandler {
    /// Creates the handler.
    #[must_use]
    pub const fn new(services: Arc<GateServices>) -> Self {
        Self {
            services,
        }
    }
}

#[async_trait]
impl OperationHandler for CreateWorkstreamHandler {
    async fn handle(
        &self,
        _context: &RequestContext,
        request: &OperationRequest,
    ) -> Result<HandlerOutput, HandlerError> {
        let body: CreateWorkstreamBody = parse_json(&request.payload)?;
        let name = WorkstreamName::parse(&body.name)
            .map_err(|err| registry_error(RegistryError::InvalidName(err)))?;
        let allowed_operations = body
            .allowed_operations
            .iter()
            .map(|label| label.parse::<Permission>())
            .collect::<Result<_, _>>()
            .map_err(|_| HandlerError::invalid_request("unknown permission label"))?;
        let config = WorkstreamConfig {
            data_path: tenant_root_for(&self.services.storage_root, &name),
            name,
            display_name: body.display_name,
            description: body.description,
            owner: body.owner,
            phase: body.phase,
            status: body.status,
            allowed_operations,
        };
        let registry = Arc::clone(&self.services.registry);
        let created = blocking(move || registry.create(config).map_err(registry_error)).await?;
        report_registry_change(self.services.ops.as_ref(), &created.name, "created");
        let summary = WorkstreamSummary::from(created.as_ref());
        Ok(HandlerOutput::json(
            SuccessStatus::Created,
            json!(summary),
            AuditSummary::new("workstream created").with_detail(AuditDetail::Workstream {
                target: created.name.to_string(),
                status: Some(created.status.as_str().to_string()),
            }),
        ))
    }
}

/// Archives an existing workstream.
pub struct ArchiveWorkstreamHandler {
    /// Shared services.
    services: Arc<GateServices>,
}

impl ArchiveWorkstreamHandler {
    /// Creates the handler.
    #[must_use]
    pub const fn new(services: Arc<GateServices>) -> Self {
        Self {
            services,
        }
    }
}

#[async_trait]
impl OperationHandler for ArchiveWorkstreamHandler {
    async fn handle(
        &self,
        _context: &RequestContext,
        request: &OperationRequest,
    ) -> Result<HandlerOutput, HandlerError> {
        let target = request
            .resource
            .as_deref()
            .ok_or_else(|| HandlerError::invalid_request("archive target is required"))?;
        let target = WorkstreamName::parse(target)
            .map_err(|err| registry_error(RegistryError::InvalidName(err)))?;
        let registry = Arc::clone(&self.services.registry);
        let archived = blocking(move || registry.archive(&target).map_err(registry_error)).await?;
        report_registry_change(self.services.ops.as_ref(), &archived.name, "archived");
        let summary = WorkstreamSummary::from(archived.as_ref());
        Ok(HandlerOutput::json(
            SuccessStatus::Ok,
            json!(summary),
            AuditSummary::new("workstream archived").with_detail(AuditDetail::Workstream {
                target: archived.name.to_string(),
                status: Some(archived.status.as_str().to_string()),
            }),
        ))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs blocking work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, HandlerError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, HandlerError> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|_| HandlerError::storage())?
}

/// Parses a JSON request payload.
fn parse_json<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T, HandlerError> {
    serde_json::from_slice(payload).map_err(|_| HandlerError::invalid_request("invalid json body"))
}

/// Maps filesystem failures; I/O detail never reaches the client.
fn io_error(err: io::Error) -> HandlerError {
    if err.kind() == io::ErrorKind::NotFound {
        HandlerError::from_category(ErrorCategory::NotFound)
    } else {
        HandlerError::storage()
    }
}

/// Maps path resolution failures.
fn path_error(err: PathError) -> HandlerError {
    HandlerError::from_category(err.category())
}

/// Maps audit logger failures.
fn audit_error(err: AuditError) -> HandlerError {
    match err {
        AuditError::InvalidEntry(message) => HandlerError::invalid_request(message),
        other => HandlerError::from_category(other.category()),
    }
}

/// Maps registry failures.
fn registry_error(err: RegistryError) -> HandlerError {
    let category = err.category();
    match category {
        ErrorCategory::StorageFailure | ErrorCategory::NotFound => HandlerError::from_category(category),
        _ => HandlerError {
            category,
            message: err.to_string(),
        },
    }
}

/// Emits a registry change event.
fn report_registry_change(ops: &dyn OpsEventSink, name: &WorkstreamName, change: &str) {
    ops.record(
        &OpsEvent::new(OpsEventKind::RegistryChanged)
            .with_workstream(name)
            .with_message(format!("workstream {change}")),
    );
}
