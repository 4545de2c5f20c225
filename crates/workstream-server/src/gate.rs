// crates/workstream-server/src/gate.rs
// ============================================================================
// Module: Context Middleware
// Description: Gate that resolves, authorizes, runs, and audits operations.
// Purpose: Ensure no handler runs without a validated, permitted context.
// Dependencies: workstream-core, async-trait, tokio
// ============================================================================

//! ## Overview
//! [`ContextMiddleware::wrap`] turns any [`OperationHandler`] into a
//! [`WrappedHandler`]. Each call:
//! 1. extracts the [`RequestContext`] and short-circuits on failure,
//! 2. checks the operation's required permission and short-circuits on denial,
//! 3. invokes the handler with the context,
//! 4. appends an audit entry to the tenant log, success or failure.
//!
//! Rejections in steps 1-2 never reach a tenant log; they are reported on the
//! operational channel by category only. Audit failures in step 4 never alter
//! the operation's own result.
//!
//! Security posture: the handler is unreachable without a registered,
//! permitted workstream.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use workstream_core::Actor;
use workstream_core::AuditDetail;
use workstream_core::AuditDraft;
use workstream_core::AuditLogger;
use workstream_core::AuditOutcome;
use workstream_core::AuditSource;
use workstream_core::ContextExtractor;
use workstream_core::ErrorCategory;
use workstream_core::GateError;
use workstream_core::OperationDescriptor;
use workstream_core::OpsEvent;
use workstream_core::OpsEventKind;
use workstream_core::OpsEventSink;
use workstream_core::PermissionMatrix;
use workstream_core::RequestContext;
use workstream_core::WorkstreamName;

// ============================================================================
// SECTION: Requests & Outputs
// ============================================================================

/// Gated operation request.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    /// Channels and kind used for context extraction.
    pub descriptor: OperationDescriptor,
    /// Tenant-relative resource (artefact path or archive target).
    pub resource: Option<String>,
    /// Raw request payload.
    pub payload: Bytes,
    /// Audit actor.
    pub actor: Actor,
    /// Audit source.
    pub source: AuditSource,
}

impl OperationRequest {
    /// Creates a request with no resource or payload and default attribution.
    #[must_use]
    pub fn new(descriptor: OperationDescriptor) -> Self {
        Self {
            descriptor,
            resource: None,
            payload: Bytes::new(),
            actor: Actor::default(),
            source: AuditSource::default(),
        }
    }

    /// Sets the resource.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the audit attribution.
    #[must_use]
    pub const fn with_attribution(mut self, actor: Actor, source: AuditSource) -> Self {
        self.actor = actor;
        self.source = source;
        self
    }
}

/// Success status reported by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessStatus {
    /// Completed.
    Ok,
    /// Created a new resource.
    Created,
    /// Completed with no body.
    NoContent,
}

/// Handler response body.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerBody {
    /// JSON document.
    Json(Value),
    /// Opaque bytes.
    Bytes(Bytes),
    /// No body.
    Empty,
}

/// Audit content a handler contributes for the middleware entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSummary {
    /// Human-readable summary.
    pub message: String,
    /// Normalized resource recorded as the entry context.
    pub context: Option<String>,
    /// Typed detail.
    pub detail: Option<AuditDetail>,
}

impl AuditSummary {
    /// Creates a summary with no detail.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            detail: None,
        }
    }

    /// Sets the entry context, replacing the raw request resource.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Sets the typed detail.
    #[must_use]
    pub fn with_detail(mut self, detail: AuditDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Successful handler result.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    /// Success status.
    pub status: SuccessStatus,
    /// Response body.
    pub body: HandlerBody,
    /// Audit content; `None` when the operation itself wrote the tenant entry.
    pub audit: Option<AuditSummary>,
}

impl HandlerOutput {
    /// Creates a JSON output.
    #[must_use]
    pub fn json(status: SuccessStatus, body: Value, audit: AuditSummary) -> Self {
        Self {
            status,
            body: HandlerBody::Json(body),
            audit: Some(audit),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failure raised by a handler after the gate admitted the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    /// Stable category.
    pub category: ErrorCategory,
    /// Client-facing message (never a filesystem path).
    pub message: String,
}

impl HandlerError {
    /// Creates an error with the category's fixed message.
    #[must_use]
    pub fn from_category(category: ErrorCategory) -> Self {
        Self {
            category,
            message: category.default_message().to_string(),
        }
    }

    /// Creates an invalid-request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::InvalidRequest,
            message: message.into(),
        }
    }

    /// Creates a storage-failure error with the fixed message.
    #[must_use]
    pub fn storage() -> Self {
        Self::from_category(ErrorCategory::StorageFailure)
    }
}

/// Result of a wrapped call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// Rejected before the handler ran.
    #[error(transparent)]
    Gate(#[from] GateError),
    /// Handler failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl CallError {
    /// Returns the stable category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Gate(err) => err.category(),
            Self::Handler(err) => err.category,
        }
    }

    /// Returns the client-facing message.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Gate(err) => err.category().default_message().to_string(),
            Self::Handler(err) if err.category == ErrorCategory::StorageFailure => {
                ErrorCategory::StorageFailure.default_message().to_string()
            }
            Self::Handler(err) => err.message.clone(),
        }
    }
}

// ============================================================================
// SECTION: Handler Trait
// ============================================================================

/// Operation handler invoked only after the gate admits a request.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Executes the operation for the resolved context.
    async fn handle(
        &self,
        context: &RequestContext,
        request: &OperationRequest,
    ) -> Result<HandlerOutput, HandlerError>;
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Composes extraction, permission, and audit around handlers.
#[derive(Clone)]
pub struct ContextMiddleware {
    /// Context extractor.
    extractor: ContextExtractor,
    /// Permission matrix.
    matrix: PermissionMatrix,
    /// Tenant audit logger.
    audit: Arc<AuditLogger>,
    /// Operational event sink.
    ops: Arc<dyn OpsEventSink>,
}

impl ContextMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(
        extractor: ContextExtractor,
        matrix: PermissionMatrix,
        audit: Arc<AuditLogger>,
        ops: Arc<dyn OpsEventSink>,
    ) -> Self {
        Self {
            extractor,
            matrix,
            audit,
            ops,
        }
    }

    /// Wraps a handler behind the gate.
    #[must_use]
    pub fn wrap(&self, handler: impl OperationHandler + 'static) -> WrappedHandler {
        WrappedHandler {
            gate: self.clone(),
            handler: Arc::new(handler),
        }
    }

    /// Resolves the context and checks the required permission.
    fn admit(&self, descriptor: &OperationDescriptor) -> Result<RequestContext, GateError> {
        let context = self.extractor.extract(descriptor)?;
        self.matrix.check(&context.workstream, descriptor.kind.required_permission())?;
        Ok(context)
    }

    /// Reports a gate rejection on the operational channel.
    fn report_rejection(&self, descriptor: &OperationDescriptor, error: &GateError) {
        self.ops.record(
            &OpsEvent::new(OpsEventKind::GateRejected)
                .with_category(error.category().as_str())
                .with_message(descriptor.kind.label()),
        );
    }

    /// Appends the post-handler audit entry on a blocking worker.
    async fn record(&self, workstream: &WorkstreamName, draft: AuditDraft) {
        let audit = Arc::clone(&self.audit);
        let name = workstream.clone();
        let outcome = tokio::task::spawn_blocking(move || audit.append(&name, draft)).await;
        let failure = match outcome {
            Ok(Ok(_)) => return,
            Ok(Err(err)) => err.category().as_str(),
            Err(_) => ErrorCategory::StorageFailure.as_str(),
        };
        self.ops.record(
            &OpsEvent::new(OpsEventKind::AuditWriteFailed)
                .with_workstream(workstream)
                .with_category(failure),
        );
    }
}

/// Handler wrapped by [`ContextMiddleware`].
#[derive(Clone)]
pub struct WrappedHandler {
    /// Gate components.
    gate: ContextMiddleware,
    /// Inner handler.
    handler: Arc<dyn OperationHandler>,
}

impl WrappedHandler {
    /// Runs the gated operation.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Gate`] when the request is rejected before the
    /// handler runs, or [`CallError::Handler`] when the handler fails.
    pub async fn call(&self, request: OperationRequest) -> Result<HandlerOutput, CallError> {
        let context = match self.gate.admit(&request.descriptor) {
            Ok(context) => context,
            Err(err) => {
                self.gate.report_rejection(&request.descriptor, &err);
                return Err(CallError::Gate(err));
            }
        };
        let result = self.handler.handle(&context, &request).await;
        if let Some(draft) = audit_draft(&context, &request, &result) {
            self.gate.record(&context.workstream, draft).await;
        }
        result.map_err(CallError::Handler)
    }
}

/// Builds the post-handler audit draft, if the middleware should write one.
fn audit_draft(
    context: &RequestContext,
    request: &OperationRequest,
    result: &Result<HandlerOutput, HandlerError>,
) -> Option<AuditDraft> {
    let kind = request.descriptor.kind;
    let (summary, outcome) = match result {
        Ok(output) => (output.audit.clone()?, AuditOutcome::Success),
        Err(err) => {
            let summary = AuditSummary::new(format!("{kind} failed: {}", err.category.as_str()));
            (summary, AuditOutcome::Failure)
        }
    };
    // A rejected resource is never written to the tenant log.
    let rejected = matches!(result, Err(err) if err.category == ErrorCategory::InvalidResourcePath);
    let audit_context = match summary.context {
        Some(audit_context) => audit_context,
        None if rejected => String::new(),
        None => request.resource.clone().unwrap_or_default(),
    };
    let mut draft = AuditDraft::new(request.actor, request.source, summary.message)
        .with_context(audit_context)
        .with_tag(kind.label())
        .with_tag(context.detection_source.as_str())
        .with_outcome(outcome);
    draft.detail = summary.detail;
    Some(draft)
}

#[cfg(test)]
mod tests;
