// crates/workstream-server/src/server.rs
// ============================================================================
// Module: HTTP Server
// Description: axum transport exposing the gated workstream operations.
// Purpose: Map HTTP requests onto wrapped handlers and categories onto statuses.
// Dependencies: workstream-core, workstream-config, axum, tokio
// ============================================================================

//! ## Overview
//! [`WorkstreamServer`] wires the registry, extractor, permission matrix, path
//! resolver, and audit logger from configuration, wraps every gated handler
//! with [`ContextMiddleware`], and serves them over HTTP. Failures are
//! rendered as `{"error": {"category", "message"}}` with the status fixed by
//! the category. Security posture: every request channel is untrusted; client
//! messages never carry filesystem paths or I/O detail.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::rejection::PathRejection;
use axum::extract::rejection::QueryRejection;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use workstream_config::OpsLogConfig;
use workstream_config::WorkstreamGateConfig;
use workstream_core::Actor;
use workstream_core::AuditLogger;
use workstream_core::AuditSource;
use workstream_core::ContextExtractor;
use workstream_core::ErrorCategory;
use workstream_core::OperationDescriptor;
use workstream_core::OperationKind;
use workstream_core::OpsEvent;
use workstream_core::OpsEventKind;
use workstream_core::OpsEventSink;
use workstream_core::PathResolver;
use workstream_core::PermissionMatrix;
use workstream_core::Registry;
use workstream_core::WorkstreamDirectory;
use workstream_core::ops::FileOpsSink;
use workstream_core::ops::NoopOpsSink;
use workstream_core::ops::StderrOpsSink;

use crate::gate::CallError;
use crate::gate::ContextMiddleware;
use crate::gate::HandlerBody;
use crate::gate::HandlerOutput;
use crate::gate::OperationRequest;
use crate::gate::SuccessStatus;
use crate::gate::WrappedHandler;
use crate::handlers::AppendAuditEntryHandler;
use crate::handlers::ArchiveWorkstreamHandler;
use crate::handlers::ArtefactAction;
use crate::handlers::ArtefactHandler;
use crate::handlers::CreateWorkstreamHandler;
use crate::handlers::DescribeWorkstreamHandler;
use crate::handlers::GateServices;
use crate::handlers::ReadAuditLogHandler;
use crate::handlers::RecordChatHandler;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header selecting the audit actor.
pub const ACTOR_HEADER: &str = "x-actor";
/// Header selecting the audit source.
pub const AUDIT_SOURCE_HEADER: &str = "x-audit-source";

// ============================================================================
// SECTION: Server
// ============================================================================

/// Workstream gate HTTP server.
pub struct WorkstreamServer {
    /// Validated configuration.
    config: WorkstreamGateConfig,
    /// Shared request state.
    state: Arc<AppState>,
    /// Operational event sink.
    ops: Arc<dyn OpsEventSink>,
}

impl WorkstreamServer {
    /// Builds a server from configuration with the configured ops sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration or initialization fails.
    pub fn from_config(config: WorkstreamGateConfig) -> Result<Self, ServerError> {
        let ops = build_ops_sink(&config.server.ops_log)?;
        Self::with_ops_sink(config, ops)
    }

    /// Builds a server from configuration with an explicit ops sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration or initialization fails.
    pub fn with_ops_sink(config: WorkstreamGateConfig, ops: Arc<dyn OpsEventSink>) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let seeds = config.seed_configs().map_err(|err| ServerError::Config(err.to_string()))?;
        let registry = Arc::new(
            Registry::open(&config.storage.registry_file(), seeds)
                .map_err(|err| ServerError::Init(err.to_string()))?,
        );
        let resolver = PathResolver::new(registry.clone());
        let audit = Arc::new(
            AuditLogger::new(resolver.clone(), Arc::clone(&ops)).with_retention(config.audit.retention),
        );
        let middleware = ContextMiddleware::new(
            ContextExtractor::new(registry.clone()).with_default_policy(config.default_policy()),
            PermissionMatrix::new(registry.clone()),
            Arc::clone(&audit),
            Arc::clone(&ops),
        );
        let services = Arc::new(GateServices {
            registry: Arc::clone(&registry),
            resolver,
            audit,
            ops: Arc::clone(&ops),
            storage_root: config.storage.root.clone(),
        });
        let state = Arc::new(AppState {
            registry,
            operations: GatedOperations::new(&middleware, &services),
        });
        Ok(Self {
            config,
            state,
            ops,
        })
    }

    /// Returns the HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.state), self.config.server.max_body_bytes)
    }

    /// Binds the configured address and serves requests.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr = self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|_| ServerError::Transport("http bind failed".to_string()))?;
        self.serve_with_listener(listener).await
    }

    /// Serves requests on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when serving fails.
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener
            .local_addr()
            .map_err(|_| ServerError::Transport("listener address unavailable".to_string()))?;
        self.ops.record(&OpsEvent::new(OpsEventKind::ServerStarted).with_message(local.to_string()));
        let app = self.router();
        axum::serve(listener, app.into_make_service())
            .await
            .map_err(|_| ServerError::Transport("http server failed".to_string()))
    }
}

/// Builds the operational sink from configuration.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the ops log file cannot be opened.
pub fn build_ops_sink(config: &OpsLogConfig) -> Result<Arc<dyn OpsEventSink>, ServerError> {
    if !config.enabled {
        return Ok(Arc::new(NoopOpsSink));
    }
    match &config.path {
        Some(path) => {
            let sink = FileOpsSink::new(path).map_err(|_| ServerError::Init("ops log open failed".to_string()))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrOpsSink)),
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Shared state for HTTP handlers.
struct AppState {
    /// Registry for the ungated listing.
    registry: Arc<Registry>,
    /// Gated operations.
    operations: GatedOperations,
}

/// Every gated operation, wrapped by the middleware.
struct GatedOperations {
    /// `workstream.describe`.
    describe: WrappedHandler,
    /// `artefact.read`.
    read_artefact: WrappedHandler,
    /// `artefact.create`.
    create_artefact: WrappedHandler,
    /// `artefact.replace`.
    replace_artefact: WrappedHandler,
    /// `artefact.delete`.
    delete_artefact: WrappedHandler,
    /// `audit.read`.
    read_audit: WrappedHandler,
    /// `audit.append`.
    append_audit: WrappedHandler,
    /// `chat.record`.
    record_chat: WrappedHandler,
    /// `admin.create_workstream`.
    create_workstream: WrappedHandler,
    /// `admin.archive_workstream`.
    archive_workstream: WrappedHandler,
}

impl GatedOperations {
    /// Wraps every handler with the middleware.
    fn new(middleware: &ContextMiddleware, services: &Arc<GateServices>) -> Self {
        let artefact = |action| middleware.wrap(ArtefactHandler::new(Arc::clone(services), action));
        Self {
            describe: middleware.wrap(DescribeWorkstreamHandler::new(Arc::clone(services))),
            read_artefact: artefact(ArtefactAction::Read),
            create_artefact: artefact(ArtefactAction::Create),
            replace_artefact: artefact(ArtefactAction::Replace),
            delete_artefact: artefact(ArtefactAction::Delete),
            read_audit: middleware.wrap(ReadAuditLogHandler::new(Arc::clone(services))),
            append_audit: middleware.wrap(AppendAuditEntryHandler::new(Arc::clone(services))),
            record_chat: middleware.wrap(RecordChatHandler),
            create_workstream: middleware.wrap(CreateWorkstreamHandler::new(Arc::clone(services))),
            archive_workstream: middleware.wrap(ArchiveWorkstreamHandler::new(Arc::clone(services))),
        }
    }

    /// Returns the wrapped handler for an operation kind.
    const fn for_kind(&self, kind: OperationKind) -> &WrappedHandler {
        match kind {
            OperationKind::DescribeWorkstream => &self.describe,
            OperationKind::ReadArtefact => &self.read_artefact,
            OperationKind::CreateArtefact => &self.create_artefact,
            OperationKind::ReplaceArtefact => &self.replace_artefact,
            OperationKind::DeleteArtefact => &self.delete_artefact,
            OperationKind::ReadAuditLog => &self.read_audit,
            OperationKind::AppendAuditEntry => &self.append_audit,
            OperationKind::RecordChat => &self.record_chat,
            OperationKind::CreateWorkstream => &self.create_workstream,
            OperationKind::ArchiveWorkstream => &self.archive_workstream,
        }
    }
}

/// Builds the HTTP router.
fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/workstreams", get(list_workstreams))
        .route("/api/workstream/{name}", get(describe_workstream))
        .route(
            "/api/workstream/{name}/artefacts/{*path}",
            get(read_artefact).post(create_artefact).put(replace_artefact).delete(delete_artefact),
        )
        .route("/api/workstream/{name}/audit", get(read_audit).post(append_audit))
        .route("/api/workstream/{name}/chat", post(record_chat))
        .route("/api/admin/workstreams", post(create_workstream))
        .route("/api/admin/workstreams/{target}/archive", post(archive_workstream))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Query extraction result.
type QueryParams = Result<Query<BTreeMap<String, String>>, QueryRejection>;

/// Liveness probe.
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Ungated registry listing; names and status only.
async fn list_workstreams(State(state): State<Arc<AppState>>) -> Json<Value> {
    let workstreams: Vec<Value> = state
        .registry
        .list()
        .iter()
        .map(|config| json!({ "name": config.name, "status": config.status }))
        .collect();
    Json(json!({ "workstreams": workstreams }))
}

/// `GET /api/workstream/{name}`.
async fn describe_workstream(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    query: QueryParams,
    headers: HeaderMap,
) -> Response {
    let inbound = Inbound::new(uri, query, headers, Bytes::new());
    dispatch(&state, OperationKind::DescribeWorkstream, inbound, Channels::PATH, None).await
}

/// `GET /api/workstream/{name}/artefacts/{*path}`.
async fn read_artefact(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
    uri: Uri,
    query: QueryParams,
    headers: HeaderMap,
) -> Response {
    artefact(&state, OperationKind::ReadArtefact, path, Inbound::new(uri, query, headers, Bytes::new())).await
}

/// `POST /api/workstream/{name}/artefacts/{*path}`.
async fn create_artefact(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
    uri: Uri,
    query: QueryParams,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    artefact(&state, OperationKind::CreateArtefact, path, Inbound::new(uri, query, headers, body)).await
}

/// `PUT /api/workstream/{name}/artefacts/{*path}`.
async fn replace_artefact(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
    uri: Uri,
    query: QueryParams,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    artefact(&state, OperationKind::ReplaceArtefact, path, Inbound::new(uri, query, headers, body)).await
}

/// `DELETE /api/workstream/{name}/artefacts/{*path}`.
async fn delete_artefact(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
    uri: Uri,
    query: QueryParams,
    headers: HeaderMap,
) -> Response {
    artefact(&state, OperationKind::DeleteArtefact, path, Inbound::new(uri, query, headers, Bytes::new())).await
}

/// Shared artefact dispatch; artefact bodies are never inspected for channels.
async fn artefact(
    state: &AppState,
    kind: OperationKind,
    path: Result<Path<(String, String)>, PathRejection>,
    inbound: Inbound,
) -> Response {
    let Ok(Path((_, resource))) = path else {
        return error_response(ErrorCategory::InvalidResourcePath, ErrorCategory::InvalidResourcePath.default_message());
    };
    dispatch(state, kind, inbound, Channels::PATH, Some(resource)).await
}

/// `GET /api/workstream/{name}/audit`.
async fn read_audit(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    query: QueryParams,
    headers: HeaderMap,
) -> Response {
    let inbound = Inbound::new(uri, query, headers, Bytes::new());
    dispatch(&state, OperationKind::ReadAuditLog, inbound, Channels::PATH, None).await
}

/// `POST /api/workstream/{name}/audit`.
async fn append_audit(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    query: QueryParams,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let inbound = Inbound::new(uri, query, headers, body);
    dispatch(&state, OperationKind::AppendAuditEntry, inbound, Channels::PATH_AND_BODY, None).await
}

/// `POST /api/workstream/{name}/chat`.
async fn record_chat(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    query: QueryParams,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let inbound = Inbound::new(uri, query, headers, body);
    dispatch(&state, OperationKind::RecordChat, inbound, Channels::PATH_AND_BODY, None).await
}

/// `POST /api/admin/workstreams`.
async fn create_workstream(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    query: QueryParams,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let inbound = Inbound::new(uri, query, headers, body);
    dispatch(&state, OperationKind::CreateWorkstream, inbound, Channels::BODY, None).await
}

/// `POST /api/admin/workstreams/{target}/archive`.
async fn archive_workstream(
    State(state): State<Arc<AppState>>,
    target: Result<Path<String>, PathRejection>,
    uri: Uri,
    query: QueryParams,
    headers: HeaderMap,
) -> Response {
    let Ok(Path(target)) = target else {
        return error_response(ErrorCategory::InvalidRequest, "invalid archive target");
    };
    let inbound = Inbound::new(uri, query, headers, Bytes::new());
    dispatch(&state, OperationKind::ArchiveWorkstream, inbound, Channels::NONE, Some(target)).await
}

// ============================================================================
// SECTION: Request Mapping
// ============================================================================

/// Raw inbound request parts.
struct Inbound {
    /// Request URI.
    uri: Uri,
    /// Parsed query, or the rejection.
    query: QueryParams,
    /// Request headers.
    headers: HeaderMap,
    /// Raw body.
    body: Bytes,
}

impl Inbound {
    /// Collects request parts.
    const fn new(uri: Uri, query: QueryParams, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            uri,
            query,
            headers,
            body,
        }
    }
}

/// Optional tenant channels a route exposes in addition to query and header.
#[derive(Debug, Clone, Copy)]
struct Channels {
    /// Read the tenant from the URL path.
    path: bool,
    /// Read the tenant from a JSON body.
    body: bool,
}

impl Channels {
    /// Query and header only.
    const NONE: Self = Self {
        path: false,
        body: false,
    };
    /// Adds the URL path.
    const PATH: Self = Self {
        path: true,
        body: false,
    };
    /// Adds the JSON body.
    const BODY: Self = Self {
        path: false,
        body: true,
    };
    /// Adds the URL path and JSON body.
    const PATH_AND_BODY: Self = Self {
        path: true,
        body: true,
    };
}

/// Builds the operation request and runs the wrapped handler.
async fn dispatch(
    state: &AppState,
    kind: OperationKind,
    inbound: Inbound,
    channels: Channels,
    resource: Option<String>,
) -> Response {
    let request = match operation_request(kind, inbound, channels, resource) {
        Ok(request) => request,
        Err(response) => return response,
    };
    respond(state.operations.for_kind(kind).call(request).await)
}

/// Maps HTTP request parts onto an [`OperationRequest`].
fn operation_request(
    kind: OperationKind,
    inbound: Inbound,
    channels: Channels,
    resource: Option<String>,
) -> Result<OperationRequest, Response> {
    let Ok(Query(query)) = inbound.query else {
        return Err(error_response(ErrorCategory::InvalidRequest, "invalid query string"));
    };
    let path = if channels.path { inbound.uri.path() } else { "" };
    let mut descriptor = OperationDescriptor::new(kind, path);
    descriptor.query = query;
    // Undecodable values stay present so they fail validation instead of
    // deferring to a lower-precedence channel.
    for (name, value) in &inbound.headers {
        descriptor = descriptor.with_header(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }
    if channels.body
        && let Ok(body) = serde_json::from_slice::<Value>(&inbound.body)
    {
        descriptor = descriptor.with_body(body);
    }
    let (actor, source) = attribution(&inbound.headers)?;
    let mut request =
        OperationRequest::new(descriptor).with_payload(inbound.body).with_attribution(actor, source);
    if let Some(resource) = resource {
        request = request.with_resource(resource);
    }
    Ok(request)
}

/// Reads the audit actor and source headers.
fn attribution(headers: &HeaderMap) -> Result<(Actor, AuditSource), Response> {
    let actor = match header_value(headers, ACTOR_HEADER) {
        Some(value) => Actor::from_str(value)
            .map_err(|_| error_response(ErrorCategory::InvalidRequest, "unknown x-actor value"))?,
        None => Actor::default(),
    };
    let source = match header_value(headers, AUDIT_SOURCE_HEADER) {
        Some(value) => AuditSource::from_str(value)
            .map_err(|_| error_response(ErrorCategory::InvalidRequest, "unknown x-audit-source value"))?,
        None => AuditSource::default(),
    };
    Ok((actor, source))
}

/// Returns a header value as text.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Error detail.
    error: ErrorDetail,
}

/// Error category and client message.
#[derive(Debug, Serialize)]
struct ErrorDetail {
    /// Stable category label.
    category: &'static str,
    /// Client-facing message.
    message: String,
}

/// Renders a wrapped call result.
fn respond(result: Result<HandlerOutput, CallError>) -> Response {
    match result {
        Ok(output) => success_response(output),
        Err(err) => error_response(err.category(), err.client_message()),
    }
}

/// Renders a successful handler output.
fn success_response(output: HandlerOutput) -> Response {
    let status = match output.status {
        SuccessStatus::Ok => StatusCode::OK,
        SuccessStatus::Created => StatusCode::CREATED,
        SuccessStatus::NoContent => StatusCode::NO_CONTENT,
    };
    match output.body {
        HandlerBody::Json(value) => (status, Json(value)).into_response(),
        HandlerBody::Bytes(bytes) => (status, [(CONTENT_TYPE, "application/octet-stream")], bytes).into_response(),
        HandlerBody::Empty => status.into_response(),
    }
}

/// Returns the HTTP status for an error category.
#[must_use]
pub const fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::MissingWorkstream
        | ErrorCategory::InvalidWorkstreamFormat
        | ErrorCategory::InvalidResourcePath
        | ErrorCategory::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCategory::UnknownWorkstream | ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorCategory::RegistryValidation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Renders an error response.
fn error_response(category: ErrorCategory, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            category: category.as_str(),
            message: message.into(),
        },
    };
    (status_for(category), Json(body)).into_response()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}
