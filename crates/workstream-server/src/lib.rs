// crates/workstream-server/src/lib.rs
// ============================================================================
// Module: Workstream Server Library
// Description: Context middleware, gated handlers, and HTTP transport.
// Purpose: Serve tenant-scoped operations behind the workstream gate.
// Dependencies: workstream-core, workstream-config, axum, tokio
// ============================================================================

//! ## Overview
//! `workstream-server` composes the core primitives into a request pipeline:
//! [`ContextMiddleware`] resolves and authorizes each operation, the handlers
//! in [`handlers`] act on tenant-scoped storage, and [`WorkstreamServer`]
//! exposes them over HTTP.
//!
//! Security posture: no handler is reachable without a registered, permitted
//! workstream; see [`gate`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod gate;
pub mod handlers;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use gate::CallError;
pub use gate::ContextMiddleware;
pub use gate::HandlerError;
pub use gate::HandlerOutput;
pub use gate::OperationHandler;
pub use gate::OperationRequest;
pub use gate::WrappedHandler;
pub use server::ServerError;
pub use server::WorkstreamServer;
pub use server::build_ops_sink;
pub use server::status_for;
