// crates/workstream-core/src/ops.rs
// ============================================================================
// Module: Operational Events
// Description: Structured operational warnings for recovered and secondary failures.
// Purpose: Surface non-blocking failures without coupling to a logging stack.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Operational events are the channel for failures that must be visible but
//! must not change an operation's result: recovered audit-log corruption,
//! audit write failures, gate rejections. Sinks emit JSON lines so deployments
//! can route them to their preferred pipeline.
//!
//! Security posture: events never carry filesystem paths or raw (unvalidated)
//! workstream candidates.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::identifiers::WorkstreamName;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Operational event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpsEventKind {
    /// A tenant audit log could not be parsed and was treated as empty.
    ReadCorruption,
    /// An audit append failed after the operation completed.
    AuditWriteFailed,
    /// The gate rejected an operation before its handler ran.
    GateRejected,
    /// A registry entry was created or changed.
    RegistryChanged,
    /// The HTTP server started listening.
    ServerStarted,
}

/// Operational event payload.
#[derive(Debug, Clone, Serialize)]
pub struct OpsEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Event classification.
    pub kind: OpsEventKind,
    /// Validated workstream name when known.
    pub workstream: Option<String>,
    /// Stable error category label when applicable.
    pub category: Option<&'static str>,
    /// Optional detail message (never a filesystem path).
    pub message: Option<String>,
}

impl OpsEvent {
    /// Creates an event with a consistent timestamp.
    #[must_use]
    pub fn new(kind: OpsEventKind) -> Self {
        Self {
            event: "ops_event",
            timestamp_ms: now_millis(),
            kind,
            workstream: None,
            category: None,
            message: None,
        }
    }

    /// Returns a copy tagged with the workstream.
    #[must_use]
    pub fn with_workstream(mut self, workstream: &WorkstreamName) -> Self {
        self.workstream = Some(workstream.to_string());
        self
    }

    /// Returns a copy tagged with an error category.
    #[must_use]
    pub const fn with_category(mut self, category: &'static str) -> Self {
        self.category = Some(category);
        self
    }

    /// Returns a copy carrying a detail message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Returns the current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink for operational events.
pub trait OpsEventSink: Send + Sync {
    /// Record an operational event.
    fn record(&self, event: &OpsEvent);
}

/// Sink that logs JSON lines to stderr.
pub struct StderrOpsSink;

impl OpsEventSink for StderrOpsSink {
    fn record(&self, event: &OpsEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
pub struct FileOpsSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileOpsSink {
    /// Opens the operational log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl OpsEventSink for FileOpsSink {
    fn record(&self, event: &OpsEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op operational sink.
pub struct NoopOpsSink;

impl OpsEventSink for NoopOpsSink {
    fn record(&self, _event: &OpsEvent) {}
}

/// In-memory sink retaining every event, for inspection in tests and tools.
#[derive(Default)]
pub struct MemoryOpsSink {
    /// Recorded events in arrival order.
    events: Mutex<Vec<OpsEvent>>,
}

impl MemoryOpsSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<OpsEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns the recorded event kinds in arrival order.
    #[must_use]
    pub fn kinds(&self) -> Vec<OpsEventKind> {
        self.events().into_iter().map(|event| event.kind).collect()
    }
}

impl OpsEventSink for MemoryOpsSink {
    fn record(&self, event: &OpsEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
