// crates/workstream-core/src/audit.rs
// ============================================================================
// Module: Tenant Audit Logger
// Description: Append-only, most-recent-first audit log per workstream.
// Purpose: Record an immutable trail of every gated operation.
// Dependencies: serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! Each tenant owns one JSON array at `logs/audit-log.json` under its storage
//! root, ordered most-recent-first and capped at a retention count. Appends are
//! read-modify-write cycles serialized per tenant by a lock table keyed by
//! [`WorkstreamName`]; different tenants never contend. Every write replaces
//! the file atomically, so readers observe either the previous or the next
//! state.
//!
//! A missing log is an empty log. An unparseable log is also treated as empty,
//! and the recovery is reported as an [`OpsEventKind::ReadCorruption`] event.
//!
//! Security posture: error messages never include filesystem paths.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::identifiers::EntryId;
use crate::identifiers::WorkstreamName;
use crate::model::StorageCategory;
use crate::ops::OpsEvent;
use crate::ops::OpsEventKind;
use crate::ops::OpsEventSink;
use crate::ops::now_millis;
use crate::paths::PathError;
use crate::paths::PathResolver;
use crate::storage::write_atomic;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Audit log file name under the tenant `logs` directory.
pub const AUDIT_LOG_FILE: &str = "audit-log.json";
/// Default retention cap (entries per tenant).
pub const DEFAULT_AUDIT_RETENTION: usize = 500;
/// Maximum number of `extra` attributes per entry.
pub const MAX_EXTRA_KEYS: usize = 16;
/// Maximum `extra` key length in bytes.
pub const MAX_EXTRA_KEY_BYTES: usize = 64;
/// Maximum `extra` value length in bytes.
pub const MAX_EXTRA_VALUE_BYTES: usize = 1024;
/// Maximum message length in bytes.
pub const MAX_MESSAGE_BYTES: usize = 4096;
/// Maximum number of tags per entry.
pub const MAX_TAGS: usize = 32;
/// Log files larger than this are treated as corrupt.
const MAX_AUDIT_LOG_BYTES: u64 = 32 * 1024 * 1024;

// ============================================================================
// SECTION: Entry Vocabulary
// ============================================================================

/// Label outside a closed audit vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown audit label")]
pub struct UnknownAuditLabel;

/// Who performed the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// Human user.
    #[default]
    User,
    /// Ora assistant acting on behalf of a user.
    Ora,
}

impl FromStr for Actor {
    type Err = UnknownAuditLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "ora" => Ok(Self::Ora),
            _ => Err(UnknownAuditLabel),
        }
    }
}

/// Surface the audited action arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSource {
    /// Web UI.
    Ui,
    /// Programmatic API.
    #[default]
    Api,
    /// Chat surface.
    Chat,
    /// Internal system action.
    System,
    /// Command-line tooling.
    Cli,
}

impl FromStr for AuditSource {
    type Err = UnknownAuditLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ui" => Ok(Self::Ui),
            "api" => Ok(Self::Api),
            "chat" => Ok(Self::Chat),
            "system" => Ok(Self::System),
            "cli" => Ok(Self::Cli),
            _ => Err(UnknownAuditLabel),
        }
    }
}

/// Result of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Action completed.
    #[default]
    Success,
    /// Action failed after passing the gate.
    Failure,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failure => "failure",
        })
    }
}

/// Typed detail for known operation families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditDetail {
    /// Artefact access.
    Artefact {
        /// Tenant-relative artefact path.
        path: String,
        /// Body size in bytes, for writes.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<u64>,
    },
    /// Registry administration.
    Workstream {
        /// Workstream the action targeted.
        target: String,
        /// Resulting status label.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    /// Free-form note (chat records, caller-supplied entries).
    Note {
        /// Note text.
        text: String,
    },
}

/// Bounded string map for open-ended attributes.
///
/// # Invariants
/// - At most [`MAX_EXTRA_KEYS`] keys, each at most [`MAX_EXTRA_KEY_BYTES`],
///   values at most [`MAX_EXTRA_VALUE_BYTES`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct AuditExtra(BTreeMap<String, String>);

impl AuditExtra {
    /// Inserts an attribute, enforcing bounds.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidEntry`] when a bound would be exceeded.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), AuditError> {
        let key = key.into();
        let value = value.into();
        check_extra_pair(&key, &value)?;
        if !self.0.contains_key(&key) && self.0.len() >= MAX_EXTRA_KEYS {
            return Err(AuditError::InvalidEntry("too many extra attributes".to_string()));
        }
        self.0.insert(key, value);
        Ok(())
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true when no attributes are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<BTreeMap<String, String>> for AuditExtra {
    type Error = AuditError;

    fn try_from(value: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        if value.len() > MAX_EXTRA_KEYS {
            return Err(AuditError::InvalidEntry("too many extra attributes".to_string()));
        }
        for (key, item) in &value {
            check_extra_pair(key, item)?;
        }
        Ok(Self(value))
    }
}

impl From<AuditExtra> for BTreeMap<String, String> {
    fn from(value: AuditExtra) -> Self {
        value.0
    }
}

/// Validates one `extra` key/value pair.
fn check_extra_pair(key: &str, value: &str) -> Result<(), AuditError> {
    if key.is_empty() || key.len() > MAX_EXTRA_KEY_BYTES {
        return Err(AuditError::InvalidEntry("extra key length out of bounds".to_string()));
    }
    if value.len() > MAX_EXTRA_VALUE_BYTES {
        return Err(AuditError::InvalidEntry("extra value too long".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Entries
// ============================================================================

/// Immutable audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Time-prefixed unique identifier.
    pub id: EntryId,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    /// Acting party.
    pub actor: Actor,
    /// Arrival surface.
    pub source: AuditSource,
    /// Free-form resource identifier.
    #[serde(default)]
    pub context: String,
    /// Ordered tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Human-readable summary.
    pub message: String,
    /// Action outcome.
    #[serde(default)]
    pub outcome: AuditOutcome,
    /// Typed detail for known operation families.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<AuditDetail>,
    /// Bounded open-ended attributes.
    #[serde(default, skip_serializing_if = "AuditExtra::is_empty")]
    pub extra: AuditExtra,
}

/// Caller-supplied content of an entry; id and timestamp are assigned on append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDraft {
    /// Acting party.
    #[serde(default)]
    pub actor: Actor,
    /// Arrival surface.
    #[serde(default)]
    pub source: AuditSource,
    /// Free-form resource identifier.
    #[serde(default)]
    pub context: String,
    /// Ordered tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Human-readable summary.
    pub message: String,
    /// Action outcome.
    #[serde(default)]
    pub outcome: AuditOutcome,
    /// Typed detail.
    #[serde(default)]
    pub detail: Option<AuditDetail>,
    /// Bounded open-ended attributes.
    #[serde(default)]
    pub extra: AuditExtra,
}

impl AuditDraft {
    /// Creates a successful draft with the given message.
    #[must_use]
    pub fn new(actor: Actor, source: AuditSource, message: impl Into<String>) -> Self {
        Self {
            actor,
            source,
            context: String::new(),
            tags: Vec::new(),
            message: message.into(),
            outcome: AuditOutcome::Success,
            detail: None,
            extra: AuditExtra::default(),
        }
    }

    /// Sets the resource context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Appends a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the outcome.
    #[must_use]
    pub const fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Sets the typed detail.
    #[must_use]
    pub fn with_detail(mut self, detail: AuditDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Validates bounds not enforced by the types.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidEntry`] for oversized messages or tag lists.
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.message.len() > MAX_MESSAGE_BYTES {
            return Err(AuditError::InvalidEntry("message too long".to_string()));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(AuditError::InvalidEntry("too many tags".to_string()));
        }
        Ok(())
    }

    /// Seals the draft into an entry.
    fn into_entry(self, id: EntryId, timestamp: String) -> AuditLogEntry {
        AuditLogEntry {
            id,
            timestamp,
            actor: self.actor,
            source: self.source,
            context: self.context,
            tags: self.tags,
            message: self.message,
            outcome: self.outcome,
            detail: self.detail,
            extra: self.extra,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Audit logger failures.
///
/// # Invariants
/// - Messages never include filesystem paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// Tenant is not registered.
    #[error("unknown workstream")]
    UnknownWorkstream,
    /// Log path failed containment checks.
    #[error("invalid resource path")]
    Traversal,
    /// Entry violates a bound.
    #[error("invalid audit entry: {0}")]
    InvalidEntry(String),
    /// Log could not be read.
    #[error("audit log read failed: {0}")]
    Read(String),
    /// Log could not be written.
    #[error("audit log write failed: {0}")]
    Write(String),
}

impl From<PathError> for AuditError {
    fn from(value: PathError) -> Self {
        match value {
            PathError::UnknownWorkstream => Self::UnknownWorkstream,
            PathError::Traversal => Self::Traversal,
        }
    }
}

// ============================================================================
// SECTION: Logger
// ============================================================================

/// Per-tenant append-only audit logger.
pub struct AuditLogger {
    /// Resolver for tenant log paths.
    resolver: PathResolver,
    /// Maximum entries retained per tenant.
    retention: usize,
    /// Operational channel for recovered corruption.
    ops: Arc<dyn OpsEventSink>,
    /// Per-tenant serialization points.
    locks: Mutex<HashMap<WorkstreamName, Arc<Mutex<()>>>>,
}

impl AuditLogger {
    /// Creates a logger with the default retention cap.
    #[must_use]
    pub fn new(resolver: PathResolver, ops: Arc<dyn OpsEventSink>) -> Self {
        Self {
            resolver,
            retention: DEFAULT_AUDIT_RETENTION,
            ops,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a copy using the given retention cap (minimum 1).
    #[must_use]
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    /// Returns the retention cap.
    #[must_use]
    pub const fn retention(&self) -> usize {
        self.retention
    }

    /// Appends an entry to the tenant log, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the tenant is unknown, the draft is invalid,
    /// or the log cannot be written. The previous log is left intact on error.
    pub fn append(&self, name: &WorkstreamName, draft: AuditDraft) -> Result<EntryId, AuditError> {
        draft.validate()?;
        let path = self.log_path(name)?;
        let lock = self.tenant_lock(name);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load(name, &path)?;
        let entry = draft.into_entry(EntryId::generate(now_millis()), rfc3339_now()?);
        let id = entry.id.clone();
        entries.insert(0, entry);
        entries.truncate(self.retention);
        let bytes = serde_json::to_vec_pretty(&entries)
            .map_err(|_| AuditError::Write("serialization failed".to_string()))?;
        write_atomic(&path, &bytes).map_err(|err| AuditError::Write(err.kind().to_string()))?;
        Ok(id)
    }

    /// Reads entries most-recent-first, optionally limited.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the tenant is unknown or the log cannot be
    /// read for reasons other than absence or corruption.
    pub fn read(&self, name: &WorkstreamName, limit: Option<usize>) -> Result<Vec<AuditLogEntry>, AuditError> {
        let path = self.log_path(name)?;
        let mut entries = self.load(name, &path)?;
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Resolves the tenant log path.
    fn log_path(&self, name: &WorkstreamName) -> Result<std::path::PathBuf, AuditError> {
        Ok(self.resolver.resolve(name, StorageCategory::Logs, &[AUDIT_LOG_FILE])?)
    }

    /// Returns the serialization lock for a tenant.
    fn tenant_lock(&self, name: &WorkstreamName) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.clone()).or_default())
    }

    /// Loads the log; missing is empty, corrupt is empty plus an ops event.
    fn load(&self, name: &WorkstreamName, path: &Path) -> Result<Vec<AuditLogEntry>, AuditError> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(AuditError::Read(err.kind().to_string())),
        };
        if metadata.len() > MAX_AUDIT_LOG_BYTES {
            self.report_corruption(name, "audit log exceeds size limit");
            return Ok(Vec::new());
        }
        let bytes = fs::read(path).map_err(|err| AuditError::Read(err.kind().to_string()))?;
        match serde_json::from_slice::<Vec<AuditLogEntry>>(&bytes) {
            Ok(entries) => Ok(entries),
            Err(_) => {
                self.report_corruption(name, "audit log is not a valid entry array");
                Ok(Vec::new())
            }
        }
    }

    /// Emits a read-corruption operational event.
    fn report_corruption(&self, name: &WorkstreamName, message: &str) {
        self.ops.record(
            &OpsEvent::new(OpsEventKind::ReadCorruption)
                .with_workstream(name)
                .with_category("read_corruption")
                .with_message(message),
        );
    }
}

/// Formats the current UTC time as RFC 3339.
fn rfc3339_now() -> Result<String, AuditError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|_| AuditError::Write("timestamp formatting failed".to_string()))
}
