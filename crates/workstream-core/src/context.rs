// crates/workstream-core/src/context.rs
// ============================================================================
// Module: Context Extractor
// Description: Resolves the tenant of an inbound operation from its channels.
// Purpose: Turn untrusted query/header/body/path input into a validated context.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The extractor inspects four channels in fixed precedence (query
//! `workstream`, header `x-workstream`, body field `workstream`, path segment
//! after `workstream`/`workstreams`) and takes the first non-blank value. The
//! candidate is slug-validated before it is allowed anywhere near the registry;
//! a registered candidate yields a [`RequestContext`] whose `data_path` is
//! copied verbatim from the registry entry.
//!
//! There is no implicit fallback tenant. A configured default is only used when
//! [`DefaultWorkstreamPolicy::Fallback`] is set explicitly.
//!
//! Security posture: candidates are untrusted; errors never include them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::identifiers::NameError;
use crate::identifiers::WorkstreamName;
use crate::model::OperationKind;
use crate::registry::WorkstreamDirectory;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Query parameter carrying the workstream.
pub const WORKSTREAM_QUERY_PARAM: &str = "workstream";
/// Header carrying the workstream (lowercase).
pub const WORKSTREAM_HEADER: &str = "x-workstream";
/// Body field carrying the workstream.
pub const WORKSTREAM_BODY_FIELD: &str = "workstream";
/// Path segments that precede a workstream name.
const WORKSTREAM_PATH_MARKERS: [&str; 2] = ["workstream", "workstreams"];

// ============================================================================
// SECTION: Operation Descriptor
// ============================================================================

/// Transport-neutral description of an inbound operation.
///
/// # Invariants
/// - Header names are stored lowercase.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    /// Operation being attempted.
    pub kind: OperationKind,
    /// Request path used for path-channel detection; empty disables it.
    pub path: String,
    /// Query parameters.
    pub query: BTreeMap<String, String>,
    /// Request headers keyed by lowercase name.
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, when the operation carries one.
    pub body: Option<Value>,
}

impl OperationDescriptor {
    /// Creates a descriptor with no channels populated except the path.
    #[must_use]
    pub fn new(kind: OperationKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Adds a header, normalizing the name to lowercase.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Attaches a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Channel the workstream was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Query parameter.
    Query,
    /// Request header.
    Header,
    /// JSON body field.
    Body,
    /// URL path segment.
    Path,
    /// Explicitly configured default.
    ConfiguredDefault,
}

impl DetectionSource {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
            Self::Path => "path",
            Self::ConfiguredDefault => "configured_default",
        }
    }
}

/// Resolved tenant context for one operation.
///
/// # Invariants
/// - `workstream` is registered at extraction time.
/// - `data_path` equals the registry entry's `data_path` at extraction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    /// Resolved workstream.
    pub workstream: WorkstreamName,
    /// Tenant storage root copied from the registry.
    pub data_path: PathBuf,
    /// Channel the workstream was found on.
    pub detection_source: DetectionSource,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reason a candidate was rejected as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatViolation {
    /// Candidate violates the slug grammar.
    #[error(transparent)]
    Name(#[from] NameError),
    /// Body `workstream` field is present but not a string.
    #[error("workstream body field is not a string")]
    NonStringBodyField,
}

/// Context extraction failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// No channel supplied a workstream.
    #[error("missing workstream parameter")]
    MissingWorkstream,
    /// Candidate failed lexical validation.
    #[error("invalid workstream parameter format")]
    InvalidFormat(FormatViolation),
    /// Candidate is well-formed but not registered.
    #[error("unknown workstream")]
    UnknownWorkstream,
}

// ============================================================================
// SECTION: Extractor
// ============================================================================

/// Fallback behavior when no channel supplies a workstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DefaultWorkstreamPolicy {
    /// Reject with [`ContextError::MissingWorkstream`].
    #[default]
    Disabled,
    /// Use the named workstream.
    Fallback(WorkstreamName),
}

/// Resolves [`RequestContext`] values from operation descriptors.
#[derive(Clone)]
pub struct ContextExtractor {
    /// Registry view used to validate candidates.
    directory: Arc<dyn WorkstreamDirectory>,
    /// Behavior when no channel supplies a candidate.
    default_policy: DefaultWorkstreamPolicy,
}

impl ContextExtractor {
    /// Creates an extractor with no default workstream.
    #[must_use]
    pub fn new(directory: Arc<dyn WorkstreamDirectory>) -> Self {
        Self {
            directory,
            default_policy: DefaultWorkstreamPolicy::Disabled,
        }
    }

    /// Returns a copy using the given default policy.
    #[must_use]
    pub fn with_default_policy(mut self, policy: DefaultWorkstreamPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Extracts and validates the workstream for `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when no candidate is supplied, the candidate
    /// is malformed, or it is not registered.
    pub fn extract(&self, operation: &OperationDescriptor) -> Result<RequestContext, ContextError> {
        let (candidate, detection_source) = match find_candidate(operation)? {
            Some(found) => found,
            None => match &self.default_policy {
                DefaultWorkstreamPolicy::Fallback(name) => {
                    (name.as_str(), DetectionSource::ConfiguredDefault)
                }
                DefaultWorkstreamPolicy::Disabled => return Err(ContextError::MissingWorkstream),
            },
        };
        let workstream = WorkstreamName::parse(candidate)
            .map_err(|err| ContextError::InvalidFormat(FormatViolation::Name(err)))?;
        let config = self.directory.get(&workstream).ok_or(ContextError::UnknownWorkstream)?;
        Ok(RequestContext {
            workstream,
            data_path: config.data_path.clone(),
            detection_source,
        })
    }
}

// ============================================================================
// SECTION: Channel Helpers
// ============================================================================

/// Returns the first non-blank candidate in precedence order.
fn find_candidate(
    operation: &OperationDescriptor,
) -> Result<Option<(&str, DetectionSource)>, ContextError> {
    if let Some(value) = operation.query.get(WORKSTREAM_QUERY_PARAM).map(String::as_str)
        && !is_blank(value)
    {
        return Ok(Some((value, DetectionSource::Query)));
    }
    if let Some(value) = operation.header(WORKSTREAM_HEADER)
        && !is_blank(value)
    {
        return Ok(Some((value, DetectionSource::Header)));
    }
    if let Some(value) = body_candidate(operation.body.as_ref())? {
        return Ok(Some((value, DetectionSource::Body)));
    }
    Ok(path_candidate(&operation.path).map(|value| (value, DetectionSource::Path)))
}

/// Reads the body channel; `null` and blank strings count as absent.
fn body_candidate(body: Option<&Value>) -> Result<Option<&str>, ContextError> {
    let Some(Value::Object(fields)) = body else {
        return Ok(None);
    };
    match fields.get(WORKSTREAM_BODY_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) if is_blank(value) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.as_str())),
        Some(_) => Err(ContextError::InvalidFormat(FormatViolation::NonStringBodyField)),
    }
}

/// Reads the segment following the first workstream path marker.
fn path_candidate(path: &str) -> Option<&str> {
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    while let Some(segment) = segments.next() {
        if WORKSTREAM_PATH_MARKERS.contains(&segment) {
            return segments.next().filter(|value| !is_blank(value));
        }
    }
    None
}

/// Returns true for empty or whitespace-only values.
fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[cfg(test)]
mod tests;
