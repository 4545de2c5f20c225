// crates/workstream-core/src/identifiers.rs
// ============================================================================
// Module: Workstream Identifiers
// Description: Validated workstream slugs and audit entry identifiers.
// Purpose: Make malformed tenant names unrepresentable past the parse boundary.
// Dependencies: serde, rand
// ============================================================================

//! ## Overview
//! [`WorkstreamName`] is the only way a tenant name travels through the core.
//! It can only be built by [`WorkstreamName::parse`], which enforces the slug
//! grammar `^[a-z][a-z0-9-]{1,31}$`. Anything that takes a `WorkstreamName`
//! (registry lookups, path resolution) therefore never sees a traversal
//! sequence, separator, or control character.
//!
//! Security posture: raw candidates are untrusted and are never echoed back in
//! error messages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum slug length in bytes.
pub const MIN_WORKSTREAM_NAME_LENGTH: usize = 2;
/// Maximum slug length in bytes.
pub const MAX_WORKSTREAM_NAME_LENGTH: usize = 32;

// ============================================================================
// SECTION: Workstream Name
// ============================================================================

/// Validated workstream (tenant) slug.
///
/// # Invariants
/// - Matches `^[a-z][a-z0-9-]{1,31}$`.
/// - Contains no path separators, dots, or control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkstreamName(String);

impl WorkstreamName {
    /// Parses and validates a candidate workstream name.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] when the candidate violates the slug grammar.
    pub fn parse(candidate: &str) -> Result<Self, NameError> {
        validate_slug(candidate)?;
        Ok(Self(candidate.to_string()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkstreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for WorkstreamName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_slug(&value)?;
        Ok(Self(value))
    }
}

impl From<WorkstreamName> for String {
    fn from(value: WorkstreamName) -> Self {
        value.0
    }
}

impl AsRef<str> for WorkstreamName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Slug validation failures.
///
/// # Invariants
/// - Variants never carry the rejected candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NameError {
    /// Candidate is empty.
    #[error("workstream name is empty")]
    Empty,
    /// Candidate is shorter than the minimum length.
    #[error("workstream name is too short")]
    TooShort,
    /// Candidate exceeds the maximum length.
    #[error("workstream name is too long")]
    TooLong,
    /// Candidate contains a path separator or traversal sequence.
    #[error("workstream name contains a path sequence")]
    PathSequence,
    /// Candidate contains a control character.
    #[error("workstream name contains a control character")]
    ControlCharacter,
    /// Candidate does not start with a lowercase ASCII letter.
    #[error("workstream name must start with a lowercase letter")]
    InvalidStart,
    /// Candidate contains a character outside `[a-z0-9-]`.
    #[error("workstream name contains an illegal character")]
    IllegalCharacter,
}

/// Validates the slug grammar, classifying the most severe violation first.
fn validate_slug(candidate: &str) -> Result<(), NameError> {
    if candidate.is_empty() {
        return Err(NameError::Empty);
    }
    if candidate.chars().any(char::is_control) {
        return Err(NameError::ControlCharacter);
    }
    if candidate.contains("..") || candidate.contains('/') || candidate.contains('\\') {
        return Err(NameError::PathSequence);
    }
    if candidate.len() > MAX_WORKSTREAM_NAME_LENGTH {
        return Err(NameError::TooLong);
    }
    if candidate.len() < MIN_WORKSTREAM_NAME_LENGTH {
        return Err(NameError::TooShort);
    }
    let mut bytes = candidate.bytes();
    if !bytes.next().is_some_and(|first| first.is_ascii_lowercase()) {
        return Err(NameError::InvalidStart);
    }
    if !bytes.all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-') {
        return Err(NameError::IllegalCharacter);
    }
    Ok(())
}

// ============================================================================
// SECTION: Audit Entry Identifier
// ============================================================================

/// Audit log entry identifier.
///
/// # Invariants
/// - Generated ids are `log-<unix-millis>-<16 hex digits>`; ids read back from
///   disk are kept opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Generates a time-prefixed identifier with a random suffix.
    #[must_use]
    pub fn generate(unix_millis: u128) -> Self {
        let suffix: u64 = rand::random();
        Self(format!("log-{unix_millis}-{suffix:016x}"))
    }

    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
