// crates/workstream-core/src/error.rs
// ============================================================================
// Module: Error Categories
// Description: Stable machine-checkable categories for every core failure.
// Purpose: Give transports one mapping point from errors to responses.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every core error type reports an [`ErrorCategory`]. Transports map
//! categories (not error variants) onto status codes, and only ever surface the
//! category's fixed message for storage failures so that I/O detail never
//! reaches a client.

use serde::Serialize;
use thiserror::Error;

use crate::audit::AuditError;
use crate::context::ContextError;
use crate::paths::PathError;
use crate::permissions::PermissionDenied;
use crate::registry::RegistryError;

// ============================================================================
// SECTION: Categories
// ============================================================================

/// Stable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// No channel supplied a workstream.
    MissingWorkstream,
    /// Workstream candidate is malformed.
    InvalidWorkstreamFormat,
    /// Workstream is not registered.
    UnknownWorkstream,
    /// Permission not granted.
    PermissionDenied,
    /// Resource path escapes the tenant root.
    InvalidResourcePath,
    /// Resource does not exist.
    NotFound,
    /// Request input is invalid.
    InvalidRequest,
    /// Registry update violates registry invariants.
    RegistryValidation,
    /// Storage read or write failed.
    StorageFailure,
}

impl ErrorCategory {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingWorkstream => "missing_workstream",
            Self::InvalidWorkstreamFormat => "invalid_workstream_format",
            Self::UnknownWorkstream => "unknown_workstream",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidResourcePath => "invalid_resource_path",
            Self::NotFound => "not_found",
            Self::InvalidRequest => "invalid_request",
            Self::RegistryValidation => "registry_validation",
            Self::StorageFailure => "storage_failure",
        }
    }

    /// Returns the fixed client-facing message for the category.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::MissingWorkstream => "missing workstream parameter",
            Self::InvalidWorkstreamFormat => "invalid workstream parameter format",
            Self::UnknownWorkstream => "unknown workstream",
            Self::PermissionDenied => "access denied to workstream",
            Self::InvalidResourcePath => "invalid resource path",
            Self::NotFound => "resource not found",
            Self::InvalidRequest => "invalid request",
            Self::RegistryValidation => "registry validation failed",
            Self::StorageFailure => "internal storage error",
        }
    }
}

// ============================================================================
// SECTION: Gate Errors
// ============================================================================

/// Rejection raised before a gated handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    /// Context extraction failed.
    #[error(transparent)]
    Context(#[from] ContextError),
    /// Permission check failed.
    #[error(transparent)]
    Permission(#[from] PermissionDenied),
}

impl GateError {
    /// Returns the stable category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Context(err) => err.category(),
            Self::Permission(_) => ErrorCategory::PermissionDenied,
        }
    }
}

// ============================================================================
// SECTION: Category Mapping
// ============================================================================

impl ContextError {
    /// Returns the stable category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingWorkstream => ErrorCategory::MissingWorkstream,
            Self::InvalidFormat(_) => ErrorCategory::InvalidWorkstreamFormat,
            Self::UnknownWorkstream => ErrorCategory::UnknownWorkstream,
        }
    }
}

impl PathError {
    /// Returns the stable category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownWorkstream => ErrorCategory::UnknownWorkstream,
            Self::Traversal => ErrorCategory::InvalidResourcePath,
        }
    }
}

impl RegistryError {
    /// Returns the stable category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound => ErrorCategory::NotFound,
            Self::Load(_) | Self::Persist(_) => ErrorCategory::StorageFailure,
            _ => ErrorCategory::RegistryValidation,
        }
    }
}

impl AuditError {
    /// Returns the stable category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownWorkstream => ErrorCategory::UnknownWorkstream,
            Self::Traversal => ErrorCategory::InvalidResourcePath,
            Self::InvalidEntry(_) => ErrorCategory::InvalidRequest,
            Self::Read(_) | Self::Write(_) => ErrorCategory::StorageFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FormatViolation;
    use crate::identifiers::NameError;
    use crate::model::Permission;

    #[test]
    fn gate_errors_map_to_stable_labels() {
        let cases = [
            (GateError::Context(ContextError::MissingWorkstream), "missing_workstream"),
            (
                GateError::Context(ContextError::InvalidFormat(FormatViolation::Name(NameError::PathSequence))),
                "invalid_workstream_format",
            ),
            (GateError::Context(ContextError::UnknownWorkstream), "unknown_workstream"),
            (
                GateError::Permission(PermissionDenied {
                    required: Permission::Delete,
                }),
                "permission_denied",
            ),
        ];
        for (error, label) in cases {
            assert_eq!(error.category().as_str(), label);
        }
    }

    #[test]
    fn storage_failures_use_a_fixed_message() {
        let err = AuditError::Write("permission denied".to_string());
        assert_eq!(err.category(), ErrorCategory::StorageFailure);
        assert_eq!(err.category().default_message(), "internal storage error");
        assert_eq!(RegistryError::Duplicate.category(), ErrorCategory::RegistryValidation);
        assert_eq!(PathError::Traversal.category(), ErrorCategory::InvalidResourcePath);
    }
}
