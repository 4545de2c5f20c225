// crates/workstream-core/src/permissions.rs
// ============================================================================
// Module: Permission Matrix
// Description: Deny-by-default (workstream, permission) decisions.
// Purpose: Single point through which every permission check flows.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The matrix is a pure function over the registry snapshot: unknown tenants
//! are denied everything, known tenants are allowed exactly their
//! `allowed_operations`. There is no override, wildcard, or role layer.

use std::sync::Arc;

use thiserror::Error;

use crate::identifiers::WorkstreamName;
use crate::model::Permission;
use crate::registry::WorkstreamDirectory;

/// Permission denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("access denied to workstream")]
pub struct PermissionDenied {
    /// Permission that was required.
    pub required: Permission,
}

/// Deny-by-default permission matrix.
#[derive(Clone)]
pub struct PermissionMatrix {
    /// Registry view supplying `allowed_operations`.
    directory: Arc<dyn WorkstreamDirectory>,
}

impl PermissionMatrix {
    /// Creates a matrix backed by the given directory.
    #[must_use]
    pub fn new(directory: Arc<dyn WorkstreamDirectory>) -> Self {
        Self {
            directory,
        }
    }

    /// Returns true iff the tenant is registered and grants `permission`.
    #[must_use]
    pub fn is_allowed(&self, name: &WorkstreamName, permission: Permission) -> bool {
        self.directory.get(name).is_some_and(|config| config.allows(permission))
    }

    /// Checks a permission, returning a denial error when it is not granted.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionDenied`] when [`PermissionMatrix::is_allowed`] is false.
    pub fn check(&self, name: &WorkstreamName, permission: Permission) -> Result<(), PermissionDenied> {
        if self.is_allowed(name, permission) {
            Ok(())
        } else {
            Err(PermissionDenied {
                required: permission,
            })
        }
    }
}
