// crates/workstream-core/src/model.rs
// ============================================================================
// Module: Workstream Model
// Description: Tenant configuration, permission vocabulary, operation kinds.
// Purpose: Provide the closed vocabularies every gate decision is made from.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The model defines [`WorkstreamConfig`] (identity and policy for one
//! tenant), the closed [`Permission`] vocabulary, the storage
//! [`StorageCategory`] partitions and the [`OperationKind`] catalog that maps
//! every gated operation onto exactly one required permission.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::identifiers::WorkstreamName;

// ============================================================================
// SECTION: Permission
// ============================================================================

/// Operation permission label.
///
/// # Invariants
/// - Closed vocabulary; unknown labels fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Read tenant-owned resources.
    Read,
    /// Create new tenant-owned resources.
    Write,
    /// Modify existing tenant-owned resources.
    Mutate,
    /// Delete tenant-owned resources.
    Delete,
    /// Record chat interactions.
    Chat,
    /// Administrative registry actions.
    Admin,
}

impl Permission {
    /// All permissions in declaration order.
    pub const ALL: [Self; 6] =
        [Self::Read, Self::Write, Self::Mutate, Self::Delete, Self::Chat, Self::Admin];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Mutate => "mutate",
            Self::Delete => "delete",
            Self::Chat => "chat",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|permission| permission.as_str() == value).ok_or(UnknownPermission)
    }
}

/// Permission label outside the closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown permission label")]
pub struct UnknownPermission;

// ============================================================================
// SECTION: Workstream Configuration
// ============================================================================

/// Lifecycle status of a workstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkstreamStatus {
    /// Not yet started.
    Planning,
    /// In progress.
    #[default]
    Active,
    /// Retired; kept for audit continuity.
    Archived,
}

impl WorkstreamStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

/// Identity and policy for one tenant.
///
/// # Invariants
/// - `name` is immutable once registered.
/// - `data_path` is absolute and owned exclusively by this tenant (enforced by
///   [`crate::registry::Registry`]).
/// - `allowed_operations` is non-empty once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkstreamConfig {
    /// Unique slug.
    pub name: WorkstreamName,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Owning person or team.
    #[serde(default)]
    pub owner: String,
    /// Current delivery phase label.
    #[serde(default)]
    pub phase: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: WorkstreamStatus,
    /// Tenant storage root.
    pub data_path: PathBuf,
    /// Permissions granted to this tenant.
    pub allowed_operations: BTreeSet<Permission>,
}

impl WorkstreamConfig {
    /// Returns true when the permission is granted.
    #[must_use]
    pub fn allows(&self, permission: Permission) -> bool {
        self.allowed_operations.contains(&permission)
    }
}

// ============================================================================
// SECTION: Storage Categories
// ============================================================================

/// Storage partition under a tenant root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageCategory {
    /// Tenant content (tasks, documents).
    Artefacts,
    /// Tenant audit logs.
    Logs,
    /// Tenant-local configuration.
    Config,
}

impl StorageCategory {
    /// Returns the directory name for the category.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Artefacts => "artefacts",
            Self::Logs => "logs",
            Self::Config => "config",
        }
    }
}

// ============================================================================
// SECTION: Operation Kinds
// ============================================================================

/// Gated operation catalog.
///
/// # Invariants
/// - Each kind maps to exactly one required [`Permission`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Describe the resolved workstream.
    DescribeWorkstream,
    /// Read an artefact.
    ReadArtefact,
    /// Create an artefact that must not already exist.
    CreateArtefact,
    /// Create or overwrite an artefact.
    ReplaceArtefact,
    /// Delete an artefact.
    DeleteArtefact,
    /// Read the tenant audit log.
    ReadAuditLog,
    /// Append a caller-supplied audit entry.
    AppendAuditEntry,
    /// Record a chat interaction.
    RecordChat,
    /// Register a new workstream.
    CreateWorkstream,
    /// Archive an existing workstream.
    ArchiveWorkstream,
}

impl OperationKind {
    /// Returns the permission the operation requires.
    #[must_use]
    pub const fn required_permission(self) -> Permission {
        match self {
            Self::DescribeWorkstream | Self::ReadArtefact | Self::ReadAuditLog => Permission::Read,
            Self::CreateArtefact | Self::AppendAuditEntry => Permission::Write,
            Self::ReplaceArtefact => Permission::Mutate,
            Self::DeleteArtefact => Permission::Delete,
            Self::RecordChat => Permission::Chat,
            Self::CreateWorkstream | Self::ArchiveWorkstream => Permission::Admin,
        }
    }

    /// Returns the stable dotted label used in audit tags.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::DescribeWorkstream => "workstream.describe",
            Self::ReadArtefact => "artefact.read",
            Self::CreateArtefact => "artefact.create",
            Self::ReplaceArtefact => "artefact.replace",
            Self::DeleteArtefact => "artefact.delete",
            Self::ReadAuditLog => "audit.read",
            Self::AppendAuditEntry => "audit.append",
            Self::RecordChat => "chat.record",
            Self::CreateWorkstream => "admin.create_workstream",
            Self::ArchiveWorkstream => "admin.archive_workstream",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
