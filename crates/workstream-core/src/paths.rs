// crates/workstream-core/src/paths.rs
// ============================================================================
// Module: Tenant Path Resolver
// Description: Traversal-safe storage paths under a tenant's exclusive root.
// Purpose: Be the only constructor of tenant storage paths.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`PathResolver::resolve`] joins caller-supplied segments onto the category
//! directory of a tenant's registered `data_path`, normalizes the result
//! lexically, and then re-checks containment against the filesystem by
//! canonicalizing the deepest ancestor that already exists. Symlinks that lead
//! outside the tenant root are therefore rejected even when the lexical path
//! looks contained.
//!
//! Security posture: fail closed. Rejections never echo the attempted path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::identifiers::WorkstreamName;
use crate::model::StorageCategory;
use crate::registry::WorkstreamDirectory;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Directory under the storage root that holds synthesized tenant roots.
pub const WORKSTREAMS_DIR: &str = "workstreams";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Path resolution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathError {
    /// Tenant is not registered.
    #[error("unknown workstream")]
    UnknownWorkstream,
    /// Resolved path would leave the tenant's category directory.
    #[error("invalid resource path")]
    Traversal,
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolves tenant-scoped storage paths.
///
/// # Invariants
/// - Every returned path lies inside `data_path/<category>` of the named
///   tenant, both lexically and after symlink resolution of existing parts.
#[derive(Clone)]
pub struct PathResolver {
    /// Source of tenant storage roots.
    directory: Arc<dyn WorkstreamDirectory>,
}

impl PathResolver {
    /// Creates a resolver backed by the given directory.
    #[must_use]
    pub fn new(directory: Arc<dyn WorkstreamDirectory>) -> Self {
        Self {
            directory,
        }
    }

    /// Resolves `segments` under the tenant's `category` directory.
    ///
    /// Each segment may itself contain `/`-separated components. An empty
    /// segment list resolves to the category directory; segments that
    /// normalize to nothing are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownWorkstream`] when the tenant is absent and
    /// [`PathError::Traversal`] when any segment is unsafe or the result would
    /// escape the category directory.
    pub fn resolve(
        &self,
        name: &WorkstreamName,
        category: StorageCategory,
        segments: &[&str],
    ) -> Result<PathBuf, PathError> {
        let config = self.directory.get(name).ok_or(PathError::UnknownWorkstream)?;
        let root = config.data_path.as_path();
        let mut stack: Vec<&str> = Vec::new();
        for segment in segments {
            push_segment(&mut stack, segment)?;
        }
        if stack.is_empty() && !segments.is_empty() {
            return Err(PathError::Traversal);
        }
        let mut resolved = root.join(category.dir_name());
        for part in &stack {
            resolved.push(part);
        }
        if !resolved.starts_with(root) || resolved == root {
            return Err(PathError::Traversal);
        }
        ensure_physically_contained(root, &resolved)?;
        Ok(resolved)
    }
}

/// Returns the normalized `/`-joined form of a caller resource.
///
/// # Errors
///
/// Returns [`PathError::Traversal`] under the same rules as
/// [`PathResolver::resolve`] for lexical checks.
pub fn normalize_resource(resource: &str) -> Result<String, PathError> {
    let mut stack: Vec<&str> = Vec::new();
    push_segment(&mut stack, resource)?;
    if stack.is_empty() {
        return Err(PathError::Traversal);
    }
    Ok(stack.join("/"))
}

/// Derives the storage root for a new tenant under the service storage root.
#[must_use]
pub fn tenant_root_for(storage_root: &Path, name: &WorkstreamName) -> PathBuf {
    storage_root.join(WORKSTREAMS_DIR).join(name.as_str())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates one caller segment and applies it to the normalized stack.
fn push_segment<'a>(stack: &mut Vec<&'a str>, segment: &'a str) -> Result<(), PathError> {
    if segment.is_empty() || segment.contains('\0') || segment.contains('\\') {
        return Err(PathError::Traversal);
    }
    for component in Path::new(segment).components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or(PathError::Traversal)?;
                stack.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                stack.pop().ok_or(PathError::Traversal)?;
            }
            Component::RootDir | Component::Prefix(_) => return Err(PathError::Traversal),
        }
    }
    Ok(())
}

/// Canonicalizes the deepest existing ancestor and re-checks containment.
fn ensure_physically_contained(root: &Path, resolved: &Path) -> Result<(), PathError> {
    let Some(existing) = resolved
        .ancestors()
        .take_while(|ancestor| ancestor.starts_with(root))
        .find(|ancestor| fs::symlink_metadata(ancestor).is_ok())
    else {
        return Ok(());
    };
    let canonical_root = fs::canonicalize(root).map_err(|_| PathError::Traversal)?;
    let canonical = fs::canonicalize(existing).map_err(|_| PathError::Traversal)?;
    if canonical.starts_with(&canonical_root) { Ok(()) } else { Err(PathError::Traversal) }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
