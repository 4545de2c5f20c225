// crates/workstream-core/src/registry.rs
// ============================================================================
// Module: Workstream Registry
// Description: Catalog of known workstreams and their storage/permission policy.
// Purpose: Single owner of tenant configuration with linearizable updates.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The [`Registry`] exclusively owns every [`WorkstreamConfig`]. Reads take an
//! immutable snapshot (`Arc<BTreeMap>`) and never block each other; writes are
//! serialized by a single writer lock, persisted atomically, and only then
//! swapped in, so a successful `upsert` is visible to the very next `get`.
//!
//! ## Invariants
//! - No two entries share a `data_path`, and no `data_path` is a component-wise
//!   prefix of another.
//! - `data_path` is absolute, free of `.`/`..` components, and immutable.
//! - Entries are never removed; [`Registry::archive`] flips status instead.
//!
//! Security posture: the registry is the only source of tenant storage roots;
//! callers never synthesize one from request input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::identifiers::NameError;
use crate::identifiers::WorkstreamName;
use crate::model::WorkstreamConfig;
use crate::model::WorkstreamStatus;
use crate::storage::write_atomic;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Durable registry document version.
const REGISTRY_DOCUMENT_VERSION: u32 = 1;
/// Maximum registry document size in bytes.
const MAX_REGISTRY_FILE_BYTES: u64 = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Directory Trait
// ============================================================================

/// Read-only view over registered workstreams.
///
/// The context extractor and permission matrix depend on this seam rather than
/// on [`Registry`] directly; lookups only accept validated names.
pub trait WorkstreamDirectory: Send + Sync {
    /// Returns the configuration for `name`, if registered.
    fn get(&self, name: &WorkstreamName) -> Option<Arc<WorkstreamConfig>>;

    /// Returns all registered configurations ordered by name.
    fn list(&self) -> Vec<Arc<WorkstreamConfig>>;
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Snapshot map type.
type Snapshot = Arc<BTreeMap<WorkstreamName, Arc<WorkstreamConfig>>>;

/// Workstream registry with optional durable persistence.
pub struct Registry {
    /// Current immutable snapshot.
    snapshot: RwLock<Snapshot>,
    /// Single writer lock serializing mutations.
    writer: Mutex<()>,
    /// Registry document path; `None` keeps the registry in memory.
    persist_path: Option<PathBuf>,
}

impl Registry {
    /// Builds an in-memory registry from configurations.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when any entry or the set as a whole is invalid.
    pub fn from_configs(configs: Vec<WorkstreamConfig>) -> Result<Self, RegistryError> {
        let map = build_map(configs)?;
        Ok(Self {
            snapshot: RwLock::new(Arc::new(map)),
            writer: Mutex::new(()),
            persist_path: None,
        })
    }

    /// Opens a durable registry.
    ///
    /// An existing document at `path` is authoritative. Otherwise the registry
    /// is seeded from `seeds` and persisted immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the document cannot be read or parsed, or
    /// when its contents violate registry invariants.
    pub fn open(path: &Path, seeds: Vec<WorkstreamConfig>) -> Result<Self, RegistryError> {
        let map = if path.exists() {
            build_map(load_document(path)?)?
        } else {
            let map = build_map(seeds)?;
            persist_document(path, &map)?;
            map
        };
        Ok(Self {
            snapshot: RwLock::new(Arc::new(map)),
            writer: Mutex::new(()),
            persist_path: Some(path.to_path_buf()),
        })
    }

    /// Returns the configuration for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when the workstream is not registered.
    pub fn require(&self, name: &WorkstreamName) -> Result<Arc<WorkstreamConfig>, RegistryError> {
        self.current().get(name).cloned().ok_or(RegistryError::NotFound)
    }

    /// Inserts or updates a workstream.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when validation or persistence fails. On error
    /// the registry is unchanged.
    pub fn upsert(&self, config: WorkstreamConfig) -> Result<Arc<WorkstreamConfig>, RegistryError> {
        self.mutate(|current| {
            let config = normalize_entry(config)?;
            if let Some(existing) = current.get(&config.name)
                && existing.data_path != config.data_path
            {
                return Err(RegistryError::DataPathImmutable);
            }
            ensure_disjoint(&config, current.values().map(Arc::as_ref))?;
            Ok(config)
        })
    }

    /// Registers a new workstream; fails when the name already exists.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] for an existing name, or any
    /// validation/persistence error from [`Registry::upsert`].
    pub fn create(&self, config: WorkstreamConfig) -> Result<Arc<WorkstreamConfig>, RegistryError> {
        self.mutate(|current| {
            if current.contains_key(&config.name) {
                return Err(RegistryError::Duplicate);
            }
            let config = normalize_entry(config)?;
            ensure_disjoint(&config, current.values().map(Arc::as_ref))?;
            Ok(config)
        })
    }

    /// Marks a workstream archived. Entries are never removed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown names or a persistence
    /// error when the document cannot be written.
    pub fn archive(&self, name: &WorkstreamName) -> Result<Arc<WorkstreamConfig>, RegistryError> {
        self.mutate(|current| {
            let existing = current.get(name).ok_or(RegistryError::NotFound)?;
            let mut updated = WorkstreamConfig::clone(existing);
            updated.status = WorkstreamStatus::Archived;
            Ok(updated)
        })
    }

    /// Returns the current snapshot.
    fn current(&self) -> Snapshot {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Applies a single-entry mutation under the writer lock.
    fn mutate(
        &self,
        build: impl FnOnce(&BTreeMap<WorkstreamName, Arc<WorkstreamConfig>>) -> Result<WorkstreamConfig, RegistryError>,
    ) -> Result<Arc<WorkstreamConfig>, RegistryError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current();
        let entry = Arc::new(build(&current)?);
        let mut next = BTreeMap::clone(&current);
        next.insert(entry.name.clone(), Arc::clone(&entry));
        if let Some(path) = &self.persist_path {
            persist_document(path, &next)?;
        }
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(entry)
    }
}

impl WorkstreamDirectory for Registry {
    fn get(&self, name: &WorkstreamName) -> Option<Arc<WorkstreamConfig>> {
        self.current().get(name).cloned()
    }

    fn list(&self) -> Vec<Arc<WorkstreamConfig>> {
        self.current().values().cloned().collect()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry validation and persistence failures.
///
/// # Invariants
/// - Messages never include filesystem paths.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Name violates the slug grammar.
    #[error("invalid workstream name: {0}")]
    InvalidName(NameError),
    /// Entry grants no permissions.
    #[error("workstream {0} must allow at least one operation")]
    EmptyPermissions(WorkstreamName),
    /// Storage root is not absolute.
    #[error("workstream {0} data_path must be absolute")]
    DataPathNotAbsolute(WorkstreamName),
    /// Storage root contains `..` components.
    #[error("workstream {0} data_path must not contain parent components")]
    DataPathTraversal(WorkstreamName),
    /// Storage root collides with or nests inside another workstream's root.
    #[error("workstream {name} data_path overlaps workstream {other}")]
    DataPathConflict {
        /// Entry being registered.
        name: WorkstreamName,
        /// Entry already owning the overlapping root.
        other: WorkstreamName,
    },
    /// Update attempted to move an existing storage root.
    #[error("data_path is immutable once registered")]
    DataPathImmutable,
    /// Name already registered.
    #[error("workstream already exists")]
    Duplicate,
    /// Name not registered.
    #[error("unknown workstream")]
    NotFound,
    /// Registry document could not be read or parsed.
    #[error("registry load failed: {0}")]
    Load(String),
    /// Registry document could not be written.
    #[error("registry persist failed: {0}")]
    Persist(String),
}

impl RegistryError {
    /// Returns true for caller-correctable validation failures.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidName(_)
                | Self::EmptyPermissions(_)
                | Self::DataPathNotAbsolute(_)
                | Self::DataPathTraversal(_)
                | Self::DataPathConflict { .. }
                | Self::DataPathImmutable
                | Self::Duplicate
        )
    }
}

// ============================================================================
// SECTION: Durable Document
// ============================================================================

/// On-disk registry document.
#[derive(Debug, Serialize, Deserialize)]
struct RegistryDocument {
    /// Document format version.
    version: u32,
    /// Registered workstreams ordered by name.
    workstreams: Vec<WorkstreamConfig>,
}

/// Reads and parses the registry document.
fn load_document(path: &Path) -> Result<Vec<WorkstreamConfig>, RegistryError> {
    let size = fs::metadata(path).map_err(|err| RegistryError::Load(err.kind().to_string()))?.len();
    if size > MAX_REGISTRY_FILE_BYTES {
        return Err(RegistryError::Load("registry document exceeds size limit".to_string()));
    }
    let bytes = fs::read(path).map_err(|err| RegistryError::Load(err.kind().to_string()))?;
    let document: RegistryDocument = serde_json::from_slice(&bytes)
        .map_err(|_| RegistryError::Load("registry document is not valid".to_string()))?;
    if document.version != REGISTRY_DOCUMENT_VERSION {
        return Err(RegistryError::Load("unsupported registry document version".to_string()));
    }
    Ok(document.workstreams)
}

/// Writes the registry document atomically.
fn persist_document(
    path: &Path,
    map: &BTreeMap<WorkstreamName, Arc<WorkstreamConfig>>,
) -> Result<(), RegistryError> {
    let document = RegistryDocument {
        version: REGISTRY_DOCUMENT_VERSION,
        workstreams: map.values().map(|entry| WorkstreamConfig::clone(entry)).collect(),
    };
    let bytes = serde_json::to_vec_pretty(&document)
        .map_err(|_| RegistryError::Persist("registry serialization failed".to_string()))?;
    write_atomic(path, &bytes).map_err(|err| RegistryError::Persist(err.kind().to_string()))
}

// ============================================================================
// SECTION: Validation Helpers
// ============================================================================

/// Validates a full set of entries and builds the snapshot map.
fn build_map(
    configs: Vec<WorkstreamConfig>,
) -> Result<BTreeMap<WorkstreamName, Arc<WorkstreamConfig>>, RegistryError> {
    let mut map: BTreeMap<WorkstreamName, Arc<WorkstreamConfig>> = BTreeMap::new();
    for config in configs {
        let config = normalize_entry(config)?;
        if map.contains_key(&config.name) {
            return Err(RegistryError::Duplicate);
        }
        ensure_disjoint(&config, map.values().map(Arc::as_ref))?;
        map.insert(config.name.clone(), Arc::new(config));
    }
    Ok(map)
}

/// Validates a single entry and normalizes its storage root.
fn normalize_entry(mut config: WorkstreamConfig) -> Result<WorkstreamConfig, RegistryError> {
    if config.allowed_operations.is_empty() {
        return Err(RegistryError::EmptyPermissions(config.name));
    }
    if !config.data_path.is_absolute() {
        return Err(RegistryError::DataPathNotAbsolute(config.name));
    }
    if config.data_path.components().any(|component| component == Component::ParentDir) {
        return Err(RegistryError::DataPathTraversal(config.name));
    }
    config.data_path = config.data_path.components().collect();
    Ok(config)
}

/// Ensures `candidate` owns a storage root disjoint from every other entry.
fn ensure_disjoint<'a>(
    candidate: &WorkstreamConfig,
    others: impl Iterator<Item = &'a WorkstreamConfig>,
) -> Result<(), RegistryError> {
    for other in others {
        if other.name == candidate.name {
            continue;
        }
        if other.data_path.starts_with(&candidate.data_path)
            || candidate.data_path.starts_with(&other.data_path)
        {
            return Err(RegistryError::DataPathConflict {
                name: candidate.name.clone(),
                other: other.name.clone(),
            });
        }
    }
    Ok(())
}
