// crates/workstream-config/src/config.rs
// ============================================================================
// Module: Workstream Gate Configuration
// Description: Configuration loading and validation for Workstream Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: workstream-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed. The `[[workstreams]]` table
//! only seeds the registry; once a registry document exists on disk it is
//! authoritative.
//!
//! Security posture: config inputs are untrusted. The default workstream is an
//! explicit opt-in and must name a seeded workstream.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use workstream_core::DefaultWorkstreamPolicy;
use workstream_core::Permission;
use workstream_core::WorkstreamConfig;
use workstream_core::WorkstreamName;
use workstream_core::WorkstreamStatus;
use workstream_core::tenant_root_for;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "workstream-gate.toml";
/// Environment variable for config path overrides.
pub(crate) const CONFIG_ENV_VAR: &str = "WORKSTREAM_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default HTTP bind address.
pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:8420";
/// Default maximum request body size in bytes.
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Upper bound on the request body size limit.
pub(crate) const MAX_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;
/// Default storage root.
pub(crate) const DEFAULT_STORAGE_ROOT: &str = "/var/lib/workstream-gate";
/// Default registry document name (relative to the storage root).
pub(crate) const DEFAULT_REGISTRY_FILE: &str = "registry.json";
/// Default audit retention cap.
pub(crate) const DEFAULT_AUDIT_RETENTION: usize = 500;
/// Maximum audit retention cap.
pub(crate) const MAX_AUDIT_RETENTION: usize = 10_000;
/// Maximum number of seeded workstreams.
pub(crate) const MAX_SEED_WORKSTREAMS: usize = 1024;
/// Maximum length of descriptive workstream fields.
pub(crate) const MAX_DESCRIPTIVE_FIELD_LENGTH: usize = 1024;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Workstream Gate configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkstreamGateConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage layout configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Audit log configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Context extraction configuration.
    #[serde(default)]
    pub context: ContextConfig,
    /// Registry seed entries.
    #[serde(default)]
    pub workstreams: Vec<WorkstreamSeed>,
}

impl WorkstreamGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config = Self::from_toml_str(content)?;
        Ok(config)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.storage.validate()?;
        self.audit.validate()?;
        self.validate_seeds()?;
        self.validate_context()?;
        Ok(())
    }

    /// Returns the registry seed as core workstream configurations.
    ///
    /// Seeds without an explicit `data_path` are placed under
    /// `<storage.root>/workstreams/<name>`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a seed name is invalid.
    pub fn seed_configs(&self) -> Result<Vec<WorkstreamConfig>, ConfigError> {
        self.workstreams.iter().map(|seed| seed.to_config(&self.storage.root)).collect()
    }

    /// Returns the default workstream policy.
    ///
    /// Falls back to [`DefaultWorkstreamPolicy::Disabled`] unless the default is
    /// explicitly enabled and names a valid workstream.
    #[must_use]
    pub fn default_policy(&self) -> DefaultWorkstreamPolicy {
        if !self.context.allow_default {
            return DefaultWorkstreamPolicy::Disabled;
        }
        self.context
            .default_workstream
            .as_deref()
            .and_then(|name| WorkstreamName::parse(name).ok())
            .map_or(DefaultWorkstreamPolicy::Disabled, DefaultWorkstreamPolicy::Fallback)
    }

    /// Validates registry seed entries.
    fn validate_seeds(&self) -> Result<(), ConfigError> {
        if self.workstreams.len() > MAX_SEED_WORKSTREAMS {
            return Err(ConfigError::Invalid("too many workstreams entries".to_string()));
        }
        let mut seen = BTreeSet::new();
        for seed in &self.workstreams {
            seed.validate()?;
            if !seen.insert(seed.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate workstreams.name: {}", seed.name)));
            }
        }
        Ok(())
    }

    /// Validates the opt-in default workstream against the seeds.
    fn validate_context(&self) -> Result<(), ConfigError> {
        let Some(default) = self.context.default_workstream.as_deref() else {
            if self.context.allow_default {
                return Err(ConfigError::Invalid(
                    "context.allow_default requires context.default_workstream".to_string(),
                ));
            }
            return Ok(());
        };
        WorkstreamName::parse(default).map_err(|err| {
            ConfigError::Invalid(format!("context.default_workstream is invalid: {err}"))
        })?;
        if !self.workstreams.iter().any(|seed| seed.name == default) {
            return Err(ConfigError::Invalid(format!(
                "context.default_workstream {default} is not a seeded workstream"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Operational event log configuration.
    #[serde(default)]
    pub ops_log: OpsLogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            ops_log: OpsLogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the bind address is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("server.bind must be a socket address".to_string()))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be greater than zero".to_string()));
        }
        if self.max_body_bytes > MAX_MAX_BODY_BYTES {
            return Err(ConfigError::Invalid("max_body_bytes exceeds limit".to_string()));
        }
        self.bind_addr()?;
        self.ops_log.validate()
    }
}

/// Operational event log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpsLogConfig {
    /// Enables operational event output.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Optional JSON-lines file; stderr when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for OpsLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl OpsLogConfig {
    /// Validates operational log configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("server.ops_log.path", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// Storage layout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Absolute service storage root.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Registry document path; relative paths are resolved under `root`.
    #[serde(default)]
    pub registry_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            registry_path: None,
        }
    }
}

impl StorageConfig {
    /// Returns the resolved registry document path.
    #[must_use]
    pub fn registry_file(&self) -> PathBuf {
        match &self.registry_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.root.join(path),
            None => self.root.join(DEFAULT_REGISTRY_FILE),
        }
    }

    /// Validates storage configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("storage.root", &self.root.to_string_lossy())?;
        if !self.root.is_absolute() {
            return Err(ConfigError::Invalid("storage.root must be absolute".to_string()));
        }
        if has_parent_component(&self.root) {
            return Err(ConfigError::Invalid("storage.root must not contain '..'".to_string()));
        }
        if let Some(path) = &self.registry_path {
            validate_path_string("storage.registry_path", &path.to_string_lossy())?;
            if has_parent_component(path) {
                return Err(ConfigError::Invalid(
                    "storage.registry_path must not contain '..'".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit & Context
// ============================================================================

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Entries retained per workstream.
    #[serde(default = "default_audit_retention")]
    pub retention: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention: default_audit_retention(),
        }
    }
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.retention == 0 || self.retention > MAX_AUDIT_RETENTION {
            return Err(ConfigError::Invalid(format!(
                "audit.retention must be between 1 and {MAX_AUDIT_RETENTION}"
            )));
        }
        Ok(())
    }
}

/// Context extraction configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContextConfig {
    /// Enables the configured default workstream (explicit opt-in).
    #[serde(default)]
    pub allow_default: bool,
    /// Workstream used when no request channel supplies one.
    #[serde(default)]
    pub default_workstream: Option<String>,
}

// ============================================================================
// SECTION: Workstream Seeds
// ============================================================================

/// Registry seed entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkstreamSeed {
    /// Workstream slug.
    pub name: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Owning person or team.
    #[serde(default)]
    pub owner: String,
    /// Delivery phase label.
    #[serde(default)]
    pub phase: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: WorkstreamStatus,
    /// Explicit storage root; derived from `storage.root` when unset.
    #[serde(default)]
    pub data_path: Option<PathBuf>,
    /// Granted permissions.
    #[serde(default)]
    pub allowed_operations: Vec<Permission>,
}

impl WorkstreamSeed {
    /// Validates a seed entry.
    fn validate(&self) -> Result<(), ConfigError> {
        WorkstreamName::parse(&self.name).map_err(|err| {
            ConfigError::Invalid(format!("workstreams.name {:?} is invalid: {err}", self.name))
        })?;
        if self.allowed_operations.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "workstreams.allowed_operations must be non-empty: {}",
                self.name
            )));
        }
        for (field, value) in [
            ("display_name", &self.display_name),
            ("description", &self.description),
            ("owner", &self.owner),
            ("phase", &self.phase),
        ] {
            if value.len() > MAX_DESCRIPTIVE_FIELD_LENGTH {
                return Err(ConfigError::Invalid(format!("workstreams.{field} exceeds max length")));
            }
        }
        if let Some(path) = &self.data_path {
            validate_path_string("workstreams.data_path", &path.to_string_lossy())?;
            if !path.is_absolute() || has_parent_component(path) {
                return Err(ConfigError::Invalid(format!(
                    "workstreams.data_path must be absolute without '..': {}",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Converts the seed into a core configuration.
    fn to_config(&self, storage_root: &Path) -> Result<WorkstreamConfig, ConfigError> {
        let name = WorkstreamName::parse(&self.name).map_err(|err| {
            ConfigError::Invalid(format!("workstreams.name {:?} is invalid: {err}", self.name))
        })?;
        let data_path = self.data_path.clone().unwrap_or_else(|| tenant_root_for(storage_root, &name));
        Ok(WorkstreamConfig {
            name,
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            owner: self.owner.clone(),
            phase: self.phase.clone(),
            status: self.status,
            data_path,
            allowed_operations: self.allowed_operations.iter().copied().collect(),
        })
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Returns true when the path contains a `..` component.
fn has_parent_component(path: &Path) -> bool {
    path.components().any(|component| component == Component::ParentDir)
}

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default request body limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default storage root.
fn default_storage_root() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_ROOT)
}

/// Default audit retention.
const fn default_audit_retention() -> usize {
    DEFAULT_AUDIT_RETENTION
}

/// Serde helper returning `true`.
const fn default_true() -> bool {
    true
}

// ============================================================================
// SECTION: Tests
// ============================================================================
