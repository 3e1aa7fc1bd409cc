// crates/permission-gate-config/src/config.rs
// ============================================================================
// Module: Permission Gate Configuration
// Description: Configuration loading and validation for Permission Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: permission-gate-core, permission-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed. A validated config converts
//! into [`PermissionServiceConfig`], the SQLite store settings, and the static
//! identity directory used by local hosts.
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use permission_gate_core::CacheSettings;
use permission_gate_core::IdentityProfile;
use permission_gate_core::PermissionServiceConfig;
use permission_gate_core::RoleDefault;
use permission_gate_core::RoleDefaults;
use permission_gate_core::StaticIdentityDirectory;
use permission_gate_core::UserId;
use permission_gate_core::runtime::cache::DEFAULT_CACHE_MAX_ENTRIES;
use permission_gate_core::runtime::cache::DEFAULT_CACHE_TTL_MS;
use permission_gate_core::runtime::expander::DEFAULT_MAX_EXPANSION_ROWS;
use permission_gate_core::runtime::service::DEFAULT_AUDIT_PAGE_LIMIT;
use permission_gate_core::runtime::service::MAX_AUDIT_PAGE_LIMIT;
use permission_gate_store_sqlite::SqliteStoreConfig;
use permission_gate_store_sqlite::SqliteStoreMode;
use permission_gate_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "permission-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "PERMISSION_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default `SQLite` busy timeout in milliseconds.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum `SQLite` busy timeout in milliseconds.
const MAX_STORE_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Default number of `SQLite` read connections.
const DEFAULT_STORE_READ_POOL_SIZE: usize = 4;
/// Maximum number of `SQLite` read connections.
const MAX_STORE_READ_POOL_SIZE: usize = 64;
/// Maximum cache time-to-live in milliseconds.
const MAX_CACHE_TTL_MS: i64 = 3_600_000;
/// Maximum cached decisions.
const MAX_CACHE_ENTRIES: usize = 1_000_000;
/// Maximum rows a single intent may expand into.
const MAX_EXPANSION_ROWS: usize = 100_000;
/// Maximum role default entries.
const MAX_ROLE_DEFAULTS: usize = 256;
/// Maximum static identity profiles.
const MAX_IDENTITIES: usize = 100_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Permission Gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionGateConfig {
    /// Rule, restriction, and audit store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Evaluation cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Audit log configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Scope expansion limits.
    #[serde(default)]
    pub expansion: ExpansionConfig,
    /// Structured event output.
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Role default table; empty selects the platform table.
    #[serde(default)]
    pub role_defaults: Vec<RoleDefault>,
    /// Static identity profiles for local hosts.
    #[serde(default)]
    pub identities: Vec<IdentityProfile>,
}

impl PermissionGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit `path`, then `PERMISSION_GATE_CONFIG`, then
    /// `permission-gate.toml` in the working directory.
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
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.cache.validate()?;
        self.audit.validate()?;
        self.expansion.validate()?;
        self.observability.validate()?;
        validate_role_defaults(&self.role_defaults)?;
        validate_identities(&self.identities)?;
        Ok(())
    }

    /// Returns the role default table, falling back to the platform table.
    #[must_use]
    pub fn role_defaults(&self) -> RoleDefaults {
        if self.role_defaults.is_empty() {
            RoleDefaults::platform()
        } else {
            RoleDefaults::new(self.role_defaults.clone())
        }
    }

    /// Converts the validated config into service settings.
    #[must_use]
    pub fn service_config(&self) -> PermissionServiceConfig {
        PermissionServiceConfig {
            role_defaults: self.role_defaults(),
            cache: self.cache.settings(),
            record_denied_evaluations: self.audit.record_denied_evaluations,
            audit_page_limit_default: self.audit.page_limit_default,
            audit_page_limit_max: self.audit.page_limit_max,
            max_expansion_rows: self.expansion.max_rows,
        }
    }

    /// Builds the static identity directory from configured profiles.
    #[must_use]
    pub fn identity_directory(&self) -> StaticIdentityDirectory {
        StaticIdentityDirectory::new(self.identities.iter().cloned())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use the `SQLite` store.
    Sqlite,
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of `SQLite` read connections.
    #[serde(default = "default_store_read_pool_size")]
    pub read_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: default_store_read_pool_size(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self
                    .path
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid("sqlite store requires path".to_string()))?;
                validate_path_string("store.path", &path.to_string_lossy())?;
                if self.busy_timeout_ms > MAX_STORE_BUSY_TIMEOUT_MS {
                    return Err(ConfigError::Invalid(format!(
                        "store.busy_timeout_ms must be at most {MAX_STORE_BUSY_TIMEOUT_MS}"
                    )));
                }
                if self.read_pool_size == 0 || self.read_pool_size > MAX_STORE_READ_POOL_SIZE {
                    return Err(ConfigError::Invalid(format!(
                        "store.read_pool_size must be between 1 and {MAX_STORE_READ_POOL_SIZE}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Returns `SQLite` settings when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
                read_pool_size: self.read_pool_size,
            }),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Evaluation cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Enables the evaluation cache.
    #[serde(default)]
    pub enabled: bool,
    /// Time-to-live for cached decisions (milliseconds).
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: i64,
    /// Maximum cached decisions.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_ms: default_cache_ttl_ms(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheConfig {
    /// Validates cache configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.ttl_ms <= 0 || self.ttl_ms > MAX_CACHE_TTL_MS {
            return Err(ConfigError::Invalid(format!(
                "cache.ttl_ms must be between 1 and {MAX_CACHE_TTL_MS}"
            )));
        }
        if self.max_entries == 0 || self.max_entries > MAX_CACHE_ENTRIES {
            return Err(ConfigError::Invalid(format!(
                "cache.max_entries must be between 1 and {MAX_CACHE_ENTRIES}"
            )));
        }
        Ok(())
    }

    /// Returns cache settings when enabled.
    #[must_use]
    pub const fn settings(&self) -> Option<CacheSettings> {
        if self.enabled {
            Some(CacheSettings {
                ttl_ms: self.ttl_ms,
                max_entries: self.max_entries,
            })
        } else {
            None
        }
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit log configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Append explicit-deny and restriction-block outcomes to the audit log.
    #[serde(default)]
    pub record_denied_evaluations: bool,
    /// Page size used when callers omit one.
    #[serde(default = "default_audit_page_limit")]
    pub page_limit_default: usize,
    /// Largest page size accepted.
    #[serde(default = "default_audit_page_limit_max")]
    pub page_limit_max: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            record_denied_evaluations: false,
            page_limit_default: default_audit_page_limit(),
            page_limit_max: default_audit_page_limit_max(),
        }
    }
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.page_limit_max == 0 || self.page_limit_max > MAX_AUDIT_PAGE_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "audit.page_limit_max must be between 1 and {MAX_AUDIT_PAGE_LIMIT}"
            )));
        }
        if self.page_limit_default == 0 || self.page_limit_default > self.page_limit_max {
            return Err(ConfigError::Invalid(
                "audit.page_limit_default must be between 1 and audit.page_limit_max".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Expansion
// ============================================================================

/// Scope expansion limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpansionConfig {
    /// Largest row count one intent may expand into.
    #[serde(default = "default_max_expansion_rows")]
    pub max_rows: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_expansion_rows(),
        }
    }
}

impl ExpansionConfig {
    /// Validates expansion limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rows == 0 || self.max_rows > MAX_EXPANSION_ROWS {
            return Err(ConfigError::Invalid(format!(
                "expansion.max_rows must be between 1 and {MAX_EXPANSION_ROWS}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Observability
// ============================================================================

/// Structured event sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObservabilitySink {
    /// Drop events.
    #[default]
    None,
    /// JSON lines on stderr.
    Stderr,
    /// JSON lines appended to a file.
    File,
}

/// Structured event output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Selected sink.
    #[serde(default)]
    pub sink: ObservabilitySink,
    /// Output path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl ObservabilityConfig {
    /// Validates observability configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (ObservabilitySink::File, Some(path)) => {
                validate_path_string("observability.path", &path.to_string_lossy())
            }
            (ObservabilitySink::File, None) => {
                Err(ConfigError::Invalid("file observability sink requires path".to_string()))
            }
            (_, Some(_)) => Err(ConfigError::Invalid(
                "observability.path is only valid for the file sink".to_string(),
            )),
            (_, None) => Ok(()),
        }
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
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates role default entries.
fn validate_role_defaults(entries: &[RoleDefault]) -> Result<(), ConfigError> {
    if entries.len() > MAX_ROLE_DEFAULTS {
        return Err(ConfigError::Invalid(format!(
            "role_defaults exceeds {MAX_ROLE_DEFAULTS} entries"
        )));
    }
    for (index, entry) in entries.iter().enumerate() {
        if entry.resources.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "role_defaults[{index}].resources must be non-empty"
            )));
        }
        if entry.actions.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "role_defaults[{index}].actions must be non-empty"
            )));
        }
    }
    Ok(())
}

/// Validates static identity profiles.
fn validate_identities(profiles: &[IdentityProfile]) -> Result<(), ConfigError> {
    if profiles.len() > MAX_IDENTITIES {
        return Err(ConfigError::Invalid(format!("identities exceeds {MAX_IDENTITIES} entries")));
    }
    let mut seen: BTreeSet<UserId> = BTreeSet::new();
    for profile in profiles {
        if !seen.insert(profile.user_id) {
            return Err(ConfigError::Invalid(format!(
                "identities lists user {} more than once",
                profile.user_id
            )));
        }
    }
    Ok(())
}

/// Returns the default `SQLite` busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

/// Returns the default `SQLite` read pool size.
const fn default_store_read_pool_size() -> usize {
    DEFAULT_STORE_READ_POOL_SIZE
}

/// Returns the default cache time-to-live.
const fn default_cache_ttl_ms() -> i64 {
    DEFAULT_CACHE_TTL_MS
}

/// Returns the default cache capacity.
const fn default_cache_max_entries() -> usize {
    DEFAULT_CACHE_MAX_ENTRIES
}

/// Returns the default audit page size.
const fn default_audit_page_limit() -> usize {
    DEFAULT_AUDIT_PAGE_LIMIT
}

/// Returns the default maximum audit page size.
const fn default_audit_page_limit_max() -> usize {
    MAX_AUDIT_PAGE_LIMIT
}

/// Returns the default expansion row limit.
const fn default_max_expansion_rows() -> usize {
    DEFAULT_MAX_EXPANSION_ROWS
}
