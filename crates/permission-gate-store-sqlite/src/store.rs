// crates/permission-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Permission Store
// Description: Durable PermissionStore backed by SQLite.
// Purpose: Persist rules, restrictions, and the audit chain transactionally.
// Dependencies: permission-gate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`PermissionStore`] using `SQLite`. Each
//! row keeps its full JSON form next to the columns used for lookups; reads
//! narrow in SQL and then apply the core query predicates so both backends
//! agree on semantics. The audit table is append-only: triggers reject
//! updates and deletes, and every row carries its chain hash.
//! Writes go through one connection held from `BEGIN IMMEDIATE` to commit;
//! lookups use a round-robin pool of read connections so evaluations are
//! not blocked by an open write under WAL.
//! Security posture: database contents are untrusted; decoded rows whose
//! identifiers disagree with their columns fail closed as corruption.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use permission_gate_core::AUDIT_CHAIN_GENESIS;
use permission_gate_core::AuditEntryId;
use permission_gate_core::AuditLogEntry;
use permission_gate_core::AuditQuery;
use permission_gate_core::AuditRecord;
use permission_gate_core::GranteeFilter;
use permission_gate_core::NewPermissionRule;
use permission_gate_core::NewRestriction;
use permission_gate_core::PermissionRule;
use permission_gate_core::PermissionStore;
use permission_gate_core::ResourceKind;
use permission_gate_core::Restriction;
use permission_gate_core::RestrictionId;
use permission_gate_core::RestrictionQuery;
use permission_gate_core::RuleId;
use permission_gate_core::RuleQuery;
use permission_gate_core::StoreError;
use permission_gate_core::StoreTransaction;
use permission_gate_core::Timestamp;
use permission_gate_core::UserId;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default number of read connections.
const DEFAULT_READ_POOL_SIZE: usize = 4;
/// Maximum number of read connections.
const MAX_READ_POOL_SIZE: usize = 64;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` permission store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `read_pool_size` is between 1 and 64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of read-only connections used for lookups.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl SqliteStoreConfig {
    /// Builds a config for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: DEFAULT_READ_POOL_SIZE,
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

/// Validates the read pool size.
fn validate_read_pool_size(config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    if config.read_pool_size == 0 || config.read_pool_size > MAX_READ_POOL_SIZE {
        return Err(SqliteStoreError::Invalid(format!(
            "read_pool_size must be between 1 and {MAX_READ_POOL_SIZE}"
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw row payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or identifier mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Referenced row does not exist.
    #[error("sqlite store record not found: {0}")]
    NotFound(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
        }
    }
}

/// Maps a `rusqlite` error into a store error.
#[allow(clippy::needless_pass_by_value, reason = "Used as a map_err adapter.")]
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed permission store.
///
/// # Invariants
/// - A transaction holds the writer mutex from `BEGIN IMMEDIATE` until
///   commit or drop.
/// - Lookups never take the writer mutex.
#[derive(Clone)]
pub struct SqlitePermissionStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared writer connection guarded by a mutex.
    write_connection: Arc<Mutex<Connection>>,
    /// Read connection pool used for read path isolation under WAL.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
}

impl SqlitePermissionStore {
    /// Opens an `SQLite`-backed permission store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        validate_read_pool_size(&config)?;
        ensure_parent_dir(&config.path)?;
        let mut write_connection = open_connection(&config)?;
        initialize_schema(&mut write_connection)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            let mut read_connection = open_connection(&config)?;
            initialize_schema(&mut read_connection)?;
            read_connections.push(Mutex::new(read_connection));
        }
        Ok(Self {
            config,
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Locks the writer connection.
    fn lock_writer(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.write_connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite writer mutex poisoned".to_string()))
    }

    /// Locks the next read connection using round-robin selection.
    fn lock_reader(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        let cursor = self.read_cursor.fetch_add(1, Ordering::Relaxed);
        cursor
            .checked_rem(self.read_connections.len())
            .and_then(|index| self.read_connections.get(index))
            .ok_or_else(|| SqliteStoreError::Invalid("read pool is empty".to_string()))?
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite reader mutex poisoned".to_string()))
    }
}

impl PermissionStore for SqlitePermissionStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        let connection = self.lock_writer()?;
        connection.execute_batch("BEGIN IMMEDIATE").map_err(db_error)?;
        Ok(Box::new(SqliteTransaction {
            connection,
            finished: false,
        }))
    }

    fn find_rules(&self, query: &RuleQuery) -> Result<Vec<PermissionRule>, StoreError> {
        let connection = self.lock_reader()?;
        let grantee = match query.grantee {
            None => None,
            Some(GranteeFilter::ActorOrEveryone(actor)) => Some(actor),
            Some(GranteeFilter::Exactly(grantee)) => grantee.user(),
        };
        let mut statement = connection
            .prepare(
                "SELECT id, rule_json FROM user_permissions
                 WHERE (?1 IS NULL OR grantor = ?1)
                   AND (?2 IS NULL OR resource = ?2)
                   AND (?3 = 0 OR revoked_at IS NULL)
                   AND (?4 IS NULL OR grantee IS NULL OR grantee = ?4)
                 ORDER BY id",
            )
            .map_err(db_error)?;
        let rows = statement
            .query_map(
                params![
                    query.grantor.map(user_column).transpose()?,
                    query.resource.map(ResourceKind::as_str),
                    i64::from(query.active_at.is_some()),
                    grantee.map(user_column).transpose()?,
                ],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(db_error)?;
        let mut rules = Vec::new();
        for row in rows {
            let (id, payload) = row.map_err(db_error)?;
            let rule: PermissionRule = decode_row(&payload, "user_permissions")?;
            ensure_row_id(rule.id.get(), id, "user_permissions")?;
            if query.matches(&rule) {
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    fn find_restrictions(&self, query: &RestrictionQuery) -> Result<Vec<Restriction>, StoreError> {
        let connection = self.lock_reader()?;
        let mut statement = connection
            .prepare(
                "SELECT id, restriction_json FROM trading_restrictions
                 WHERE (?1 IS NULL OR restricted_user = ?1)
                   AND (?2 IS NULL OR imposed_by = ?2)
                   AND (?3 = 0 OR revoked_at IS NULL)
                 ORDER BY id",
            )
            .map_err(db_error)?;
        let rows = statement
            .query_map(
                params![
                    query.restricted_user.map(user_column).transpose()?,
                    query.imposed_by.map(user_column).transpose()?,
                    i64::from(query.active_at.is_some()),
                ],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(db_error)?;
        let mut restrictions = Vec::new();
        for row in rows {
            let (id, payload) = row.map_err(db_error)?;
            let restriction: Restriction = decode_row(&payload, "trading_restrictions")?;
            ensure_row_id(restriction.id.get(), id, "trading_restrictions")?;
            if query.matches(&restriction) {
                restrictions.push(restriction);
            }
        }
        Ok(restrictions)
    }

    fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
        let connection = self.lock_reader()?;
        let limit = i64::try_from(query.limit)
            .map_err(|_| SqliteStoreError::Invalid("audit limit too large".to_string()))?;
        let offset = i64::try_from(query.offset)
            .map_err(|_| SqliteStoreError::Invalid("audit offset too large".to_string()))?;
        let mut statement = connection
            .prepare(
                "SELECT id, entry_json FROM permission_audit_log
                 WHERE (?1 IS NULL OR actor = ?1 OR target = ?1)
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT ?2 OFFSET ?3",
            )
            .map_err(db_error)?;
        let rows = statement
            .query_map(
                params![query.subject.map(user_column).transpose()?, limit, offset],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(db_error)?;
        collect_audit_rows(rows)
    }

    fn audit_chain(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        let connection = self.lock_reader()?;
        let mut statement = connection
            .prepare("SELECT id, entry_json FROM permission_audit_log ORDER BY id")
            .map_err(db_error)?;
        let rows = statement
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_error)?;
        collect_audit_rows(rows)
    }
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Open `BEGIN IMMEDIATE` block; rolled back on drop unless committed.
struct SqliteTransaction<'a> {
    /// Held writer connection; serializes writers until done.
    connection: MutexGuard<'a, Connection>,
    /// Set once `COMMIT` succeeded.
    finished: bool,
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.connection.execute_batch("ROLLBACK");
        }
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn insert_rule(
        &mut self,
        rule: &NewPermissionRule,
        granted_at: Timestamp,
    ) -> Result<PermissionRule, StoreError> {
        let raw = next_id(&self.connection, "user_permissions")?;
        let id = RuleId::from_raw(raw).ok_or_else(|| {
            SqliteStoreError::Corrupt("rule id allocation produced zero".to_string())
        })?;
        let stored = PermissionRule::from_new(id, rule, granted_at);
        self.connection
            .execute(
                "INSERT INTO user_permissions (
                    id, grantor, grantee, permission_kind, resource, level,
                    granted_at, expires_at, revoked_at, rule_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9)",
                params![
                    id_column(raw)?,
                    user_column(stored.grantor)?,
                    stored.grantee.user().map(user_column).transpose()?,
                    stored.permission_kind.as_str(),
                    stored.resource.as_str(),
                    stored.level.as_str(),
                    stored.granted_at.as_unix_millis(),
                    stored.expires_at.map(Timestamp::as_unix_millis),
                    encode_row(&stored)?,
                ],
            )
            .map_err(db_error)?;
        Ok(stored)
    }

    fn insert_restriction(
        &mut self,
        restriction: &NewRestriction,
        applied_at: Timestamp,
    ) -> Result<Restriction, StoreError> {
        let raw = next_id(&self.connection, "trading_restrictions")?;
        let id = RestrictionId::from_raw(raw).ok_or_else(|| {
            SqliteStoreError::Corrupt("restriction id allocation produced zero".to_string())
        })?;
        let stored = Restriction::from_new(id, restriction, applied_at);
        self.connection
            .execute(
                "INSERT INTO trading_restrictions (
                    id, restricted_user, imposed_by, applied_at, expires_at, revoked_at,
                    restriction_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
                params![
                    id_column(raw)?,
                    user_column(stored.restricted_user)?,
                    user_column(stored.imposed_by)?,
                    stored.applied_at.as_unix_millis(),
                    stored.expires_at.map(Timestamp::as_unix_millis),
                    encode_row(&stored)?,
                ],
            )
            .map_err(db_error)?;
        Ok(stored)
    }

    fn rule(&mut self, id: RuleId) -> Result<Option<PermissionRule>, StoreError> {
        Ok(load_row(&self.connection, "user_permissions", "rule_json", id.get())?)
    }

    fn restriction(&mut self, id: RestrictionId) -> Result<Option<Restriction>, StoreError> {
        Ok(load_row(&self.connection, "trading_restrictions", "restriction_json", id.get())?)
    }

    fn revoke_rule(
        &mut self,
        id: RuleId,
        revoked_by: UserId,
        revoked_at: Timestamp,
    ) -> Result<PermissionRule, StoreError> {
        let mut rule: PermissionRule =
            load_row(&self.connection, "user_permissions", "rule_json", id.get())?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("rule {id}")))?;
        rule.revoked_at = Some(revoked_at);
        rule.revoked_by = Some(revoked_by);
        self.connection
            .execute(
                "UPDATE user_permissions SET revoked_at = ?1, rule_json = ?2 WHERE id = ?3",
                params![revoked_at.as_unix_millis(), encode_row(&rule)?, id_column(id.get())?],
            )
            .map_err(db_error)?;
        Ok(rule)
    }

    fn revoke_restriction(
        &mut self,
        id: RestrictionId,
        revoked_by: UserId,
        revoked_at: Timestamp,
    ) -> Result<Restriction, StoreError> {
        let mut restriction: Restriction =
            load_row(&self.connection, "trading_restrictions", "restriction_json", id.get())?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("restriction {id}")))?;
        restriction.revoked_at = Some(revoked_at);
        restriction.revoked_by = Some(revoked_by);
        self.connection
            .execute(
                "UPDATE trading_restrictions SET revoked_at = ?1, restriction_json = ?2 WHERE id \
                 = ?3",
                params![
                    revoked_at.as_unix_millis(),
                    encode_row(&restriction)?,
                    id_column(id.get())?
                ],
            )
            .map_err(db_error)?;
        Ok(restriction)
    }

    fn append_audit(&mut self, record: AuditRecord) -> Result<AuditLogEntry, StoreError> {
        let raw = next_id(&self.connection, "permission_audit_log")?;
        let id = AuditEntryId::from_raw(raw).ok_or_else(|| {
            SqliteStoreError::Corrupt("audit id allocation produced zero".to_string())
        })?;
        let prev_hash: Option<String> = self
            .connection
            .query_row(
                "SELECT hash FROM permission_audit_log ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        let prev_hash = prev_hash.unwrap_or_else(|| AUDIT_CHAIN_GENESIS.to_string());
        let entry = AuditLogEntry::seal(id, record, prev_hash)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        self.connection
            .execute(
                "INSERT INTO permission_audit_log (
                    id, actor, target, action_type, table_name, record_id, recorded_at,
                    entry_json, prev_hash, hash
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id_column(raw)?,
                    user_column(entry.record.actor)?,
                    entry.record.target.user().map(user_column).transpose()?,
                    entry.record.action_type.as_str(),
                    entry.record.table.as_str(),
                    entry.record.record_id.map(id_column).transpose()?,
                    entry.record.recorded_at.as_unix_millis(),
                    encode_row(&entry)?,
                    entry.prev_hash,
                    entry.hash,
                ],
            )
            .map_err(db_error)?;
        Ok(entry)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.connection.execute_batch("COMMIT").map_err(db_error)?;
        self.finished = true;
        Ok(())
    }
}

// ============================================================================
// SECTION: Row Helpers
// ============================================================================

/// Converts an identifier into its column value.
fn id_column(raw: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(raw).map_err(|_| SqliteStoreError::Invalid(format!("identifier {raw} too large")))
}

/// Converts a user identifier into its column value.
fn user_column(user: UserId) -> Result<i64, SqliteStoreError> {
    id_column(user.get())
}

/// Returns the next identifier for `table` inside the open transaction.
fn next_id(connection: &Connection, table: &'static str) -> Result<u64, SqliteStoreError> {
    let last: i64 = connection
        .query_row(&format!("SELECT COALESCE(MAX(id), 0) FROM {table}"), [], |row| row.get(0))
        .map_err(db_error)?;
    let last = u64::try_from(last)
        .map_err(|_| SqliteStoreError::Corrupt(format!("{table} holds a negative id")))?;
    last.checked_add(1)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("{table} id space exhausted")))
}

/// Serializes a row payload.
fn encode_row<T: Serialize>(value: &T) -> Result<String, SqliteStoreError> {
    serde_json::to_string(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Deserializes a row payload, treating failures as corruption.
fn decode_row<T: DeserializeOwned>(payload: &str, table: &str) -> Result<T, SqliteStoreError> {
    serde_json::from_str(payload)
        .map_err(|err| SqliteStoreError::Corrupt(format!("{table} row payload invalid: {err}")))
}

/// Fails closed when a payload identifier disagrees with its row.
fn ensure_row_id(payload_id: u64, column_id: i64, table: &str) -> Result<(), SqliteStoreError> {
    if i64::try_from(payload_id).ok() == Some(column_id) {
        return Ok(());
    }
    Err(SqliteStoreError::Corrupt(format!(
        "{table} row {column_id} carries payload id {payload_id}"
    )))
}

/// Loads one JSON row by identifier.
fn load_row<T: DeserializeOwned>(
    connection: &Connection,
    table: &'static str,
    column: &'static str,
    id: u64,
) -> Result<Option<T>, SqliteStoreError> {
    let sql = format!("SELECT {column} FROM {table} WHERE id = ?1");
    let payload: Option<String> = connection
        .query_row(&sql, params![id_column(id)?], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    payload.map(|payload| decode_row(&payload, table)).transpose()
}

/// Decodes audit rows, checking each payload against its row id.
fn collect_audit_rows(
    rows: impl Iterator<Item = rusqlite::Result<(i64, String)>>,
) -> Result<Vec<AuditLogEntry>, StoreError> {
    let mut entries = Vec::new();
    for row in rows {
        let (id, payload) = row.map_err(db_error)?;
        let entry: AuditLogEntry = decode_row(&payload, "permission_audit_log")?;
        ensure_row_id(entry.id.get(), id, "permission_audit_log")?;
        entries.push(entry);
    }
    Ok(entries)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(db_error)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS user_permissions (
                    id INTEGER PRIMARY KEY,
                    grantor INTEGER NOT NULL,
                    grantee INTEGER,
                    permission_kind TEXT NOT NULL,
                    resource TEXT NOT NULL,
                    level TEXT NOT NULL,
                    granted_at INTEGER NOT NULL,
                    expires_at INTEGER,
                    revoked_at INTEGER,
                    rule_json TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_user_permissions_grantee
                    ON user_permissions (grantee, resource);
                CREATE INDEX IF NOT EXISTS idx_user_permissions_grantor
                    ON user_permissions (grantor, resource);
                CREATE TABLE IF NOT EXISTS trading_restrictions (
                    id INTEGER PRIMARY KEY,
                    restricted_user INTEGER NOT NULL,
                    imposed_by INTEGER NOT NULL,
                    applied_at INTEGER NOT NULL,
                    expires_at INTEGER,
                    revoked_at INTEGER,
                    restriction_json TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_trading_restrictions_user
                    ON trading_restrictions (restricted_user);
                CREATE TABLE IF NOT EXISTS permission_audit_log (
                    id INTEGER PRIMARY KEY,
                    actor INTEGER NOT NULL,
                    target INTEGER,
                    action_type TEXT NOT NULL,
                    table_name TEXT NOT NULL,
                    record_id INTEGER,
                    recorded_at INTEGER NOT NULL,
                    entry_json TEXT NOT NULL,
                    prev_hash TEXT NOT NULL,
                    hash TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_permission_audit_log_actor
                    ON permission_audit_log (actor, recorded_at);
                CREATE INDEX IF NOT EXISTS idx_permission_audit_log_target
                    ON permission_audit_log (target, recorded_at);
                CREATE TRIGGER IF NOT EXISTS permission_audit_log_no_update
                    BEFORE UPDATE ON permission_audit_log
                    BEGIN SELECT RAISE(ABORT, 'permission_audit_log is append-only'); END;
                CREATE TRIGGER IF NOT EXISTS permission_audit_log_no_delete
                    BEFORE DELETE ON permission_audit_log
                    BEGIN SELECT RAISE(ABORT, 'permission_audit_log is append-only'); END;",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}
