// crates/certmagic-store-sqlite/src/config.rs
// ============================================================================
// Module: SQLite Store Config
// Description: Immutable configuration for the SQLite certificate store.
// Purpose: Separate configuration values from the live store handle.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`SqliteStorageConfig`] is a plain value: building a store from it is a
//! pure function of the config. Timeouts are milliseconds internally; the
//! file-level configuration surface in `certmagic-store-config` speaks
//! seconds and converts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default per-call query timeout (ms).
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 3_000;
/// Default lease duration for acquired locks (ms).
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 60_000;
/// Default number of pooled connections.
pub const DEFAULT_POOL_SIZE: usize = 4;
/// DSN selecting a private in-memory database.
pub const MEMORY_DSN: &str = ":memory:";
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum pool size accepted by validation.
const MAX_POOL_SIZE: usize = 64;

// ============================================================================
// SECTION: Modes
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
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
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
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

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` certificate store.
///
/// # Invariants
/// - `dsn` is a file path, a `file:` URI, or [`MEMORY_DSN`].
/// - `query_timeout_ms` and `lock_timeout_ms` are non-zero milliseconds.
/// - `pool_size` is non-zero; an in-memory DSN always uses one connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStorageConfig {
    /// Connection string (database path or URI).
    pub dsn: String,
    /// Deadline applied to every database call (ms).
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Lease duration for acquired locks (ms).
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of pooled connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

/// Returns the default query timeout.
const fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

/// Returns the default lock timeout.
const fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

/// Returns the default pool size.
const fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

impl SqliteStorageConfig {
    /// Returns a config for `dsn` with default timeouts and modes.
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Returns the per-call query timeout.
    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Returns the lease duration.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Returns true when the DSN selects an in-memory database.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.dsn.trim() == MEMORY_DSN
    }

    /// Returns the database file path for plain path DSNs.
    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        let dsn = self.dsn.trim();
        if dsn.is_empty() || self.is_memory() || dsn.starts_with("file:") {
            return None;
        }
        Some(Path::new(dsn))
    }

    /// Returns the number of connections the pool should open.
    #[must_use]
    pub fn effective_pool_size(&self) -> usize {
        if self.is_memory() { 1 } else { self.pool_size }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Config`] for a missing DSN or zero limits,
    /// and [`SqliteStoreError::Invalid`] for unsafe store paths.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        if self.dsn.trim().is_empty() {
            return Err(SqliteStoreError::Config("connection string must be set".to_string()));
        }
        if self.query_timeout_ms == 0 {
            return Err(SqliteStoreError::Config(
                "query_timeout must be greater than zero".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(SqliteStoreError::Config(
                "lock_timeout must be greater than zero".to_string(),
            ));
        }
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(SqliteStoreError::Config(format!(
                "pool_size must be between 1 and {MAX_POOL_SIZE}"
            )));
        }
        if let Some(path) = self.file_path() {
            validate_store_path(path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
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
