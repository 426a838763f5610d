// crates/certmagic-store-sqlite/src/records.rs
// ============================================================================
// Module: SQLite Records
// Description: Key/value record operations over `certmagic_data`.
// Purpose: Implement store, load, delete, exists, list and stat.
// Dependencies: certmagic-store-core, rusqlite, time, tracing
// ============================================================================

//! ## Overview
//! Records are addressed by [`KeyHash`]; the plaintext key is kept alongside
//! for listing. Every statement runs in autocommit mode on a pooled
//! connection bounded by the caller's deadline.
//!
//! `modified` is written by the database clock with millisecond precision,
//! bumped past the previous stamp on overwrite, and read back through `julianday()`, so both the space-separated format
//! written here and the `T`-separated format some clients write parse.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use certmagic_store_core::KeyInfo;
use certmagic_store_core::OpContext;
use rusqlite::OptionalExtension;
use rusqlite::params;
use time::OffsetDateTime;
use tracing::debug;
use tracing::warn;

use crate::error::SqliteStoreError;
use crate::hashing::KeyHash;
use crate::pool::ConnectionPool;

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Inserts or replaces a record, stamping `modified`.
///
/// An overwrite stamps at least one millisecond past the previous value.
const UPSERT_RECORD: &str = "INSERT INTO certmagic_data (key_hash, key, value, modified)
    VALUES (?1, ?2, ?3, strftime('%Y-%m-%d %H:%M:%f', 'now'))
    ON CONFLICT(key_hash) DO UPDATE SET
        key = excluded.key,
        value = excluded.value,
        modified = strftime('%Y-%m-%d %H:%M:%f', max(julianday('now'),
            coalesce(julianday(certmagic_data.modified), 0) + 1.0 / 86400000.0))";

/// Loads a record value.
const SELECT_VALUE: &str = "SELECT value FROM certmagic_data WHERE key_hash = ?1";

/// Deletes a record.
const DELETE_RECORD: &str = "DELETE FROM certmagic_data WHERE key_hash = ?1";

/// Checks record presence.
const RECORD_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM certmagic_data WHERE key_hash = ?1)";

/// Lists keys by literal, case-sensitive prefix.
///
/// `LIKE` narrows the scan; the `substr` comparison enforces case.
const LIST_KEYS: &str = "SELECT key FROM certmagic_data
    WHERE key LIKE ?1 ESCAPE '\\' AND substr(key, 1, length(?2)) = ?2
    ORDER BY key";

/// Reads size and modification time (unix ms).
const SELECT_STAT: &str = "SELECT length(CAST(value AS BLOB)),
    CAST(round((julianday(modified) - 2440587.5) * 86400000.0) AS INTEGER)
    FROM certmagic_data WHERE key_hash = ?1";

/// Escape character used in `LIKE` patterns.
const LIKE_ESCAPE: char = '\\';

// ============================================================================
// SECTION: Record Store
// ============================================================================

/// Record operations over the pooled connections.
#[derive(Clone)]
pub struct RecordStore {
    /// Shared connection pool.
    pool: Arc<ConnectionPool>,
}

impl RecordStore {
    /// Creates a record store.
    pub const fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
        }
    }

    /// Writes `value` at `key`, replacing any previous record.
    pub fn store(&self, ctx: &OpContext, key: &str, value: &[u8]) -> Result<(), SqliteStoreError> {
        let key_hash = KeyHash::of(key);
        let conn = self.pool.checkout(ctx)?;
        conn.execute(UPSERT_RECORD, params![key_hash.as_str(), key, value])
            .map_err(|err| conn.budget().map_err(&err))?;
        debug!(key_hash = %key_hash, size = value.len(), "record stored");
        Ok(())
    }

    /// Reads the value at `key`. A stored NULL reads as empty bytes.
    pub fn load(&self, ctx: &OpContext, key: &str) -> Result<Vec<u8>, SqliteStoreError> {
        let key_hash = KeyHash::of(key);
        let conn = self.pool.checkout(ctx)?;
        let value: Option<Option<Vec<u8>>> = conn
            .query_row(SELECT_VALUE, params![key_hash.as_str()], |row| row.get(0))
            .optional()
            .map_err(|err| conn.budget().map_err(&err))?;
        match value {
            Some(bytes) => Ok(bytes.unwrap_or_default()),
            None => Err(SqliteStoreError::NotFound(key.to_string())),
        }
    }

    /// Removes `key`; removing an absent key succeeds.
    pub fn delete(&self, ctx: &OpContext, key: &str) -> Result<(), SqliteStoreError> {
        let key_hash = KeyHash::of(key);
        let conn = self.pool.checkout(ctx)?;
        let removed = conn
            .execute(DELETE_RECORD, params![key_hash.as_str()])
            .map_err(|err| conn.budget().map_err(&err))?;
        debug!(key_hash = %key_hash, removed, "record deleted");
        Ok(())
    }

    /// Returns true when `key` has a record. Errors read as absent.
    pub fn exists(&self, ctx: &OpContext, key: &str) -> bool {
        let key_hash = KeyHash::of(key);
        let conn = match self.pool.checkout(ctx) {
            Ok(conn) => conn,
            Err(err) => {
                warn!(key_hash = %key_hash, error = %err, "exists check failed");
                return false;
            }
        };
        match conn.query_row(RECORD_EXISTS, params![key_hash.as_str()], |row| row.get(0)) {
            Ok(found) => found,
            Err(err) => {
                let err = conn.budget().map_err(&err);
                warn!(key_hash = %key_hash, error = %err, "exists check failed");
                false
            }
        }
    }

    /// Lists keys starting with `prefix`, ascending.
    pub fn list(
        &self,
        ctx: &OpContext,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<String>, SqliteStoreError> {
        if recursive {
            return Err(SqliteStoreError::Unsupported("recursive listing not supported".to_string()));
        }
        let pattern = like_prefix_pattern(prefix);
        let conn = self.pool.checkout(ctx)?;
        let budget = conn.budget();
        let mut stmt = conn.prepare_cached(LIST_KEYS).map_err(|err| budget.map_err(&err))?;
        let rows = stmt
            .query_map(params![pattern, prefix], |row| row.get::<_, String>(0))
            .map_err(|err| budget.map_err(&err))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(|err| budget.map_err(&err))?);
        }
        Ok(keys)
    }

    /// Returns size and modification time for `key`.
    pub fn stat(&self, ctx: &OpContext, key: &str) -> Result<KeyInfo, SqliteStoreError> {
        let key_hash = KeyHash::of(key);
        let conn = self.pool.checkout(ctx)?;
        let row: Option<(Option<i64>, Option<i64>)> = conn
            .query_row(SELECT_STAT, params![key_hash.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()
            .map_err(|err| conn.budget().map_err(&err))?;
        let Some((length, modified_ms)) = row else {
            return Err(SqliteStoreError::NotFound(key.to_string()));
        };
        let size = u64::try_from(length.unwrap_or(0))
            .map_err(|_| SqliteStoreError::Invalid(format!("negative record size for {key}")))?;
        let modified_ms = modified_ms.ok_or_else(|| {
            SqliteStoreError::Invalid(format!("record {key} has no modification time"))
        })?;
        let modified = unix_millis_to_datetime(modified_ms)?;
        Ok(KeyInfo {
            key: key.to_string(),
            modified,
            size,
            is_terminal: true,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a `LIKE` pattern matching `prefix` literally.
pub(crate) fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Converts unix milliseconds into a UTC timestamp.
fn unix_millis_to_datetime(millis: i64) -> Result<OffsetDateTime, SqliteStoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|err| SqliteStoreError::Invalid(format!("modification time out of range: {err}")))
}
