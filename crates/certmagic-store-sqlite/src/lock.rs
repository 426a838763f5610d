// crates/certmagic-store-sqlite/src/lock.rs
// ============================================================================
// Module: SQLite Lease Locks
// Description: Advisory, time-bounded locks stored in `certmagic_locks`.
// Purpose: Serialize work on one logical key across threads and processes.
// Dependencies: certmagic-store-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! A lock is a row whose `expires` lies in the future. Expired rows count as
//! unlocked and are overwritten by the next acquirer; nothing sweeps them.
//!
//! Acquisition is one conditional upsert inside a `BEGIN IMMEDIATE`
//! transaction. The upsert only replaces an existing row when its lease has
//! lapsed, so "check" and "take" are a single statement, and the immediate
//! transaction holds the database write lock from the start so two
//! processes cannot both observe the key as free. All timestamps come from
//! the database clock. Leases written by Go clients in `time.Time` text form
//! are honored until they lapse.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use certmagic_store_core::OpContext;
use rusqlite::Connection;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use tracing::debug;

use crate::error::SqliteStoreError;
use crate::hashing::KeyHash;
use crate::pool::ConnectionPool;

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Expands to the lease expiry of the current row as a Julian day.
///
/// Besides the formats `julianday` reads directly, this accepts the Go
/// `time.Time` text form (`2006-01-02 15:04:05.999 +0000 UTC m=+1.5`) by
/// rewriting its leading date, time and numeric offset to
/// `2006-01-02 15:04:05.999+00:00`. Anything else yields 0 and counts as
/// expired.
macro_rules! lease_expiry {
    () => {
        "coalesce(julianday(expires), julianday(
            substr(expires, 1, 10 + instr(substr(expires, 12), ' '))
            || substr(expires, 12 + instr(substr(expires, 12), ' '), 3) || ':'
            || substr(expires, 15 + instr(substr(expires, 12), ' '), 2)), 0)"
    };
}

/// Takes the lease unless an unexpired one exists.
///
/// Unqualified `expires` in the `WHERE` refers to the existing row.
const ACQUIRE_LEASE: &str = concat!(
    "INSERT INTO certmagic_locks (key_hash, key, expires)
    VALUES (?1, ?2, strftime('%Y-%m-%d %H:%M:%f', 'now', ?3))
    ON CONFLICT(key_hash) DO UPDATE SET key = excluded.key, expires = excluded.expires
    WHERE ",
    lease_expiry!(),
    " <= julianday('now')"
);

/// Reports whether an unexpired lease exists.
const LEASE_HELD: &str = concat!(
    "SELECT EXISTS(SELECT 1 FROM certmagic_locks WHERE key_hash = ?1 AND ",
    lease_expiry!(),
    " > julianday('now'))"
);

/// Drops the lease row.
const RELEASE_LEASE: &str = "DELETE FROM certmagic_locks WHERE key_hash = ?1";

// ============================================================================
// SECTION: Lock Manager
// ============================================================================

/// Lease lock operations over the pooled connections.
#[derive(Clone)]
pub struct LockManager {
    /// Shared connection pool.
    pool: Arc<ConnectionPool>,
    /// Lease duration applied on acquisition.
    lock_timeout: Duration,
}

impl LockManager {
    /// Creates a lock manager.
    pub const fn new(pool: Arc<ConnectionPool>, lock_timeout: Duration) -> Self {
        Self {
            pool,
            lock_timeout,
        }
    }

    /// Acquires the lease for `key`.
    pub fn lock(&self, ctx: &OpContext, key: &str) -> Result<(), SqliteStoreError> {
        let key_hash = KeyHash::of(key);
        let mut conn = self.pool.checkout(ctx)?;
        let budget = conn.budget().clone();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| budget.map_err(&err))?;
        let acquired = try_acquire(&tx, &key_hash, key, self.lock_timeout)
            .map_err(|err| budget.map_err(&err))?;
        if !acquired {
            debug!(key_hash = %key_hash, "lock held by another owner");
            return Err(SqliteStoreError::Locked(key.to_string()));
        }
        tx.commit().map_err(|err| budget.map_err(&err))?;
        debug!(key_hash = %key_hash, lease_ms = self.lock_timeout.as_millis(), "lock acquired");
        Ok(())
    }

    /// Releases the lease for `key`; releasing a free key succeeds.
    pub fn unlock(&self, ctx: &OpContext, key: &str) -> Result<(), SqliteStoreError> {
        let key_hash = KeyHash::of(key);
        let conn = self.pool.checkout(ctx)?;
        conn.execute(RELEASE_LEASE, params![key_hash.as_str()])
            .map_err(|err| conn.budget().map_err(&err))?;
        debug!(key_hash = %key_hash, "lock released");
        Ok(())
    }

    /// Returns true when an unexpired lease exists for `key`.
    pub fn is_locked(&self, ctx: &OpContext, key: &str) -> Result<bool, SqliteStoreError> {
        let key_hash = KeyHash::of(key);
        let conn = self.pool.checkout(ctx)?;
        lease_held(&conn, &key_hash).map_err(|err| conn.budget().map_err(&err))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs the conditional upsert; returns false when the lease is held.
fn try_acquire(
    conn: &Connection,
    key_hash: &KeyHash,
    key: &str,
    lease: Duration,
) -> rusqlite::Result<bool> {
    let modifier = format!("+{:.3} seconds", lease.as_secs_f64());
    let changed = conn.execute(ACQUIRE_LEASE, params![key_hash.as_str(), key, modifier])?;
    Ok(changed > 0)
}

/// Queries for an unexpired lease.
fn lease_held(conn: &Connection, key_hash: &KeyHash) -> rusqlite::Result<bool> {
    conn.query_row(LEASE_HELD, params![key_hash.as_str()], |row| row.get(0))
}
