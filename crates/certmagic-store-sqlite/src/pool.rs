// crates/certmagic-store-sqlite/src/pool.rs
// ============================================================================
// Module: SQLite Connection Pool
// Description: Round-robin connection pool with per-call deadlines.
// Purpose: Bound every database call by a deadline and cancellation token.
// Dependencies: certmagic-store-core, rusqlite
// ============================================================================

//! ## Overview
//! The pool is the only state shared between operations. Checking out a
//! connection arms two limits on it for the duration of the call:
//! - the busy timeout, so waiting on another writer (possibly another
//!   process) never outlives the call budget;
//! - a progress handler that interrupts the running statement once the
//!   deadline passes or the caller cancels.
//!
//! Dropping the [`PooledConnection`] disarms the handler before the
//! connection returns to the pool.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::TryLockError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use certmagic_store_core::CancelToken;
use certmagic_store_core::OpContext;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;

use crate::config::SqliteStorageConfig;
use crate::error::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// VM instructions between progress-handler deadline checks.
const PROGRESS_CHECK_INTERVAL: i32 = 1_000;
/// First wait between checkout attempts when every connection is busy.
const ACQUIRE_BACKOFF_MIN: Duration = Duration::from_millis(1);
/// Longest wait between checkout attempts.
const ACQUIRE_BACKOFF_MAX: Duration = Duration::from_millis(10);

// ============================================================================
// SECTION: Call Budget
// ============================================================================

/// Deadline and cancellation for one checked-out call.
#[derive(Debug, Clone)]
pub struct CallBudget {
    /// Absolute deadline for the call.
    deadline: Instant,
    /// Caller cancellation token.
    cancel: Option<CancelToken>,
}

impl CallBudget {
    /// Builds the budget from the caller context and the store timeout.
    fn new(ctx: &OpContext, query_timeout: Duration) -> Self {
        Self {
            deadline: ctx.bounded_deadline(query_timeout),
            cancel: ctx.cancel_token().cloned(),
        }
    }

    /// Returns true when the caller has cancelled.
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Returns the time left before the deadline.
    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Fails when the call is already cancelled or out of time.
    fn ensure_live(&self, stage: &str) -> Result<(), SqliteStoreError> {
        if self.is_cancelled() {
            return Err(SqliteStoreError::Cancelled(format!("cancelled {stage}")));
        }
        if self.remaining().is_zero() {
            return Err(SqliteStoreError::Timeout(format!("deadline exceeded {stage}")));
        }
        Ok(())
    }

    /// Classifies a `SQLite` error raised under this budget.
    pub fn map_err(&self, err: &rusqlite::Error) -> SqliteStoreError {
        match err.sqlite_error_code() {
            Some(ErrorCode::OperationInterrupted) => {
                if self.is_cancelled() {
                    SqliteStoreError::Cancelled("database call cancelled".to_string())
                } else {
                    SqliteStoreError::Timeout("database call exceeded deadline".to_string())
                }
            }
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                SqliteStoreError::Timeout(format!("database busy: {err}"))
            }
            _ => SqliteStoreError::Db(err.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Pooled Connection
// ============================================================================

/// Connection checked out of the pool with an armed deadline.
pub struct PooledConnection<'a> {
    /// Exclusive access to the pooled connection.
    guard: MutexGuard<'a, Connection>,
    /// Budget armed on the connection.
    budget: CallBudget,
}

impl PooledConnection<'_> {
    /// Returns the budget armed on this connection.
    pub const fn budget(&self) -> &CallBudget {
        &self.budget
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.guard
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.guard
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        let _ = self.guard.progress_handler(0, None::<fn() -> bool>);
    }
}

// ============================================================================
// SECTION: Pool
// ============================================================================

/// Fixed-size pool of `SQLite` connections.
pub struct ConnectionPool {
    /// Pooled connections.
    connections: Vec<Mutex<Connection>>,
    /// Round-robin cursor.
    cursor: AtomicUsize,
    /// Store-level budget applied to every call.
    query_timeout: Duration,
}

impl ConnectionPool {
    /// Opens every pooled connection with the configured pragmas.
    pub fn open(config: &SqliteStorageConfig) -> Result<Self, SqliteStoreError> {
        let size = config.effective_pool_size();
        let mut connections = Vec::with_capacity(size);
        for _ in 0 .. size {
            connections.push(Mutex::new(open_connection(config)?));
        }
        Ok(Self {
            connections,
            cursor: AtomicUsize::new(0),
            query_timeout: config.query_timeout(),
        })
    }

    /// Checks out a connection bounded by `ctx` and the query timeout.
    pub fn checkout(&self, ctx: &OpContext) -> Result<PooledConnection<'_>, SqliteStoreError> {
        let budget = CallBudget::new(ctx, self.query_timeout);
        budget.ensure_live("before database call")?;
        let guard = self.acquire(&budget)?;
        guard.busy_timeout(budget.remaining()).map_err(|err| budget.map_err(&err))?;
        let deadline = budget.deadline;
        let cancel = budget.cancel.clone();
        let _ = guard.progress_handler(
            PROGRESS_CHECK_INTERVAL,
            Some(move || {
                Instant::now() >= deadline || cancel.as_ref().is_some_and(CancelToken::is_cancelled)
            }),
        );
        Ok(PooledConnection {
            guard,
            budget,
        })
    }

    /// Locks an idle connection, polling until the budget runs out.
    fn acquire(&self, budget: &CallBudget) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        let len = self.connections.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        let mut backoff = ACQUIRE_BACKOFF_MIN;
        loop {
            for offset in 0 .. len {
                match self.connections[(start + offset) % len].try_lock() {
                    Ok(guard) => return Ok(guard),
                    Err(TryLockError::WouldBlock) => {}
                    Err(TryLockError::Poisoned(_)) => {
                        return Err(SqliteStoreError::Db(
                            "sqlite connection mutex poisoned".to_string(),
                        ));
                    }
                }
            }
            budget.ensure_live("waiting for a pooled connection")?;
            thread::sleep(backoff.min(budget.remaining()));
            backoff = (backoff * 2).min(ACQUIRE_BACKOFF_MAX);
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStorageConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(config.dsn.trim(), flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStorageConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(config.query_timeout())
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
