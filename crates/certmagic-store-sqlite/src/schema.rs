// crates/certmagic-store-sqlite/src/schema.rs
// ============================================================================
// Module: SQLite Schema
// Description: Idempotent bootstrap of the data and lock tables.
// Purpose: Guarantee the schema exists before the store is handed out.
// Dependencies: rusqlite, tracing
// ============================================================================

//! ## Overview
//! The schema is shared with other clients of the same database, so table
//! names, column names and column types are fixed. Bootstrap runs inside a
//! single transaction: either both tables and the trigger exist afterwards
//! or nothing was created.

use tracing::info;

use crate::error::SqliteStoreError;
use crate::pool::PooledConnection;

/// Data table name.
pub const DATA_TABLE: &str = "certmagic_data";
/// Lock table name.
pub const LOCKS_TABLE: &str = "certmagic_locks";
/// Trigger refreshing `modified` on value updates.
pub const MODIFIED_TRIGGER: &str = "Trg_LastUpdated";

/// Data table DDL.
const CREATE_DATA_TABLE: &str = "CREATE TABLE IF NOT EXISTS certmagic_data (
    key_hash CHAR(40) NOT NULL,
    key TEXT NOT NULL,
    value BLOB,
    modified TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (key_hash)
)";

/// Lock table DDL.
const CREATE_LOCKS_TABLE: &str = "CREATE TABLE IF NOT EXISTS certmagic_locks (
    key_hash CHAR(40) NOT NULL,
    key TEXT NOT NULL,
    expires TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (key_hash)
)";

/// Trigger DDL.
///
/// The new stamp is at least one millisecond past the old one, so updates
/// landing within the same clock tick still order.
const CREATE_MODIFIED_TRIGGER: &str = "CREATE TRIGGER IF NOT EXISTS Trg_LastUpdated
    AFTER UPDATE OF value ON certmagic_data
    FOR EACH ROW
    BEGIN
        UPDATE certmagic_data SET modified = strftime('%Y-%m-%d %H:%M:%f',
            max(julianday('now'), coalesce(julianday(OLD.modified), 0) + 1.0 / 86400000.0))
        WHERE key_hash = OLD.key_hash;
    END";

/// Creates the tables and trigger if absent.
///
/// The transaction rolls back on drop, so an early return leaves the
/// database untouched.
pub(crate) fn ensure_schema(conn: &mut PooledConnection<'_>) -> Result<(), SqliteStoreError> {
    let budget = conn.budget().clone();
    let tx = conn.transaction().map_err(|err| budget.map_err(&err))?;
    for statement in [CREATE_DATA_TABLE, CREATE_LOCKS_TABLE, CREATE_MODIFIED_TRIGGER] {
        tx.execute_batch(statement).map_err(|err| budget.map_err(&err))?;
    }
    tx.commit().map_err(|err| budget.map_err(&err))?;
    info!(
        data_table = DATA_TABLE,
        locks_table = LOCKS_TABLE,
        trigger = MODIFIED_TRIGGER,
        "sqlite schema ready"
    );
    Ok(())
}
