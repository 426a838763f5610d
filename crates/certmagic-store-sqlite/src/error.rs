// crates/certmagic-store-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Store Errors
// Description: Backend error type and mapping into the storage contract.
// Dependencies: certmagic-store-core, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteStoreError`] is the backend-level error. It converts losslessly
//! into the contract-level [`StorageError`] so callers branch on the shared
//! taxonomy regardless of backend.

use certmagic_store_core::StorageError;
use thiserror::Error;

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Invalid or missing store configuration.
    #[error("sqlite store config error: {0}")]
    Config(String),
    /// Key has no stored record.
    #[error("sqlite store key not found: {0}")]
    NotFound(String),
    /// Key is held by an unexpired lease.
    #[error("sqlite store key is locked: {0}")]
    Locked(String),
    /// Operation not supported by the store.
    #[error("sqlite store unsupported: {0}")]
    Unsupported(String),
    /// Database call exceeded its deadline.
    #[error("sqlite store timeout: {0}")]
    Timeout(String),
    /// Database call was cancelled by the caller.
    #[error("sqlite store cancelled: {0}")]
    Cancelled(String),
}

impl From<SqliteStoreError> for StorageError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::NotFound(key) => Self::NotFound(key),
            SqliteStoreError::Locked(key) => Self::AlreadyLocked(key),
            SqliteStoreError::Unsupported(message) => Self::Unsupported(message),
            SqliteStoreError::Timeout(message) => Self::Timeout(message),
            SqliteStoreError::Cancelled(message) => Self::Cancelled(message),
            SqliteStoreError::Config(message) => Self::Config(message),
            SqliteStoreError::Io(message)
            | SqliteStoreError::Db(message)
            | SqliteStoreError::Invalid(message) => Self::Database(message),
        }
    }
}
