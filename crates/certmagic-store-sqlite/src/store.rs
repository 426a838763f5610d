// crates/certmagic-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Storage
// Description: Storage and Locker implementation backed by SQLite.
// Purpose: Durable certificate storage shared by processes on one host.
// Dependencies: certmagic-store-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! [`SqliteStorage`] ties the connection pool, the record table and the
//! lease table together behind the backend-agnostic contract. Construction
//! validates the configuration, opens the pool and bootstraps the schema;
//! the returned handle is cheap to clone and safe to share across threads.
//!
//! Security posture: keys and values are opaque caller data. Keys never
//! reach SQL text; they are always bound parameters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::sync::Arc;

use certmagic_store_core::KeyInfo;
use certmagic_store_core::Locker;
use certmagic_store_core::OpContext;
use certmagic_store_core::Storage;
use certmagic_store_core::StorageError;
use tracing::info;

use crate::config::SqliteStorageConfig;
use crate::error::SqliteStoreError;
use crate::lock::LockManager;
use crate::pool::ConnectionPool;
use crate::records::RecordStore;
use crate::schema::ensure_schema;

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed certificate storage.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Configuration the store was opened with.
    config: Arc<SqliteStorageConfig>,
    /// Record table operations.
    records: RecordStore,
    /// Lease table operations.
    locks: LockManager,
}

impl SqliteStorage {
    /// Opens the database and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Config`] for an invalid configuration and
    /// [`SqliteStoreError::Io`] or [`SqliteStoreError::Db`] when the database
    /// cannot be opened or bootstrapped.
    pub fn new(config: SqliteStorageConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        if let Some(parent) = config.file_path().and_then(std::path::Path::parent)
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        }
        let pool = Arc::new(ConnectionPool::open(&config)?);
        {
            let mut conn = pool.checkout(&OpContext::background())?;
            ensure_schema(&mut conn)?;
        }
        info!(
            pool_size = config.effective_pool_size(),
            journal_mode = config.journal_mode.pragma_value(),
            "sqlite storage opened"
        );
        let lock_timeout = config.lock_timeout();
        Ok(Self {
            config: Arc::new(config),
            records: RecordStore::new(Arc::clone(&pool)),
            locks: LockManager::new(pool, lock_timeout),
        })
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &SqliteStorageConfig {
        &self.config
    }

    /// Returns true when an unexpired lease exists for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the lease table cannot be read.
    pub fn is_locked(&self, ctx: &OpContext, key: &str) -> Result<bool, StorageError> {
        self.locks.is_locked(ctx, key).map_err(StorageError::from)
    }
}

// ============================================================================
// SECTION: Contract
// ============================================================================

impl Locker for SqliteStorage {
    fn lock(&self, ctx: &OpContext, key: &str) -> Result<(), StorageError> {
        self.locks.lock(ctx, key).map_err(StorageError::from)
    }

    fn unlock(&self, ctx: &OpContext, key: &str) -> Result<(), StorageError> {
        self.locks.unlock(ctx, key).map_err(StorageError::from)
    }
}

impl Storage for SqliteStorage {
    fn store(&self, ctx: &OpContext, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.records.store(ctx, key, value).map_err(StorageError::from)
    }

    fn load(&self, ctx: &OpContext, key: &str) -> Result<Vec<u8>, StorageError> {
        self.records.load(ctx, key).map_err(StorageError::from)
    }

    fn delete(&self, ctx: &OpContext, key: &str) -> Result<(), StorageError> {
        self.records.delete(ctx, key).map_err(StorageError::from)
    }

    fn exists(&self, ctx: &OpContext, key: &str) -> bool {
        self.records.exists(ctx, key)
    }

    fn list(
        &self,
        ctx: &OpContext,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<String>, StorageError> {
        self.records.list(ctx, prefix, recursive).map_err(StorageError::from)
    }

    fn stat(&self, ctx: &OpContext, key: &str) -> Result<KeyInfo, StorageError> {
        self.records.stat(ctx, key).map_err(StorageError::from)
    }
}
