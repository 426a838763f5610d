// crates/certmagic-store-core/src/runtime/store.rs
// ============================================================================
// Module: CertMagic In-Memory Store
// Description: Simple in-memory storage for tests and examples.
// Purpose: Provide a deterministic contract implementation without a database.
// Dependencies: crate::interfaces, crate::model, time
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`Storage`] and
//! [`Locker`] with the same observable semantics as the database backend:
//! lazy lease expiry, idempotent delete and unlock, literal prefix listing,
//! and unsupported recursive listing. It is process-local and not intended
//! for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use time::OffsetDateTime;

use crate::interfaces::Locker;
use crate::interfaces::Storage;
use crate::interfaces::StorageError;
use crate::model::KeyInfo;
use crate::model::OpContext;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default lease duration for acquired locks.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Stored value with its modification time.
#[derive(Debug, Clone)]
struct MemoryRecord {
    /// Payload bytes.
    value: Vec<u8>,
    /// Last modification time.
    modified: OffsetDateTime,
}

/// In-memory storage for tests and examples.
#[derive(Debug, Clone)]
pub struct InMemoryStorage {
    /// Records keyed by logical key.
    records: Arc<Mutex<BTreeMap<String, MemoryRecord>>>,
    /// Lease expiry instants keyed by logical key.
    locks: Arc<Mutex<BTreeMap<String, Instant>>>,
    /// Lease duration applied on acquisition.
    lock_timeout: Duration,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    /// Creates an empty store with the default lease duration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates an empty store with an explicit lease duration.
    #[must_use]
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            records: Arc::new(Mutex::new(BTreeMap::new())),
            locks: Arc::new(Mutex::new(BTreeMap::new())),
            lock_timeout,
        }
    }
}

impl Locker for InMemoryStorage {
    fn lock(&self, ctx: &OpContext, key: &str) -> Result<(), StorageError> {
        ctx.check()?;
        let now = Instant::now();
        let mut guard = self
            .locks
            .lock()
            .map_err(|_| StorageError::Database("lock table mutex poisoned".to_string()))?;
        if guard.get(key).is_some_and(|expires| *expires > now) {
            return Err(StorageError::AlreadyLocked(key.to_string()));
        }
        let expires = now.checked_add(self.lock_timeout).unwrap_or(now);
        guard.insert(key.to_string(), expires);
        drop(guard);
        Ok(())
    }

    fn unlock(&self, ctx: &OpContext, key: &str) -> Result<(), StorageError> {
        ctx.check()?;
        self.locks
            .lock()
            .map_err(|_| StorageError::Database("lock table mutex poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}

impl Storage for InMemoryStorage {
    fn store(&self, ctx: &OpContext, key: &str, value: &[u8]) -> Result<(), StorageError> {
        ctx.check()?;
        let mut records = self
            .records
            .lock()
            .map_err(|_| StorageError::Database("record map mutex poisoned".to_string()))?;
        let mut modified = OffsetDateTime::now_utc();
        if let Some(previous) = records.get(key) {
            modified = modified.max(previous.modified + time::Duration::NANOSECOND);
        }
        records.insert(
            key.to_string(),
            MemoryRecord {
                value: value.to_vec(),
                modified,
            },
        );
        Ok(())
    }

    fn load(&self, ctx: &OpContext, key: &str) -> Result<Vec<u8>, StorageError> {
        ctx.check()?;
        let guard = self
            .records
            .lock()
            .map_err(|_| StorageError::Database("record map mutex poisoned".to_string()))?;
        guard
            .get(key)
            .map(|record| record.value.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn delete(&self, ctx: &OpContext, key: &str) -> Result<(), StorageError> {
        ctx.check()?;
        self.records
            .lock()
            .map_err(|_| StorageError::Database("record map mutex poisoned".to_string()))?
            .remove(key);
        Ok(())
    }

    fn exists(&self, ctx: &OpContext, key: &str) -> bool {
        if ctx.check().is_err() {
            return false;
        }
        self.records.lock().is_ok_and(|guard| guard.contains_key(key))
    }

    fn list(
        &self,
        ctx: &OpContext,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<String>, StorageError> {
        if recursive {
            return Err(StorageError::Unsupported("recursive listing not supported".to_string()));
        }
        ctx.check()?;
        let guard = self
            .records
            .lock()
            .map_err(|_| StorageError::Database("record map mutex poisoned".to_string()))?;
        Ok(guard.keys().filter(|key| key.starts_with(prefix)).cloned().collect())
    }

    fn stat(&self, ctx: &OpContext, key: &str) -> Result<KeyInfo, StorageError> {
        ctx.check()?;
        let guard = self
            .records
            .lock()
            .map_err(|_| StorageError::Database("record map mutex poisoned".to_string()))?;
        let record = guard.get(key).ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(KeyInfo {
            key: key.to_string(),
            modified: record.modified,
            size: u64::try_from(record.value.len()).unwrap_or(u64::MAX),
            is_terminal: true,
        })
    }
}
