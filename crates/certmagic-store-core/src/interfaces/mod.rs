// crates/certmagic-store-core/src/interfaces/mod.rs
// ============================================================================
// Module: CertMagic Store Interfaces
// Description: Backend-agnostic storage and locking contracts.
// Purpose: Define the operation surface certificate managers depend on.
// Dependencies: crate::model, thiserror
// ============================================================================

//! ## Overview
//! [`Storage`] is the full key-addressed contract: values are opaque bytes,
//! keys are arbitrary strings, and every key is terminal. [`Locker`] is the
//! advisory lease pair that callers use to serialize work on one logical key
//! across threads and processes. Backends never retry internally; retry and
//! back-off policy belongs to the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::model::KeyInfo;
use crate::model::OpContext;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Storage contract errors.
///
/// `NotFound` and `AlreadyLocked` are expected control-flow signals; the
/// remaining variants report failures of the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Key is absent.
    #[error("key not found: {0}")]
    NotFound(String),
    /// Key is held by an unexpired lease.
    #[error("key is locked: {0}")]
    AlreadyLocked(String),
    /// Operation is not supported by this backend.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// Operation exceeded its deadline.
    #[error("storage timeout: {0}")]
    Timeout(String),
    /// Operation was cancelled by the caller.
    #[error("storage operation cancelled: {0}")]
    Cancelled(String),
    /// Backing database reported an error.
    #[error("storage database error: {0}")]
    Database(String),
    /// Store could not be constructed from its configuration.
    #[error("storage configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Returns true for [`StorageError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true for [`StorageError::AlreadyLocked`].
    #[must_use]
    pub const fn is_already_locked(&self) -> bool {
        matches!(self, Self::AlreadyLocked(_))
    }
}

// ============================================================================
// SECTION: Locker
// ============================================================================

/// Advisory, lease-based key locking.
///
/// Locks are not enforced on reads or writes; callers cooperate by taking
/// the lock before mutating state tied to a key.
pub trait Locker {
    /// Acquires the lease for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyLocked`] when another holder's lease has
    /// not expired, or a backend error.
    fn lock(&self, ctx: &OpContext, key: &str) -> Result<(), StorageError>;

    /// Releases the lease for `key`. Releasing an unlocked key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn unlock(&self, ctx: &OpContext, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// Key-addressed byte storage.
pub trait Storage: Locker {
    /// Stores `value` at `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the write fails.
    fn store(&self, ctx: &OpContext, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Loads the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the key is absent.
    fn load(&self, ctx: &OpContext, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Deletes `key`. Deleting an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] only when the key may still exist.
    fn delete(&self, ctx: &OpContext, key: &str) -> Result<(), StorageError>;

    /// Returns true when `key` exists and no error occurred checking it.
    fn exists(&self, ctx: &OpContext, key: &str) -> bool;

    /// Lists keys that start with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] when `recursive` is requested
    /// from a backend without hierarchical keys.
    fn list(&self, ctx: &OpContext, prefix: &str, recursive: bool)
    -> Result<Vec<String>, StorageError>;

    /// Returns metadata for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the key is absent.
    fn stat(&self, ctx: &OpContext, key: &str) -> Result<KeyInfo, StorageError>;
}
