// crates/certmagic-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Certificate Store
// Description: Durable Storage and Locker backend using SQLite.
// Purpose: Share certificates and leases between processes on one host.
// Dependencies: certmagic-store-core, rusqlite, md-5, hex, tracing
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`SqliteStorage`] implementing the
//! [`certmagic_store_core::Storage`] and [`certmagic_store_core::Locker`]
//! contracts. Records live in `certmagic_data`, leases in `certmagic_locks`;
//! both are keyed by a salted MD5 digest of the logical key so databases
//! written by other clients of the same schema remain compatible.
//!
//! Every call is bounded by the caller's [`certmagic_store_core::OpContext`]
//! and the configured query timeout, whichever ends first.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod hashing;
pub mod schema;
pub mod store;

mod lock;
mod pool;
mod records;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::DEFAULT_LOCK_TIMEOUT_MS;
pub use config::DEFAULT_POOL_SIZE;
pub use config::DEFAULT_QUERY_TIMEOUT_MS;
pub use config::MEMORY_DSN;
pub use config::SqliteStorageConfig;
pub use config::SqliteStoreMode;
pub use config::SqliteSyncMode;
pub use error::SqliteStoreError;
pub use hashing::KEY_HASH_SALT;
pub use hashing::KeyHash;
pub use store::SqliteStorage;
