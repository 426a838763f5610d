// crates/certmagic-store-core/src/lib.rs
// ============================================================================
// Module: CertMagic Store Core Library
// Description: Public API surface for the certificate storage contract.
// Purpose: Expose the storage traits, error taxonomy, and call contexts.
// Dependencies: crate::{model, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The core crate defines the key-addressed storage contract that a
//! certificate-management client depends on: store, load, delete, exists,
//! list, stat, and the advisory lock pair. Backends implement
//! [`Storage`] and [`Locker`]; callers bound every operation with an
//! [`OpContext`] carrying a deadline and an optional cancellation token.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod model;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use model::*;

pub use interfaces::Locker;
pub use interfaces::Storage;
pub use interfaces::StorageError;
pub use runtime::InMemoryStorage;
