// crates/certmagic-store-core/src/runtime/mod.rs
// ============================================================================
// Module: CertMagic Store Runtime
// Description: Reference storage implementations.
// Dependencies: crate::interfaces, crate::model
// ============================================================================

//! ## Overview
//! Runtime helpers shipped with the core contract.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::DEFAULT_LOCK_TIMEOUT;
pub use store::InMemoryStorage;
