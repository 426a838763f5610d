// crates/certmagic-store-core/src/model/mod.rs
// ============================================================================
// Module: CertMagic Store Model Types
// Description: Value types shared by every storage backend.
// Purpose: Group call contexts and key metadata under one namespace.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Plain data types used across the storage contract.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod key_info;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::CancelToken;
pub use context::OpContext;
pub use key_info::KeyInfo;
