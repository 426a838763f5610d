// crates/certmagic-store-config/src/lib.rs
// ============================================================================
// Module: CertMagic Store Config Library
// Description: Configuration model, directive parsing, and validation.
// Purpose: Single source of truth for store configuration semantics.
// Dependencies: certmagic-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `certmagic-store-config` turns operator input (a TOML file or a directive
//! block) into a validated [`certmagic_store_sqlite::SqliteStorageConfig`].
//! Loading is fail-closed: malformed files and out-of-range values are
//! errors, while the directive parser stays lenient for compatibility with
//! existing server configuration blocks.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod directives;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use directives::apply_directives;
pub use directives::parse_directives;
