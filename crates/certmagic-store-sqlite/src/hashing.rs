// crates/certmagic-store-sqlite/src/hashing.rs
// ============================================================================
// Module: Key Hashing
// Description: Fixed-width storage identifiers derived from logical keys.
// Purpose: Map arbitrary-length keys onto the tables' primary key column.
// Dependencies: md-5, hex
// ============================================================================

//! ## Overview
//! Every record and lock row is addressed by `key_hash`, the lowercase hex
//! MD5 digest of the logical key followed by [`KEY_HASH_SALT`]. The digest
//! and salt are part of the on-disk format: databases written by earlier
//! clients of the same schema stay readable only while both are unchanged.
//! The digest is 32 hex characters stored in a `CHAR(40)` column.
//!
//! There is no collision detection. Two keys with equal hashes would share a
//! row.

use std::fmt;

use md5::Digest;
use md5::Md5;

/// Salt appended to every key before hashing.
pub const KEY_HASH_SALT: &str = "storage.sqlite.salt";

/// Hex-encoded storage identifier for a logical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyHash(String);

impl KeyHash {
    /// Hashes a logical key.
    #[must_use]
    pub fn of(key: &str) -> Self {
        let mut hasher = Md5::new();
        hasher.update(key.as_bytes());
        hasher.update(KEY_HASH_SALT.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
