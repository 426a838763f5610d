// crates/certmagic-store-core/src/model/key_info.rs
// ============================================================================
// Module: Key Metadata
// Description: Metadata returned by stat calls.
// Purpose: Describe a stored key without loading its value.
// Dependencies: time
// ============================================================================

//! ## Overview
//! [`KeyInfo`] is the result of a `stat` call.

use time::OffsetDateTime;

/// Metadata describing a stored key.
///
/// # Invariants
/// - `is_terminal` is always true; keys are never directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Logical key the metadata describes.
    pub key: String,
    /// Last modification time (UTC).
    pub modified: OffsetDateTime,
    /// Payload size in bytes.
    pub size: u64,
    /// Whether the key is a leaf.
    pub is_terminal: bool,
}
