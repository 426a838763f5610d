// crates/certmagic-store-config/src/directives.rs
// ============================================================================
// Module: Storage Directives
// Description: Lenient parser for line-oriented storage directives.
// Purpose: Accept the server-config style `key value` block for the store.
// Dependencies: certmagic-store-sqlite, tracing
// ============================================================================

//! ## Overview
//! A directive block holds one `name value` pair per line, for example:
//!
//! ```text
//! storage sqlite {
//!     dsn /var/lib/certs.sqlite
//!     query_timeout 10
//!     lock_timeout 60
//! }
//! ```
//!
//! Parsing never fails. Unknown directives, directives without an argument,
//! braces and `#` comments are skipped, and a value that does not parse
//! leaves the current setting untouched. Values may be double-quoted to
//! include whitespace.

use certmagic_store_sqlite::SqliteStoreMode;
use certmagic_store_sqlite::SqliteSyncMode;
use tracing::debug;

use crate::config::StorageSettings;

/// Parses a directive block on top of the default settings.
#[must_use]
pub fn parse_directives(input: &str) -> StorageSettings {
    let mut settings = StorageSettings::default();
    apply_directives(&mut settings, input);
    settings
}

/// Applies a directive block to existing settings.
pub fn apply_directives(settings: &mut StorageSettings, input: &str) {
    for line in input.lines() {
        let tokens = tokenize(line);
        let [name, value, ..] = tokens.as_slice() else {
            continue;
        };
        apply_directive(settings, name, value);
    }
    debug!(
        dsn = settings.dsn.as_deref().unwrap_or_default(),
        query_timeout = settings.query_timeout,
        lock_timeout = settings.lock_timeout,
        pool_size = settings.pool_size,
        "storage directives applied"
    );
}

/// Applies one directive; unknown names and bad values are ignored.
fn apply_directive(settings: &mut StorageSettings, name: &str, value: &str) {
    match name {
        "dsn" => settings.dsn = Some(value.to_string()),
        "query_timeout" => {
            if let Ok(seconds) = value.parse() {
                settings.query_timeout = seconds;
            }
        }
        "lock_timeout" => {
            if let Ok(seconds) = value.parse() {
                settings.lock_timeout = seconds;
            }
        }
        "pool_size" => {
            if let Ok(size) = value.parse() {
                settings.pool_size = size;
            }
        }
        "journal_mode" => match value {
            "wal" => settings.journal_mode = SqliteStoreMode::Wal,
            "delete" => settings.journal_mode = SqliteStoreMode::Delete,
            _ => {}
        },
        "sync_mode" => match value {
            "full" => settings.sync_mode = SqliteSyncMode::Full,
            "normal" => settings.sync_mode = SqliteSyncMode::Normal,
            _ => {}
        },
        _ => {}
    }
}

/// Splits a line into tokens, honoring double quotes and `#` comments.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_token = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            '#' if !quoted && !in_token => break,
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens.retain(|token| token != "{" && token != "}");
    tokens
}
