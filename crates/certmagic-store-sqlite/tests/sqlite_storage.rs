// crates/certmagic-store-sqlite/tests/sqlite_storage.rs
// ============================================================================
// Module: SQLite Storage Tests
// Description: Validate the SQLite Storage and Locker backend.
// Purpose: Ensure durable records, shared leases and schema compatibility.
// Dependencies: certmagic-store-sqlite, certmagic-store-core, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Conformance tests for the SQLite-backed certificate store. Covers record
//! round-trips, literal prefix listing, lease contention across handles and
//! threads, lease expiry, deadline and cancellation mapping, and rows written
//! by other clients of the same schema.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use certmagic_store_core::CancelToken;
use certmagic_store_core::Locker;
use certmagic_store_core::OpContext;
use certmagic_store_core::Storage;
use certmagic_store_core::StorageError;
use certmagic_store_sqlite::KeyHash;
use certmagic_store_sqlite::MEMORY_DSN;
use certmagic_store_sqlite::SqliteStorage;
use certmagic_store_sqlite::SqliteStorageConfig;
use certmagic_store_sqlite::SqliteStoreError;
use certmagic_store_sqlite::schema::DATA_TABLE;
use certmagic_store_sqlite::schema::LOCKS_TABLE;
use certmagic_store_sqlite::schema::MODIFIED_TRIGGER;
use proptest::prelude::*;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn config_at(path: &Path) -> SqliteStorageConfig {
    SqliteStorageConfig::new(path.display().to_string())
}

fn open_store(dir: &TempDir) -> SqliteStorage {
    SqliteStorage::new(config_at(&dir.path().join("certs.sqlite"))).unwrap()
}

// ============================================================================
// SECTION: Records
// ============================================================================

#[test]
fn end_to_end_store_list_lock_scenario() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let ctx = OpContext::background();

    storage.store(&ctx, "test", b"test").unwrap();
    storage.store(&ctx, "test1", b"test1").unwrap();
    storage.store(&ctx, "test2", b"test2").unwrap();

    assert_eq!(storage.load(&ctx, "test").unwrap(), b"test");
    assert_eq!(storage.list(&ctx, "test", false).unwrap(), vec!["test", "test1", "test2"]);
    assert_eq!(storage.list(&ctx, "test1", false).unwrap(), vec!["test1"]);

    let info = storage.stat(&ctx, "test").unwrap();
    assert_eq!(info.key, "test");
    assert_eq!(info.size, 4);
    assert!(info.is_terminal);

    storage.lock(&ctx, "test").unwrap();
    assert!(storage.is_locked(&ctx, "test").unwrap());
    assert!(storage.lock(&ctx, "test").unwrap_err().is_already_locked());
    storage.unlock(&ctx, "test").unwrap();
    assert!(!storage.is_locked(&ctx, "test").unwrap());

    storage.delete(&ctx, "test").unwrap();
    assert!(!storage.exists(&ctx, "test"));
    assert!(storage.exists(&ctx, "test1"));
}

#[test]
fn missing_key_is_not_found_for_load_and_stat() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let ctx = OpContext::background();
    assert_eq!(
        storage.load(&ctx, "absent").unwrap_err(),
        StorageError::NotFound("absent".to_string())
    );
    assert!(storage.stat(&ctx, "absent").unwrap_err().is_not_found());
    assert!(!storage.exists(&ctx, "absent"));
}

#[test]
fn delete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let ctx = OpContext::background();
    storage.delete(&ctx, "never-stored").unwrap();
    storage.store(&ctx, "k", b"v").unwrap();
    storage.delete(&ctx, "k").unwrap();
    storage.delete(&ctx, "k").unwrap();
    assert!(storage.load(&ctx, "k").unwrap_err().is_not_found());
}

#[test]
fn empty_value_round_trips() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let ctx = OpContext::background();
    storage.store(&ctx, "empty", b"").unwrap();
    assert!(storage.load(&ctx, "empty").unwrap().is_empty());
    assert_eq!(storage.stat(&ctx, "empty").unwrap().size, 0);
}

#[test]
fn overwrite_updates_value_size_and_modified() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let ctx = OpContext::background();
    storage.store(&ctx, "k", b"short").unwrap();
    let first = storage.stat(&ctx, "k").unwrap();
    storage.store(&ctx, "k", b"a much longer value").unwrap();
    let second = storage.stat(&ctx, "k").unwrap();

    assert_eq!(storage.load(&ctx, "k").unwrap(), b"a much longer value");
    assert_eq!(first.size, 5);
    assert_eq!(second.size, 19);
    assert!(second.modified > first.modified);
}

#[test]
fn rapid_overwrites_strictly_advance_modified() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let ctx = OpContext::background();
    storage.store(&ctx, "k", b"0").unwrap();
    let mut previous = storage.stat(&ctx, "k").unwrap().modified;
    for round in 1 .. 200 {
        storage.store(&ctx, "k", round.to_string().as_bytes()).unwrap();
        let modified = storage.stat(&ctx, "k").unwrap().modified;
        assert!(modified > previous, "round {round}: {modified} <= {previous}");
        previous = modified;
    }
}

#[test]
fn binary_values_are_stored_verbatim() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let ctx = OpContext::background();
    let value: Vec<u8> = (0 ..= 255).collect();
    storage.store(&ctx, "bin", &value).unwrap();
    assert_eq!(storage.load(&ctx, "bin").unwrap(), value);
    assert_eq!(storage.stat(&ctx, "bin").unwrap().size, 256);
}

#[test]
fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let ctx = OpContext::background();
    {
        let storage = open_store(&dir);
        storage.store(&ctx, "persisted", b"value").unwrap();
    }
    let reopened = open_store(&dir);
    assert_eq!(reopened.load(&ctx, "persisted").unwrap(), b"value");
}

// ============================================================================
// SECTION: Listing
// ============================================================================

#[test]
fn list_treats_wildcards_literally() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let ctx = OpContext::background();
    for key in ["a%b/1", "axb/1", "a_c/1", "abc/1", "a\\d/1", "aXd/1"] {
        storage.store(&ctx, key, b"v").unwrap();
    }
    assert_eq!(storage.list(&ctx, "a%", false).unwrap(), vec!["a%b/1"]);
    assert_eq!(storage.list(&ctx, "a_", false).unwrap(), vec!["a_c/1"]);
    assert_eq!(storage.list(&ctx, "a\\", false).unwrap(), vec!["a\\d/1"]);
}

#[test]
fn list_is_case_sensitive() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let ctx = OpContext::background();
    storage.store(&ctx, "Certs/a", b"v").unwrap();
    storage.store(&ctx, "certs/b", b"v").unwrap();
    assert_eq!(storage.list(&ctx, "certs/", false).unwrap(), vec!["certs/b"]);
    assert_eq!(storage.list(&ctx, "Certs/", false).unwrap(), vec!["Certs/a"]);
}

#[test]
fn list_without_matches_is_empty() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let ctx = OpContext::background();
    storage.store(&ctx, "certs/a", b"v").unwrap();
    assert!(storage.list(&ctx, "keys/", false).unwrap().is_empty());
    assert_eq!(storage.list(&ctx, "", false).unwrap(), vec!["certs/a"]);
}

#[test]
fn recursive_list_is_unsupported() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let err = storage.list(&OpContext::background(), "certs/", true).unwrap_err();
    assert!(matches!(err, StorageError::Unsupported(_)));
}

// ============================================================================
// SECTION: Locks
// ============================================================================

#[test]
fn unlock_of_free_key_succeeds() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    storage.unlock(&OpContext::background(), "never-locked").unwrap();
}

#[test]
fn locks_are_independent_of_records() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let ctx = OpContext::background();
    storage.lock(&ctx, "issue/example.com").unwrap();
    assert!(!storage.exists(&ctx, "issue/example.com"));
    storage.store(&ctx, "issue/example.com", b"v").unwrap();
    storage.lock(&ctx, "other").unwrap();
    assert!(storage.is_locked(&ctx, "issue/example.com").unwrap());
}

#[test]
fn expired_lease_can_be_reacquired() {
    let dir = TempDir::new().unwrap();
    let mut config = config_at(&dir.path().join("certs.sqlite"));
    config.lock_timeout_ms = 200;
    let storage = SqliteStorage::new(config).unwrap();
    let ctx = OpContext::background();

    storage.lock(&ctx, "lease").unwrap();
    assert!(storage.lock(&ctx, "lease").unwrap_err().is_already_locked());
    thread::sleep(Duration::from_millis(500));
    assert!(!storage.is_locked(&ctx, "lease").unwrap());
    storage.lock(&ctx, "lease").unwrap();
    assert!(storage.is_locked(&ctx, "lease").unwrap());
}

#[test]
fn second_handle_observes_lease() {
    let dir = TempDir::new().unwrap();
    let first = open_store(&dir);
    let second = open_store(&dir);
    let ctx = OpContext::background();

    first.lock(&ctx, "shared").unwrap();
    assert!(second.lock(&ctx, "shared").unwrap_err().is_already_locked());
    first.unlock(&ctx, "shared").unwrap();
    second.lock(&ctx, "shared").unwrap();
    assert!(first.is_locked(&ctx, "shared").unwrap());
}

#[test]
fn concurrent_lockers_have_one_winner() {
    const CONTENDERS: usize = 8;
    let dir = TempDir::new().unwrap();
    let primary = open_store(&dir);
    let secondary = open_store(&dir);
    let barrier = Arc::new(Barrier::new(CONTENDERS));

    let handles: Vec<_> = (0 .. CONTENDERS)
        .map(|index| {
            let storage = if index % 2 == 0 { primary.clone() } else { secondary.clone() };
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                storage.lock(&OpContext::with_timeout(Duration::from_secs(10)), "race")
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
    let winners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1, "results: {results:?}");
    assert!(results.iter().filter_map(|result| result.as_ref().err()).all(StorageError::is_already_locked));
}

// ============================================================================
// SECTION: Deadlines
// ============================================================================

#[test]
fn expired_context_times_out_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let expired = OpContext::with_timeout(Duration::ZERO);
    let err = storage.store(&expired, "k", b"v").unwrap_err();
    assert!(matches!(err, StorageError::Timeout(_)));
    assert!(!storage.exists(&OpContext::background(), "k"));
}

#[test]
fn cancelled_context_is_reported_as_cancelled() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);
    let token = CancelToken::new();
    token.cancel();
    let ctx = OpContext::background().cancellable(token);
    assert!(matches!(storage.load(&ctx, "k").unwrap_err(), StorageError::Cancelled(_)));
    assert!(matches!(storage.lock(&ctx, "k").unwrap_err(), StorageError::Cancelled(_)));
    assert!(!storage.exists(&ctx, "k"));
}

#[test]
fn writer_blocked_past_deadline_times_out() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("certs.sqlite");
    let storage = SqliteStorage::new(config_at(&path)).unwrap();

    let mut blocker = Connection::open(&path).unwrap();
    let tx = blocker.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate).unwrap();

    let ctx = OpContext::with_timeout(Duration::from_millis(150));
    let err = storage.lock(&ctx, "blocked").unwrap_err();
    assert!(matches!(err, StorageError::Timeout(_)), "unexpected error: {err:?}");
    tx.rollback().unwrap();

    storage.lock(&OpContext::background(), "blocked").unwrap();
}

#[test]
fn pool_wait_is_bounded_by_caller_deadline() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("certs.sqlite");
    let mut config = config_at(&path);
    config.pool_size = 1;
    config.query_timeout_ms = 3_000;
    let storage = SqliteStorage::new(config).unwrap();

    let mut blocker = Connection::open(&path).unwrap();
    let tx = blocker.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate).unwrap();

    let holder = {
        let storage = storage.clone();
        thread::spawn(move || storage.lock(&OpContext::background(), "held"))
    };
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    let err = storage.load(&OpContext::with_timeout(Duration::from_millis(100)), "k").unwrap_err();
    let waited = started.elapsed();
    assert!(matches!(err, StorageError::Timeout(_)), "unexpected error: {err:?}");
    assert!(waited < Duration::from_secs(1), "waited {waited:?}");

    let token = CancelToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        })
    };
    let started = Instant::now();
    let err = storage.load(&OpContext::background().cancellable(token), "k").unwrap_err();
    assert!(matches!(err, StorageError::Cancelled(_)), "unexpected error: {err:?}");
    assert!(started.elapsed() < Duration::from_secs(1));
    canceller.join().unwrap();

    tx.rollback().unwrap();
    holder.join().unwrap().unwrap();
}

// ============================================================================
// SECTION: Schema and Compatibility
// ============================================================================

#[test]
fn schema_bootstrap_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("certs.sqlite");
    drop(SqliteStorage::new(config_at(&path)).unwrap());
    drop(SqliteStorage::new(config_at(&path)).unwrap());

    let conn = Connection::open(&path).unwrap();
    let objects: i64 = conn
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE name IN (?1, ?2, ?3)",
            params![DATA_TABLE, LOCKS_TABLE, MODIFIED_TRIGGER],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(objects, 3);
}

#[test]
fn rows_are_keyed_by_salted_hash() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("certs.sqlite");
    let storage = SqliteStorage::new(config_at(&path)).unwrap();
    storage.store(&OpContext::background(), "test", b"test").unwrap();

    let conn = Connection::open(&path).unwrap();
    let (hash, key): (String, String) = conn
        .query_row("SELECT key_hash, key FROM certmagic_data", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(hash, "6525cb663dbb9460dc17c201a681fb37");
    assert_eq!(hash, KeyHash::of("test").as_str());
    assert_eq!(key, "test");
}

#[test]
fn rows_written_by_other_clients_are_readable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("certs.sqlite");
    let storage = SqliteStorage::new(config_at(&path)).unwrap();
    let ctx = OpContext::background();

    let conn = Connection::open(&path).unwrap();
    conn.execute(
        "INSERT INTO certmagic_data (key_hash, key, value, modified) VALUES (?1, ?2, NULL, ?3)",
        params![KeyHash::of("legacy").as_str(), "legacy", "2024-01-02T03:04:05.678Z"],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO certmagic_locks (key_hash, key, expires) VALUES (?1, ?2, ?3)",
        params![KeyHash::of("stale").as_str(), "stale", "2000-01-01 00:00:00"],
    )
    .unwrap();

    assert!(storage.load(&ctx, "legacy").unwrap().is_empty());
    let info = storage.stat(&ctx, "legacy").unwrap();
    assert_eq!(info.size, 0);
    assert_eq!(info.modified.unix_timestamp(), 1_704_164_645);
    assert_eq!(info.modified.millisecond(), 678);

    assert!(!storage.is_locked(&ctx, "stale").unwrap());
    storage.lock(&ctx, "stale").unwrap();
}

#[test]
fn leases_in_go_time_format_are_honored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("certs.sqlite");
    let storage = SqliteStorage::new(config_at(&path)).unwrap();
    let ctx = OpContext::background();

    let conn = Connection::open(&path).unwrap();
    let leases = [
        ("live-utc", "'+1 hour'", " +0000 UTC m=+3600.000000001"),
        ("live-offset", "'+3 hours'", " +0200 CEST"),
        ("lapsed-utc", "'-1 hour'", " +0000 UTC"),
        ("lapsed-offset", "'+1 hour'", " +0200 CEST m=+3600.5"),
    ];
    for (key, modifier, suffix) in leases {
        conn.execute(
            &format!(
                "INSERT INTO certmagic_locks (key_hash, key, expires)
                 VALUES (?1, ?2, strftime('%Y-%m-%d %H:%M:%f', 'now', {modifier}) || '123456' || ?3)"
            ),
            params![KeyHash::of(key).as_str(), key, suffix],
        )
        .unwrap();
    }

    for key in ["live-utc", "live-offset"] {
        assert!(storage.is_locked(&ctx, key).unwrap(), "{key}");
        assert!(matches!(storage.lock(&ctx, key).unwrap_err(), StorageError::AlreadyLocked(_)));
    }
    for key in ["lapsed-utc", "lapsed-offset"] {
        assert!(!storage.is_locked(&ctx, key).unwrap(), "{key}");
        storage.lock(&ctx, key).unwrap();
    }
}

#[test]
fn trigger_refreshes_modified_on_direct_update() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("certs.sqlite");
    let storage = SqliteStorage::new(config_at(&path)).unwrap();
    let ctx = OpContext::background();

    let conn = Connection::open(&path).unwrap();
    conn.execute(
        "INSERT INTO certmagic_data (key_hash, key, value, modified) VALUES (?1, ?2, ?3, ?4)",
        params![KeyHash::of("old").as_str(), "old", b"v".as_slice(), "2001-01-01 00:00:00"],
    )
    .unwrap();
    conn.execute(
        "UPDATE certmagic_data SET value = ?1 WHERE key_hash = ?2",
        params![b"new".as_slice(), KeyHash::of("old").as_str()],
    )
    .unwrap();

    let info = storage.stat(&ctx, "old").unwrap();
    assert!(info.modified.year() > 2001);
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

#[test]
fn empty_dsn_is_a_config_error() {
    let err = SqliteStorage::new(SqliteStorageConfig::new("  ")).err().unwrap();
    assert!(matches!(err, SqliteStoreError::Config(_)));
    assert!(matches!(StorageError::from(err), StorageError::Config(_)));
}

#[test]
fn zero_timeouts_are_rejected() {
    let mut config = SqliteStorageConfig::new(MEMORY_DSN);
    config.query_timeout_ms = 0;
    assert!(matches!(SqliteStorage::new(config).err().unwrap(), SqliteStoreError::Config(_)));

    let mut config = SqliteStorageConfig::new(MEMORY_DSN);
    config.lock_timeout_ms = 0;
    assert!(matches!(SqliteStorage::new(config).err().unwrap(), SqliteStoreError::Config(_)));
}

#[test]
fn directory_dsn_is_rejected() {
    let dir = TempDir::new().unwrap();
    let err = SqliteStorage::new(config_at(dir.path())).err().unwrap();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn missing_parent_directories_are_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("certs.sqlite");
    let storage = SqliteStorage::new(config_at(&path)).unwrap();
    storage.store(&OpContext::background(), "k", b"v").unwrap();
    assert!(path.exists());
}

#[test]
fn memory_dsn_uses_single_connection() {
    let mut config = SqliteStorageConfig::new(MEMORY_DSN);
    config.pool_size = 8;
    assert_eq!(config.effective_pool_size(), 1);
    let storage = SqliteStorage::new(config).unwrap();
    let ctx = OpContext::background();
    storage.store(&ctx, "k", b"v").unwrap();
    assert_eq!(storage.load(&ctx, "k").unwrap(), b"v");
    assert_eq!(storage.config().pool_size, 8);
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn list_matches_literal_prefix_model(
        keys in proptest::collection::btree_set("[abA%_\\\\]{0,4}", 0..12),
        prefix in "[abA%_\\\\]{0,2}",
    ) {
        let storage = SqliteStorage::new(SqliteStorageConfig::new(MEMORY_DSN)).unwrap();
        let ctx = OpContext::background();
        for key in &keys {
            storage.store(&ctx, key, key.as_bytes()).unwrap();
        }
        let listed = storage.list(&ctx, &prefix, false).unwrap();
        let expected: Vec<String> =
            keys.iter().filter(|key| key.starts_with(&prefix)).cloned().collect();
        prop_assert_eq!(listed, expected);
    }
}
