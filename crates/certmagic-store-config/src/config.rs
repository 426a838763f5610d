// crates/certmagic-store-config/src/config.rs
// ============================================================================
// Module: CertMagic Store Configuration
// Description: Configuration loading, provisioning and validation.
// Purpose: Turn operator input into a validated SQLite store config.
// Dependencies: certmagic-store-sqlite, serde, toml, tracing
// ============================================================================

//! ## Overview
//! Configuration is read from a TOML file with a `[storage]` table, or from
//! a directive block (see [`crate::directives`]). Both produce
//! [`StorageSettings`], which is then provisioned:
//! - an unset DSN falls back to the `sqlite_DSN` environment variable and
//!   then to [`DEFAULT_DSN`];
//! - zero timeouts are treated as unset and replaced by the defaults.
//!
//! Timeouts are whole seconds at this layer and become milliseconds in
//! [`SqliteStorageConfig`]. File loading enforces the same size and path
//! limits for every source.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use certmagic_store_sqlite::SqliteStorageConfig;
use certmagic_store_sqlite::SqliteStoreMode;
use certmagic_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "certmagic-store.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "CERTMAGIC_STORE_CONFIG";
/// Environment variable consulted when no DSN is configured.
pub const DSN_ENV_VAR: &str = "sqlite_DSN";
/// DSN used when neither configuration nor environment provide one.
pub const DEFAULT_DSN: &str = "/var/lib/caddy/.local/share/caddy/certs.sqlite";
/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 3;
/// Default lock lease in seconds.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 60;
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound for `query_timeout` in seconds.
pub(crate) const MAX_QUERY_TIMEOUT_SECS: u64 = 3_600;
/// Upper bound for `lock_timeout` in seconds.
pub(crate) const MAX_LOCK_TIMEOUT_SECS: u64 = 7 * 24 * 3_600;
/// Upper bound for `pool_size`.
pub(crate) const MAX_POOL_SIZE: usize = 64;

// ============================================================================
// SECTION: File Config
// ============================================================================

/// Top-level configuration file model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertStoreConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageSettings,
}

impl CertStoreConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// An explicit or environment-provided path must exist. When neither is
    /// given and the default file is absent, provisioned defaults are used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, required) = resolve_path(path)?;
        validate_path(&resolved)?;
        if !required && !resolved.exists() {
            debug!(path = %resolved.display(), "no config file found, using defaults");
            let mut config = Self::default();
            config.storage.provision();
            config.validate()?;
            return Ok(config);
        }
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::parse(content)?;
        config.storage.provision();
        config.validate()?;
        debug!(path = %resolved.display(), "config loaded");
        Ok(config)
    }

    /// Parses TOML without provisioning or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown fields.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()
    }
}

// ============================================================================
// SECTION: Storage Settings
// ============================================================================

/// Operator-facing settings for the `SQLite` store.
///
/// # Invariants
/// - After [`StorageSettings::provision`], `dsn` is set and both timeouts are
///   non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    /// Connection string; falls back to the environment when unset.
    #[serde(default)]
    pub dsn: Option<String>,
    /// Per-call timeout in seconds; zero means default.
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,
    /// Lock lease in seconds; zero means default.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of pooled connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dsn: None,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            lock_timeout: DEFAULT_LOCK_TIMEOUT_SECS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            pool_size: certmagic_store_sqlite::DEFAULT_POOL_SIZE,
        }
    }
}

/// Returns the default query timeout.
const fn default_query_timeout() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}

/// Returns the default lock timeout.
const fn default_lock_timeout() -> u64 {
    DEFAULT_LOCK_TIMEOUT_SECS
}

/// Returns the default pool size.
const fn default_pool_size() -> usize {
    certmagic_store_sqlite::DEFAULT_POOL_SIZE
}

impl StorageSettings {
    /// Fills unset values from the process environment and defaults.
    pub fn provision(&mut self) {
        let env_dsn = env::var(DSN_ENV_VAR).ok();
        self.provision_with(env_dsn.as_deref());
    }

    /// Fills unset values using `env_dsn` as the environment fallback.
    pub fn provision_with(&mut self, env_dsn: Option<&str>) {
        let configured = self.dsn.as_deref().map(str::trim).filter(|dsn| !dsn.is_empty());
        let dsn = configured
            .or_else(|| env_dsn.map(str::trim).filter(|dsn| !dsn.is_empty()))
            .unwrap_or(DEFAULT_DSN)
            .to_string();
        self.dsn = Some(dsn);
        if self.query_timeout == 0 {
            self.query_timeout = DEFAULT_QUERY_TIMEOUT_SECS;
        }
        if self.lock_timeout == 0 {
            self.lock_timeout = DEFAULT_LOCK_TIMEOUT_SECS;
        }
        debug!(
            dsn = self.dsn.as_deref().unwrap_or_default(),
            query_timeout = self.query_timeout,
            lock_timeout = self.lock_timeout,
            "storage settings provisioned"
        );
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value is missing or out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(dsn) = self.dsn.as_deref() else {
            return Err(ConfigError::Invalid("storage.dsn must be set".to_string()));
        };
        validate_path_string("storage.dsn", dsn)?;
        if self.query_timeout == 0 || self.query_timeout > MAX_QUERY_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "storage.query_timeout must be between 1 and {MAX_QUERY_TIMEOUT_SECS} seconds"
            )));
        }
        if self.lock_timeout == 0 || self.lock_timeout > MAX_LOCK_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "storage.lock_timeout must be between 1 and {MAX_LOCK_TIMEOUT_SECS} seconds"
            )));
        }
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::Invalid(format!(
                "storage.pool_size must be between 1 and {MAX_POOL_SIZE}"
            )));
        }
        Ok(())
    }

    /// Converts provisioned settings into a store configuration.
    #[must_use]
    pub fn into_store_config(self) -> SqliteStorageConfig {
        SqliteStorageConfig {
            dsn: self.dsn.unwrap_or_default(),
            query_timeout_ms: self.query_timeout.saturating_mul(1_000),
            lock_timeout_ms: self.lock_timeout.saturating_mul(1_000),
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
            pool_size: self.pool_size,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path; the flag is true when the file must exist.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
