// crates/certmagic-store-cli/src/main.rs
// ============================================================================
// Module: CertMagic Store CLI Entry Point
// Description: Command dispatcher for the SQLite certificate store.
// Purpose: Expose every store operation to operators and scripts.
// Dependencies: clap, certmagic-store-config, certmagic-store-sqlite, tracing-subscriber
// ============================================================================

//! ## Overview
//! `certmagic-store` opens the store described by the configuration file
//! (or `--dsn`) and runs a single operation against it. Values are written
//! to stdout verbatim; diagnostics and logs go to stderr. Log verbosity is
//! controlled with `RUST_LOG` and defaults to `warn`.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use certmagic_store_config::CertStoreConfig;
use certmagic_store_config::StorageSettings;
use certmagic_store_config::apply_directives;
use certmagic_store_core::Locker;
use certmagic_store_core::OpContext;
use certmagic_store_core::Storage;
use certmagic_store_core::StorageError;
use certmagic_store_sqlite::SqliteStorage;
use clap::ArgGroup;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a value read from `--file`.
const MAX_VALUE_BYTES: u64 = 16 * 1024 * 1024;
/// Maximum size of a directive block file.
const MAX_DIRECTIVES_BYTES: u64 = 1024 * 1024;
/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "warn";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "certmagic-store", version, about = "Inspect and maintain a SQLite certificate store")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Connection string overriding the configured DSN.
    #[arg(long, global = true, value_name = "DSN")]
    dsn: Option<String>,
    /// Deadline for the whole operation, in seconds.
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<u64>,
    /// Selected subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a value at a key, replacing any existing value.
    Store(StoreCommand),
    /// Write the value stored at a key.
    Load(LoadCommand),
    /// Delete a key; deleting an absent key succeeds.
    Delete(KeyArgs),
    /// Report whether a key exists (exit status 1 when absent).
    Exists(KeyArgs),
    /// List keys starting with a prefix.
    List(ListCommand),
    /// Show size and modification time of a key.
    Stat(KeyArgs),
    /// Acquire the lease lock for a key.
    Lock(KeyArgs),
    /// Release the lease lock for a key.
    Unlock(KeyArgs),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments naming a single key.
#[derive(Args, Debug)]
struct KeyArgs {
    /// Logical key.
    key: String,
}

/// Arguments for `store`.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["value", "file"])))]
struct StoreCommand {
    /// Logical key.
    key: String,
    /// Value given inline as UTF-8 text.
    #[arg(long)]
    value: Option<String>,
    /// File whose bytes become the value.
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

/// Arguments for `load`.
#[derive(Args, Debug)]
struct LoadCommand {
    /// Logical key.
    key: String,
    /// Write the value to this file instead of stdout.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

/// Arguments for `list`.
#[derive(Args, Debug)]
struct ListCommand {
    /// Key prefix; matched literally and case-sensitively.
    #[arg(default_value = "")]
    prefix: String,
    /// Request recursive listing (not supported by this store).
    #[arg(long)]
    recursive: bool,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load, validate and print the effective storage settings.
    Check(ConfigCheckCommand),
}

/// Arguments for `config check`.
#[derive(Args, Debug)]
struct ConfigCheckCommand {
    /// Directive block applied on top of the configuration file.
    #[arg(long, value_name = "PATH")]
    directives: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    match run(cli, &mut stdout) {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Installs the stderr log subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

/// Executes the parsed command, writing results to `out`.
fn run(cli: Cli, out: &mut impl Write) -> CliResult<ExitCode> {
    let ctx = operation_context(cli.timeout);
    match cli.command {
        Commands::Config {
            command: ConfigCommand::Check(command),
        } => command_config_check(cli.config.as_deref(), cli.dsn.as_deref(), &command, out),
        command => {
            let settings = load_settings(cli.config.as_deref(), None, cli.dsn.as_deref())?;
            let storage = open_store(settings)?;
            dispatch(&storage, &ctx, command, out)
        }
    }
}

/// Routes a store command to its handler.
fn dispatch(
    storage: &SqliteStorage,
    ctx: &OpContext,
    command: Commands,
    out: &mut impl Write,
) -> CliResult<ExitCode> {
    match command {
        Commands::Store(command) => command_store(storage, ctx, &command, out),
        Commands::Load(command) => command_load(storage, ctx, &command, out),
        Commands::Delete(args) => command_delete(storage, ctx, &args.key, out),
        Commands::Exists(args) => command_exists(storage, ctx, &args.key, out),
        Commands::List(command) => command_list(storage, ctx, &command, out),
        Commands::Stat(args) => command_stat(storage, ctx, &args.key, out),
        Commands::Lock(args) => command_lock(storage, ctx, &args.key, out),
        Commands::Unlock(args) => command_unlock(storage, ctx, &args.key, out),
        Commands::Config {
            ..
        } => Err(CliError::new("config commands do not open the store".to_string())),
    }
}

// ============================================================================
// SECTION: Record Commands
// ============================================================================

/// Executes `store`.
fn command_store(
    storage: &SqliteStorage,
    ctx: &OpContext,
    command: &StoreCommand,
    out: &mut impl Write,
) -> CliResult<ExitCode> {
    let value = match (&command.value, &command.file) {
        (Some(value), _) => value.clone().into_bytes(),
        (None, Some(path)) => read_limited(path, MAX_VALUE_BYTES)?,
        (None, None) => return Err(CliError::new("store requires --value or --file".to_string())),
    };
    storage.store(ctx, &command.key, &value).map_err(|err| storage_error("store", &command.key, &err))?;
    write_line(out, &format!("stored {} ({} bytes)", command.key, value.len()))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `load`.
fn command_load(
    storage: &SqliteStorage,
    ctx: &OpContext,
    command: &LoadCommand,
    out: &mut impl Write,
) -> CliResult<ExitCode> {
    let value =
        storage.load(ctx, &command.key).map_err(|err| storage_error("load", &command.key, &err))?;
    if let Some(path) = &command.output {
        fs::write(path, &value).map_err(|err| {
            CliError::new(format!("failed to write {}: {err}", path.display()))
        })?;
        write_line(out, &format!("wrote {} bytes to {}", value.len(), path.display()))?;
    } else {
        out.write_all(&value).map_err(|err| output_error(&err))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `delete`.
fn command_delete(
    storage: &SqliteStorage,
    ctx: &OpContext,
    key: &str,
    out: &mut impl Write,
) -> CliResult<ExitCode> {
    storage.delete(ctx, key).map_err(|err| storage_error("delete", key, &err))?;
    write_line(out, &format!("deleted {key}"))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `exists`.
fn command_exists(
    storage: &SqliteStorage,
    ctx: &OpContext,
    key: &str,
    out: &mut impl Write,
) -> CliResult<ExitCode> {
    let found = storage.exists(ctx, key);
    write_line(out, if found { "true" } else { "false" })?;
    Ok(if found { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Executes `list`.
fn command_list(
    storage: &SqliteStorage,
    ctx: &OpContext,
    command: &ListCommand,
    out: &mut impl Write,
) -> CliResult<ExitCode> {
    let keys = storage
        .list(ctx, &command.prefix, command.recursive)
        .map_err(|err| storage_error("list", &command.prefix, &err))?;
    for key in keys {
        write_line(out, &key)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `stat`.
fn command_stat(
    storage: &SqliteStorage,
    ctx: &OpContext,
    key: &str,
    out: &mut impl Write,
) -> CliResult<ExitCode> {
    let info = storage.stat(ctx, key).map_err(|err| storage_error("stat", key, &err))?;
    let modified = info
        .modified
        .format(&Rfc3339)
        .map_err(|err| CliError::new(format!("failed to format modification time: {err}")))?;
    write_line(out, &format!("key: {}", info.key))?;
    write_line(out, &format!("size: {}", info.size))?;
    write_line(out, &format!("modified: {modified}"))?;
    write_line(out, &format!("terminal: {}", info.is_terminal))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Lock Commands
// ============================================================================

/// Executes `lock`.
fn command_lock(
    storage: &SqliteStorage,
    ctx: &OpContext,
    key: &str,
    out: &mut impl Write,
) -> CliResult<ExitCode> {
    storage.lock(ctx, key).map_err(|err| storage_error("lock", key, &err))?;
    let lease = storage.config().lock_timeout();
    write_line(out, &format!("locked {key} for {}s", lease.as_secs()))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `unlock`.
fn command_unlock(
    storage: &SqliteStorage,
    ctx: &OpContext,
    key: &str,
    out: &mut impl Write,
) -> CliResult<ExitCode> {
    storage.unlock(ctx, key).map_err(|err| storage_error("unlock", key, &err))?;
    write_line(out, &format!("unlocked {key}"))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Executes `config check`.
fn command_config_check(
    config: Option<&Path>,
    dsn: Option<&str>,
    command: &ConfigCheckCommand,
    out: &mut impl Write,
) -> CliResult<ExitCode> {
    let settings = load_settings(config, command.directives.as_deref(), dsn)?;
    write_line(out, &format!("dsn = {}", settings.dsn.as_deref().unwrap_or_default()))?;
    write_line(out, &format!("query_timeout = {}s", settings.query_timeout))?;
    write_line(out, &format!("lock_timeout = {}s", settings.lock_timeout))?;
    write_line(out, &format!("journal_mode = {}", settings.journal_mode.pragma_value()))?;
    write_line(out, &format!("sync_mode = {}", settings.sync_mode.pragma_value()))?;
    write_line(out, &format!("pool_size = {}", settings.pool_size))?;
    write_line(out, "config ok")?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads settings: file, then directives, then the `--dsn` override.
fn load_settings(
    config: Option<&Path>,
    directives: Option<&Path>,
    dsn: Option<&str>,
) -> CliResult<StorageSettings> {
    let loaded = CertStoreConfig::load(config)
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let mut settings = loaded.storage;
    if let Some(path) = directives {
        let bytes = read_limited(path, MAX_DIRECTIVES_BYTES)?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| CliError::new("directive file must be utf-8".to_string()))?;
        apply_directives(&mut settings, text);
        settings.provision();
    }
    if let Some(dsn) = dsn {
        settings.dsn = Some(dsn.to_string());
    }
    settings.validate().map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    Ok(settings)
}

/// Opens the store described by `settings`.
fn open_store(settings: StorageSettings) -> CliResult<SqliteStorage> {
    let config = settings.into_store_config();
    debug!(dsn = %config.dsn, "opening store");
    SqliteStorage::new(config).map_err(|err| CliError::new(format!("failed to open store: {err}")))
}

/// Builds the per-invocation operation context.
fn operation_context(timeout: Option<u64>) -> OpContext {
    timeout.map_or_else(OpContext::background, |seconds| {
        OpContext::with_timeout(Duration::from_secs(seconds))
    })
}

/// Reads a file, failing when it exceeds `limit` bytes.
fn read_limited(path: &Path, limit: u64) -> CliResult<Vec<u8>> {
    let file = File::open(path)
        .map_err(|err| CliError::new(format!("failed to open {}: {err}", path.display())))?;
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|err| CliError::new(format!("failed to read {}: {err}", path.display())))?;
    if u64::try_from(bytes.len()).unwrap_or(u64::MAX) > limit {
        return Err(CliError::new(format!(
            "{} exceeds the {limit} byte limit",
            path.display()
        )));
    }
    Ok(bytes)
}

/// Formats a storage failure for the operator.
fn storage_error(operation: &str, key: &str, error: &StorageError) -> CliError {
    CliError::new(format!("{operation} '{key}' failed: {error}"))
}

/// Writes a line to `out`.
fn write_line(out: &mut impl Write, message: &str) -> CliResult<()> {
    writeln!(out, "{message}").map_err(|err| output_error(&err))
}

/// Formats an output error message.
fn output_error(error: &std::io::Error) -> CliError {
    CliError::new(format!("failed to write output: {error}"))
}

/// Writes an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let mut stderr = std::io::stderr();
    let _ = writeln!(&mut stderr, "{message}");
    ExitCode::FAILURE
}
