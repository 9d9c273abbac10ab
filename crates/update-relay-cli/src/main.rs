// crates/update-relay-cli/src/main.rs
// ============================================================================
// Module: Update Relay CLI Entry Point
// Description: Command dispatcher for serving and inspecting update relays.
// Purpose: Run the relay server and answer operator questions offline.
// Dependencies: clap, serde_json, thiserror, tokio, update-relay-server
// ============================================================================

//! ## Overview
//! The `update-relay` binary starts the HTTP server, checks a configuration
//! file without starting anything, and resolves which bundle a runtime
//! version would receive. Security posture: configuration paths and
//! arguments are operator input; they are validated by the config crate
//! before any storage access.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use serde::Serialize;
use thiserror::Error;
use update_relay_config::RelayConfig;
use update_relay_core::Platform;
use update_relay_core::RuntimeVersion;
use update_relay_core::UpdateType;
use update_relay_server::CodeSigner;
use update_relay_server::Resolution;
use update_relay_server::UpdateRelayServer;
use update_relay_server::build_logger;
use update_relay_server::service_for_store;
use update_relay_storage::StorageDeps;
use update_relay_storage::connect_blob_store;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "update-relay", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the update relay HTTP server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print the bundle a runtime version and platform resolve to.
    Resolve(ResolveCommand),
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to update-relay.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override the configured bind address.
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a config file.
    Check(ConfigCheckCommand),
}

/// Arguments for config checks.
#[derive(Args, Debug)]
struct ConfigCheckCommand {
    /// Optional config file path (defaults to update-relay.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for bundle resolution.
#[derive(Args, Debug)]
struct ResolveCommand {
    /// Runtime version to resolve.
    #[arg(long, value_name = "VERSION")]
    runtime_version: String,
    /// Client platform.
    #[arg(long, value_enum)]
    platform: PlatformArg,
    /// Optional config file path (defaults to update-relay.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Platform selector for CLI arguments.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PlatformArg {
    /// iOS clients.
    Ios,
    /// Android clients.
    Android,
}

impl From<PlatformArg> for Platform {
    fn from(value: PlatformArg) -> Self {
        match value {
            PlatformArg::Ios => Self::Ios,
            PlatformArg::Android => Self::Android,
        }
    }
}

/// JSON report printed by `resolve`.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct ResolveReport {
    /// Bundle directory.
    bundle: String,
    /// `normal` or `rollback`.
    update_type: &'static str,
    /// Manifest id for normal bundles.
    update_id: Option<String>,
}

impl From<Resolution> for ResolveReport {
    fn from(value: Resolution) -> Self {
        Self {
            bundle: value.bundle.as_str().to_string(),
            update_type: match value.update_type {
                UpdateType::Normal => "normal",
                UpdateType::Rollback => "rollback",
            },
            update_id: value.update_id,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying the operator-facing message.
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
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Check(command) => command_config_check(&command),
        },
        Commands::Resolve(command) => command_resolve(command).await,
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let mut config = load_config(command.config)?;
    if let Some(bind) = command.bind {
        config.server.bind = bind;
    }
    let server = UpdateRelayServer::from_config(config)
        .await
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `config check` command.
fn command_config_check(command: &ConfigCheckCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.clone())?;
    for line in config_summary(&config) {
        write_stdout_line(&line).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes the `resolve` command.
async fn command_resolve(command: ResolveCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config)?;
    let runtime_version = RuntimeVersion::parse(&command.runtime_version)
        .map_err(|err| CliError::new(format!("invalid runtime version: {err}")))?;
    let logger = build_logger(&config.logging).map_err(|err| CliError::new(err.to_string()))?;
    let store = connect_blob_store(&config.storage, &StorageDeps::new(logger.clone()))
        .await
        .map_err(|err| CliError::new(format!("storage connect failed: {err}")))?;
    let service = service_for_store(&config, store, CodeSigner::disabled(), logger);
    let resolution = service
        .resolve(&runtime_version, command.platform.into())
        .await
        .map_err(|err| CliError::new(format!("resolve failed: {err}")))?;
    let report = ResolveReport::from(resolution);
    let json = serde_json::to_string_pretty(&report)
        .map_err(|err| CliError::new(format!("report serialization failed: {err}")))?;
    write_stdout_line(&json).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates configuration.
fn load_config(path: Option<PathBuf>) -> CliResult<RelayConfig> {
    RelayConfig::load(path.as_deref())
        .map_err(|err| CliError::new(format!("config load failed: {err}")))
}

/// Renders the lines printed by `config check`.
fn config_summary(config: &RelayConfig) -> Vec<String> {
    let source = config
        .source_path
        .as_ref()
        .map_or_else(|| "<inline>".to_string(), |path| path.display().to_string());
    vec![
        format!("config ok: {source}"),
        format!("bind: {}", config.server.bind),
        format!("public host: {}", config.server.public_host),
        format!("storage: {} bucket {}", config.storage.provider.as_str(), config.storage.bucket),
        format!(
            "signing: {}",
            if config.signing.private_key_path.is_some() { "enabled" } else { "disabled" }
        ),
    ]
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
