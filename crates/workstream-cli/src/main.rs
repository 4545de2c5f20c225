// crates/workstream-cli/src/main.rs
// ============================================================================
// Module: Workstream Gate CLI Entry Point
// Description: Command dispatcher for serving and inspecting the gate.
// Purpose: Provide a safe CLI for the server and offline registry/audit tasks.
// Dependencies: clap, workstream-core, workstream-config, workstream-server, tokio.
// ============================================================================

//! ## Overview
//! The Workstream Gate CLI runs the HTTP server and offers read-only
//! inspection of configuration, the registry, permissions, and tenant audit
//! logs. Inspection commands never persist anything: an absent registry
//! document is reconstructed from the configured seeds in memory.
//!
//! Security posture: workstream names given on the command line pass the same
//! slug validation as request channels.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use thiserror::Error;
use workstream_config::WorkstreamGateConfig;
use workstream_config::config_toml_example;
use workstream_core::AuditLogEntry;
use workstream_core::AuditLogger;
use workstream_core::PathResolver;
use workstream_core::Permission;
use workstream_core::PermissionMatrix;
use workstream_core::Registry;
use workstream_core::WorkstreamDirectory;
use workstream_core::WorkstreamName;
use workstream_core::WorkstreamStatus;
use workstream_server::WorkstreamServer;
use workstream_server::build_ops_sink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of audit entries shown by `audit tail`.
const DEFAULT_TAIL_LIMIT: usize = 20;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Workstream Gate command line.
#[derive(Parser, Debug)]
#[command(name = "workstream-gate", version, disable_help_subcommand = true)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server.
    Serve(ConfigArgs),
    /// Configuration utilities.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Registry inspection.
    Registry {
        /// Registry subcommand.
        #[command(subcommand)]
        command: RegistryCommand,
    },
    /// Dry-run a permission check.
    Check(CheckCommand),
    /// Audit log inspection.
    Audit {
        /// Audit subcommand.
        #[command(subcommand)]
        command: AuditCommand,
    },
}

/// Config file selection shared by every command.
#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    /// Path to `workstream-gate.toml`.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a config file.
    Validate(ConfigArgs),
    /// Print the canonical example config.
    Example,
}

/// Registry subcommands.
#[derive(Subcommand, Debug)]
enum RegistryCommand {
    /// List registered workstreams.
    List(ConfigArgs),
    /// Show one workstream.
    Show(RegistryShowCommand),
}

/// Arguments for `registry show`.
#[derive(Args, Debug)]
struct RegistryShowCommand {
    /// Workstream name.
    #[arg(value_name = "WORKSTREAM")]
    workstream: String,
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
}

/// Arguments for `check`.
#[derive(Args, Debug)]
struct CheckCommand {
    /// Workstream name.
    #[arg(value_name = "WORKSTREAM")]
    workstream: String,
    /// Permission label.
    #[arg(value_name = "PERMISSION")]
    permission: Permission,
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
}

/// Audit subcommands.
#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Print the most recent entries of a tenant log.
    Tail(AuditTailCommand),
}

/// Arguments for `audit tail`.
#[derive(Args, Debug)]
struct AuditTailCommand {
    /// Workstream name.
    #[arg(value_name = "WORKSTREAM")]
    workstream: String,
    /// Maximum entries to print.
    #[arg(long, default_value_t = DEFAULT_TAIL_LIMIT)]
    limit: usize,
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
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
        Commands::Serve(args) => command_serve(args).await,
        Commands::Config {
            command,
        } => command_config(command),
        Commands::Registry {
            command,
        } => command_registry(command),
        Commands::Check(command) => command_check(&command),
        Commands::Audit {
            command,
        } => command_audit(command),
    }
}

// ============================================================================
// SECTION: Serve
// ============================================================================

/// Executes `serve`.
async fn command_serve(args: ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(&args)?;
    let server = tokio::task::spawn_blocking(move || WorkstreamServer::from_config(config))
        .await
        .map_err(|err| CliError::new(format!("server init failed: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(args) => {
            let _config = load_config(&args)?;
            write_stdout_line("config ok").map_err(|err| CliError::new(output_error(&err)))?;
        }
        ConfigCommand::Example => {
            write_stdout_line(config_toml_example().trim_end()).map_err(|err| CliError::new(output_error(&err)))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Registry Commands
// ============================================================================

/// Registry listing row.
#[derive(Debug, Serialize, PartialEq, Eq)]
struct RegistryRow {
    /// Workstream slug.
    name: String,
    /// Human-readable name.
    display_name: String,
    /// Lifecycle status.
    status: WorkstreamStatus,
    /// Granted permissions.
    allowed_operations: Vec<Permission>,
}

/// Dispatches registry subcommands.
fn command_registry(command: RegistryCommand) -> CliResult<ExitCode> {
    match command {
        RegistryCommand::List(args) => {
            let config = load_config(&args)?;
            let rows = registry_rows(&open_registry(&config)?);
            write_json(&rows)?;
        }
        RegistryCommand::Show(command) => {
            let config = load_config(&command.config)?;
            let name = parse_name(&command.workstream)?;
            let registry = open_registry(&config)?;
            let entry = registry
                .get(&name)
                .ok_or_else(|| CliError::new(format!("unknown workstream: {name}")))?;
            write_json(entry.as_ref())?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Builds listing rows in registry order.
fn registry_rows(registry: &Registry) -> Vec<RegistryRow> {
    registry
        .list()
        .iter()
        .map(|config| RegistryRow {
            name: config.name.to_string(),
            display_name: config.display_name.clone(),
            status: config.status,
            allowed_operations: config.allowed_operations.iter().copied().collect(),
        })
        .collect()
}

// ============================================================================
// SECTION: Permission Check
// ============================================================================

/// Output for `check`.
#[derive(Debug, Serialize, PartialEq, Eq)]
struct CheckReport {
    /// Workstream checked.
    workstream: String,
    /// Permission checked.
    permission: Permission,
    /// Matrix decision.
    allowed: bool,
}

/// Executes `check`; a denial exits with failure.
fn command_check(command: &CheckCommand) -> CliResult<ExitCode> {
    let config = load_config(&command.config)?;
    let report = check_permission(&config, &command.workstream, command.permission)?;
    write_json(&report)?;
    Ok(if report.allowed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Evaluates the permission matrix for a workstream.
fn check_permission(config: &WorkstreamGateConfig, workstream: &str, permission: Permission) -> CliResult<CheckReport> {
    let name = parse_name(workstream)?;
    let matrix = PermissionMatrix::new(Arc::new(open_registry(config)?));
    Ok(CheckReport {
        allowed: matrix.is_allowed(&name, permission),
        workstream: name.to_string(),
        permission,
    })
}

// ============================================================================
// SECTION: Audit Commands
// ============================================================================

/// Dispatches audit subcommands.
fn command_audit(command: AuditCommand) -> CliResult<ExitCode> {
    match command {
        AuditCommand::Tail(command) => {
            let config = load_config(&command.config)?;
            let entries = tail_audit(&config, &command.workstream, command.limit)?;
            for entry in &entries {
                let line = serde_json::to_string(entry)
                    .map_err(|err| CliError::new(format!("audit entry serialization failed: {err}")))?;
                write_stdout_line(&line).map_err(|err| CliError::new(output_error(&err)))?;
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Reads the most recent entries of a tenant log.
fn tail_audit(config: &WorkstreamGateConfig, workstream: &str, limit: usize) -> CliResult<Vec<AuditLogEntry>> {
    let name = parse_name(workstream)?;
    let ops = build_ops_sink(&config.server.ops_log).map_err(|err| CliError::new(err.to_string()))?;
    let logger = AuditLogger::new(PathResolver::new(Arc::new(open_registry(config)?)), ops);
    logger.read(&name, Some(limit)).map_err(|err| CliError::new(format!("audit read failed: {err}")))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates configuration.
fn load_config(args: &ConfigArgs) -> CliResult<WorkstreamGateConfig> {
    WorkstreamGateConfig::load(args.config.as_deref())
        .map_err(|err| CliError::new(format!("config load failed: {err}")))
}

/// Opens the registry without persisting anything.
fn open_registry(config: &WorkstreamGateConfig) -> CliResult<Registry> {
    let seeds = config.seed_configs().map_err(|err| CliError::new(err.to_string()))?;
    let path = config.storage.registry_file();
    let registry = if path.is_file() { Registry::open(&path, seeds) } else { Registry::from_configs(seeds) };
    registry.map_err(|err| CliError::new(format!("registry open failed: {err}")))
}

/// Validates a workstream name argument.
fn parse_name(candidate: &str) -> CliResult<WorkstreamName> {
    WorkstreamName::parse(candidate).map_err(|err| CliError::new(format!("invalid workstream name: {err}")))
}

/// Writes a value as pretty JSON to stdout.
fn write_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("output serialization failed: {err}")))?;
    write_stdout_line(&text).map_err(|err| CliError::new(output_error(&err)))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(error: &std::io::Error) -> String {
    format!("failed to write output: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
