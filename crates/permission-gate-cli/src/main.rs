// crates/permission-gate-cli/src/main.rs
// ============================================================================
// Module: Permission Gate CLI Entry Point
// Description: Command dispatcher for permission evaluation and administration.
// Purpose: Provide a safe CLI over the permission service for local hosts.
// Dependencies: clap, permission-gate-config, permission-gate-core,
//               permission-gate-store-sqlite, serde, serde_jcs, thiserror
// ============================================================================

//! ## Overview
//! The Permission Gate CLI loads `permission-gate.toml`, opens the configured
//! store, and runs one command against the permission service: evaluate a
//! request, write grants or restrictions from JSON intents, revoke, inspect
//! sharing settings, or page and verify the audit log. Results are written to
//! stdout as canonical JSON. Security posture: inputs are untrusted; JSON
//! inputs are size-limited and every write goes through the standing checks.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use permission_gate_config::ObservabilityConfig;
use permission_gate_config::ObservabilitySink;
use permission_gate_config::PermissionGateConfig;
use permission_gate_config::config_toml_example;
use permission_gate_core::ActionKind;
use permission_gate_core::ClientMetadata;
use permission_gate_core::DataSharingIntent;
use permission_gate_core::EvaluationRequest;
use permission_gate_core::FileJsonObserver;
use permission_gate_core::InMemoryPermissionStore;
use permission_gate_core::InstrumentKey;
use permission_gate_core::MutationContext;
use permission_gate_core::NoopObserver;
use permission_gate_core::PermissionObserver;
use permission_gate_core::PermissionService;
use permission_gate_core::PermissionStore;
use permission_gate_core::ResourceKind;
use permission_gate_core::RestrictionId;
use permission_gate_core::RestrictionIntent;
use permission_gate_core::RuleId;
use permission_gate_core::StderrJsonObserver;
use permission_gate_core::SystemClock;
use permission_gate_core::TradingGrantIntent;
use permission_gate_core::UserId;
use permission_gate_store_sqlite::SqlitePermissionStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a JSON intent input.
const MAX_INTENT_BYTES: usize = 1024 * 1024;
/// Exit code returned when an evaluation denies the request.
const DENIED_EXIT_CODE: u8 = 2;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "permission-gate", version, disable_help_subcommand = true)]
struct Cli {
    /// Optional config file path (defaults to permission-gate.toml or env override).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate whether an actor may perform an action.
    Evaluate(EvaluateCommand),
    /// Share the grantor's data from a JSON data-sharing intent.
    Share(IntentCommand),
    /// Trading authority utilities.
    Trade {
        /// Selected trade subcommand.
        #[command(subcommand)]
        command: TradeCommand,
    },
    /// Impose restrictions from a JSON restriction intent.
    Restrict(IntentCommand),
    /// Revocation utilities.
    Revoke {
        /// Selected revoke subcommand.
        #[command(subcommand)]
        command: RevokeCommand,
    },
    /// Show the grantor's data-sharing settings per resource.
    Settings(SettingsCommand),
    /// Show who may view the grantor's data for one resource.
    Viewers(ViewersCommand),
    /// List active restrictions imposed on a user.
    Restrictions(RestrictionsCommand),
    /// Audit log utilities.
    Audit {
        /// Selected audit subcommand.
        #[command(subcommand)]
        command: AuditCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Trading authority subcommands.
#[derive(Subcommand, Debug)]
enum TradeCommand {
    /// Grant trading authority from a JSON trading grant intent.
    Grant(IntentCommand),
}

/// Revocation subcommands.
#[derive(Subcommand, Debug)]
enum RevokeCommand {
    /// Revoke a permission rule.
    Rule(RevokeRuleCommand),
    /// Revoke a restriction.
    Restriction(RevokeRestrictionCommand),
}

/// Audit log subcommands.
#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// List audit entries, newest first.
    List(AuditListCommand),
    /// Verify the audit hash chain.
    Verify,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a Permission Gate configuration file.
    Validate,
    /// Print a canonical example configuration.
    Example,
}

/// Arguments for `evaluate`.
#[derive(Args, Debug)]
struct EvaluateCommand {
    /// Acting user.
    #[arg(long, value_parser = parse_user_id)]
    actor: UserId,
    /// Requested action (view, create, modify, exit, all).
    #[arg(long)]
    action: ActionKind,
    /// Target resource class (positions, holdings, orders, strategies, margins).
    #[arg(long)]
    resource: ResourceKind,
    /// Optional instrument key, such as `NSE:TCS`.
    #[arg(long, value_name = "KEY")]
    instrument: Option<String>,
    /// Owner of the target resource.
    #[arg(long, value_parser = parse_user_id)]
    owner: Option<UserId>,
    /// Bypass the evaluation cache.
    #[arg(long)]
    strict: bool,
}

/// Caller identity and audit metadata shared by mutating commands.
#[derive(Args, Debug)]
struct MutationArgs {
    /// Authenticated caller making the change.
    #[arg(long, value_parser = parse_user_id)]
    caller: UserId,
    /// Reason recorded in the audit log.
    #[arg(long)]
    reason: Option<String>,
    /// Client IP address recorded in the audit log.
    #[arg(long = "ip-address")]
    ip_address: Option<String>,
    /// Client user agent recorded in the audit log.
    #[arg(long = "user-agent")]
    user_agent: Option<String>,
}

/// Arguments for intent-driven writes.
#[derive(Args, Debug)]
struct IntentCommand {
    /// Caller and audit metadata.
    #[command(flatten)]
    mutation: MutationArgs,
    /// Path to the JSON intent.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
}

/// Arguments for `revoke rule`.
#[derive(Args, Debug)]
struct RevokeRuleCommand {
    /// Caller and audit metadata.
    #[command(flatten)]
    mutation: MutationArgs,
    /// Rule identifier.
    #[arg(long, value_parser = parse_rule_id)]
    id: RuleId,
}

/// Arguments for `revoke restriction`.
#[derive(Args, Debug)]
struct RevokeRestrictionCommand {
    /// Caller and audit metadata.
    #[command(flatten)]
    mutation: MutationArgs,
    /// Restriction identifier.
    #[arg(long, value_parser = parse_restriction_id)]
    id: RestrictionId,
}

/// Arguments for `settings`.
#[derive(Args, Debug)]
struct SettingsCommand {
    /// Grantor whose settings are shown.
    #[arg(long, value_parser = parse_user_id)]
    grantor: UserId,
}

/// Arguments for `viewers`.
#[derive(Args, Debug)]
struct ViewersCommand {
    /// Grantor whose data is shared.
    #[arg(long, value_parser = parse_user_id)]
    grantor: UserId,
    /// Resource class.
    #[arg(long)]
    resource: ResourceKind,
}

/// Arguments for `restrictions`.
#[derive(Args, Debug)]
struct RestrictionsCommand {
    /// Restricted user.
    #[arg(long, value_parser = parse_user_id)]
    user: UserId,
}

/// Arguments for `audit list`.
#[derive(Args, Debug)]
struct AuditListCommand {
    /// Only entries where this user is actor or target.
    #[arg(long, value_parser = parse_user_id)]
    subject: Option<UserId>,
    /// Entries to skip.
    #[arg(long, default_value_t = 0)]
    offset: usize,
    /// Page size (defaults to the configured page size).
    #[arg(long)]
    limit: Option<usize>,
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
    /// Constructs a new [`CliError`] from a message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Errors raised by bounded file reads.
#[derive(Debug)]
enum ReadLimitError {
    /// File could not be read.
    Io(std::io::Error),
    /// File exceeds the size limit.
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if let Commands::Config {
        command: ConfigCommand::Example,
    } = cli.command
    {
        write_stdout_bytes(config_toml_example().as_bytes())
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = PermissionGateConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    if let Commands::Config {
        command: ConfigCommand::Validate,
    } = cli.command
    {
        write_json(&json!({ "status": "valid" }))?;
        return Ok(ExitCode::SUCCESS);
    }

    let service = open_service(&config)?;
    match cli.command {
        Commands::Evaluate(command) => command_evaluate(&service, command),
        Commands::Share(command) => {
            let intent: DataSharingIntent = read_intent(&command.input, "data sharing intent")?;
            let ids = service
                .grant_data_sharing(&mutation_context(command.mutation), &intent)
                .map_err(|err| CliError::new(format!("share failed: {err}")))?;
            write_json(&json!({ "rule_ids": ids }))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Trade {
            command: TradeCommand::Grant(command),
        } => {
            let intent: TradingGrantIntent = read_intent(&command.input, "trading grant intent")?;
            let ids = service
                .grant_trading(&mutation_context(command.mutation), &intent)
                .map_err(|err| CliError::new(format!("trade grant failed: {err}")))?;
            write_json(&json!({ "rule_ids": ids }))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Restrict(command) => {
            let intent: RestrictionIntent = read_intent(&command.input, "restriction intent")?;
            let ids = service
                .restrict_trading(&mutation_context(command.mutation), &intent)
                .map_err(|err| CliError::new(format!("restrict failed: {err}")))?;
            write_json(&json!({ "restriction_ids": ids }))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Revoke {
            command,
        } => command_revoke(&service, command),
        Commands::Settings(command) => {
            let settings = service
                .sharing_settings(command.grantor)
                .map_err(|err| CliError::new(format!("settings lookup failed: {err}")))?;
            write_json(&settings)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Viewers(command) => {
            let viewers = service
                .data_viewers(command.grantor, command.resource)
                .map_err(|err| CliError::new(format!("viewer lookup failed: {err}")))?;
            write_json(&viewers)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Restrictions(command) => {
            let restrictions = service
                .restrictions_for(command.user)
                .map_err(|err| CliError::new(format!("restriction lookup failed: {err}")))?;
            write_json(&restrictions)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Audit {
            command,
        } => command_audit(&service, command),
        Commands::Config {
            ..
        } => Ok(ExitCode::SUCCESS),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `evaluate` command.
fn command_evaluate(service: &PermissionService, command: EvaluateCommand) -> CliResult<ExitCode> {
    let mut request = EvaluationRequest::new(command.actor, command.action, command.resource);
    if let Some(instrument) = command.instrument {
        request = request.with_instrument(InstrumentKey::new(instrument));
    }
    if let Some(owner) = command.owner {
        request = request.with_owner(owner);
    }
    let result = if command.strict {
        service.evaluate_strict(&request)
    } else {
        service.evaluate(&request)
    }
    .map_err(|err| CliError::new(format!("evaluation failed: {err}")))?;
    write_json(&result)?;
    if result.allowed { Ok(ExitCode::SUCCESS) } else { Ok(ExitCode::from(DENIED_EXIT_CODE)) }
}

/// Executes the `revoke` subcommands.
fn command_revoke(service: &PermissionService, command: RevokeCommand) -> CliResult<ExitCode> {
    let outcome = match command {
        RevokeCommand::Rule(command) => {
            service.revoke(&mutation_context(command.mutation), command.id)
        }
        RevokeCommand::Restriction(command) => {
            service.revoke_restriction(&mutation_context(command.mutation), command.id)
        }
    }
    .map_err(|err| CliError::new(format!("revoke failed: {err}")))?;
    write_json(&json!({ "outcome": outcome }))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `audit` subcommands.
fn command_audit(service: &PermissionService, command: AuditCommand) -> CliResult<ExitCode> {
    match command {
        AuditCommand::List(command) => {
            let entries = service
                .list_audit_log(command.subject, command.offset, command.limit)
                .map_err(|err| CliError::new(format!("audit listing failed: {err}")))?;
            write_json(&entries)?;
        }
        AuditCommand::Verify => {
            let entries = service
                .verify_audit_log()
                .map_err(|err| CliError::new(format!("audit verification failed: {err}")))?;
            write_json(&json!({ "status": "pass", "entries": entries }))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Wiring
// ============================================================================

/// Opens the configured store and builds the permission service.
fn open_service(config: &PermissionGateConfig) -> CliResult<PermissionService> {
    let store: Arc<dyn PermissionStore> = match config.store.sqlite_config() {
        Some(sqlite) => Arc::new(
            SqlitePermissionStore::new(sqlite)
                .map_err(|err| CliError::new(format!("failed to open store: {err}")))?,
        ),
        None => Arc::new(InMemoryPermissionStore::new()),
    };
    let observer = build_observer(&config.observability)?;
    let service = PermissionService::new(
        store,
        Arc::new(config.identity_directory()),
        Arc::new(SystemClock),
        config.service_config(),
    );
    Ok(service.with_observer(observer))
}

/// Builds the configured structured event sink.
fn build_observer(config: &ObservabilityConfig) -> CliResult<Arc<dyn PermissionObserver>> {
    match (config.sink, &config.path) {
        (ObservabilitySink::Stderr, _) => Ok(Arc::new(StderrJsonObserver)),
        (ObservabilitySink::File, Some(path)) => {
            let observer = FileJsonObserver::new(path).map_err(|err| {
                CliError::new(format!("failed to open event log {}: {err}", path.display()))
            })?;
            Ok(Arc::new(observer))
        }
        _ => Ok(Arc::new(NoopObserver)),
    }
}

/// Builds the mutation context from caller arguments.
fn mutation_context(args: MutationArgs) -> MutationContext {
    let mut context = MutationContext::new(args.caller).with_client(ClientMetadata {
        ip_address: args.ip_address,
        user_agent: args.user_agent,
    });
    if let Some(reason) = args.reason {
        context = context.with_reason(reason);
    }
    context
}

// ============================================================================
// SECTION: Argument Parsers
// ============================================================================

/// Parses a non-zero identifier.
fn parse_nonzero(value: &str, label: &str) -> Result<u64, String> {
    let raw: u64 = value.trim().parse().map_err(|_| format!("{label} must be an integer"))?;
    if raw == 0 {
        return Err(format!("{label} must be greater than zero"));
    }
    Ok(raw)
}

/// Parses a user identifier argument.
fn parse_user_id(value: &str) -> Result<UserId, String> {
    let raw = parse_nonzero(value, "user id")?;
    UserId::from_raw(raw).ok_or_else(|| "user id must be greater than zero".to_string())
}

/// Parses a rule identifier argument.
fn parse_rule_id(value: &str) -> Result<RuleId, String> {
    let raw = parse_nonzero(value, "rule id")?;
    RuleId::from_raw(raw).ok_or_else(|| "rule id must be greater than zero".to_string())
}

/// Parses a restriction identifier argument.
fn parse_restriction_id(value: &str) -> Result<RestrictionId, String> {
    let raw = parse_nonzero(value, "restriction id")?;
    RestrictionId::from_raw(raw)
        .ok_or_else(|| "restriction id must be greater than zero".to_string())
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let metadata = file.metadata().map_err(ReadLimitError::Io)?;
    let size = metadata.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        let actual = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        return Err(ReadLimitError::TooLarge {
            size: actual,
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Reads and decodes a JSON intent file.
fn read_intent<T: DeserializeOwned>(path: &Path, kind: &str) -> CliResult<T> {
    let bytes = read_bytes_with_limit(path, MAX_INTENT_BYTES).map_err(|err| match err {
        ReadLimitError::Io(err) => {
            CliError::new(format!("failed to read {kind} {}: {err}", path.display()))
        }
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(format!(
            "{kind} {} exceeds size limit ({size} > {limit} bytes)",
            path.display()
        )),
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|err| CliError::new(format!("invalid {kind} {}: {err}", path.display())))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)
}

/// Writes a value to stdout as one line of canonical JSON.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let value: Value = serde_json::to_value(value)
        .map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    let mut bytes = serde_jcs::to_vec(&value)
        .map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
