//! Audit Kernel Core - table ingestion, detection and hex risk mapping
//!
//! The main entry point for ak-core, handling:
//! - One-shot audits: schema + rows + detection requests → JSON report
//! - The detection function catalog
//! - Configuration validation
//! - Synthetic ledger generation for testing

use ak_common::error::format_error_human;
use ak_common::{
    sort_findings, Error, Finding, OutputFormat, Severity, SessionId, StructuredError,
    SCHEMA_VERSION,
};
use ak_config::{load_config, ConfigError, ConfigSnapshot, ResolvedConfig, CONFIG_SCHEMA_VERSION};
use ak_core::detect::DetectionRequest;
use ak_core::exit_codes::ExitCode;
use ak_core::hexfield::RiskLevel;
use ak_core::logging::{event_names, init_logging, LogConfig, LogFormat, LogLevel, Stage};
use ak_core::synth::{LedgerBuilder, DEFAULT_SEED};
use ak_core::Kernel;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::io::{BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};

/// Audit Kernel Core - in-memory tabular anomaly detection
#[derive(Parser)]
#[command(name = "ak-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to a kernel.toml / kernel.json configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log record format on stderr: human or jsonl
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a table, run detections, and map findings onto the hex field
    Audit(AuditArgs),

    /// List registered detection functions and their parameters
    Catalog,

    /// Resolve and validate configuration
    CheckConfig(CheckConfigArgs),

    /// Print the JSON Schema of the table definition document
    Schema,

    /// Emit synthetic ledger rows as JSONL
    Synth(SynthArgs),

    /// Print version information
    Version,
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct AuditArgs {
    /// Table definition: {name, fields: [{name, type, primary_key, indexed, nullable}]}
    #[arg(long)]
    schema: PathBuf,

    /// Rows as a JSON array or JSONL
    #[arg(long)]
    rows: PathBuf,

    /// Detection requests: a JSON array of {function, params}
    #[arg(long)]
    requests: Option<PathBuf>,

    /// Extra detection request: '{"function":..,"params":..}', 'NAME' or 'NAME:{params}'
    #[arg(long = "detect", value_name = "REQUEST")]
    detect: Vec<String>,

    /// Hex cell radius (defaults to the configured radius)
    #[arg(long)]
    radius: Option<f64>,

    /// Advance the logical clock by this many ticks before mapping
    #[arg(long, default_value_t = 0)]
    advance_ticks: u64,

    /// Override the per-detection timeout
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: Option<u64>,

    /// Override the worker bound
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=256))]
    max_workers: Option<u64>,
}

#[derive(Args, Debug)]
struct CheckConfigArgs {
    /// Config file to validate (defaults to --config / AK_CONFIG / XDG)
    path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SynthArgs {
    /// Number of rows
    #[arg(long, default_value_t = 1000)]
    rows: usize,

    /// RNG seed
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Row pairs sharing an identical (vendor, amount)
    #[arg(long, default_value_t = 0)]
    duplicates: usize,

    /// Distinct vendor names to draw from
    #[arg(long, default_value_t = 250)]
    vendors: usize,
}

fn main() {
    let cli = Cli::parse();

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let exit_code = match cli.command {
        None | Some(Commands::Version) => {
            print_version(&cli.global);
            ExitCode::Clean
        }
        Some(Commands::Audit(args)) => run_audit(&cli.global, &args),
        Some(Commands::Catalog) => run_catalog(&cli.global),
        Some(Commands::CheckConfig(args)) => run_check_config(&cli.global, &args),
        Some(Commands::Schema) => {
            println!("{:#}", ak_common::schema::table_definition_schema());
            ExitCode::Clean
        }
        Some(Commands::Synth(args)) => run_synth(&args),
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// audit
// ============================================================================

/// Per-request outcome in the audit report.
#[derive(Debug, Serialize)]
struct DetectionOutcome {
    function: String,
    status: &'static str,
    findings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<StructuredError>,
}

fn run_audit(global: &GlobalOpts, args: &AuditArgs) -> ExitCode {
    match audit(global, args) {
        Ok((report, code)) => {
            emit_report(global, &report);
            code
        }
        Err(err) => output_error(global, &err),
    }
}

fn audit(global: &GlobalOpts, args: &AuditArgs) -> Result<(JsonValue, ExitCode), Error> {
    let session_id = SessionId::new();
    let mut resolved = load_config(global.config.as_deref())?;
    if let Some(ms) = args.timeout_ms {
        resolved.config.detection_timeout_ms = ms;
        resolved.overrides.push(format!("--timeout-ms={ms}"));
    }
    if let Some(n) = args.max_workers {
        resolved.config.max_workers = n as usize;
        resolved.overrides.push(format!("--max-workers={n}"));
    }
    log_config_loaded(&resolved);
    let kernel = Kernel::new(resolved.config.clone())?;

    let definition: JsonValue = serde_json::from_str(&std::fs::read_to_string(&args.schema)?)?;
    let handle = kernel.create_table_from_json(&definition)?;
    let rows = parse_rows(&std::fs::read_to_string(&args.rows)?)?;
    let ingest = kernel.load_rows(handle, &rows)?;

    let mut requests = match &args.requests {
        Some(path) => parse_requests(&std::fs::read_to_string(path)?)?,
        None => Vec::new(),
    };
    for spec in &args.detect {
        requests.push(parse_detect(spec)?);
    }

    let mut code = ExitCode::Clean;
    let mut findings: Vec<Finding> = Vec::new();
    let mut outcomes = Vec::with_capacity(requests.len());
    for (request, result) in requests.iter().zip(kernel.run_many(handle, &requests)) {
        match result {
            Ok(found) => {
                outcomes.push(DetectionOutcome {
                    function: request.function.clone(),
                    status: "ok",
                    findings: found.len(),
                    error: None,
                });
                findings.extend(found);
            }
            Err(err) => {
                code = worse(code, ExitCode::from_detection(&err));
                outcomes.push(DetectionOutcome {
                    function: request.function.clone(),
                    status: if matches!(err, ak_common::DetectionError::Timeout { .. }) {
                        "timeout"
                    } else {
                        "error"
                    },
                    findings: 0,
                    error: Some(StructuredError::from(&Error::Detection(err))),
                });
            }
        }
    }
    sort_findings(&mut findings);
    if !findings.is_empty() {
        code = worse(code, ExitCode::FindingsPresent);
    }

    kernel.advance_clock(args.advance_ticks);
    let hex_map = kernel.map_findings(&findings, args.radius);
    let table = kernel.describe(handle)?;
    let red_regions = hex_map.at_least(RiskLevel::Red).count();
    let yellow_regions = hex_map.at_least(RiskLevel::Yellow).count() - red_regions;

    tracing::info!(
        event = event_names::AUDIT_FINISHED,
        stage = %Stage::Report,
        findings = findings.len(),
        red_regions,
        exit_code = %code,
        "audit finished"
    );

    let report = json!({
        "schema_version": SCHEMA_VERSION,
        "session_id": session_id.0,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "exit_code": code.as_i32(),
        "table": table,
        "ingest": ingest,
        "detections": outcomes,
        "findings": findings,
        "risk": {"red_regions": red_regions, "yellow_regions": yellow_regions},
        "hex_map": hex_map,
        "metrics": kernel.metrics().snapshot(),
        "config": ConfigSnapshot::new(&resolved),
    });
    Ok((report, code))
}

/// Exit code precedence: timeout, internal, argument errors, findings, clean.
fn worse(a: ExitCode, b: ExitCode) -> ExitCode {
    fn rank(code: ExitCode) -> u8 {
        match code {
            ExitCode::TimeoutError => 5,
            ExitCode::InternalError | ExitCode::IoError => 4,
            ExitCode::ArgsError | ExitCode::ConfigError | ExitCode::SchemaError => 3,
            ExitCode::FindingsPresent => 1,
            ExitCode::Clean => 0,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

fn parse_rows(raw: &str) -> Result<Vec<JsonValue>, serde_json::Error> {
    if raw.trim_start().starts_with('[') {
        return serde_json::from_str(raw);
    }
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect()
}

fn parse_requests(raw: &str) -> Result<Vec<DetectionRequest>, serde_json::Error> {
    let value: JsonValue = serde_json::from_str(raw)?;
    if value.is_array() {
        serde_json::from_value(value)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}

fn parse_detect(spec: &str) -> Result<DetectionRequest, serde_json::Error> {
    let spec = spec.trim();
    if spec.starts_with('{') {
        return serde_json::from_str(spec);
    }
    match spec.split_once(':') {
        Some((name, params)) => Ok(DetectionRequest::new(
            name.trim(),
            serde_json::from_str(params)?,
        )),
        None => Ok(DetectionRequest::new(spec, JsonValue::Null)),
    }
}

fn emit_report(global: &GlobalOpts, report: &JsonValue) {
    match global.format {
        OutputFormat::Json => println!("{report:#}"),
        OutputFormat::Jsonl => {
            for section in [
                "table",
                "ingest",
                "detections",
                "hex_map",
                "metrics",
                "config",
            ] {
                println!(
                    "{}",
                    json!({
                        "type": section,
                        "session_id": report["session_id"],
                        "data": report[section],
                    })
                );
            }
            if let Some(findings) = report["findings"].as_array() {
                for finding in findings {
                    println!(
                        "{}",
                        json!({
                            "type": "finding",
                            "session_id": report["session_id"],
                            "data": finding,
                        })
                    );
                }
            }
        }
        OutputFormat::Summary => println!("{}", summary_line(report)),
    }
}

fn summary_line(report: &JsonValue) -> String {
    let findings = report["findings"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    let critical = findings
        .iter()
        .filter(|f| f["severity"] == json!(Severity::Critical))
        .count();
    let red = report["risk"]["red_regions"].as_u64().unwrap_or(0);
    format!(
        "[{}] audit: {} accepted, {} rejected, {} findings ({} critical), {} red regions",
        report["session_id"].as_str().unwrap_or_default(),
        report["ingest"]["accepted"],
        report["ingest"]["rejected"].as_array().map_or(0, Vec::len),
        findings.len(),
        critical,
        red
    )
}

// ============================================================================
// catalog / check-config / synth / version
// ============================================================================

fn run_catalog(global: &GlobalOpts) -> ExitCode {
    let catalog = Kernel::with_defaults().catalog();
    match global.format {
        OutputFormat::Json => println!("{:#}", json!({ "functions": catalog })),
        OutputFormat::Jsonl => {
            for entry in &catalog {
                println!("{}", json!(entry));
            }
        }
        OutputFormat::Summary => {
            let names: Vec<&str> = catalog.iter().map(|e| e.name.as_str()).collect();
            println!("{}", names.join(" "));
        }
    }
    ExitCode::Clean
}

fn run_check_config(global: &GlobalOpts, args: &CheckConfigArgs) -> ExitCode {
    let session_id = SessionId::new();
    let path: Option<&Path> = args.path.as_deref().or(global.config.as_deref());

    match load_config(path) {
        Ok(resolved) => {
            log_config_loaded(&resolved);
            let response = json!({
                "schema_version": SCHEMA_VERSION,
                "session_id": session_id.0,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "status": "valid",
                "source": resolved.source.to_string(),
                "config": resolved.config,
                "snapshot": ConfigSnapshot::new(&resolved),
            });
            match global.format {
                OutputFormat::Json => println!("{response:#}"),
                OutputFormat::Jsonl => println!("{response}"),
                OutputFormat::Summary => {
                    println!("[{}] config: OK ({})", session_id, resolved.source)
                }
            }
            ExitCode::Clean
        }
        Err(err) => output_config_error(global, err),
    }
}

fn log_config_loaded(resolved: &ResolvedConfig) {
    tracing::info!(
        event = event_names::CONFIG_LOADED,
        stage = %Stage::Init,
        source = %resolved.source,
        path = ?resolved.path,
        max_workers = resolved.config.max_workers,
        detection_timeout_ms = resolved.config.detection_timeout_ms,
        "configuration loaded"
    );
}

fn run_synth(args: &SynthArgs) -> ExitCode {
    let rows = LedgerBuilder::new()
        .rows(args.rows)
        .seed(args.seed)
        .vendors(args.vendors)
        .duplicates(args.duplicates)
        .build();

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for row in &rows {
        if let Err(e) = writeln!(out, "{row}") {
            return output_io_error(&e);
        }
    }
    match out.flush() {
        Ok(()) => ExitCode::Clean,
        Err(e) => output_io_error(&e),
    }
}

fn print_version(global: &GlobalOpts) {
    let version_info = json!({
        "schema_version": SCHEMA_VERSION,
        "config_schema_version": CONFIG_SCHEMA_VERSION,
        "ak_core_version": env!("CARGO_PKG_VERSION"),
        "rust_version": env!("CARGO_PKG_RUST_VERSION"),
    });

    match global.format {
        OutputFormat::Json => println!("{version_info:#}"),
        OutputFormat::Jsonl => println!("{version_info}"),
        OutputFormat::Summary => {
            println!("ak-core {}", env!("CARGO_PKG_VERSION"));
        }
    }
}

// ============================================================================
// Error output
// ============================================================================

/// Output an error in the appropriate format and pick the exit code.
fn output_error(global: &GlobalOpts, error: &Error) -> ExitCode {
    let exit_code = ExitCode::from_error(error);
    tracing::error!(
        event = event_names::COMMAND_FAILED,
        code = error.code(),
        error = %error,
        exit_code = %exit_code,
        "command failed"
    );

    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            let response = json!({
                "schema_version": SCHEMA_VERSION,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "status": "error",
                "exit_code": exit_code.as_i32(),
                "error": StructuredError::from(error),
            });
            eprintln!("{response:#}");
        }
        OutputFormat::Summary => {
            eprintln!("{}", format_error_human(error, std::io::stderr().is_terminal()));
        }
    }
    exit_code
}

fn output_config_error(global: &GlobalOpts, error: ConfigError) -> ExitCode {
    tracing::error!(
        event = event_names::CONFIG_ERROR,
        code = error.code(),
        error = %error,
        "configuration rejected"
    );
    output_error(global, &Error::from(error))
}

fn output_io_error(err: &std::io::Error) -> ExitCode {
    // A closed pipe (e.g. `| head`) is not a failure.
    if err.kind() == std::io::ErrorKind::BrokenPipe {
        return ExitCode::Clean;
    }
    eprintln!("ak-core: write failed: {err}");
    ExitCode::IoError
}
