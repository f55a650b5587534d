//! Handsel CLI - Command-line interface for the Handsel gesture engine
//!
//! Commands:
//! - replay: Run an observation trace through the engine (deterministic)
//! - classify: Per-frame finger classification without the state machine
//! - validate: Validate observation trace records
//! - doctor: Diagnose engine configuration and environment
//! - schema: Print trace and event format information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use handsel::config::{DEFAULT_HISTORY_SIZE, DEFAULT_STABLE_MS, DEFAULT_VOTE_THRESHOLD};
use handsel::types::TimedEvent;
use handsel::{
    parse_ndjson, replay_trace, EngineConfig, EngineError, FingerClassifier, ObservationRecord,
    StabilityMode, ENGINE_VERSION, PRODUCER_NAME,
};

/// Handsel - Dwell-gesture selection engine for hand-tracking frontends
#[derive(Parser)]
#[command(name = "handsel")]
#[command(author = "Handsel Maintainers")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Replay and inspect dwell-gesture observation traces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an observation trace through the engine (deterministic)
    Replay {
        /// Input trace path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Engine configuration file (JSON, partial documents allowed)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the stability strategy
        #[arg(long)]
        strategy: Option<StrategyArg>,

        /// Override the open-palm wake dwell (ms)
        #[arg(long)]
        wake_ms: Option<u64>,

        /// Override the selection dwell (ms)
        #[arg(long)]
        select_ms: Option<u64>,

        /// Override the confirmation dwell (ms)
        #[arg(long)]
        confirm_ms: Option<u64>,

        /// Override the hand-loss grace period (ms)
        #[arg(long)]
        grace_ms: Option<u64>,

        /// Override the tick interval (ms)
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Per-frame finger classification without the state machine
    Classify {
        /// Input trace path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Engine configuration file (JSON, partial documents allowed)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Validate observation trace records
    Validate {
        /// Input trace path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose engine configuration and environment
    Doctor {
        /// Check a configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print trace and event format information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Accept a value once it has been unchanged for stable_ms
    Hold,
    /// Accept the plurality value of a sliding observation window
    Vote,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (observation.trace.v1)
    Input,
    /// Output schema (engine.event.v1)
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Engine diagnostics go to stderr so piped NDJSON output stays clean;
    // RUST_LOG=handsel=debug shows per-tick state machine activity.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "handsel=warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), HandselCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            config,
            strategy,
            wake_ms,
            select_ms,
            confirm_ms,
            grace_ms,
            tick_ms,
            output_format,
        } => {
            let config = build_config(
                config.as_deref(),
                strategy,
                wake_ms,
                select_ms,
                confirm_ms,
                grace_ms,
                tick_ms,
            )?;
            cmd_replay(&input, &output, config, output_format)
        }

        Commands::Classify {
            input,
            output,
            config,
            output_format,
        } => {
            let config = build_config(config.as_deref(), None, None, None, None, None, None)?;
            cmd_classify(&input, &output, config, output_format)
        }

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn cmd_replay(
    input: &PathBuf,
    output: &PathBuf,
    config: EngineConfig,
    output_format: OutputFormat,
) -> Result<(), HandselCliError> {
    let input_data = read_input(input)?;
    let records = parse_ndjson(&input_data)?;

    if records.is_empty() {
        return Err(HandselCliError::NoRecords);
    }

    let events: Vec<TimedEvent> = replay_trace(&records, config)?;
    let output_data = format_records(&events, &output_format)?;
    write_output(output, &output_data)
}

fn cmd_classify(
    input: &PathBuf,
    output: &PathBuf,
    config: EngineConfig,
    output_format: OutputFormat,
) -> Result<(), HandselCliError> {
    let input_data = read_input(input)?;
    let records: Vec<ObservationRecord> = parse_ndjson(&input_data)?;

    if records.is_empty() {
        return Err(HandselCliError::NoRecords);
    }

    let classifier = FingerClassifier::new(&config);
    let mut frames: Vec<ClassifiedFrame> = Vec::with_capacity(records.len());

    for record in &records {
        match record.landmarks()? {
            Some(hand) => {
                let raw = classifier.classify(&hand);
                frames.push(ClassifiedFrame {
                    t_ms: record.t_ms,
                    hand_detected: true,
                    finger_count: Some(raw.finger_count),
                    is_palm: Some(raw.is_palm),
                });
            }
            None => frames.push(ClassifiedFrame {
                t_ms: record.t_ms,
                hand_detected: false,
                finger_count: None,
                is_palm: None,
            }),
        }
    }

    let output_data = format_records(&frames, &output_format)?;
    write_output(output, &output_data)
}

fn cmd_validate(input: &PathBuf, json: bool) -> Result<(), HandselCliError> {
    let input_data = read_input(input)?;
    let records = parse_ndjson(&input_data)?;
    let report = build_validation_report(&records);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);
        println!("Detected frames: {}", report.detected_frames);
        println!("Lost frames:     {}", report.lost_frames);
        println!("Duration:        {} ms", report.duration_ms);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Record {} ({} ms): {}", err.index, err.t_ms, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(HandselCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

/// Run the same checks as `validate_trace`, collected per record instead
/// of failing on the first problem. A record with several problems is
/// still a single invalid record.
fn build_validation_report(records: &[ObservationRecord]) -> ValidationReport {
    let mut errors: Vec<ValidationErrorDetail> = Vec::new();
    let mut invalid = 0usize;
    let mut detected = 0usize;
    let mut prev_ms: Option<u64> = None;

    for (index, record) in records.iter().enumerate() {
        let errors_before = errors.len();
        if let Err(e) = record.validate() {
            errors.push(ValidationErrorDetail {
                index,
                t_ms: record.t_ms,
                error: e.to_string(),
            });
        }
        if let Some(prev) = prev_ms {
            if record.t_ms < prev {
                errors.push(ValidationErrorDetail {
                    index,
                    t_ms: record.t_ms,
                    error: format!("timestamps out of order: {} after {}", record.t_ms, prev),
                });
            }
        }
        if errors.len() > errors_before {
            invalid += 1;
        }
        prev_ms = Some(record.t_ms);
        if record.hand.is_some() {
            detected += 1;
        }
    }

    ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - invalid,
        invalid_records: invalid,
        detected_frames: detected,
        lost_frames: records.len() - detected,
        duration_ms: prev_ms.unwrap_or(0),
        errors,
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), HandselCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    // Check Handsel version
    checks.push(DoctorCheck {
        name: "handsel_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Handsel version {}", ENGINE_VERSION),
    });

    // Check configuration
    let loaded = match config {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => match EngineConfig::from_json(&content) {
                Ok(c) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Configuration valid (strategy={}, wake={}ms, select={}ms, confirm={}ms)",
                            c.stability.as_str(),
                            c.wake_ms,
                            c.select_ms,
                            c.confirm_ms
                        ),
                    });
                    Some(c)
                }
                Err(e) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid configuration: {}", e),
                    });
                    None
                }
            },
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read configuration file: {}", e),
                });
                None
            }
        },
        None => {
            let c = EngineConfig::default();
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Using built-in defaults (strategy={}, wake={}ms, select={}ms, confirm={}ms)",
                    c.stability.as_str(),
                    c.wake_ms,
                    c.select_ms,
                    c.confirm_ms
                ),
            });
            Some(c)
        }
    };

    // Check tick granularity: dwells that are not tick multiples complete
    // on the tick after their nominal deadline.
    if let Some(c) = &loaded {
        let misaligned: Vec<&str> = [
            ("wake_ms", c.wake_ms),
            ("select_ms", c.select_ms),
            ("confirm_ms", c.confirm_ms),
        ]
        .iter()
        .filter(|(_, ms)| ms % c.tick_ms != 0)
        .map(|(name, _)| *name)
        .collect();

        if misaligned.is_empty() {
            checks.push(DoctorCheck {
                name: "tick_alignment".to_string(),
                status: CheckStatus::Ok,
                message: format!("Tick interval {}ms divides all dwell durations", c.tick_ms),
            });
        } else {
            checks.push(DoctorCheck {
                name: "tick_alignment".to_string(),
                status: CheckStatus::Warning,
                message: format!(
                    "Not multiples of the {}ms tick: {} (completion lands on the next tick)",
                    c.tick_ms,
                    misaligned.join(", ")
                ),
            });
        }
    }

    // Check stdin is available (for piped traces)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (trace streaming ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Handsel Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(HandselCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), HandselCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: observation.trace.v1");
                println!();
                println!("One JSON record per line (NDJSON), timestamps non-decreasing:");
                println!();
                println!("  {{\"t_ms\": 1250, \"hand\": [{{\"x\": 0.42, \"y\": 0.61, \"z\": 0.0}}, ...]}}");
                println!("  {{\"t_ms\": 1300, \"hand\": null}}");
                println!();
                println!("- t_ms: milliseconds on the trace clock");
                println!("- hand: exactly 21 landmarks, or null when the frame had no hand");
                println!("- x, y: normalized image coordinates; z is optional (default 0.0)");
                println!();
                println!("Landmark indices follow the MediaPipe Hands convention:");
                println!("  0 wrist, 1-4 thumb, 5-8 index, 9-12 middle,");
                println!("  13-16 ring, 17-20 pinky (each run ends at the fingertip)");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output Schema: engine.event.v1");
                println!();
                println!("One JSON event per line (NDJSON), tagged by \"event\":");
                println!();
                println!("  {{\"t_ms\": 1850, \"event\": \"progress\", \"ratio\": 0.25}}");
                println!("  {{\"t_ms\": 2200, \"event\": \"state_changed\", \"state\": \"select_hold\"}}");
                println!("  {{\"t_ms\": 5350, \"event\": \"activated\", \"selection\": 3}}");
                println!();
                println!("- progress: dwell completion for the active timer, 0.0 through 1.0");
                println!("- state_changed: the machine entered a new state");
                println!("  states: idle, select_hold, confirm, activated, error");
                println!("  selection appears once a finger count is locked in");
                println!("- activated: the selection was delivered; exactly once per cycle");
            }
        }
    }

    Ok(())
}

// Helper functions

#[allow(clippy::too_many_arguments)]
fn build_config(
    config_path: Option<&Path>,
    strategy: Option<StrategyArg>,
    wake_ms: Option<u64>,
    select_ms: Option<u64>,
    confirm_ms: Option<u64>,
    grace_ms: Option<u64>,
    tick_ms: Option<u64>,
) -> Result<EngineConfig, HandselCliError> {
    let mut config = match config_path {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };

    if let Some(strategy) = strategy {
        config.stability = match strategy {
            StrategyArg::Hold => StabilityMode::Hold {
                stable_ms: DEFAULT_STABLE_MS,
            },
            StrategyArg::Vote => StabilityMode::Vote {
                history: DEFAULT_HISTORY_SIZE,
                threshold: DEFAULT_VOTE_THRESHOLD,
            },
        };
    }
    if let Some(ms) = wake_ms {
        config.wake_ms = ms;
    }
    if let Some(ms) = select_ms {
        config.select_ms = ms;
    }
    if let Some(ms) = confirm_ms {
        config.confirm_ms = ms;
    }
    if let Some(ms) = grace_ms {
        config.grace_ms = ms;
    }
    if let Some(ms) = tick_ms {
        config.tick_ms = ms;
    }

    config.validate()?;
    Ok(config)
}

fn read_input(input: &PathBuf) -> Result<String, HandselCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &PathBuf, data: &str) -> Result<(), HandselCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn format_records<T: serde::Serialize>(
    records: &[T],
    format: &OutputFormat,
) -> Result<String, HandselCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://handsel.dev/schemas/observation.trace.v1.json",
        "title": "observation.trace.v1",
        "description": "Handsel observation trace record",
        "type": "object",
        "required": ["t_ms", "hand"],
        "properties": {
            "t_ms": {
                "type": "integer",
                "minimum": 0,
                "description": "Milliseconds on the trace clock, non-decreasing"
            },
            "hand": {
                "oneOf": [
                    { "type": "null" },
                    {
                        "type": "array",
                        "minItems": 21,
                        "maxItems": 21,
                        "items": {
                            "type": "object",
                            "required": ["x", "y"],
                            "properties": {
                                "x": { "type": "number" },
                                "y": { "type": "number" },
                                "z": { "type": "number", "default": 0.0 }
                            }
                        }
                    }
                ]
            }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://handsel.dev/schemas/engine.event.v1.json",
        "title": "engine.event.v1",
        "description": "Handsel engine event, stamped with its tick time",
        "type": "object",
        "required": ["t_ms", "event"],
        "properties": {
            "t_ms": { "type": "integer", "minimum": 0 },
            "event": {
                "type": "string",
                "enum": ["progress", "state_changed", "activated"]
            },
            "ratio": {
                "type": "number",
                "minimum": 0.0,
                "maximum": 1.0,
                "description": "Present on progress events"
            },
            "state": {
                "type": "string",
                "enum": ["idle", "select_hold", "confirm", "activated", "error"],
                "description": "Present on state_changed events"
            },
            "selection": {
                "type": "integer",
                "minimum": 1,
                "maximum": 5,
                "description": "Present on activated events, and on state_changed once locked"
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum HandselCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for HandselCliError {
    fn from(e: io::Error) -> Self {
        HandselCliError::Io(e)
    }
}

impl From<EngineError> for HandselCliError {
    fn from(e: EngineError) -> Self {
        HandselCliError::Engine(e)
    }
}

impl From<serde_json::Error> for HandselCliError {
    fn from(e: serde_json::Error) -> Self {
        HandselCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HandselCliError> for CliError {
    fn from(e: HandselCliError) -> Self {
        match e {
            HandselCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HandselCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'handsel validate' to inspect the trace".to_string()),
            },
            HandselCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HandselCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No observation records found in input".to_string(),
                hint: Some("Ensure input contains one record per line".to_string()),
            },
            HandselCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix the listed records and retry".to_string()),
            },
            HandselCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ClassifiedFrame {
    t_ms: u64,
    hand_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    finger_count: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_palm: Option<bool>,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    detected_frames: usize,
    lost_frames: usize,
    duration_ms: u64,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    t_ms: u64,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
