//! Rhythm CLI - Command-line interface for Synheart Rhythm
//!
//! Commands:
//! - segment: Turn activity samples into sleep sessions
//! - expand: Redistribute daily activity totals into synthetic samples
//! - summary: Compute the sleep profile and energy curve
//! - validate: Report malformed activity samples
//! - doctor: Diagnose configuration and state files

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use synheart_rhythm::config::RhythmConfig;
use synheart_rhythm::encoder::RhythmEncoder;
use synheart_rhythm::pipeline::RhythmProcessor;
use synheart_rhythm::schema::{
    DailyActivityTotal, RawActivitySample, SampleAdapter, SCHEMA_VERSION,
};
use synheart_rhythm::segmenter::SleepSegmenter;
use synheart_rhythm::types::{Chronotype, SleepAnchors, TimeOfDay};
use synheart_rhythm::{PRODUCER_NAME, RHYTHM_VERSION};

/// Rhythm - Sleep inference and circadian energy engine
#[derive(Parser)]
#[command(name = "rhythm")]
#[command(author = "Synheart AI Inc")]
#[command(version = RHYTHM_VERSION)]
#[command(about = "Infer sleep and daily energy from activity data", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON); missing fields take defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Local calendar offset from UTC in minutes (overrides the config file)
    #[arg(long, global = true, allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn activity samples into sleep sessions
    Segment {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Redistribute daily activity totals into synthetic samples
    Expand {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Compute the sleep profile and energy curve
    Summary {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// What the input contains
        #[arg(long, default_value = "samples")]
        from: SummaryInput,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Habitual wake time (HH:MM)
        #[arg(long, default_value = "07:00")]
        wake: TimeOfDay,

        /// Habitual sleep time (HH:MM)
        #[arg(long, default_value = "23:00")]
        sleep: TimeOfDay,

        #[arg(long, default_value = "balanced")]
        chronotype: ChronotypeArg,

        /// Computation time (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        /// Load processor state from file before ingesting
        #[arg(long)]
        load_state: Option<PathBuf>,

        /// Save processor state to file after computing
        #[arg(long)]
        save_state: Option<PathBuf>,
    },

    /// Report malformed activity samples
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and state files
    Doctor {
        /// Check a saved processor state file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SummaryInput {
    /// Activity samples, segmented before computing
    Samples,
    /// Sleep sessions
    Sessions,
}

#[derive(Clone, Copy, ValueEnum)]
enum ChronotypeArg {
    Morning,
    Evening,
    Balanced,
}

impl From<ChronotypeArg> for Chronotype {
    fn from(value: ChronotypeArg) -> Self {
        match value {
            ChronotypeArg::Morning => Chronotype::Morning,
            ChronotypeArg::Evening => Chronotype::Evening,
            ChronotypeArg::Balanced => Chronotype::Balanced,
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

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

/// Log to stderr, filtered by `RUST_LOG` (default `warn`)
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), RhythmCliError> {
    let config = load_config(cli.config.as_deref(), cli.utc_offset_minutes)?;

    match cli.command {
        Commands::Segment {
            input,
            output,
            input_format,
            output_format,
        } => cmd_segment(&input, &output, input_format, output_format, &config),

        Commands::Expand {
            input,
            output,
            input_format,
            output_format,
        } => cmd_expand(&input, &output, input_format, output_format, &config),

        Commands::Summary {
            input,
            output,
            from,
            input_format,
            wake,
            sleep,
            chronotype,
            now,
            load_state,
            save_state,
        } => {
            let options = SummaryOptions {
                from,
                input_format,
                anchors: SleepAnchors { wake, sleep },
                chronotype: chronotype.into(),
                now: now.unwrap_or_else(Utc::now),
                load_state,
                save_state,
            };
            cmd_summary(&input, &output, options, config)
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { state, json } => {
            cmd_doctor(cli.config.as_deref(), state.as_deref(), json)
        }
    }
}

fn load_config(
    path: Option<&Path>,
    utc_offset_minutes: Option<i32>,
) -> Result<RhythmConfig, RhythmCliError> {
    let mut config = match path {
        Some(path) => RhythmConfig::from_json(&fs::read_to_string(path)?)?,
        None => RhythmConfig::default(),
    };
    if let Some(offset) = utc_offset_minutes {
        config.segmenter.utc_offset_minutes = offset;
        config.validate()?;
    }
    Ok(config)
}

fn cmd_segment(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: &RhythmConfig,
) -> Result<(), RhythmCliError> {
    let raw = read_samples(input, &input_format)?;
    if raw.is_empty() {
        return Err(RhythmCliError::NoRecords);
    }

    let sanitized = SampleAdapter::sanitize(&raw);
    if !sanitized.rejected.is_empty() {
        tracing::warn!(
            rejected = sanitized.rejected.len(),
            "dropped malformed samples; run 'rhythm validate' for details"
        );
    }

    let sessions = SleepSegmenter::new(config.segmenter.clone()).segment(&sanitized.samples);
    write_output(output, &format_output(&sessions, &output_format)?)
}

fn cmd_expand(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: &RhythmConfig,
) -> Result<(), RhythmCliError> {
    let totals: Vec<DailyActivityTotal> = parse_records(&read_input(input)?, &input_format)?;
    if totals.is_empty() {
        return Err(RhythmCliError::NoRecords);
    }

    let samples = SampleAdapter::expand_daily_totals(&totals, &config.segmenter);
    write_output(output, &format_output(&samples, &output_format)?)
}

struct SummaryOptions {
    from: SummaryInput,
    input_format: InputFormat,
    anchors: SleepAnchors,
    chronotype: Chronotype,
    now: DateTime<Utc>,
    load_state: Option<PathBuf>,
    save_state: Option<PathBuf>,
}

fn cmd_summary(
    input: &Path,
    output: &Path,
    options: SummaryOptions,
    config: RhythmConfig,
) -> Result<(), RhythmCliError> {
    let min_sessions = config.need.min_sessions;
    let mut processor = RhythmProcessor::new(config);
    processor.set_anchors(options.anchors);
    processor.set_chronotype(options.chronotype);

    if let Some(state_path) = &options.load_state {
        processor.load_state(&fs::read_to_string(state_path)?)?;
    }

    let input_data = read_input(input)?;
    let report = match options.from {
        SummaryInput::Samples => {
            let raw: Vec<RawActivitySample> = parse_records(&input_data, &options.input_format)?;
            processor.ingest_samples(&serde_json::to_string(&raw)?)?
        }
        SummaryInput::Sessions => {
            let records: Vec<serde_json::Value> =
                parse_records(&input_data, &options.input_format)?;
            processor.ingest_sessions(&serde_json::to_string(&records)?)?
        }
    };
    tracing::info!(
        added = report.merge.added,
        replaced = report.merge.replaced,
        kept = report.merge.kept,
        rejected_samples = report.rejected_samples.len(),
        rejected_sessions = report.rejected_sessions.len(),
        "ingested input"
    );

    let snapshot = processor.recompute(options.now);

    if let Some(state_path) = &options.save_state {
        fs::write(state_path, processor.save_state()?)?;
    }

    let payload = RhythmEncoder::new()
        .with_min_sessions(min_sessions)
        .encode_to_json(&snapshot)?;
    write_output(output, &format!("{}\n", payload))
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), RhythmCliError> {
    let raw = read_samples(input, &input_format)?;
    let sanitized = SampleAdapter::sanitize(&raw);

    let report = ValidationReport {
        total_samples: raw.len(),
        valid_samples: sanitized.samples.len(),
        invalid_samples: sanitized.rejected.len(),
        errors: sanitized
            .rejected
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                timestamp: r.timestamp.to_rfc3339(),
                reason: serde_json::to_value(r.reason)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total samples:   {}", report.total_samples);
        println!("Valid samples:   {}", report.valid_samples);
        println!("Invalid samples: {}", report.invalid_samples);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Sample {} at {}: {}", err.index, err.timestamp, err.reason);
            }
        }
    }

    if report.invalid_samples > 0 {
        Err(RhythmCliError::ValidationFailed(report.invalid_samples))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, state: Option<&Path>, json: bool) -> Result<(), RhythmCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "rhythm_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Rhythm version {}", RHYTHM_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}", SCHEMA_VERSION),
    });

    // The config itself was already loaded by `run`; report what it resolved to.
    if let Some(config_path) = config {
        checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!("Config file {} is valid", config_path.display()),
        });
    }

    if let Some(state_path) = state {
        checks.push(check_state_file(state_path));
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass -i <file>)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (-i - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: RHYTHM_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Rhythm Doctor Report");
        println!("====================");
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
        Err(RhythmCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_state_file(path: &Path) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: "state".to_string(),
            status: CheckStatus::Warning,
            message: "State file does not exist".to_string(),
        };
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return DoctorCheck {
                name: "state".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read state file: {}", e),
            }
        }
    };

    let mut processor = RhythmProcessor::default();
    match processor.load_state(&content) {
        Ok(()) => DoctorCheck {
            name: "state".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "State file valid ({} sessions, profile {})",
                processor.history().len(),
                if processor.profile().is_some() {
                    "present"
                } else {
                    "not yet computed"
                }
            ),
        },
        Err(e) => DoctorCheck {
            name: "state".to_string(),
            status: CheckStatus::Error,
            message: format!("Invalid state file: {}", e),
        },
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, RhythmCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_samples(
    input: &Path,
    input_format: &InputFormat,
) -> Result<Vec<RawActivitySample>, RhythmCliError> {
    let input_data = read_input(input)?;
    let samples = match input_format {
        InputFormat::Ndjson => SampleAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => SampleAdapter::parse_array(&input_data)?,
    };
    Ok(samples)
}

fn parse_records<T: DeserializeOwned>(
    data: &str,
    format: &InputFormat,
) -> Result<Vec<T>, RhythmCliError> {
    match format {
        InputFormat::Json => Ok(serde_json::from_str(data)?),
        InputFormat::Ndjson => data
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_num, line)| {
                serde_json::from_str(line.trim()).map_err(|e| {
                    RhythmCliError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    ))
                })
            })
            .collect(),
    }
}

fn format_output<T: Serialize>(records: &[T], format: &OutputFormat) -> Result<String, RhythmCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines = String::new();
            for record in records {
                lines.push_str(&serde_json::to_string(record)?);
                lines.push('\n');
            }
            Ok(lines)
        }
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string(records)?)),
        OutputFormat::JsonPretty => Ok(format!("{}\n", serde_json::to_string_pretty(records)?)),
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), RhythmCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum RhythmCliError {
    Io(io::Error),
    Compute(synheart_rhythm::ComputeError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for RhythmCliError {
    fn from(e: io::Error) -> Self {
        RhythmCliError::Io(e)
    }
}

impl From<synheart_rhythm::ComputeError> for RhythmCliError {
    fn from(e: synheart_rhythm::ComputeError) -> Self {
        RhythmCliError::Compute(e)
    }
}

impl From<serde_json::Error> for RhythmCliError {
    fn from(e: serde_json::Error) -> Self {
        RhythmCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RhythmCliError> for CliError {
    fn from(e: RhythmCliError) -> Self {
        match e {
            RhythmCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RhythmCliError::Compute(e @ synheart_rhythm::ComputeError::InvalidConfig(_)) => {
                CliError {
                    code: "CONFIG_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some("Run 'rhythm doctor --config <file>' to check it".to_string()),
                }
            }
            RhythmCliError::Compute(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches the {} schema", SCHEMA_VERSION)),
            },
            RhythmCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RhythmCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            RhythmCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} samples failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            RhythmCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            RhythmCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ValidationReport {
    total_samples: usize,
    valid_samples: usize,
    invalid_samples: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    timestamp: String,
    reason: String,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
