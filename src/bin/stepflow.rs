//! Stepflow CLI - Command-line interface for stepflow
//!
//! Commands:
//! - process: Run a CSV recording through the full pipeline
//! - validate: Check a CSV against the column mapping without processing
//! - schema: Print input and output schema information
//! - doctor: Diagnose pipeline health and configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use uuid::Uuid;

use stepflow::artifacts::ArtifactStore;
use stepflow::normalize::Normalizer;
use stepflow::pipeline::{ProcessOutcome, StepPipeline};
use stepflow::report::SummaryReport;
use stepflow::schema::{map_columns, validate_axes, CANONICAL_COLUMNS};
use stepflow::{
    ExecutionDevice, ModelVariant, PipelineError, ProcessingConfig, RawTable, PRODUCER_NAME,
    STEPFLOW_VERSION,
};

/// Stepflow - Accelerometer preparation and step-count pipeline
#[derive(Parser)]
#[command(name = "stepflow")]
#[command(version = STEPFLOW_VERSION)]
#[command(about = "Prepare accelerometer data and count steps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a CSV recording through the full pipeline
    Process {
        /// Input CSV path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory to persist exported artifacts into
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Model variant (rf or ssl)
        #[arg(long, default_value = "rf")]
        model: ModelVariant,

        /// Source column names as time,x,y,z
        #[arg(long, default_value = "time,x,y,z")]
        txyz: String,

        /// Sample rate in Hz; omit to infer from the timestamps
        #[arg(long)]
        sample_rate: Option<f64>,

        /// Keep only samples at or after this time
        #[arg(long)]
        start_time: Option<String>,

        /// Keep only samples at or before this time
        #[arg(long)]
        end_time: Option<String>,

        /// Drop whole days from the recording edges: first, last or both
        #[arg(long)]
        exclude_first_last: Option<String>,

        /// Null out days with wear below this duration, e.g. 12h
        #[arg(long)]
        exclude_wear_below: Option<String>,

        /// Minutes of wear required per day
        #[arg(long, default_value = "1260.0")]
        min_wear_per_day: f64,

        /// Minutes of wear required per hour
        #[arg(long, default_value = "50.0")]
        min_wear_per_hour: f64,

        /// Fraction of a minute that must be covered
        #[arg(long, default_value = "0.5")]
        min_wear_per_minute: f64,

        /// Minutes of walking required for a day to count in cadence summaries
        #[arg(long, default_value = "5.0")]
        min_walk_per_day: f64,

        /// Fraction of a bout that must be walking
        #[arg(long, default_value = "0.8")]
        bouts_min_walk: f64,

        /// Longest idle stretch tolerated inside a bout, in windows
        #[arg(long, default_value = "3.0")]
        bouts_max_idle: f64,

        /// Execution device (cpu, cuda or mps)
        #[arg(long, default_value = "cpu")]
        device: ExecutionDevice,

        /// Pretty-print the response JSON (default when stdout is a TTY)
        #[arg(long)]
        pretty: bool,
    },

    /// Check a CSV against the column mapping without processing
    Validate {
        /// Input CSV path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Source column names as time,x,y,z
        #[arg(long, default_value = "time,x,y,z")]
        txyz: String,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,
    },

    /// Diagnose pipeline health and configuration
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input CSV schema
    Input,
    /// Output report schema
    Output,
}

fn main() -> ExitCode {
    env_logger::init();
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

fn run(cli: Cli) -> Result<(), StepflowCliError> {
    match cli.command {
        Commands::Process {
            input,
            output,
            model,
            txyz,
            sample_rate,
            start_time,
            end_time,
            exclude_first_last,
            exclude_wear_below,
            min_wear_per_day,
            min_wear_per_hour,
            min_wear_per_minute,
            min_walk_per_day,
            bouts_min_walk,
            bouts_max_idle,
            device,
            pretty,
        } => {
            let config = ProcessingConfig {
                model,
                txyz: split_txyz(&txyz),
                sample_rate,
                start_time,
                end_time,
                exclude_first_last,
                exclude_wear_below,
                min_wear_per_day,
                min_wear_per_hour,
                min_wear_per_minute,
                min_walk_per_day,
                bouts_min_walk,
                bouts_max_idle,
                device,
            };
            cmd_process(&input, output.as_deref(), &config, pretty)
        }

        Commands::Validate { input, txyz, json } => cmd_validate(&input, &txyz, json),

        Commands::Schema { schema_type } => {
            cmd_schema(schema_type);
            Ok(())
        }

        Commands::Doctor { json } => cmd_doctor(json),
    }
}

fn cmd_process(
    input: &Path,
    output: Option<&Path>,
    config: &ProcessingConfig,
    pretty: bool,
) -> Result<(), StepflowCliError> {
    let started = Instant::now();
    let run_id = Uuid::new_v4();
    log::info!("processing run {}", run_id);

    let table = read_table(input)?;
    let pipeline = StepPipeline::new();

    let response = match pipeline.process(table, config)? {
        ProcessOutcome::Completed { report, artifacts } => {
            let output_files = match output {
                Some(dir) => Some(persist_artifacts(&artifacts, dir)?),
                None => None,
            };
            ProcessingResponse {
                success: true,
                message: "Processing completed successfully".to_string(),
                processing_time: started.elapsed().as_secs_f64(),
                run_id,
                results: Some(report),
                output_files,
            }
        }
        ProcessOutcome::NoValidData { .. } => ProcessingResponse {
            success: false,
            message: "No valid data to process after filtering".to_string(),
            processing_time: started.elapsed().as_secs_f64(),
            run_id,
            results: None,
            output_files: None,
        },
        ProcessOutcome::InsufficientData {
            actual,
            required,
            variant,
        } => ProcessingResponse {
            success: false,
            message: insufficient_message(actual, required, variant),
            processing_time: started.elapsed().as_secs_f64(),
            run_id,
            results: None,
            output_files: None,
        },
    };

    let rendered = if pretty || atty::is(atty::Stream::Stdout) {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", rendered);
    Ok(())
}

fn cmd_validate(input: &Path, txyz: &str, json: bool) -> Result<(), StepflowCliError> {
    let table = read_table(input)?;
    let rows = table.n_rows();
    let columns = table.column_names().to_vec();
    let mapping = split_txyz(txyz);

    let outcome = map_columns(table, &mapping).and_then(|mapped| {
        let axes = validate_axes(&mapped)?;
        Normalizer::index_frame(&mapped, axes, &ProcessingConfig::default())?;
        Ok(())
    });

    let report = ValidationReport {
        rows,
        columns,
        mapping,
        valid: outcome.is_ok(),
        error: outcome.as_ref().err().map(|e| e.to_string()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Rows:    {}", report.rows);
        println!("Columns: {}", report.columns.join(", "));
        println!("Mapping: {}", report.mapping.join(", "));
        match &report.error {
            None => println!("Status:  valid"),
            Some(error) => {
                println!("Status:  invalid");
                println!("\nError: {}", error);
            }
        }
    }

    match outcome {
        Ok(()) => Ok(()),
        Err(e) => Err(StepflowCliError::ValidationFailed(e.to_string())),
    }
}

fn cmd_schema(schema_type: SchemaType) {
    match schema_type {
        SchemaType::Input => {
            println!("Input Schema: CSV accelerometer table");
            println!();
            println!("Four columns are mapped onto the canonical layout:");
            println!();
            for name in CANONICAL_COLUMNS {
                match name {
                    "time" => println!("  time - timestamp per sample"),
                    axis => println!("  {}    - acceleration along {} in g units", axis, axis),
                }
            }
            println!();
            println!("Source column names map via --txyz (default: time,x,y,z).");
            println!("Extra columns pass through untouched.");
            println!();
            println!("Accepted time formats:");
            println!("  - RFC 3339, e.g. 2023-05-10T08:00:00Z");
            println!("  - Naive datetime, e.g. 2023-05-10 08:00:00[.123]");
            println!("  - Bare date (midnight), e.g. 2023-05-10");
            println!("  - Epoch seconds, e.g. 1683705600");
            println!();
            println!("Timestamps must be in non-decreasing order.");
        }
        SchemaType::Output => {
            println!("Output Schema: processing response");
            println!();
            println!("- success, message, processing_time, run_id");
            println!("- results: the full report on success:");
            println!("  - wear_stats: start/end, wear days, per-day coverage");
            println!("  - enmo/steps/cadence summaries, each with an adjusted twin");
            println!("  - bouts_summary: walking-bout counts and durations");
            println!("  - minutely / hourly / daily: [time, steps, enmo] records");
            println!("  - total_steps, total_walking_minutes, average_daily_steps");
            println!("  - sample_rate, sample_rate_source, data_duration_hours");
            println!("- output_files: artifact name to path, when --output is given:");
            println!("  - Steps.csv.gz, StepTimes.csv.gz");
            println!("  - Minutely.csv.gz, Hourly.csv.gz, Daily.csv.gz");
            println!("  - Steps.svg");
        }
    }
}

fn cmd_doctor(json: bool) -> Result<(), StepflowCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "stepflow_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("stepflow version {}", STEPFLOW_VERSION),
    });

    // Load both classifier variants on the CPU
    let pipeline = StepPipeline::new();
    for variant in [ModelVariant::Rf, ModelVariant::Ssl] {
        let check = match pipeline.cache().get_or_load(variant, ExecutionDevice::Cpu) {
            Ok(_) => DoctorCheck {
                name: format!("classifier_{}", variant.as_str()),
                status: CheckStatus::Ok,
                message: format!("{} classifier loads", variant.as_str()),
            },
            Err(e) => DoctorCheck {
                name: format!("classifier_{}", variant.as_str()),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        };
        checks.push(check);
    }

    // Library logs flow through env_logger
    let logging_check = match std::env::var("RUST_LOG") {
        Ok(filter) => DoctorCheck {
            name: "logging".to_string(),
            status: CheckStatus::Ok,
            message: format!("RUST_LOG={}", filter),
        },
        Err(_) => DoctorCheck {
            name: "logging".to_string(),
            status: CheckStatus::Warning,
            message: "RUST_LOG unset, library logs are silenced".to_string(),
        },
    };
    checks.push(logging_check);

    // Scratch space for exports
    let workspace_check = match ArtifactStore::create() {
        Ok(store) => DoctorCheck {
            name: "workspace".to_string(),
            status: CheckStatus::Ok,
            message: format!("scratch directory writable at {}", store.path().display()),
        },
        Err(e) => DoctorCheck {
            name: "workspace".to_string(),
            status: CheckStatus::Error,
            message: format!("cannot create scratch directory: {}", e),
        },
    };
    checks.push(workspace_check);

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
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: STEPFLOW_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Stepflow Doctor Report");
        println!("======================");
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
        Err(StepflowCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_table(input: &Path) -> Result<RawTable, StepflowCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(StepflowCliError::NoInput);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(RawTable::from_csv_reader(buffer.as_bytes())?)
    } else {
        let file = File::open(input)?;
        Ok(RawTable::from_csv_reader(file)?)
    }
}

fn split_txyz(txyz: &str) -> Vec<String> {
    txyz.split(',').map(|s| s.trim().to_string()).collect()
}

fn persist_artifacts(
    artifacts: &ArtifactStore,
    dir: &Path,
) -> Result<BTreeMap<String, String>, StepflowCliError> {
    let copied = artifacts.persist_to(dir)?;
    let mut files = BTreeMap::new();
    for path in copied {
        if let Some(name) = path.file_name() {
            files.insert(
                name.to_string_lossy().to_string(),
                path.display().to_string(),
            );
        }
    }
    Ok(files)
}

fn insufficient_message(actual: usize, required: usize, variant: ModelVariant) -> String {
    match variant {
        ModelVariant::Rf => format!(
            "Insufficient data for Random Forest model. Need at least {} data points, got {}. \
             Please provide more data or use the SSL model instead.",
            required, actual
        ),
        ModelVariant::Ssl => format!(
            "Insufficient data for SSL model. Need at least {} data points, got {}. \
             Please provide more data.",
            required, actual
        ),
    }
}

// Error types

#[derive(Debug)]
enum StepflowCliError {
    Io(io::Error),
    Pipeline(PipelineError),
    Json(serde_json::Error),
    NoInput,
    ValidationFailed(String),
    DoctorFailed,
}

impl From<io::Error> for StepflowCliError {
    fn from(e: io::Error) -> Self {
        StepflowCliError::Io(e)
    }
}

impl From<PipelineError> for StepflowCliError {
    fn from(e: PipelineError) -> Self {
        StepflowCliError::Pipeline(e)
    }
}

impl From<serde_json::Error> for StepflowCliError {
    fn from(e: serde_json::Error) -> Self {
        StepflowCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<StepflowCliError> for CliError {
    fn from(e: StepflowCliError) -> Self {
        match e {
            StepflowCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            StepflowCliError::Pipeline(e) => {
                let hint = pipeline_hint(&e);
                CliError {
                    code: "PIPELINE_ERROR".to_string(),
                    message: e.to_string(),
                    hint,
                }
            }
            StepflowCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            StepflowCliError::NoInput => CliError {
                code: "NO_INPUT".to_string(),
                message: "stdin is a TTY, nothing to read".to_string(),
                hint: Some("Pipe a CSV in or pass a file path with --input".to_string()),
            },
            StepflowCliError::ValidationFailed(message) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message,
                hint: Some("Fix the input CSV or adjust --txyz and retry".to_string()),
            },
            StepflowCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

fn pipeline_hint(e: &PipelineError) -> Option<String> {
    let hint = match e {
        PipelineError::Schema(_) => "Check --txyz against the CSV header",
        PipelineError::TypeCoercion(_) | PipelineError::MissingData(_) => {
            "Inspect the named rows in the input CSV"
        }
        PipelineError::TimeParse(_) | PipelineError::NonMonotonicTime(_) => {
            "Ensure the time column is sorted and parseable"
        }
        PipelineError::Config { .. } => "Review the option value",
        PipelineError::InsufficientData { .. } => "Provide a longer recording",
        PipelineError::Csv(_) | PipelineError::TableRead(_) => {
            "Check that the file is comma-separated with a header row"
        }
        _ => return None,
    };
    Some(hint.to_string())
}

// Report types

#[derive(serde::Serialize)]
struct ProcessingResponse {
    success: bool,
    message: String,
    processing_time: f64,
    run_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<SummaryReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_files: Option<BTreeMap<String, String>>,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    rows: usize,
    columns: Vec<String>,
    mapping: Vec<String>,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
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
