//! Rideseg CLI - Command-line interface for rental record segmentation
//!
//! Commands:
//! - segment: Cluster a filtered working set and write a segmentation report
//! - rfm: Derive recency, frequency and monetary metrics only
//! - validate: Check records for problems before analysis
//! - predict: Fit on the working set and assign a new feature vector

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rideseg::dataset::{DatasetAdapter, ValidationIssue};
use rideseg::encoder::ReportEncoder;
use rideseg::pipeline::{derive_rfm, predict_segment, segment_records, SegmentationConfig};
use rideseg::types::{FeatureField, Record};
use rideseg::{ComputeError, RecordFilter, RIDESEG_VERSION};

/// Rideseg - Deterministic RFM derivation and k-means segmentation
#[derive(Parser)]
#[command(name = "rideseg")]
#[command(version = RIDESEG_VERSION)]
#[command(about = "Segment bike-rental usage records", long_about = None)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a filtered working set and write a segmentation report
    Segment {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        segmentation: SegmentationArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Derive recency, frequency and monetary metrics only
    Rfm {
        #[command(flatten)]
        source: SourceArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Check records for problems before analysis
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "csv")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fit on the working set and assign a new feature vector
    Predict {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        segmentation: SegmentationArgs,

        /// Feature vector in original units, one value per feature field
        #[arg(long, required = true, value_delimiter = ',', allow_negative_numbers = true)]
        point: Vec<f64>,
    },
}

/// Where records come from and which of them form the working set
#[derive(Args)]
struct SourceArgs {
    /// Input file path (use - for stdin)
    #[arg(short, long)]
    input: PathBuf,

    /// Input format
    #[arg(long, default_value = "csv")]
    input_format: InputFormat,

    /// Keep only these working-day flags (e.g. 0,1)
    #[arg(long, value_delimiter = ',')]
    workingday: Vec<u8>,

    /// Keep only these weather categories (e.g. 1,2)
    #[arg(long, value_delimiter = ',')]
    weathersit: Vec<u8>,

    /// Inclusive start date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Inclusive end date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl SourceArgs {
    fn filter(&self) -> RecordFilter {
        RecordFilter {
            workingday: self.workingday.clone(),
            weathersit: self.weathersit.clone(),
            from: self.from,
            to: self.to,
        }
    }
}

/// Clustering parameters; flags override values from `--config`
#[derive(Args)]
struct SegmentationArgs {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feature fields, in order (e.g. temp,cnt)
    #[arg(long, value_delimiter = ',')]
    features: Vec<FeatureField>,

    /// Number of clusters
    #[arg(short = 'k', long)]
    clusters: Option<usize>,

    /// Number of independent restarts
    #[arg(long)]
    restarts: Option<usize>,

    /// Base random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Bound on assignment passes per restart
    #[arg(long)]
    max_iterations: Option<usize>,
}

impl SegmentationArgs {
    fn resolve(&self) -> Result<SegmentationConfig, RidesegCliError> {
        let mut config = match &self.config {
            Some(path) => SegmentationConfig::from_json(&fs::read_to_string(path)?)?,
            None => SegmentationConfig::default(),
        };
        if !self.features.is_empty() {
            config.feature_fields = self.features.clone();
        }
        if let Some(k) = self.clusters {
            config.n_clusters = k;
        }
        if let Some(restarts) = self.restarts {
            config.n_restarts = restarts;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.max_iterations = max_iterations;
        }
        Ok(config)
    }
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Comma-separated values with a header row
    Csv,
    /// JSON array of records
    Json,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON report
    Json,
    /// Pretty-printed JSON report
    JsonPretty,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), RidesegCliError> {
    match cli.command {
        Commands::Segment {
            source,
            segmentation,
            output,
            output_format,
        } => cmd_segment(&source, &segmentation, &output, &output_format),

        Commands::Rfm {
            source,
            output,
            output_format,
        } => cmd_rfm(&source, &output, &output_format),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, &input_format, json),

        Commands::Predict {
            source,
            segmentation,
            point,
        } => cmd_predict(&source, &segmentation, &point),
    }
}

fn cmd_segment(
    source: &SourceArgs,
    segmentation: &SegmentationArgs,
    output: &Path,
    output_format: &OutputFormat,
) -> Result<(), RidesegCliError> {
    let config = segmentation.resolve()?;
    let working_set = load_working_set(source)?;

    let view = segment_records(&working_set, &config)?;
    let data = match output_format {
        OutputFormat::Ndjson => to_ndjson(&view.records)?,
        OutputFormat::Json => serde_json::to_string(&ReportEncoder::new().encode(view, &config))?,
        OutputFormat::JsonPretty => ReportEncoder::new().encode_to_json(view, &config)?,
    };

    write_output(output, &data)
}

fn cmd_rfm(
    source: &SourceArgs,
    output: &Path,
    output_format: &OutputFormat,
) -> Result<(), RidesegCliError> {
    let working_set = load_working_set(source)?;

    let report = derive_rfm(&working_set)?;
    let data = match output_format {
        OutputFormat::Ndjson => to_ndjson(&report.records)?,
        OutputFormat::Json => serde_json::to_string(&ReportEncoder::new().encode_metrics(report))?,
        OutputFormat::JsonPretty => {
            serde_json::to_string_pretty(&ReportEncoder::new().encode_metrics(report))?
        }
    };

    write_output(output, &data)
}

fn cmd_validate(
    input: &Path,
    input_format: &InputFormat,
    json: bool,
) -> Result<(), RidesegCliError> {
    let records = read_records(input, input_format)?;
    let issues = DatasetAdapter::validate_records(&records);

    let mut invalid: Vec<usize> = issues.iter().map(|i| i.index).collect();
    invalid.dedup();

    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - invalid.len(),
        invalid_records: invalid.len(),
        issues,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.issues.is_empty() {
            println!("\nIssues:");
            for issue in &report.issues {
                let instant = issue
                    .instant
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!(
                    "  - Record {} (index {}): {}",
                    instant, issue.index, issue.problem
                );
            }
        }
    }

    if report.invalid_records > 0 {
        Err(RidesegCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_predict(
    source: &SourceArgs,
    segmentation: &SegmentationArgs,
    point: &[f64],
) -> Result<(), RidesegCliError> {
    let config = segmentation.resolve()?;
    let working_set = load_working_set(source)?;

    let (cluster, view) = predict_segment(&working_set, &config, point)?;
    let summary = &view.clusters[cluster];

    let prediction = Prediction {
        feature_fields: &view.feature_fields,
        point,
        cluster,
        centroid: &summary.centroid,
        cluster_size: summary.size,
    };
    println!("{}", serde_json::to_string_pretty(&prediction)?);

    Ok(())
}

// Helper functions

fn read_records(input: &Path, format: &InputFormat) -> Result<Vec<Record>, RidesegCliError> {
    let data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let records = match format {
        InputFormat::Csv => DatasetAdapter::parse_csv(data.as_bytes())?,
        InputFormat::Json => DatasetAdapter::parse_array(&data)?,
        InputFormat::Ndjson => DatasetAdapter::parse_ndjson(&data)?,
    };

    if records.is_empty() {
        return Err(RidesegCliError::NoRecords);
    }
    Ok(records)
}

fn load_working_set(source: &SourceArgs) -> Result<Vec<Record>, RidesegCliError> {
    let records = read_records(&source.input, &source.input_format)?;
    let read = records.len();
    let filter = source.filter();
    let working_set = if filter.is_empty() {
        records
    } else {
        filter.apply(&records)
    };

    info!(read, selected = working_set.len(), "Working set loaded");

    if working_set.is_empty() {
        return Err(RidesegCliError::EmptyView);
    }
    Ok(working_set)
}

fn to_ndjson<T: Serialize>(items: &[T]) -> Result<String, RidesegCliError> {
    let mut lines: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        lines.push(serde_json::to_string(item)?);
    }
    Ok(lines.join("\n") + "\n")
}

fn write_output(output: &Path, data: &str) -> Result<(), RidesegCliError> {
    if output.to_string_lossy() == "-" {
        println!("{}", data.trim_end());
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum RidesegCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoRecords,
    EmptyView,
    ValidationFailed(usize),
}

impl From<io::Error> for RidesegCliError {
    fn from(e: io::Error) -> Self {
        RidesegCliError::Io(e)
    }
}

impl From<ComputeError> for RidesegCliError {
    fn from(e: ComputeError) -> Self {
        RidesegCliError::Compute(e)
    }
}

impl From<serde_json::Error> for RidesegCliError {
    fn from(e: serde_json::Error) -> Self {
        RidesegCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RidesegCliError> for CliError {
    fn from(e: RidesegCliError) -> Self {
        match e {
            RidesegCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RidesegCliError::Compute(ComputeError::InvalidInput(e)) => CliError {
                code: "INVALID_INPUT".to_string(),
                message: e.to_string(),
                hint: Some("Check the working set and clustering parameters".to_string()),
            },
            RidesegCliError::Compute(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure input matches the --input-format and dataset columns".to_string()),
            },
            RidesegCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RidesegCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            RidesegCliError::EmptyView => CliError {
                code: "EMPTY_VIEW".to_string(),
                message: "No records match the selected filters".to_string(),
                hint: Some("Widen --workingday, --weathersit or the date range".to_string()),
            },
            RidesegCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    issues: Vec<ValidationIssue>,
}

#[derive(Serialize)]
struct Prediction<'a> {
    feature_fields: &'a [FeatureField],
    point: &'a [f64],
    cluster: usize,
    centroid: &'a [f64],
    cluster_size: usize,
}
