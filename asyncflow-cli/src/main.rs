#![forbid(unsafe_code)]

//! `asyncflow` — run a validated scenario to completion and write its two
//! structured output records (spec.md §6): per-request latencies and sampled
//! time series, both `serde_json` pretty-printed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use asyncflow_core::schema::SimulationPayload;
use asyncflow_core::validate;
use asyncflow_engine::Simulation;
use asyncflow_telemetry::Analyzer;

/// The fixed seed used when `--seed` is omitted: determinism (spec.md §8) is a
/// tested invariant, so the default must never come from OS entropy.
const DEFAULT_SEED: u64 = 42;

#[derive(Parser, Debug)]
#[command(name = "asyncflow", author, version, about = "Discrete-event simulator for asynchronous request-serving systems", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate and run a scenario, writing latency and sampled-metric records.
    Run(RunArgs),
    /// Validate a scenario without running it.
    Validate(ValidateArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Path to the scenario file (YAML or JSON).
    scenario: PathBuf,

    /// Directory the two output records are written into (created if missing).
    #[arg(long = "out")]
    out: PathBuf,

    /// Seed for the process-wide RNG; fixed and reproducible when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Output file format for the two records.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(clap::Args, Debug)]
struct ValidateArgs {
    /// Path to the scenario file (YAML or JSON).
    scenario: PathBuf,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

/// Exit codes (SPEC_FULL.md §6): 0 success, 1 I/O failure, 2 validation failure.
const EXIT_OK: u8 = 0;
const EXIT_IO_FAILURE: u8 = 1;
const EXIT_VALIDATION_FAILURE: u8 = 2;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_IO_FAILURE)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Validate(args) => cmd_validate(args),
    }
}

fn load_payload(path: &Path) -> Result<SimulationPayload> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading scenario file '{}'", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            SimulationPayload::from_json(&text).with_context(|| "parsing scenario as JSON".to_string())
        }
        _ => SimulationPayload::from_yaml(&text).with_context(|| "parsing scenario as YAML".to_string()),
    }
}

/// Prints one line per field-pathed validation failure (spec.md §7:
/// "surfaced to the caller as structured failures identifying field paths").
fn report_validation_errors(errors: &[asyncflow_core::ValidationError]) {
    eprintln!("scenario failed validation ({} error(s)):", errors.len());
    for e in errors {
        eprintln!("  {e}");
    }
}

fn cmd_validate(args: ValidateArgs) -> Result<u8> {
    let payload = load_payload(&args.scenario)?;
    match validate::validate(&payload) {
        Ok(input) => {
            tracing::info!(
                servers = input.servers.len(),
                edges = input.edges.len(),
                "scenario is valid"
            );
            println!("scenario '{}' is valid", args.scenario.display());
            Ok(EXIT_OK)
        }
        Err(errors) => {
            report_validation_errors(&errors);
            Ok(EXIT_VALIDATION_FAILURE)
        }
    }
}

fn cmd_run(args: RunArgs) -> Result<u8> {
    let payload = load_payload(&args.scenario)?;
    let input = match validate::validate(&payload) {
        Ok(input) => input,
        Err(errors) => {
            report_validation_errors(&errors);
            return Ok(EXIT_VALIDATION_FAILURE);
        }
    };

    let seed = args.seed.unwrap_or(DEFAULT_SEED);
    tracing::info!(
        scenario = %args.scenario.display(),
        seed,
        horizon = input.settings.total_simulation_time,
        "starting simulation run"
    );

    let output = Simulation::build(&input, seed)
        .with_context(|| "building simulation runtimes")?
        .run();
    let analyzer = Analyzer::new(&output);

    fs::create_dir_all(&args.out)
        .with_context(|| format!("creating output directory '{}'", args.out.display()))?;

    write_record(&args.out, "latencies", args.format, &LatenciesRecord::from_analyzer(&analyzer))?;
    write_record(
        &args.out,
        "sampled_metrics",
        args.format,
        &SampledMetricsRecord::from_analyzer(&analyzer),
    )?;

    tracing::info!(
        completed = analyzer.latencies().len(),
        out = %args.out.display(),
        "simulation run complete"
    );
    println!(
        "wrote {} completed request(s) to '{}'",
        analyzer.latencies().len(),
        args.out.display()
    );
    Ok(EXIT_OK)
}

fn write_record<T: Serialize>(dir: &Path, stem: &str, format: OutputFormat, value: &T) -> Result<()> {
    let (ext, text) = match format {
        OutputFormat::Json => ("json", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => ("yaml", serde_yaml::to_string(value)?),
    };
    let path = dir.join(format!("{stem}.{ext}"));
    fs::write(&path, text).with_context(|| format!("writing '{}'", path.display()))
}

/// Per-request latencies and completion times (spec.md §6, output record (a)).
#[derive(Serialize)]
struct LatenciesRecord {
    requests: Vec<LatencyEntry>,
    summary: asyncflow_telemetry::LatencySummary,
}

#[derive(Serialize)]
struct LatencyEntry {
    request_id: u64,
    initial_time: f64,
    finish_time: f64,
    latency: f64,
}

impl LatenciesRecord {
    fn from_analyzer(analyzer: &Analyzer<'_>) -> Self {
        let requests = analyzer
            .latency_records()
            .iter()
            .map(|r| LatencyEntry {
                request_id: r.request_id,
                initial_time: r.initial_time,
                finish_time: r.finish_time,
                latency: r.finish_time - r.initial_time,
            })
            .collect();
        Self {
            requests,
            summary: analyzer.latency_summary(),
        }
    }
}

/// Sampled time series keyed by metric, then entity id (spec.md §6, output
/// record (b)).
#[derive(Serialize)]
struct SampledMetricsRecord {
    series: asyncflow_telemetry::SampledSeries,
}

impl SampledMetricsRecord {
    fn from_analyzer(analyzer: &Analyzer<'_>) -> Self {
        Self {
            series: analyzer.sampled_series(),
        }
    }
}
