//! ingest-wasm CLI entry point.
//!
//! Runs a guest module over newline-delimited JSON events. Each input line is
//! one event object; processed events are written to stdout in input order.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ingest_wasm_common::{ConfigFile, ProcessorConfig};
use ingest_wasm_processor::{Processor, SystemHost, Value};

type Fields = BTreeMap<String, Value>;

/// Run a sandboxed WebAssembly processor over NDJSON events.
#[derive(Debug, Parser)]
#[command(name = "ingest-wasm", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "INGEST_WASM_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of idle sessions kept between events.
    #[arg(long)]
    max_cached_sessions: Option<usize>,

    /// Number of worker threads (defaults to available parallelism).
    #[arg(short, long)]
    workers: Option<usize>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    /// Guest module (.wasm, or .wat text). Overrides `[module].path` from the config file.
    module: Option<PathBuf>,

    /// NDJSON events file. Reads stdin when omitted or `-`.
    events: Option<PathBuf>,
}

/// One input line and, once processed, its resulting event.
struct Record {
    line: usize,
    /// `None` once the line failed to parse or process.
    event: Option<Fields>,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigFile::default(),
    };

    init_tracing(&config.log.filter, cli.json_logs || config.log.json);

    if let Some(max_cached_sessions) = cli.max_cached_sessions {
        config.processor.max_cached_sessions = max_cached_sessions;
    }

    let module_path = resolve_module_path(cli.module.as_deref(), &config)?;
    let processor = load_processor(&module_path, config.processor)?;

    info!(module = %module_path.display(), "Module loaded");

    let mut records = read_records(cli.events.as_ref())?;

    let workers = cli
        .workers
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, usize::from))
        .max(1);
    let start = Instant::now();
    process_records(&processor, &mut records, workers);

    let failed = write_records(&records).context("Failed to write events")?;

    info!(
        events = records.len(),
        failed,
        workers,
        duration_ms = start.elapsed().as_millis(),
        "Processing complete"
    );

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Pick the guest module: the positional argument wins over `[module].path`.
fn resolve_module_path(cli_module: Option<&Path>, config: &ConfigFile) -> anyhow::Result<PathBuf> {
    match (cli_module, &config.module) {
        (Some(path), _) => Ok(path.to_path_buf()),
        (None, Some(entry)) => Ok(entry.path.clone()),
        (None, None) => {
            bail!("No guest module given. Pass MODULE or set [module].path in the config file")
        }
    }
}

/// Build a processor from a `.wasm` binary or, for `.wat` files, module text.
fn load_processor(path: &Path, config: ProcessorConfig) -> anyhow::Result<Processor<Fields>> {
    let host = Arc::new(SystemHost);
    let is_text = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("wat"));

    let processor = if is_text {
        let wat = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read module {}", path.display()))?;
        Processor::from_wat(host, &wat, config)
    } else {
        let file = File::open(path)
            .with_context(|| format!("Failed to open module {}", path.display()))?;
        Processor::new(host, BufReader::new(file), config)
    };

    processor.with_context(|| format!("Failed to load module {}", path.display()))
}

fn init_tracing(default_filter: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // stdout carries events, so logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(io::stderr)))
        .init();
}

fn read_records(path: Option<&PathBuf>) -> anyhow::Result<Vec<Record>> {
    let reader: Box<dyn BufRead> = match path {
        Some(path) if path.as_os_str() != "-" => Box::new(BufReader::new(
            File::open(path)
                .with_context(|| format!("Failed to open events {}", path.display()))?,
        )),
        _ => Box::new(io::stdin().lock()),
    };

    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.with_context(|| format!("Failed to read line {line_number}"))?;
        if line.trim().is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<Fields>(&line) {
            Ok(event) => Some(event),
            Err(err) => {
                error!(line = line_number, error = %err, "Invalid event");
                None
            }
        };
        records.push(Record {
            line: line_number,
            event,
        });
    }
    Ok(records)
}

fn process_records(processor: &Processor<Fields>, records: &mut [Record], workers: usize) {
    if records.is_empty() {
        return;
    }
    let chunk_size = records.len().div_ceil(workers);

    std::thread::scope(|scope| {
        for chunk in records.chunks_mut(chunk_size) {
            scope.spawn(move || {
                for record in chunk {
                    let failure = match record.event.as_mut() {
                        Some(event) => processor.process(event).err(),
                        None => None,
                    };
                    if let Some(err) = failure {
                        error!(line = record.line, error = %err, "Event processing failed");
                        record.event = None;
                    }
                }
            });
        }
    });
}

/// Write processed events as NDJSON, returning the number of failed records.
fn write_records(records: &[Record]) -> anyhow::Result<usize> {
    let mut out = BufWriter::new(io::stdout().lock());
    let mut failed = 0;

    for record in records {
        match &record.event {
            Some(event) => {
                serde_json::to_writer(&mut out, event)?;
                out.write_all(b"\n")?;
            }
            None => failed += 1,
        }
    }

    out.flush()?;
    Ok(failed)
}
