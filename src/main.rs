//! CLI entry point for the GTFS-RT differential-to-full-dataset converter.
//!
//! Reads a stream of DIFFERENTIAL FeedMessages, keeps every entity that has
//! not aged out, and emits one FULL_DATASET snapshot reflecting all of them.

use std::ffi::OsStr;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gtfs_rt_full_dataset::{
    ingest::{DifferentialToFullDataset, Options},
    parser::{parse_delimited_feeds, parse_feed},
    stats::FeedSummary,
};
use tracing::{debug, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_full_dataset")]
#[command(about = "Convert DIFFERENTIAL GTFS-RT feeds into a FULL_DATASET snapshot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a stream of length-delimited DIFFERENTIAL FeedMessages and
    /// write the resulting FULL_DATASET snapshot
    Convert {
        /// File with length-delimited messages, or '-' for stdin
        #[arg(value_name = "FILE_OR_DASH")]
        source: String,

        /// Entity time-to-live in seconds
        #[arg(short, long, default_value_t = 300)]
        ttl: u64,

        /// File to write the snapshot to, or '-' for stdout
        #[arg(short, long, default_value = "-")]
        output: String,
    },
    /// Decode a single FeedMessage (file path or hex string) and print a
    /// JSON summary
    Inspect {
        #[arg(value_name = "FILE_OR_HEX")]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/gtfs_rt_full_dataset.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_full_dataset.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            source,
            ttl,
            output,
        } => {
            convert(&source, ttl, &output).await?;
        }
        Commands::Inspect { source } => {
            inspect(&source)?;
        }
    }

    Ok(())
}

/// Applies every message from `source` and writes the snapshot to `output`.
#[tracing::instrument(skip(output), fields(source = %source, ttl))]
async fn convert(source: &str, ttl: u64, output: &str) -> Result<()> {
    let bytes = read_source(source)?;
    let messages = parse_delimited_feeds(&bytes)
        .with_context(|| format!("decoding length-delimited FeedMessages from {source}"))?;
    info!(messages = messages.len(), "input decoded");

    let mut converter = DifferentialToFullDataset::new(Options {
        ttl: Duration::from_secs(ttl),
        ..Options::default()
    });
    converter.set_on_change(|| debug!("dataset changed"));
    converter.process_batch(&messages)?;

    info!(
        entities = converter.nr_of_entities(),
        time_modified = converter.time_modified(),
        "all messages applied"
    );

    let snapshot = converter.finish().to_vec();
    write_output(output, &snapshot)?;
    info!(bytes = snapshot.len(), "snapshot written");
    Ok(())
}

/// Decodes one FeedMessage and prints a JSON summary to stdout.
fn inspect(source: &str) -> Result<()> {
    let bytes = read_message_bytes(source)?;
    let feed = parse_feed(&bytes)?;
    let summary = FeedSummary::from_feed(&feed);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn read_source(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut bytes = Vec::new();
        std::io::stdin().read_to_end(&mut bytes)?;
        Ok(bytes)
    } else {
        Ok(std::fs::read(source)?)
    }
}

/// `inspect` accepts a file path or, for quick debugging, a hex dump.
fn read_message_bytes(source: &str) -> Result<Vec<u8>> {
    if Path::new(source).exists() {
        Ok(std::fs::read(source)?)
    } else {
        hex::decode(source.trim()).context("source is neither an existing file nor valid hex")
    }
}

fn write_output(output: &str, bytes: &[u8]) -> Result<()> {
    if output == "-" {
        std::io::stdout().write_all(bytes)?;
        std::io::stdout().flush()?;
    } else {
        std::fs::write(output, bytes)?;
    }
    Ok(())
}
