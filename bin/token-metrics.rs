use std::{process, sync::Arc};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use log::{error, info};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;
use token_metrics::{
    config::{ChainKind, RunSpec, Settings},
    oracle::{NativePriceOracle, StaticNativePriceStore},
    Database, Orchestrator,
};

/// One invocation of the token-metrics worker: a single chunked run over a
/// window on one chain, optionally a dry run (spec.md §6 "Run
/// specification").
#[derive(Parser)]
#[command(name = "token-metrics", author, version, about = "Chunked token-metrics engine")]
struct Args {
    /// Which pipeline to run.
    #[arg(long, value_enum)]
    kind: ChainKind,

    /// Chain namespace: an `evm_chains` key for EVM-style, ignored for
    /// Solana-style (single namespace, passed as `"solana"`).
    #[arg(long)]
    chain: String,

    /// Window start, RFC 3339.
    #[arg(long)]
    window_start: String,

    /// Window end, RFC 3339.
    #[arg(long)]
    window_end: String,

    /// Minimum qualifying swap count for C5 discovery.
    #[arg(long, default_value_t = 1)]
    min_swaps: u32,

    /// Recorded in the output table's `view_source` column.
    #[arg(long, default_value = "token-metrics")]
    view_source: String,

    /// Override the chain kind's default chunk size.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Without this flag, computes and logs the row count but does not
    /// write to the relational sink.
    #[arg(long)]
    write: bool,

    /// Run `schema/postgres.sql` before starting.
    #[arg(long)]
    migrate: bool,
}

fn parse_rfc3339(label: &str, value: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid RFC 3339 timestamp for --{label}: `{value}`"))
}

#[tokio::main]
async fn main() {
    let log = SimpleLogger::new();
    if let Err(err) = log.init() {
        eprintln!("Logger setup failed: {err}");
    }

    if let Err(err) = run().await {
        error!("run failed: {err:?}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = Settings::load().context("loading configuration")?;

    let window_start = parse_rfc3339("window-start", &args.window_start)?;
    let window_end = parse_rfc3339("window-end", &args.window_end)?;

    let chunk_size = args.chunk_size.unwrap_or_else(|| RunSpec::default_chunk_size(args.kind));
    let spec = RunSpec {
        kind: args.kind,
        chain: args.chain,
        window_start,
        window_end,
        min_swaps: args.min_swaps,
        view_source: args.view_source,
        chunk_size,
        write: args.write,
    };

    info!("connecting to analytics store and relational sink");
    let db = Database::connect(&settings).await.context("connecting to databases")?;
    db.health_check().await.context("health check")?;

    if args.migrate {
        db.migrate().await.context("running migrations")?;
    }

    let native_store = Arc::new(StaticNativePriceStore::new(settings.native_prices.clone()));
    let native_oracle = Arc::new(NativePriceOracle::new(native_store));

    let orchestrator = Orchestrator::new(db, settings, native_oracle);
    let cancellation_token = CancellationToken::new();

    let written = orchestrator.run(spec, cancellation_token).await.context("orchestrator run")?;
    info!("run complete: {written} rows");

    Ok(())
}
