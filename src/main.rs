//! `fuchupo-ingest` — one full ingest run per invocation.
//!
//! Exit codes: 0 on success (including runs where some enrichments fell
//! back), 1 when the run failed (fetch, persist, cancelled), 2 on a
//! configuration error such as a missing OPENAI_API_KEY.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fuchupo_news::config::IngestConfig;
use fuchupo_news::metrics::Metrics;
use fuchupo_news::{cancel_pair, Pipeline};

#[derive(Debug, Parser)]
#[command(
    name = "fuchupo-ingest",
    version,
    about = "Fetch the news feed once, merge new items, enrich them and write the collection"
)]
struct Cli {
    /// TOML config file (default: $INGEST_CONFIG_PATH, then config/ingest.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feed endpoint (overrides RSS_FEED_URL)
    #[arg(long)]
    feed_url: Option<String>,

    /// Collection file to update (overrides NEWS_STORE_PATH)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Keep at most this many records (capped at 1000)
    #[arg(long)]
    max_items: Option<usize>,

    /// Max enrichment calls in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Skip the AI provider; new items keep their headline
    #[arg(long)]
    no_enrich: bool,

    /// Write Prometheus exposition here after the run (textfile collector)
    #[arg(long, env = "METRICS_TEXTFILE")]
    metrics_textfile: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    summary_json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fuchupo_news=info,fuchupo_ingest=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn build_config(cli: &Cli) -> Result<IngestConfig> {
    let mut cfg = IngestConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.feed_url {
        cfg.feed_url = url.clone();
    }
    if let Some(out) = &cli.out {
        cfg.store_path = out.clone();
    }
    if let Some(n) = cli.max_items {
        cfg.max_items = n;
    }
    if let Some(n) = cli.concurrency {
        cfg.ai.concurrency = n;
    }
    if cli.no_enrich {
        cfg.ai.enabled = false;
    }
    cfg.sanitize();
    Ok(cfg)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let cfg = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };
    let pipeline = match Pipeline::from_config(&cfg) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };

    let metrics = match &cli.metrics_textfile {
        Some(_) => match Metrics::init() {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!("metrics disabled: {e:#}");
                None
            }
        },
        None => None,
    };

    let (cancel, signal) = cancel_pair();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let result = pipeline.run_with_cancel(signal).await;
    ctrl_c.abort();

    if let (Some(m), Some(path)) = (&metrics, &cli.metrics_textfile) {
        if let Err(e) = m.write_textfile(path) {
            tracing::warn!("metrics textfile: {e}");
        }
    }

    match result {
        Ok(summary) => {
            if cli.summary_json {
                match serde_json::to_string(&summary) {
                    Ok(s) => println!("{s}"),
                    Err(e) => tracing::warn!("summary json: {e}"),
                }
            } else {
                println!(
                    "ingest ok: fetched={} added={} dropped={} fallback={} total={} -> {}",
                    summary.fetched,
                    summary.added,
                    summary.dropped,
                    summary.fallback,
                    summary.total,
                    pipeline.store().path().display()
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("ingest failed at {} stage: {e}", e.stage());
            ExitCode::from(1)
        }
    }
}
